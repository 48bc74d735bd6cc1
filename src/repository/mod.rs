// src/repository/mod.rs

//! Remote repository transport
//!
//! This module provides functionality for:
//! - Fetching the index document from a remote repository
//! - Downloading artifacts in fixed-size chunks with progress reporting
//! - Resuming an interrupted download from its `.part` fragment
//!
//! Transport failures are never retried here; callers report them.

use crate::error::{Error, Result};
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use reqwest::{StatusCode, Url};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Size of one download chunk
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Timeout for establishing a connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Suffix of an in-progress download
const PARTIAL_SUFFIX: &str = ".part";

/// Receives download progress, counted in chunks
pub trait DownloadProgress {
    /// A download of `total_chunks` chunks (0 if unknown) is starting
    fn start(&mut self, label: &str, total_chunks: u64);

    /// `done_chunks` chunks are now on disk
    fn update(&mut self, done_chunks: u64);

    /// The download completed
    fn finish(&mut self);
}

/// Progress sink that reports nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {
    fn start(&mut self, _label: &str, _total_chunks: u64) {}
    fn update(&mut self, _done_chunks: u64) {}
    fn finish(&mut self) {}
}

/// Number of chunks needed for `bytes`
pub fn chunk_count(bytes: u64) -> u64 {
    bytes.div_ceil(CHUNK_SIZE as u64)
}

/// Path of the in-progress fragment for `dest`
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

/// Blocking HTTP client for one remote repository
pub struct RepositoryClient {
    client: Client,
}

impl RepositoryClient {
    /// Create a new repository client
    ///
    /// `timeout` bounds a whole request, body included.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Fetch the raw index document
    pub fn fetch_index(&self, url: &Url) -> Result<Vec<u8>> {
        info!("Fetching repository index from {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| Error::DownloadError(format!("Failed to read response: {}", e)))?;

        debug!("Fetched {} bytes of index", bytes.len());
        Ok(bytes.to_vec())
    }

    /// Download `url` to `dest`
    ///
    /// Data is written to `<dest>.part` and renamed into place only once the
    /// transfer completed and, when `expected_size` is non-zero, the length
    /// matches. An existing fragment is resumed with a range request.
    pub fn download_file(
        &self,
        url: &Url,
        dest: &Path,
        expected_size: u64,
        progress: &mut dyn DownloadProgress,
    ) -> Result<()> {
        info!("Downloading {} to {}", url, dest.display());

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::IoError(format!("Failed to create directory {}: {}", parent.display(), e))
            })?;
        }

        let part = partial_path(dest);
        let mut existing = fs::metadata(&part).map(|m| m.len()).unwrap_or(0);

        if expected_size > 0 && existing == expected_size {
            debug!("Fragment {} is already complete", part.display());
            return finish_download(&part, dest);
        }
        if expected_size > 0 && existing > expected_size {
            warn!("Discarding oversized fragment {}", part.display());
            remove_fragment(&part)?;
            existing = 0;
        }

        let mut request = self.client.get(url.clone());
        if existing > 0 {
            debug!("Resuming {} from byte {}", url, existing);
            request = request.header(RANGE, format!("bytes={}-", existing));
        }

        let mut response = request
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to download {}: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && existing > 0 {
            warn!("Server rejected resume of {}, restarting", url);
            remove_fragment(&part)?;
            return self.download_file(url, dest, expected_size, progress);
        }
        if !status.is_success() {
            return Err(Error::DownloadError(format!("HTTP {} from {}", status, url)));
        }

        let opened = if status == StatusCode::PARTIAL_CONTENT {
            OpenOptions::new().append(true).open(&part)
        } else {
            existing = 0;
            File::create(&part)
        };
        let mut file = opened
            .map_err(|e| Error::IoError(format!("Failed to open {}: {}", part.display(), e)))?;

        let total_bytes = if expected_size > 0 {
            expected_size
        } else {
            existing + response.content_length().unwrap_or(0)
        };
        let label = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| url.to_string());
        progress.start(&label, chunk_count(total_bytes));

        let mut written = existing;
        progress.update(chunk_count(written));

        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let n = response
                .read(&mut buffer)
                .map_err(|e| Error::DownloadError(format!("Failed to read {}: {}", url, e)))?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n]).map_err(|e| {
                Error::IoError(format!("Failed to write {}: {}", part.display(), e))
            })?;
            written += n as u64;
            progress.update(chunk_count(written));
        }
        file.flush()
            .map_err(|e| Error::IoError(format!("Failed to write {}: {}", part.display(), e)))?;
        drop(file);

        if expected_size > 0 && written != expected_size {
            if written > expected_size {
                remove_fragment(&part)?;
            }
            return Err(Error::DownloadError(format!(
                "Size mismatch for {}: expected {} bytes, got {}",
                url, expected_size, written
            )));
        }

        finish_download(&part, dest)?;
        progress.finish();
        info!("Successfully downloaded to {}", dest.display());
        Ok(())
    }
}

fn finish_download(part: &Path, dest: &Path) -> Result<()> {
    fs::rename(part, dest).map_err(|e| {
        Error::IoError(format!(
            "Failed to move {} to {}: {}",
            part.display(),
            dest.display(),
            e
        ))
    })
}

fn remove_fragment(part: &Path) -> Result<()> {
    fs::remove_file(part)
        .map_err(|e| Error::IoError(format!("Failed to remove {}: {}", part.display(), e)))
}
