// src/index/store.rs

//! Local index cache backed by a single JSON file

use super::{Index, IndexEntry};
use crate::error::{Error, Result};
use crate::repository::RepositoryClient;
use reqwest::Url;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Loads, refreshes and holds the in-memory index
#[derive(Debug)]
pub struct IndexStore {
    path: PathBuf,
    index: Option<Index>,
}

impl IndexStore {
    /// Create a store for the index file at `path`; nothing is read yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            index: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory index, if one has been loaded
    pub fn index(&self) -> Option<&Index> {
        self.index.as_ref()
    }

    /// Parse the cached index file into memory
    ///
    /// A missing file is `NotFound`; a document that is not a JSON array is a
    /// `ParseError`. On failure the previously loaded index, if any, is kept.
    pub fn load(&mut self) -> Result<&Index> {
        if !self.path.exists() {
            return Err(Error::NotFound(format!(
                "no index found at {}",
                self.path.display()
            )));
        }

        let data = fs::read(&self.path).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let index = Index::parse(&data)?;

        debug!("Loaded {} entries from {}", index.len(), self.path.display());
        Ok(&*self.index.insert(index))
    }

    /// Replace the cached index file with the remote document and reload it
    ///
    /// The document is validated before anything is written, and written
    /// through a temporary file, so a transport or parse failure leaves the
    /// previous file untouched.
    pub fn update(&mut self, client: &RepositoryClient, url: &Url) -> Result<&Index> {
        let data = client.fetch_index(url)?;
        let fetched = Index::parse(&data)?;

        self.write_file(&data)?;
        info!("Updated index from {} ({} packages)", url, fetched.len());

        self.load()
    }

    /// Make sure an index is in memory
    ///
    /// Tries the local file first, then a remote update. If both fail the
    /// index is unavailable and nothing else can proceed.
    pub fn ensure_loaded(
        &mut self,
        client: &RepositoryClient,
        url: Result<Url>,
    ) -> Result<&Index> {
        if self.index.is_none() {
            let loaded = self.load().map(|_| ());
            if let Err(local) = loaded {
                warn!("Local index unusable ({}), updating from remote", local);
                let remote = url.and_then(|url| self.update(client, &url).map(|_| ()));
                if let Err(remote) = remote {
                    return Err(Error::IndexUnavailable(format!(
                        "local: {}; remote: {}",
                        local, remote
                    )));
                }
            }
        }

        self.index
            .as_ref()
            .ok_or_else(|| Error::IndexUnavailable("index not loaded".to_string()))
    }

    /// Look up an entry in the loaded index
    pub fn get(&self, identity: &str) -> Option<&IndexEntry> {
        self.index.as_ref().and_then(|index| index.get(identity))
    }

    fn write_file(&self, data: &[u8]) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| {
            Error::IoError(format!("Failed to create directory {}: {}", dir.display(), e))
        })?;

        let mut temp = NamedTempFile::new_in(dir).map_err(|e| {
            Error::IoError(format!("Failed to create temp file in {}: {}", dir.display(), e))
        })?;
        temp.write_all(data)
            .map_err(|e| Error::IoError(format!("Failed to write index: {}", e)))?;
        temp.persist(&self.path).map_err(|e| {
            Error::IoError(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e.error
            ))
        })?;
        Ok(())
    }
}
