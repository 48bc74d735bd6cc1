// src/cache.rs

//! Local artifact cache
//!
//! Artifacts are stored at `<cache_root>/<entry.path>`, mirroring the remote
//! repository, alongside the cached index document. An artifact is valid
//! only when its length equals the size recorded in the index; anything else
//! is treated as absent and overwritten by the next fetch.

use crate::config::{artifact_url, Layout};
use crate::error::{Error, Result};
use crate::index::IndexEntry;
use crate::repository::{partial_path, DownloadProgress, RepositoryClient};
use reqwest::Url;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Cached artifacts plus the cached index document
#[derive(Debug, Clone)]
pub struct Cache {
    root: PathBuf,
    index_file: PathBuf,
    keep_file: PathBuf,
}

impl Cache {
    pub fn new(layout: &Layout) -> Self {
        Self {
            root: layout.cache_root.clone(),
            index_file: layout.index_file.clone(),
            keep_file: layout.keep_file.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path of an entry's artifact
    pub fn artifact_path(&self, entry: &IndexEntry) -> PathBuf {
        self.root.join(&entry.path)
    }

    /// True iff the artifact exists and its length matches the index
    pub fn is_cached(&self, entry: &IndexEntry) -> bool {
        match fs::metadata(self.artifact_path(entry)) {
            Ok(meta) => meta.is_file() && meta.len() == entry.size,
            Err(_) => false,
        }
    }

    /// Return the cached artifact, downloading it from `base` if needed
    pub fn fetch(
        &self,
        client: &RepositoryClient,
        base: &Url,
        entry: &IndexEntry,
        progress: &mut dyn DownloadProgress,
    ) -> Result<PathBuf> {
        let dest = self.artifact_path(entry);
        if self.is_cached(entry) {
            debug!("{} is cached at {}", entry.identity(), dest.display());
            return Ok(dest);
        }

        let url = artifact_url(base, &entry.path)?;
        client.download_file(&url, &dest, entry.size, progress)?;

        if !self.is_cached(entry) {
            return Err(Error::DownloadError(format!(
                "Downloaded {} does not match the indexed size of {} bytes",
                dest.display(),
                entry.size
            )));
        }
        Ok(dest)
    }

    /// Remove an entry's artifact and any partial download of it
    ///
    /// Returns true if anything was removed.
    pub fn invalidate(&self, entry: &IndexEntry) -> Result<bool> {
        let dest = self.artifact_path(entry);
        let mut removed = false;
        for path in [partial_path(&dest), dest] {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    Error::IoError(format!("Failed to remove {}: {}", path.display(), e))
                })?;
                debug!("Removed {}", path.display());
                removed = true;
            }
        }
        Ok(removed)
    }

    /// Delete every cached artifact, keeping the index document
    ///
    /// The index is parked next to the cache root while the directory is
    /// removed and recreated. If this is interrupted, the parked file is
    /// restored by [`Layout::recover_index`] the next time the repository
    /// is opened.
    pub fn clean(&self) -> Result<()> {
        if self.index_file.exists() {
            move_file(&self.index_file, &self.keep_file)?;
        }

        if self.root.exists() {
            fs::remove_dir_all(&self.root).map_err(|e| {
                Error::IoError(format!("Failed to remove {}: {}", self.root.display(), e))
            })?;
        }
        fs::create_dir_all(&self.root).map_err(|e| {
            Error::IoError(format!("Failed to create directory {}: {}", self.root.display(), e))
        })?;

        if self.keep_file.exists() {
            move_file(&self.keep_file, &self.index_file)?;
        }

        info!("Cleaned cache {}", self.root.display());
        Ok(())
    }
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| {
        Error::IoError(format!(
            "Failed to move {} to {}: {}",
            from.display(),
            to.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::NoProgress;
    use mockito::Server;
    use std::time::Duration;

    fn setup() -> (tempfile::TempDir, Layout, Cache) {
        let temp = tempfile::tempdir().unwrap();
        let layout = Layout::new(temp.path());
        layout.ensure_dirs().unwrap();
        let cache = Cache::new(&layout);
        (temp, layout, cache)
    }

    fn client() -> RepositoryClient {
        RepositoryClient::new(Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn test_is_cached_requires_exact_size() {
        let (_temp, _layout, cache) = setup();
        let entry = IndexEntry::new("app", "1", "apps/app-1.apk", 5);
        let path = cache.artifact_path(&entry);
        assert!(!cache.is_cached(&entry));

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "").unwrap();
        assert!(!cache.is_cached(&entry));

        fs::write(&path, "123").unwrap();
        assert!(!cache.is_cached(&entry));

        fs::write(&path, "12345").unwrap();
        assert!(cache.is_cached(&entry));
    }

    #[test]
    fn test_fetch_then_invalidate() {
        let mut server = Server::new();
        let _m = server
            .mock("GET", "/repo/apps/app-1.apk")
            .with_status(200)
            .with_body("hello")
            .create();

        let (_temp, _layout, cache) = setup();
        let entry = IndexEntry::new("app", "1", "apps/app-1.apk", 5);
        let base = Url::parse(&format!("{}/repo/", server.url())).unwrap();

        let path = cache
            .fetch(&client(), &base, &entry, &mut NoProgress)
            .unwrap();
        assert_eq!(path, cache.artifact_path(&entry));
        assert!(cache.is_cached(&entry));

        assert!(cache.invalidate(&entry).unwrap());
        assert!(!cache.is_cached(&entry));
        assert!(!cache.invalidate(&entry).unwrap());
    }

    #[test]
    fn test_fetch_requests_literal_file_name() {
        let mut server = Server::new();
        let truncated = server
            .mock("GET", "/repo/apps/C")
            .with_status(200)
            .with_body("wrong")
            .expect(0)
            .create();
        let literal = server
            .mock("GET", "/repo/apps/C%23-1.apk")
            .with_status(200)
            .with_body("sharp")
            .create();

        let (_temp, _layout, cache) = setup();
        let entry = IndexEntry::new("C#", "1", "apps/C#-1.apk", 5);
        let base = Url::parse(&format!("{}/repo/", server.url())).unwrap();

        let path = cache
            .fetch(&client(), &base, &entry, &mut NoProgress)
            .unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "sharp");
        literal.assert();
        truncated.assert();
    }

    #[test]
    fn test_fetch_skips_download_when_cached() {
        let mut server = Server::new();
        let m = server
            .mock("GET", "/app-1.apk")
            .with_status(200)
            .with_body("hello")
            .expect(0)
            .create();

        let (_temp, _layout, cache) = setup();
        let entry = IndexEntry::new("app", "1", "app-1.apk", 5);
        fs::write(cache.artifact_path(&entry), "hello").unwrap();

        let base = Url::parse(&format!("{}/", server.url())).unwrap();
        cache
            .fetch(&client(), &base, &entry, &mut NoProgress)
            .unwrap();
        m.assert();
    }

    #[test]
    fn test_fetch_overwrites_size_mismatch() {
        let mut server = Server::new();
        let _m = server
            .mock("GET", "/app-1.apk")
            .with_status(200)
            .with_body("hello")
            .create();

        let (_temp, _layout, cache) = setup();
        let entry = IndexEntry::new("app", "1", "app-1.apk", 5);
        fs::write(cache.artifact_path(&entry), "stale content").unwrap();

        let base = Url::parse(&format!("{}/", server.url())).unwrap();
        let path = cache
            .fetch(&client(), &base, &entry, &mut NoProgress)
            .unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "hello");
    }

    #[test]
    fn test_clean_preserves_index() {
        let (_temp, layout, cache) = setup();
        fs::write(&layout.index_file, "[]").unwrap();
        let entry = IndexEntry::new("app", "1", "apps/app-1.apk", 5);
        let path = cache.artifact_path(&entry);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "12345").unwrap();

        cache.clean().unwrap();

        assert!(cache.root().is_dir());
        assert!(!path.exists());
        assert!(!cache.root().join("apps").exists());
        assert_eq!(fs::read_to_string(&layout.index_file).unwrap(), "[]");
        assert!(!layout.keep_file.exists());
    }

    #[test]
    fn test_clean_without_index() {
        let (_temp, layout, cache) = setup();
        cache.clean().unwrap();
        assert!(cache.root().is_dir());
        assert!(!layout.index_file.exists());
    }
}
