// src/config.rs

//! Client configuration and on-disk layout
//!
//! apkget keeps no configuration file. Everything comes from command-line
//! flags (with environment fallbacks) and is collected into a [`RepoConfig`].
//! The root directory is laid out as:
//!
//! ```text
//! <root>/
//!   repo/              cache root (mirrors the remote repository)
//!     index.json       cached index document
//!     ...              cached artifacts at <entry.path>
//!   install/           one directory per installed identity
//!   index.json.keep    index parked here while the cache is cleaned
//! ```

use crate::error::{Error, Result};
use crate::install::libs::ABI_MAP;
use reqwest::Url;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Default root directory, relative to the working directory
pub const DEFAULT_ROOT: &str = "app";

/// File name of the index document, both remotely and in the cache
pub const INDEX_FILE_NAME: &str = "index.json";

/// Default transport timeout for a whole request (downloads included)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

const CACHE_DIR_NAME: &str = "repo";
const INSTALL_DIR_NAME: &str = "install";
const KEEP_FILE_NAME: &str = "index.json.keep";

/// Settings for one client instance operating on one root directory
#[derive(Debug, Clone)]
pub struct RepoConfig {
    /// Local root directory
    pub root: PathBuf,

    /// Remote index URL; only required by `update`
    pub index_url: Option<String>,

    /// ABIs whose native libraries are kept on install
    pub abis: Vec<String>,

    /// Transport timeout
    pub timeout: Duration,
}

impl RepoConfig {
    /// Create a configuration rooted at `root`, keeping every known ABI
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_url: None,
            abis: ABI_MAP.iter().map(|(abi, _)| abi.to_string()).collect(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the remote index URL
    pub fn with_index_url(mut self, url: impl Into<String>) -> Self {
        self.index_url = Some(url.into());
        self
    }

    /// Restrict the ABIs kept on install
    pub fn with_abis<I, S>(mut self, abis: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.abis = abis.into_iter().map(Into::into).collect();
        self
    }

    /// Set the transport timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Directory layout derived from the root
    pub fn layout(&self) -> Layout {
        Layout::new(&self.root)
    }

    /// Parsed and normalized remote index URL
    pub fn remote_index_url(&self) -> Result<Url> {
        match &self.index_url {
            Some(url) => normalize_index_url(url),
            None => Err(Error::ConfigError(
                "no remote repository configured (use --repo or APKGET_REPO)".to_string(),
            )),
        }
    }
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

/// Parse an index URL, appending `index.json` when it names a directory
pub fn normalize_index_url(url: &str) -> Result<Url> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::ConfigError("empty repository URL".to_string()));
    }

    let full = if url.ends_with('/') {
        format!("{}{}", url, INDEX_FILE_NAME)
    } else {
        url.to_string()
    };

    let parsed = Url::parse(&full)
        .map_err(|e| Error::ConfigError(format!("Invalid repository URL {}: {}", full, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Error::ConfigError(format!(
            "Unsupported URL scheme '{}' in {}",
            other, full
        ))),
    }
}

/// Base URL artifacts are resolved against: the index URL's directory
pub fn repo_base(index_url: &Url) -> Result<Url> {
    index_url
        .join("./")
        .map_err(|e| Error::ConfigError(format!("Invalid repository URL {}: {}", index_url, e)))
}

/// URL of an artifact: `path` appended to `base` one segment at a time
///
/// Each segment is percent-encoded, so `#`, `?` and `:` in a file name stay
/// part of the path.
pub fn artifact_url(base: &Url, path: &str) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::ConfigError(format!("Repository URL {} cannot be a base", base)))?
        .pop_if_empty()
        .extend(path.split('/').filter(|s| !s.is_empty() && *s != "."));
    Ok(url)
}

/// Paths derived from the root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub cache_root: PathBuf,
    pub index_file: PathBuf,
    pub installed_root: PathBuf,
    pub keep_file: PathBuf,
}

impl Layout {
    pub fn new(root: &Path) -> Self {
        let cache_root = root.join(CACHE_DIR_NAME);
        Self {
            root: root.to_path_buf(),
            index_file: cache_root.join(INDEX_FILE_NAME),
            cache_root,
            installed_root: root.join(INSTALL_DIR_NAME),
            keep_file: root.join(KEEP_FILE_NAME),
        }
    }

    /// Create the root, cache and installed directories, then recover an
    /// index left parked by an interrupted clean
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.root, &self.cache_root, &self.installed_root] {
            fs::create_dir_all(dir).map_err(|e| {
                Error::IoError(format!("Failed to create directory {}: {}", dir.display(), e))
            })?;
        }
        self.recover_index()?;
        Ok(())
    }

    /// Move a parked index back into the cache
    ///
    /// Returns true if an index was restored. A keep-file next to an existing
    /// cache index is stale and removed.
    pub fn recover_index(&self) -> Result<bool> {
        if !self.keep_file.exists() {
            return Ok(false);
        }

        if self.index_file.exists() {
            debug!("Removing stale parked index {}", self.keep_file.display());
            fs::remove_file(&self.keep_file).map_err(|e| {
                Error::IoError(format!("Failed to remove {}: {}", self.keep_file.display(), e))
            })?;
            return Ok(false);
        }

        warn!(
            "Restoring index parked by an interrupted clean: {}",
            self.keep_file.display()
        );
        fs::create_dir_all(&self.cache_root).map_err(|e| {
            Error::IoError(format!(
                "Failed to create directory {}: {}",
                self.cache_root.display(),
                e
            ))
        })?;
        fs::rename(&self.keep_file, &self.index_file).map_err(|e| {
            Error::IoError(format!(
                "Failed to move {} to {}: {}",
                self.keep_file.display(),
                self.index_file.display(),
                e
            ))
        })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = Layout::new(Path::new("/tmp/apps"));
        assert_eq!(layout.cache_root, PathBuf::from("/tmp/apps/repo"));
        assert_eq!(layout.index_file, PathBuf::from("/tmp/apps/repo/index.json"));
        assert_eq!(layout.installed_root, PathBuf::from("/tmp/apps/install"));
        assert_eq!(layout.keep_file, PathBuf::from("/tmp/apps/index.json.keep"));
    }

    #[test]
    fn test_normalize_index_url() {
        let url = normalize_index_url("http://example.com/repo/").unwrap();
        assert_eq!(url.as_str(), "http://example.com/repo/index.json");

        let url = normalize_index_url("https://example.com/apks/all.json").unwrap();
        assert_eq!(url.as_str(), "https://example.com/apks/all.json");

        assert!(normalize_index_url("").is_err());
        assert!(normalize_index_url("ftp://example.com/index.json").is_err());
        assert!(normalize_index_url("not a url").is_err());
    }

    #[test]
    fn test_repo_base_is_directory_of_index() {
        let url = normalize_index_url("http://example.com/repo/index.json").unwrap();
        let base = repo_base(&url).unwrap();
        assert_eq!(base.as_str(), "http://example.com/repo/");
        assert_eq!(
            base.join("apps/foo-1.0.apk").unwrap().as_str(),
            "http://example.com/repo/apps/foo-1.0.apk"
        );
    }

    #[test]
    fn test_artifact_url_keeps_path_literal() {
        let base = Url::parse("http://example.com/repo/").unwrap();
        assert_eq!(
            artifact_url(&base, "apps/C#-1.apk").unwrap().as_str(),
            "http://example.com/repo/apps/C%23-1.apk"
        );
        assert_eq!(
            artifact_url(&base, "./sub/what?.apk").unwrap().as_str(),
            "http://example.com/repo/sub/what%3F.apk"
        );
        assert_eq!(
            artifact_url(&base, "a b.apk").unwrap().as_str(),
            "http://example.com/repo/a%20b.apk"
        );
        let url = artifact_url(&base, "http://other.example/x.apk").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_missing_index_url_is_config_error() {
        let config = RepoConfig::new("app");
        assert!(matches!(
            config.remote_index_url(),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_default_abis_cover_known_map() {
        let config = RepoConfig::default();
        assert_eq!(config.abis.len(), ABI_MAP.len());
        assert!(config.abis.iter().any(|a| a == "arm64-v8a"));
    }

    #[test]
    fn test_recover_parked_index() {
        let temp = tempfile::tempdir().unwrap();
        let layout = Layout::new(temp.path());
        fs::write(&layout.keep_file, "[]").unwrap();

        layout.ensure_dirs().unwrap();

        assert!(!layout.keep_file.exists());
        assert_eq!(fs::read_to_string(&layout.index_file).unwrap(), "[]");
    }

    #[test]
    fn test_stale_keep_file_removed() {
        let temp = tempfile::tempdir().unwrap();
        let layout = Layout::new(temp.path());
        fs::create_dir_all(&layout.cache_root).unwrap();
        fs::write(&layout.index_file, "[1]").unwrap();
        fs::write(&layout.keep_file, "[2]").unwrap();

        assert!(!layout.recover_index().unwrap());
        assert!(!layout.keep_file.exists());
        assert_eq!(fs::read_to_string(&layout.index_file).unwrap(), "[1]");
    }
}
