// src/repo.rs

//! Client context
//!
//! [`Repo`] owns everything one client instance needs for a root directory:
//! configuration, HTTP transport, the index store, the cache and the
//! installed tree. Operations that need the index load it explicitly through
//! [`Repo::ensure_loaded`]; there is no hidden global state.
//!
//! One `Repo` is expected per root directory at a time. Nothing here guards
//! against another process working on the same root.

use crate::cache::Cache;
use crate::config::{repo_base, Layout, RepoConfig};
use crate::error::{Error, Result};
use crate::index::{Index, IndexEntry, IndexStore};
use crate::install::{libs, InstallOutcome, Installer, UninstallOutcome};
use crate::query::{self, SearchHit, SearchOptions};
use crate::repository::{DownloadProgress, RepositoryClient};
use crate::resolver;
use std::path::PathBuf;
use tracing::{info, warn};

pub struct Repo {
    config: RepoConfig,
    layout: Layout,
    client: RepositoryClient,
    store: IndexStore,
    cache: Cache,
    installer: Installer,
}

impl Repo {
    /// Open (and if needed create) the directory tree under `config.root`
    pub fn open(config: RepoConfig) -> Result<Self> {
        let layout = config.layout();
        layout.ensure_dirs()?;

        for abi in &config.abis {
            if !libs::is_known_abi(abi) {
                warn!("Unknown ABI '{}' will never be deployed", abi);
            }
        }

        Ok(Self {
            client: RepositoryClient::new(config.timeout)?,
            store: IndexStore::new(&layout.index_file),
            cache: Cache::new(&layout),
            installer: Installer::new(&layout.installed_root),
            layout,
            config,
        })
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    /// Refresh the index from the remote repository
    ///
    /// Returns the number of packages in the new index.
    pub fn update(&mut self) -> Result<usize> {
        let url = self.config.remote_index_url()?;
        let index = self.store.update(&self.client, &url)?;
        Ok(index.len())
    }

    /// Load the cached index from disk
    pub fn load(&mut self) -> Result<usize> {
        Ok(self.store.load()?.len())
    }

    /// Load the index from disk, or from the remote if that fails
    pub fn ensure_loaded(&mut self) -> Result<&Index> {
        let url = self.config.remote_index_url();
        self.store.ensure_loaded(&self.client, url)
    }

    /// Index entry for an identity
    pub fn entry(&mut self, identity: &str) -> Result<IndexEntry> {
        self.ensure_loaded()?
            .get(identity)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("can't find {}", identity)))
    }

    /// Search the index; see [`query::search`]
    pub fn search(&mut self, pattern: &str, options: SearchOptions) -> Result<Vec<SearchHit>> {
        self.ensure_loaded()?;
        let index = self.loaded_index()?;
        query::search(index, &self.cache, &self.installer, pattern, options)
    }

    /// Expand a partial name to an identity; see [`resolver::expand`]
    pub fn expand(&mut self, name: &str, installed_only: bool) -> Result<String> {
        self.ensure_loaded()?;
        let index = self.loaded_index()?;
        resolver::expand(index, &self.cache, &self.installer, name, installed_only)
    }

    pub fn is_cached(&mut self, identity: &str) -> Result<bool> {
        let entry = self.entry(identity)?;
        Ok(self.cache.is_cached(&entry))
    }

    /// Make sure an identity's artifact is cached and return its path
    pub fn fetch(
        &mut self,
        identity: &str,
        progress: &mut dyn DownloadProgress,
    ) -> Result<PathBuf> {
        let entry = self.entry(identity)?;
        if self.cache.is_cached(&entry) {
            return Ok(self.cache.artifact_path(&entry));
        }

        let base = repo_base(&self.config.remote_index_url()?)?;
        self.cache.fetch(&self.client, &base, &entry, progress)
    }

    /// Drop an identity's cached artifact
    pub fn invalidate(&mut self, identity: &str) -> Result<bool> {
        let entry = self.entry(identity)?;
        self.cache.invalidate(&entry)
    }

    /// Remove all cached artifacts, keeping the index
    pub fn clean(&self) -> Result<()> {
        self.cache.clean()
    }

    pub fn is_installed(&self, identity: &str) -> bool {
        self.installer.is_installed(identity)
    }

    /// Install an identity keeping the configured ABIs
    pub fn install(
        &mut self,
        identity: &str,
        reinstall: bool,
        progress: &mut dyn DownloadProgress,
    ) -> Result<InstallOutcome> {
        let abis = self.config.abis.clone();
        self.install_with_abis(identity, reinstall, &abis, progress)
    }

    /// Install an identity keeping only `wanted_abis`
    ///
    /// An already installed identity is left alone unless `reinstall` is
    /// set, without fetching anything.
    pub fn install_with_abis(
        &mut self,
        identity: &str,
        reinstall: bool,
        wanted_abis: &[String],
        progress: &mut dyn DownloadProgress,
    ) -> Result<InstallOutcome> {
        let entry = self.entry(identity)?;
        if self.installer.is_installed(identity) && !reinstall {
            info!("{} is already installed", identity);
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        let advertised = entry.native_abis();
        if !advertised.is_empty() && !advertised.iter().any(|a| wanted_abis.contains(a)) {
            warn!(
                "{} ships native code for {} only; none of it will be kept",
                identity,
                advertised.join(", ")
            );
        }

        let artifact = self.fetch(identity, progress)?;
        self.installer
            .install(identity, &artifact, reinstall, wanted_abis)
    }

    /// Remove an installed identity; the index is not consulted
    pub fn uninstall(&self, identity: &str, force: bool) -> Result<UninstallOutcome> {
        self.installer.uninstall(identity, force)
    }

    /// Identities currently installed, sorted
    pub fn installed(&self) -> Result<Vec<String>> {
        self.installer.list_installed()
    }

    /// Drop leftovers of interrupted installs; see [`Installer::sweep_staging`]
    pub fn sweep_staging(&self) -> Result<usize> {
        self.installer.sweep_staging()
    }

    fn loaded_index(&self) -> Result<&Index> {
        self.store
            .index()
            .ok_or_else(|| Error::IndexUnavailable("index not loaded".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::NoProgress;
    use std::fs;

    /// Repo with a local index and one cached artifact, no remote
    fn offline_repo() -> (tempfile::TempDir, Repo) {
        let temp = tempfile::tempdir().unwrap();
        let layout = Layout::new(temp.path());
        layout.ensure_dirs().unwrap();
        fs::write(
            &layout.index_file,
            r#"[{"package": "app", "version": "1", "path": "app-1.apk", "size": 3}]"#,
        )
        .unwrap();
        fs::write(layout.cache_root.join("app-1.apk"), "abc").unwrap();

        let repo = Repo::open(RepoConfig::new(temp.path())).unwrap();
        (temp, repo)
    }

    #[test]
    fn test_open_creates_layout() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("nested/root");
        let repo = Repo::open(RepoConfig::new(&root)).unwrap();
        assert!(repo.layout().cache_root.is_dir());
        assert!(repo.layout().installed_root.is_dir());
    }

    #[test]
    fn test_cached_fetch_works_offline() {
        let (_temp, mut repo) = offline_repo();
        assert!(repo.is_cached("app-1").unwrap());
        let path = repo.fetch("app-1", &mut NoProgress).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "abc");
    }

    #[test]
    fn test_uncached_fetch_without_remote_is_config_error() {
        let (_temp, mut repo) = offline_repo();
        assert!(repo.invalidate("app-1").unwrap());
        assert!(matches!(
            repo.fetch("app-1", &mut NoProgress),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_unknown_identity_not_found() {
        let (_temp, mut repo) = offline_repo();
        assert!(matches!(repo.entry("nope-1"), Err(Error::NotFound(_))));
        assert!(matches!(
            repo.install("nope-1", false, &mut NoProgress),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_index_without_remote_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let mut repo = Repo::open(RepoConfig::new(temp.path())).unwrap();
        assert!(matches!(
            repo.search(".", SearchOptions::default()),
            Err(Error::IndexUnavailable(_))
        ));
    }

    #[test]
    fn test_update_without_remote_is_config_error() {
        let (_temp, mut repo) = offline_repo();
        assert!(matches!(repo.update(), Err(Error::ConfigError(_))));
        assert_eq!(repo.load().unwrap(), 1);
    }
}
