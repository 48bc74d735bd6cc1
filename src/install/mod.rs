// src/install/mod.rs

//! Installed-package tree
//!
//! Each installed package is a directory `<installed_root>/<identity>/`
//! holding a hard link to the cached APK (`base.apk`) and its deployed
//! native libraries under `lib/<instruction-set>/`.
//!
//! Installs are staged in a hidden sibling directory and published with a
//! single rename, so an interrupted install never looks installed.

pub mod libs;

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the linked artifact inside an installed package
pub const ARTIFACT_FILE_NAME: &str = "base.apk";

/// Prefix of in-progress install directories
const STAGING_PREFIX: &str = ".staging-";

/// Result of an install request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Package was installed at the given directory
    Installed(PathBuf),
    /// Package was already installed and `reinstall` was not requested
    AlreadyInstalled,
}

impl InstallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InstallOutcome::Installed(_))
    }
}

/// Result of an uninstall request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallOutcome {
    Removed,
    /// Nothing to remove; counts as success only when forced
    NotInstalled { forced: bool },
}

impl UninstallOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            UninstallOutcome::Removed => true,
            UninstallOutcome::NotInstalled { forced } => *forced,
        }
    }
}

/// Manages the installed-package root
#[derive(Debug, Clone)]
pub struct Installer {
    root: PathBuf,
}

impl Installer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of an installed package
    pub fn package_dir(&self, identity: &str) -> PathBuf {
        self.root.join(identity)
    }

    /// Canonical path of an installed package's linked artifact
    pub fn artifact_path(&self, identity: &str) -> PathBuf {
        self.package_dir(identity).join(ARTIFACT_FILE_NAME)
    }

    pub fn is_installed(&self, identity: &str) -> bool {
        is_valid_identity(identity) && self.artifact_path(identity).is_file()
    }

    /// Install `artifact` as `identity`
    ///
    /// The artifact is hard-linked, so it must live on the same filesystem as
    /// the installed root. Only libraries for `wanted_abis` are kept.
    pub fn install(
        &self,
        identity: &str,
        artifact: &Path,
        reinstall: bool,
        wanted_abis: &[String],
    ) -> Result<InstallOutcome> {
        check_identity(identity)?;

        if self.is_installed(identity) && !reinstall {
            debug!("{} is already installed", identity);
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        let staging = self.root.join(format!("{}{}", STAGING_PREFIX, identity));
        if staging.exists() {
            debug!("Removing stale staging directory {}", staging.display());
            remove_tree(&staging)?;
        }

        if let Err(e) = self.stage(artifact, &staging, wanted_abis) {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!(
                    "Failed to clean up {}: {}",
                    staging.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        let target = self.package_dir(identity);
        if target.exists() {
            info!("Removing existing installation of {}", identity);
            remove_tree(&target)?;
        }
        fs::rename(&staging, &target).map_err(|e| {
            Error::IoError(format!(
                "Failed to move {} to {}: {}",
                staging.display(),
                target.display(),
                e
            ))
        })?;

        info!("Installed {} to {}", identity, target.display());
        Ok(InstallOutcome::Installed(target))
    }

    fn stage(&self, artifact: &Path, staging: &Path, wanted_abis: &[String]) -> Result<()> {
        fs::create_dir_all(staging).map_err(|e| {
            Error::IoError(format!("Failed to create directory {}: {}", staging.display(), e))
        })?;

        // The link shares the cached artifact's inode; extract before it exists
        let count = libs::extract_libs(artifact, staging)?;
        debug!("Extracted {} native library files", count);
        libs::deploy_libs(staging, wanted_abis)?;

        let link = staging.join(ARTIFACT_FILE_NAME);
        fs::hard_link(artifact, &link).map_err(|e| {
            Error::IoError(format!(
                "Failed to link {} to {} (cache and install root must share a filesystem): {}",
                artifact.display(),
                link.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Remove an installed package
    pub fn uninstall(&self, identity: &str, force: bool) -> Result<UninstallOutcome> {
        check_identity(identity)?;

        let dir = self.package_dir(identity);
        if !dir.exists() {
            if force {
                debug!("{} is not installed, nothing to do", identity);
            } else {
                warn!("{} is not installed", identity);
            }
            return Ok(UninstallOutcome::NotInstalled { forced: force });
        }

        remove_tree(&dir)?;
        info!("Uninstalled {}", identity);
        Ok(UninstallOutcome::Removed)
    }

    /// Remove staging directories left behind by interrupted installs
    ///
    /// Returns the number of directories removed.
    pub fn sweep_staging(&self) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }

        let entries = fs::read_dir(&self.root).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {}", self.root.display(), e))
        })?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            if !entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                continue;
            }
            let path = entry.path();
            debug!("Removing stale staging directory {}", path.display());
            if path.is_dir() {
                remove_tree(&path)?;
            } else {
                fs::remove_file(&path).map_err(|e| {
                    Error::IoError(format!("Failed to remove {}: {}", path.display(), e))
                })?;
            }
            removed += 1;
        }
        Ok(removed)
    }

    /// Identities of all installed packages, sorted
    pub fn list_installed(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.root).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {}", self.root.display(), e))
        })?;

        let mut installed = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.is_installed(&name) {
                installed.push(name);
            }
        }
        installed.sort();
        Ok(installed)
    }
}

/// An identity doubles as a directory name, so it must be a single
/// visible path component
fn is_valid_identity(identity: &str) -> bool {
    !identity.is_empty()
        && !identity.starts_with('.')
        && !identity.contains(['/', '\\'])
}

fn check_identity(identity: &str) -> Result<()> {
    if is_valid_identity(identity) {
        Ok(())
    } else {
        Err(Error::NotFound(format!("invalid package identity '{}'", identity)))
    }
}

fn remove_tree(path: &Path) -> Result<()> {
    fs::remove_dir_all(path)
        .map_err(|e| Error::IoError(format!("Failed to remove {}: {}", path.display(), e)))
}
