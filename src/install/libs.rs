// src/install/libs.rs

//! Native library deployment
//!
//! APKs carry shared libraries under `lib/<abi>/`. On install these are
//! extracted next to the linked APK and then reshaped the way the Android
//! package manager lays them out on device: unwanted ABIs are pruned and
//! wanted ones are renamed to their instruction-set directory
//! (`lib/arm64-v8a` becomes `lib/arm64`).

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path};
use tracing::{debug, warn};
use zip::ZipArchive;

/// Archive prefix of native library entries
pub const LIB_PREFIX: &str = "lib/";

/// Known ABIs and the instruction set each one maps to
///
/// Order matters: when several ABIs map to the same instruction set, the
/// first one listed claims the directory.
pub const ABI_MAP: &[(&str, &str)] = &[
    ("arm64-v8a", "arm64"),
    ("armeabi-v7a", "arm"),
    ("armeabi", "arm"),
    ("x86_64", "x86_64"),
    ("x86", "x86"),
    ("mips64", "mips64"),
    ("mips", "mips"),
];

/// Instruction set for a known ABI
pub fn instruction_set(abi: &str) -> Option<&'static str> {
    ABI_MAP
        .iter()
        .find(|(known, _)| *known == abi)
        .map(|(_, isa)| *isa)
}

/// Whether `abi` appears in the ABI map
pub fn is_known_abi(abi: &str) -> bool {
    instruction_set(abi).is_some()
}

/// Extract every `lib/` entry of `archive` into `dest`, keeping paths
///
/// Returns the number of files written.
pub fn extract_libs(archive: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", archive.display(), e)))?;
    let mut zip = ZipArchive::new(file).map_err(|e| {
        Error::ArchiveError(format!("Failed to read {}: {}", archive.display(), e))
    })?;

    let mut count = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| {
            Error::ArchiveError(format!("Failed to read entry {} of {}: {}", i, archive.display(), e))
        })?;

        if !entry.name().starts_with(LIB_PREFIX) {
            continue;
        }
        let relative = match entry.enclosed_name() {
            Some(path) if is_lib_path(&path) => path,
            _ => {
                warn!("Skipping unsafe archive entry {}", entry.name());
                continue;
            }
        };

        let target = dest.join(&relative);
        if entry.is_dir() {
            create_dir(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            create_dir(parent)?;
        }

        let mut out = File::create(&target)
            .map_err(|e| Error::IoError(format!("Failed to create {}: {}", target.display(), e)))?;
        io::copy(&mut entry, &mut out).map_err(|e| {
            Error::ArchiveError(format!("Failed to extract {}: {}", relative.display(), e))
        })?;
        debug!("Extracted {}", relative.display());
        count += 1;
    }

    Ok(count)
}

/// A plain relative path below `lib/`
fn is_lib_path(path: &Path) -> bool {
    let mut components = path.components();
    components.next() == Some(Component::Normal("lib".as_ref()))
        && components.all(|c| matches!(c, Component::Normal(_)))
}

/// Prune and rename the extracted `lib/` tree under `package_dir`
///
/// For each known ABI in map order: an ABI not in `wanted` has its directory
/// removed; a wanted ABI is renamed to its instruction set unless that
/// directory already exists, in which case it is left where it is.
pub fn deploy_libs(package_dir: &Path, wanted: &[String]) -> Result<()> {
    let lib_dir = package_dir.join("lib");
    if !lib_dir.is_dir() {
        debug!("No native libraries in {}", package_dir.display());
        return Ok(());
    }

    for (abi, isa) in ABI_MAP {
        let abi_dir = lib_dir.join(abi);

        if !wanted.iter().any(|w| w == abi) {
            if abi_dir.exists() {
                fs::remove_dir_all(&abi_dir).map_err(|e| {
                    Error::IoError(format!("Failed to remove {}: {}", abi_dir.display(), e))
                })?;
                debug!("Pruned unwanted ABI {}", abi);
            }
            continue;
        }

        if abi == isa || !abi_dir.is_dir() {
            continue;
        }

        let isa_dir = lib_dir.join(isa);
        if isa_dir.exists() {
            warn!(
                "Instruction set {} already deployed, leaving {} in place",
                isa, abi
            );
            continue;
        }

        fs::rename(&abi_dir, &isa_dir).map_err(|e| {
            Error::IoError(format!(
                "Failed to move {} to {}: {}",
                abi_dir.display(),
                isa_dir.display(),
                e
            ))
        })?;
        debug!("Deployed {} as {}", abi, isa);
    }

    Ok(())
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|e| Error::IoError(format!("Failed to create directory {}: {}", path.display(), e)))
}
