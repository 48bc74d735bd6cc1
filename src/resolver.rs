// src/resolver.rs

//! Expansion of partial package names to identities

use crate::cache::Cache;
use crate::error::Result;
use crate::index::Index;
use crate::install::Installer;
use crate::query::{self, SearchOptions};
use tracing::debug;

/// Expand a user-supplied name to a package identity
///
/// An exact identity is returned as is. Otherwise the name is matched
/// literally (case-insensitive) against identities, keeping the latest
/// version of each package; a single match is returned. Ambiguous or
/// empty results give back the input unchanged, so the caller fails later
/// with a plain "not found".
pub fn expand(
    index: &Index,
    cache: &Cache,
    installer: &Installer,
    name: &str,
    installed_only: bool,
) -> Result<String> {
    if index.contains(name) {
        return Ok(name.to_string());
    }

    let options = SearchOptions {
        name_only: true,
        latest_only: true,
        installed_only,
    };
    let hits = query::search(index, cache, installer, &regex::escape(name), options)?;

    match hits.as_slice() {
        [hit] => {
            debug!("Expanded {} to {}", name, hit.identity);
            Ok(hit.identity.clone())
        }
        _ => {
            debug!("{} matches {} packages, not expanded", name, hits.len());
            Ok(name.to_string())
        }
    }
}
