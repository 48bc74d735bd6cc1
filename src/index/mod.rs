// src/index/mod.rs

//! Package index
//!
//! The index is a JSON array of package records published next to the
//! artifacts. Each record is keyed locally by its identity,
//! `<package>-<version>`. Fields apkget does not interpret (launchable
//! activities, native ABIs, ...) are carried along untouched.

mod store;

pub use store::IndexStore;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Component, Path};
use tracing::{debug, warn};

/// Optional index field listing the native ABIs an APK ships
const NATIVE_ABIS_FIELD: &str = "jnilib";

/// One package record from the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Android package name (e.g. `org.example.app`)
    pub package: String,

    /// Version name
    pub version: String,

    /// Monotonic version code, used to pick the latest version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vercode: Option<i64>,

    /// Display title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Artifact location relative to the repository root
    pub path: String,

    /// Artifact length in bytes
    pub size: u64,

    /// Any other fields, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IndexEntry {
    /// Create an entry with no optional fields
    pub fn new(package: &str, version: &str, path: &str, size: u64) -> Self {
        Self {
            package: package.to_string(),
            version: version.to_string(),
            vercode: None,
            title: None,
            path: path.to_string(),
            size,
            extra: Map::new(),
        }
    }

    /// Canonical identity, `<package>-<version>`
    pub fn identity(&self) -> String {
        format!("{}-{}", self.package, self.version)
    }

    /// Version code, 0 when the index does not carry one
    pub fn vercode(&self) -> i64 {
        self.vercode.unwrap_or(0)
    }

    /// Native ABIs advertised by the index
    ///
    /// Accepts a JSON list or the comma-joined string form.
    pub fn native_abis(&self) -> Vec<String> {
        match self.extra.get(NATIVE_ABIS_FIELD) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(joined)) => joined
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether `path` stays inside the repository root
    ///
    /// A `:` in the first component would read as a URL scheme or a drive.
    fn has_safe_path(&self) -> bool {
        let path = Path::new(&self.path);
        !self.path.is_empty()
            && !self.path.split('/').next().is_some_and(|first| first.contains(':'))
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
            && path.components().any(|c| matches!(c, Component::Normal(_)))
    }
}

/// Mapping of identity to entry, rebuilt wholesale on every load
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Index {
    entries: BTreeMap<String, IndexEntry>,
}

impl Index {
    /// Parse an index document
    ///
    /// The document must be a JSON array. Items missing a required field or
    /// pointing outside the repository root are skipped; for duplicate
    /// identities the first item wins.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let items: Vec<Value> = serde_json::from_slice(data)
            .map_err(|e| Error::ParseError(format!("Invalid index document: {}", e)))?;

        let mut skipped = 0;
        let mut entries = Vec::with_capacity(items.len());
        for (position, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<IndexEntry>(item) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!("Skipping malformed index item #{}: {}", position, e);
                    skipped += 1;
                }
            }
        }

        let index = Self::from_entries(entries);
        debug!(
            "Parsed index with {} entries ({} malformed items skipped)",
            index.len(),
            skipped
        );
        Ok(index)
    }

    /// Build an index from entries, applying the same validation as `parse`
    pub fn from_entries(entries: impl IntoIterator<Item = IndexEntry>) -> Self {
        let mut map = BTreeMap::new();
        for entry in entries {
            let identity = entry.identity();
            if identity.starts_with('.') || identity.contains(['/', '\\']) {
                warn!("Skipping {}: identity is not a valid directory name", identity);
                continue;
            }
            if !entry.has_safe_path() {
                warn!("Skipping {}: unsafe artifact path '{}'", identity, entry.path);
                continue;
            }
            if map.contains_key(&identity) {
                warn!("Skipping duplicate index entry {}", identity);
                continue;
            }
            map.insert(identity, entry);
        }
        Self { entries: map }
    }

    pub fn get(&self, identity: &str) -> Option<&IndexEntry> {
        self.entries.get(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    /// Entries in identity order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
