// src/query.rs

//! Pattern search over the package index

use crate::cache::Cache;
use crate::error::Result;
use crate::index::{Index, IndexEntry};
use crate::install::Installer;
use regex::RegexBuilder;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Search filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Match the identity only, not title or path
    pub name_only: bool,
    /// Keep only the newest version of each package
    pub latest_only: bool,
    /// Keep only installed packages
    pub installed_only: bool,
}

/// One search result with its live status
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub identity: String,
    pub entry: IndexEntry,
    pub cached: bool,
    pub installed: bool,
}

/// Search the index with a case-insensitive regular expression
///
/// Results are unique and ordered by identity. Status is looked up only for
/// entries that matched the pattern.
pub fn search(
    index: &Index,
    cache: &Cache,
    installer: &Installer,
    pattern: &str,
    options: SearchOptions,
) -> Result<Vec<SearchHit>> {
    let re = RegexBuilder::new(pattern).case_insensitive(true).build()?;

    // Index iteration is already unique and in identity order
    let mut hits: Vec<SearchHit> = index
        .iter()
        .filter(|(identity, entry)| {
            re.is_match(identity)
                || (!options.name_only
                    && (entry.title.as_deref().is_some_and(|t| re.is_match(t))
                        || re.is_match(&entry.path)))
        })
        .map(|(identity, entry)| SearchHit {
            identity: identity.to_string(),
            entry: entry.clone(),
            cached: cache.is_cached(entry),
            installed: installer.is_installed(identity),
        })
        .collect();

    if options.installed_only {
        hits.retain(|hit| hit.installed);
    }
    if options.latest_only {
        hits = latest_per_package(hits);
    }

    Ok(hits)
}

/// Ordering used to pick the latest version of a package
///
/// Higher `vercode` wins; ties fall back to the larger version string, then
/// the larger identity, so the choice never depends on iteration order.
pub fn compare_versions(a: &IndexEntry, b: &IndexEntry) -> Ordering {
    a.vercode()
        .cmp(&b.vercode())
        .then_with(|| a.version.cmp(&b.version))
        .then_with(|| a.identity().cmp(&b.identity()))
}

fn latest_per_package(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut best: HashMap<&str, usize> = HashMap::new();
    for (i, hit) in hits.iter().enumerate() {
        best.entry(hit.entry.package.as_str())
            .and_modify(|current| {
                if compare_versions(&hit.entry, &hits[*current].entry) == Ordering::Greater {
                    *current = i;
                }
            })
            .or_insert(i);
    }

    let mut keep = vec![false; hits.len()];
    for i in best.into_values() {
        keep[i] = true;
    }

    hits.into_iter()
        .zip(keep)
        .filter_map(|(hit, kept)| kept.then_some(hit))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Layout;
    use crate::error::Error;
    use std::fs;

    fn entry(package: &str, version: &str, vercode: i64, title: &str) -> IndexEntry {
        let mut e = IndexEntry::new(
            package,
            version,
            &format!("apps/{}-{}.apk", package, version),
            4,
        );
        e.vercode = Some(vercode);
        e.title = Some(title.to_string());
        e
    }

    fn fixture() -> (tempfile::TempDir, Index, Cache, Installer) {
        let temp = tempfile::tempdir().unwrap();
        let layout = Layout::new(temp.path());
        layout.ensure_dirs().unwrap();
        let index = Index::from_entries(vec![
            entry("org.example.notes", "1.0", 1, "Notes"),
            entry("org.example.notes", "2.0", 2, "Notes"),
            entry("org.example.clock", "5.1", 51, "Alarm Clock"),
            entry("com.acme.maps", "0.9", 9, "Maps"),
        ]);
        let cache = Cache::new(&layout);
        let installer = Installer::new(&layout.installed_root);
        (temp, index, cache, installer)
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.identity.as_str()).collect()
    }

    #[test]
    fn test_results_sorted_by_identity() {
        let (_temp, index, cache, installer) = fixture();
        let hits = search(&index, &cache, &installer, ".", SearchOptions::default()).unwrap();
        assert_eq!(
            ids(&hits),
            vec![
                "com.acme.maps-0.9",
                "org.example.clock-5.1",
                "org.example.notes-1.0",
                "org.example.notes-2.0",
            ]
        );

        let again = search(&index, &cache, &installer, ".", SearchOptions::default()).unwrap();
        assert_eq!(hits, again);
    }

    #[test]
    fn test_case_insensitive_and_title_match() {
        let (_temp, index, cache, installer) = fixture();
        let hits = search(&index, &cache, &installer, "ALARM", SearchOptions::default()).unwrap();
        assert_eq!(ids(&hits), vec!["org.example.clock-5.1"]);

        let name_only = SearchOptions {
            name_only: true,
            ..Default::default()
        };
        let hits = search(&index, &cache, &installer, "alarm", name_only).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_path_match() {
        let (_temp, index, cache, installer) = fixture();
        let hits = search(&index, &cache, &installer, r"^apps/com\.", SearchOptions::default())
            .unwrap();
        assert_eq!(ids(&hits), vec!["com.acme.maps-0.9"]);
    }

    #[test]
    fn test_latest_only() {
        let (_temp, index, cache, installer) = fixture();
        let latest = SearchOptions {
            latest_only: true,
            ..Default::default()
        };
        let hits = search(&index, &cache, &installer, "notes", latest).unwrap();
        assert_eq!(ids(&hits), vec!["org.example.notes-2.0"]);
        assert_eq!(hits[0].entry.vercode(), 2);
    }

    #[test]
    fn test_latest_tie_break_is_deterministic() {
        let a = entry("pkg", "1.0", 7, "");
        let b = entry("pkg", "1.0-hotfix", 7, "");
        assert_eq!(compare_versions(&b, &a), Ordering::Greater);
        assert_eq!(compare_versions(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_status_annotation_and_installed_only() {
        let (_temp, index, cache, installer) = fixture();
        let clock = index.get("org.example.clock-5.1").unwrap();
        let cached = cache.artifact_path(clock);
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::write(&cached, "1234").unwrap();

        let installed = installer.artifact_path("com.acme.maps-0.9");
        fs::create_dir_all(installed.parent().unwrap()).unwrap();
        fs::write(&installed, "1234").unwrap();

        let hits = search(&index, &cache, &installer, ".", SearchOptions::default()).unwrap();
        let clock_hit = hits.iter().find(|h| h.identity == "org.example.clock-5.1").unwrap();
        assert!(clock_hit.cached);
        assert!(!clock_hit.installed);

        let only = SearchOptions {
            installed_only: true,
            ..Default::default()
        };
        let hits = search(&index, &cache, &installer, ".", only).unwrap();
        assert_eq!(ids(&hits), vec!["com.acme.maps-0.9"]);
        assert!(hits[0].installed);
    }

    #[test]
    fn test_invalid_pattern() {
        let (_temp, index, cache, installer) = fixture();
        assert!(matches!(
            search(&index, &cache, &installer, "(", SearchOptions::default()),
            Err(Error::InvalidPattern(_))
        ));
    }
}
