//! Catalog index: metadata for every published page, kept sorted.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use guidepress_shared::types::lenient_time;
use guidepress_shared::{CatalogEntry, CatalogSort, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    guides: Vec<CatalogEntry>,
    #[serde(default, deserialize_with = "lenient_time::deserialize_option")]
    last_updated: Option<DateTime<Utc>>,
}

/// Ordered, file-backed collection of [`CatalogEntry`] values keyed by
/// output reference.
#[derive(Debug)]
pub struct CatalogIndex {
    path: PathBuf,
    sort: CatalogSort,
    entries: Vec<CatalogEntry>,
    last_updated: Option<DateTime<Utc>>,
    dirty: bool,
}

impl CatalogIndex {
    /// Empty index bound to `path`.
    pub fn empty(path: impl Into<PathBuf>, sort: CatalogSort) -> Self {
        Self {
            path: path.into(),
            sort,
            entries: Vec::new(),
            last_updated: None,
            dirty: false,
        }
    }

    /// Load the index. Never fails: a missing, unreadable or corrupt file
    /// gives an empty index, which can be rebuilt from publication state.
    pub fn load(path: impl Into<PathBuf>, sort: CatalogSort) -> Self {
        let path = path.into();
        let content = match super::read_optional(&path) {
            Ok(Some(content)) => content,
            Ok(None) => return Self::empty(path, sort),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "catalog unreadable, starting empty");
                return Self::empty(path, sort);
            }
        };

        match serde_json::from_str::<CatalogFile>(&content) {
            Ok(file) => {
                let mut index = Self::empty(path, sort);
                index.last_updated = file.last_updated;
                // Collapse duplicates a hand edit may have introduced; last wins.
                for entry in file.guides {
                    index.insert(entry);
                }
                index.sort_entries();
                index.dirty = false;
                debug!(entries = index.entries.len(), "loaded catalog");
                index
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "catalog is corrupt, starting empty");
                Self::empty(path, sort)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sort(&self) -> CatalogSort {
        self.sort
    }

    /// Replace any entry with the same `filename`, then re-sort.
    /// Returns the replaced entry, if any.
    pub fn upsert(&mut self, entry: CatalogEntry) -> Option<CatalogEntry> {
        let replaced = self.insert(entry);
        self.sort_entries();
        self.dirty = true;
        replaced
    }

    fn insert(&mut self, entry: CatalogEntry) -> Option<CatalogEntry> {
        let replaced = self
            .entries
            .iter()
            .position(|e| e.filename == entry.filename)
            .map(|idx| self.entries.remove(idx));
        self.entries.push(entry);
        replaced
    }

    fn sort_entries(&mut self) {
        match self.sort {
            CatalogSort::Recency => self.entries.sort_by(|a, b| {
                b.published_date
                    .cmp(&a.published_date)
                    .then_with(|| a.title.cmp(&b.title))
            }),
            CatalogSort::Title => self.entries.sort_by(|a, b| {
                compare_titles(&a.title, &b.title).then_with(|| a.filename.cmp(&b.filename))
            }),
        }
    }

    /// Entries in catalog order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, filename: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.filename == filename)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry (used before a rebuild).
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.dirty = true;
        }
    }

    /// Whether there are unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Write the full catalog atomically.
    pub fn persist(&mut self) -> Result<()> {
        let now = Utc::now();
        let file = CatalogFile {
            guides: self.entries.clone(),
            last_updated: Some(now),
        };
        super::write_json_atomic(&self.path, &file)?;
        self.last_updated = Some(now);
        self.dirty = false;
        info!(path = %self.path.display(), entries = self.entries.len(), "catalog saved");
        Ok(())
    }
}

fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::test_support::temp_dir;
    use guidepress_shared::{PublishMode, Tags};

    fn entry(title: &str, filename: &str, days_ago: i64) -> CatalogEntry {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        CatalogEntry {
            title: title.into(),
            description: String::new(),
            filename: filename.into(),
            tags: Tags::default(),
            location: String::new(),
            budget_friendly: false,
            url: format!("https://x.com/{filename}"),
            mode: PublishMode::Teaser,
            source: "Partner Portal".into(),
            published_date: base - Duration::days(days_ago),
        }
    }

    #[test]
    fn upsert_replaces_same_filename() {
        let mut index = CatalogIndex::empty("unused.json", CatalogSort::Recency);
        assert!(index.upsert(entry("Kyoto", "kyoto.html", 3)).is_none());
        assert!(index.upsert(entry("Lisbon", "lisbon.html", 2)).is_none());

        let replaced = index.upsert(entry("Kyoto (updated)", "kyoto.html", 0));
        assert_eq!(replaced.map(|e| e.title), Some("Kyoto".to_string()));
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("kyoto.html").unwrap().title, "Kyoto (updated)");
        assert!(index.is_dirty());
    }

    #[test]
    fn recency_sort_is_newest_first() {
        let mut index = CatalogIndex::empty("unused.json", CatalogSort::Recency);
        index.upsert(entry("Old", "old.html", 10));
        index.upsert(entry("New", "new.html", 1));
        index.upsert(entry("Mid", "mid.html", 5));
        let titles: Vec<&str> = index.entries().iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["New", "Mid", "Old"]);
    }

    #[test]
    fn title_sort_ignores_case() {
        let mut index = CatalogIndex::empty("unused.json", CatalogSort::Title);
        index.upsert(entry("patagonia", "p.html", 1));
        index.upsert(entry("Kyoto", "k.html", 2));
        index.upsert(entry("lisbon", "l.html", 3));
        let titles: Vec<&str> = index.entries().iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Kyoto", "lisbon", "patagonia"]);
    }

    #[test]
    fn persist_and_reload() {
        let dir = temp_dir("gp-catalog");
        let path = dir.join("index.json");

        let mut index = CatalogIndex::load(&path, CatalogSort::Recency);
        assert!(index.is_empty());
        index.upsert(entry("Kyoto", "kyoto.html", 1));
        index.upsert(entry("Lisbon", "lisbon.html", 2));
        index.persist().unwrap();
        assert!(!index.is_dirty());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["guides"].as_array().unwrap().len(), 2);
        assert!(raw["last_updated"].is_string());

        let reloaded = CatalogIndex::load(&path, CatalogSort::Recency);
        assert_eq!(reloaded.entries(), index.entries());
        assert!(reloaded.last_updated().is_some());
        assert!(!reloaded.is_dirty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_file_is_empty() {
        let dir = temp_dir("gp-catalog");
        let path = dir.join("index.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(CatalogIndex::load(&path, CatalogSort::Title).is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn clear_marks_dirty_only_when_non_empty() {
        let mut index = CatalogIndex::empty("unused.json", CatalogSort::Recency);
        index.clear();
        assert!(!index.is_dirty());
        index.upsert(entry("Kyoto", "kyoto.html", 1));
        index.clear();
        assert!(index.is_dirty());
        assert!(index.is_empty());
    }
}
