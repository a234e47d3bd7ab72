//! Publication state: which items have already been published.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use guidepress_shared::types::lenient_time;
use guidepress_shared::{PublicationRecord, Result};

/// On-disk shape of the state file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default, alias = "published_guides", alias = "processed_guides")]
    processed_keys: Vec<String>,
    #[serde(default, deserialize_with = "lenient_time::deserialize_option")]
    last_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    records: Vec<PublicationRecord>,
}

/// Durable set of published item keys.
///
/// Keys are only ever added. Insertion order is kept so the file diffs
/// cleanly between runs.
#[derive(Debug)]
pub struct PublicationState {
    path: PathBuf,
    keys: Vec<String>,
    seen: HashSet<String>,
    records: Vec<PublicationRecord>,
    last_run: Option<DateTime<Utc>>,
}

impl PublicationState {
    /// Empty state bound to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keys: Vec::new(),
            seen: HashSet::new(),
            records: Vec::new(),
            last_run: None,
        }
    }

    /// Load state from `path`.
    ///
    /// A missing or unreadable-as-JSON file yields an empty state. Any other
    /// I/O failure is returned, since continuing would republish everything.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let Some(content) = super::read_optional(&path)? else {
            info!(path = %path.display(), "no publication state yet, starting empty");
            return Ok(Self::empty(path));
        };

        let file: StateFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "publication state is corrupt, starting empty");
                return Ok(Self::empty(path));
            }
        };

        let mut state = Self::empty(path);
        state.last_run = file.last_run;
        for key in file.processed_keys {
            state.add(key);
        }
        for record in file.records {
            // Records written by newer runs imply membership even if the key
            // list was hand-edited.
            state.add(record.item_key.clone());
            state.records.push(record);
        }

        debug!(keys = state.keys.len(), "loaded publication state");
        Ok(state)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `key` has been published.
    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// Add `key`. Returns `false` if it was already present.
    pub fn add(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.seen.contains(&key) {
            return false;
        }
        self.seen.insert(key.clone());
        self.keys.push(key);
        true
    }

    /// Add the record's key and keep the record itself.
    pub fn record(&mut self, record: PublicationRecord) -> bool {
        let added = self.add(record.item_key.clone());
        if added {
            self.records.push(record);
        }
        added
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Published keys in insertion order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn records(&self) -> &[PublicationRecord] {
        &self.records
    }

    /// When state was last persisted.
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    /// Stamp `last_run` and write the state file atomically.
    pub fn persist(&mut self) -> Result<()> {
        let now = Utc::now();
        let file = StateFile {
            processed_keys: self.keys.clone(),
            last_run: Some(now),
            records: self.records.clone(),
        };
        super::write_json_atomic(&self.path, &file)?;
        self.last_run = Some(now);
        info!(path = %self.path.display(), keys = self.keys.len(), "publication state saved");
        Ok(())
    }
}
