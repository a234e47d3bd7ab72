//! Durable JSON stores for publishing runs.
//!
//! - [`PublicationState`]: the dedup ledger, authoritative for "already published"
//! - [`CatalogIndex`]: ordered metadata for every published page (`index.json`)
//!
//! Both stores are loaded once, mutated in memory, and rewritten wholesale
//! by `persist()`. Writes go to a sibling temp file that is then renamed
//! over the target, so a crash never leaves a half-written store behind.

mod catalog;
mod state;

use std::path::Path;

use guidepress_shared::{GuidePressError, Result};
use serde::Serialize;

pub use catalog::CatalogIndex;
pub use state::PublicationState;

/// Serialize `data` as pretty JSON and atomically replace `path` with it.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| GuidePressError::persist(path, format!("JSON serialization failed: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| GuidePressError::persist(path, format!("create {}: {e}", parent.display())))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".into());
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, json)
        .map_err(|e| GuidePressError::persist(path, format!("write {}: {e}", temp.display())))?;
    std::fs::rename(&temp, path)
        .map_err(|e| GuidePressError::persist(path, format!("rename into place: {e}")))?;

    tracing::debug!(path = %path.display(), "wrote JSON store");
    Ok(())
}

/// Read a store file. `Ok(None)` when it does not exist.
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(GuidePressError::io(path, e)),
    }
}
