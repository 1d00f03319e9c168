//! Persistence of the storage as a JSON document:
//!
//! ```json
//! {
//!   "schema": ["Vorname", "Nachname"],
//!   "data": [
//!     { "key": "1", "cache": { "Vorname": "Sheldon" }, "override": { "Nachname": "Cooper" } }
//!   ],
//!   "selected": { "key": "1", "ordinal": 0 },
//!   "written_at": "2024-01-01T00:00:00Z"
//! }
//! ```
//!
//! Files are written with a byte order mark. A file that mentions a column
//! outside its own schema is rejected as a whole.

use crate::entry::{EntryState, SelectionMarker};
use crate::error::{LosError, Result};
use crate::storage::LocalOverrideStorage;
use chrono::{DateTime, Utc};
use recordjoin_query::{Dataset, Schema};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, error, info};

const BOM: char = '\u{feff}';

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    schema: Schema,
    data: Vec<CachedEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selected: Option<SelectionMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    written_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedEntry {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache: Option<BTreeMap<String, String>>,
    #[serde(default, rename = "override")]
    overrides: BTreeMap<String, String>,
}

impl CacheDocument {
    fn from_storage(storage: &LocalOverrideStorage) -> Self {
        let data = storage
            .entries()
            .iter()
            .map(|entry| CachedEntry {
                key: entry.key().to_string(),
                cache: match entry.state() {
                    EntryState::Linked | EntryState::Lost => entry
                        .background()
                        .map(|bg| bg.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
                    EntryState::New => None,
                },
                overrides: entry
                    .overrides()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            })
            .collect();
        Self {
            schema: storage.schema().clone(),
            data,
            selected: storage.selection_marker(),
            written_at: Some(Utc::now()),
        }
    }

    fn into_storage(self) -> Result<LocalOverrideStorage> {
        let mut parts = Vec::with_capacity(self.data.len());
        for entry in self.data {
            let columns = entry
                .cache
                .iter()
                .flat_map(|cache| cache.keys())
                .chain(entry.overrides.keys());
            for column in columns {
                if !self.schema.contains(column) {
                    return Err(LosError::corruption(format!(
                        "Entry \"{}\" refers to column \"{}\" which is not part of the schema {}",
                        entry.key, column, self.schema
                    )));
                }
            }
            let background = entry
                .cache
                .map(|cache| cache.into_iter().collect::<HashMap<_, _>>());
            parts.push((entry.key, background, entry.overrides.into_iter().collect()));
        }
        Ok(LocalOverrideStorage::from_parts(
            self.schema,
            parts,
            self.selected.as_ref(),
        ))
    }
}

/// Write `storage` to `path`
pub fn save(storage: &LocalOverrideStorage, path: &Path) -> Result<()> {
    let document = CacheDocument::from_storage(storage);
    let json = serde_json::to_string_pretty(&document)?;
    fs::write(path, format!("{}{}", BOM, json))?;
    debug!("Saved {} entries to {}", storage.len(), path.display());
    Ok(())
}

/// Read a storage from `path`
pub fn load(path: &Path) -> Result<LocalOverrideStorage> {
    let content = fs::read_to_string(path)?;
    let content = content.strip_prefix(BOM).unwrap_or(&content);
    let document: CacheDocument = serde_json::from_str(content)
        .map_err(|e| LosError::corruption(format!("{}: {}", path.display(), e)))?;
    let storage = document.into_storage()?;
    debug!("Loaded {} entries from {}", storage.len(), path.display());
    Ok(storage)
}

/// Read a storage from `path`, starting empty if the file does not exist or
/// can not be trusted
pub fn load_or_default(path: &Path) -> LocalOverrideStorage {
    match load(path) {
        Ok(storage) => storage,
        Err(LosError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            info!("No cache at {}, starting empty", path.display());
            LocalOverrideStorage::default()
        }
        Err(e) => {
            error!("Discarding cache {}: {}", path.display(), e);
            LocalOverrideStorage::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_column_is_corruption() {
        let document: CacheDocument = serde_json::from_str(
            r#"{"schema": ["Vorname"], "data": [{"key": "1", "cache": {"Vorname": "Amy"}, "override": {"Gehalt": "90"}}]}"#,
        )
        .unwrap();
        assert!(matches!(
            document.into_storage(),
            Err(LosError::CacheCorruption(_))
        ));
    }

    #[test]
    fn test_entries_without_cache_are_new() {
        let document: CacheDocument = serde_json::from_str(
            r#"{"schema": ["Vorname"], "data": [{"key": "1", "override": {"Vorname": "Amy"}}, {"key": "2", "cache": {}}]}"#,
        )
        .unwrap();
        let storage = document.into_storage().unwrap();
        assert_eq!(storage.entries()[0].state(), EntryState::New);
        assert_eq!(storage.entries()[1].state(), EntryState::Linked);
        // no marker selects the first entry
        assert_eq!(storage.selected().unwrap().key(), "1");
    }
}
