use crate::error::{LosError, Result};
use recordjoin_query::{DataError, Dataset, Schema};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Prefix of keys generated for entries that exist only locally
pub const LOCAL_KEY_PREFIX: &str = "los-only:";

pub fn is_local_key(key: &str) -> bool {
    key.starts_with(LOCAL_KEY_PREFIX)
}

pub(crate) fn generate_local_key() -> String {
    format!("{}{}", LOCAL_KEY_PREFIX, uuid::Uuid::new_v4())
}

/// Handle of an entry, stable for the lifetime of the storage that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Override-only, no background record
    New,
    /// Background record was found on the last lookup
    Linked,
    /// Background record was known once but can no longer be found
    Lost,
}

/// Selected entry identified by its key and the number of entries with
/// the same key before it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionMarker {
    pub key: String,
    pub ordinal: usize,
}

impl SelectionMarker {
    pub fn new(key: impl Into<String>, ordinal: usize) -> Self {
        Self {
            key: key.into(),
            ordinal,
        }
    }
}

/// Record of the local override storage: an optional snapshot of the
/// background record plus the values the user has overridden locally.
#[derive(Debug, Clone)]
pub struct LosEntry {
    id: EntryId,
    key: String,
    schema: Arc<Schema>,
    background: Option<HashMap<String, String>>,
    overrides: HashMap<String, String>,
    state: EntryState,
}

impl LosEntry {
    pub(crate) fn linked(
        id: EntryId,
        key: impl Into<String>,
        schema: Arc<Schema>,
        background: HashMap<String, String>,
    ) -> Self {
        Self {
            id,
            key: key.into(),
            schema,
            background: Some(background),
            overrides: HashMap::new(),
            state: EntryState::Linked,
        }
    }

    pub(crate) fn override_only(
        id: EntryId,
        key: impl Into<String>,
        schema: Arc<Schema>,
        overrides: HashMap<String, String>,
    ) -> Self {
        Self {
            id,
            key: key.into(),
            schema,
            background: None,
            overrides,
            state: EntryState::New,
        }
    }

    pub(crate) fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }

    /// Last known values of the background record
    pub fn background(&self) -> Option<&HashMap<String, String>> {
        self.background.as_ref()
    }

    pub fn overrides(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn check_column(&self, column: &str) -> Result<()> {
        if self.schema.contains(column) {
            Ok(())
        } else {
            Err(DataError::column_not_found(column).into())
        }
    }

    /// Whether the value of `column` comes from this storage. Always true
    /// for entries without background record.
    pub fn has_local_override(&self, column: &str) -> Result<bool> {
        self.check_column(column)?;
        Ok(self.background.is_none() || self.overrides.contains_key(column))
    }

    /// Whether a non-empty override of a linked entry no longer matches the
    /// background value
    pub fn is_different_from_background(&self, column: &str) -> bool {
        if self.state != EntryState::Linked {
            return false;
        }
        let overridden = match self.overrides.get(column) {
            Some(value) if !value.is_empty() => value,
            _ => return false,
        };
        match self.background.as_ref().and_then(|bg| bg.get(column)) {
            Some(background) => background != overridden,
            None => true,
        }
    }

    pub(crate) fn set_override(&mut self, column: &str, value: impl Into<String>) -> Result<()> {
        self.check_column(column)?;
        let value = value.into();
        if value.is_empty() {
            return Err(LosError::EmptyOverride(column.to_string()));
        }
        self.overrides.insert(column.to_string(), value);
        Ok(())
    }

    pub(crate) fn drop_override(&mut self, column: &str) -> Result<()> {
        self.check_column(column)?;
        if self.background.is_none() {
            return Err(LosError::NoBackground(self.key.clone()));
        }
        self.overrides.remove(column);
        Ok(())
    }

    pub(crate) fn relink(&mut self, background: HashMap<String, String>) {
        self.background = Some(background);
        self.state = EntryState::Linked;
    }

    /// Keeps snapshot and overrides untouched
    pub(crate) fn mark_lost(&mut self) {
        if self.background.is_some() {
            self.state = EntryState::Lost;
        }
    }

    pub(crate) fn reconcile(&mut self, schema: Arc<Schema>, added: &[String], removed: &[String]) {
        for column in removed {
            self.overrides.remove(column);
            if let Some(background) = self.background.as_mut() {
                background.remove(column);
            }
        }
        for column in added {
            self.overrides.entry(column.clone()).or_default();
        }
        self.schema = schema;
    }

    /// Current value of every schema column, empty where there is none
    pub(crate) fn current_values(&self) -> HashMap<String, String> {
        self.schema
            .iter()
            .map(|column| {
                let value = self.value(column).unwrap_or_default();
                (column.clone(), value)
            })
            .collect()
    }

    fn value(&self, column: &str) -> Option<String> {
        self.overrides
            .get(column)
            .or_else(|| self.background.as_ref().and_then(|bg| bg.get(column)))
            .cloned()
    }
}

impl Dataset for LosEntry {
    fn key(&self) -> &str {
        &self.key
    }

    fn get(&self, column: &str) -> recordjoin_query::Result<Option<String>> {
        if !self.schema.contains(column) {
            return Err(DataError::column_not_found(column));
        }
        Ok(self.value(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(["Vorname", "Nachname", "Rolle"]))
    }

    fn background() -> HashMap<String, String> {
        HashMap::from([
            ("Vorname".to_string(), "Sheldon".to_string()),
            ("Nachname".to_string(), "Cooper".to_string()),
        ])
    }

    #[test]
    fn test_override_shadows_background() {
        let mut entry = LosEntry::linked(EntryId(1), "1", schema(), background());
        assert_eq!(entry.get("Vorname").unwrap().as_deref(), Some("Sheldon"));
        assert_eq!(entry.get("Rolle").unwrap(), None);
        assert!(!entry.has_local_override("Vorname").unwrap());

        entry.set_override("Vorname", "Shelly").unwrap();
        assert_eq!(entry.get("Vorname").unwrap().as_deref(), Some("Shelly"));
        assert!(entry.has_local_override("Vorname").unwrap());

        entry.drop_override("Vorname").unwrap();
        assert_eq!(entry.get("Vorname").unwrap().as_deref(), Some("Sheldon"));

        assert!(entry.get("Gehalt").unwrap_err().is_column_not_found());
        assert!(entry.set_override("Gehalt", "100").unwrap_err().is_column_not_found());
    }

    #[test]
    fn test_override_only_entry() {
        let overrides = HashMap::from([("Vorname".to_string(), "Vorname".to_string())]);
        let mut entry = LosEntry::override_only(EntryId(2), "x", schema(), overrides);
        assert_eq!(entry.state(), EntryState::New);
        assert!(entry.has_local_override("Nachname").unwrap());
        assert!(matches!(
            entry.drop_override("Vorname"),
            Err(LosError::NoBackground(_))
        ));
        assert!(!entry.is_different_from_background("Vorname"));
    }

    #[test]
    fn test_is_different_from_background() {
        let mut entry = LosEntry::linked(EntryId(1), "1", schema(), background());
        assert!(!entry.is_different_from_background("Vorname"));

        entry.set_override("Vorname", "Shelly").unwrap();
        assert!(entry.is_different_from_background("Vorname"));

        entry.set_override("Vorname", "Sheldon").unwrap();
        assert!(!entry.is_different_from_background("Vorname"));

        // blank overrides only come from schema reconciliation and are never reported
        assert!(matches!(
            entry.set_override("Nachname", ""),
            Err(LosError::EmptyOverride(_))
        ));
        entry.overrides.insert("Nachname".to_string(), String::new());
        assert!(!entry.is_different_from_background("Nachname"));

        // absent background value counts as different
        entry.set_override("Rolle", "Physiker").unwrap();
        assert!(entry.is_different_from_background("Rolle"));

        entry.mark_lost();
        assert_eq!(entry.state(), EntryState::Lost);
        assert!(!entry.is_different_from_background("Rolle"));
    }

    #[test]
    fn test_reconcile_columns() {
        let mut entry = LosEntry::linked(EntryId(1), "1", schema(), background())
            .with_overrides(HashMap::from([("Nachname".to_string(), "Hofstadter".to_string())]));
        let reduced = Arc::new(Schema::new(["Vorname", "Rolle", "Titel"]));

        entry.reconcile(reduced, &["Titel".to_string()], &["Nachname".to_string()]);

        assert!(entry.get("Nachname").unwrap_err().is_column_not_found());
        assert!(!entry.background().unwrap().contains_key("Nachname"));
        assert_eq!(entry.overrides().get("Titel").map(String::as_str), Some(""));
        assert_eq!(entry.get("Vorname").unwrap().as_deref(), Some("Sheldon"));
    }
}
