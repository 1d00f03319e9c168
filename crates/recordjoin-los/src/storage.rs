use crate::entry::{
    generate_local_key, is_local_key, EntryId, EntryState, LosEntry, SelectionMarker,
};
use crate::error::{LosError, Result};
use recordjoin_query::{Dataset, Datasource, Schema};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Columns that changed when the storage adopted a new schema
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Outcome of [`LocalOverrideStorage::refresh_from_database`]
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub linked: usize,
    /// Keys of entries whose background record could not be found
    pub lost: Vec<String>,
    pub schema: SchemaDiff,
}

/// Local cache of records with user editable overrides
#[derive(Debug, Clone, Default)]
pub struct LocalOverrideStorage {
    schema: Arc<Schema>,
    entries: Vec<LosEntry>,
    selected: Option<EntryId>,
    next_id: u64,
}

fn snapshot<D: Dataset + ?Sized>(dataset: &D, schema: &Schema) -> HashMap<String, String> {
    schema
        .iter()
        .filter_map(|column| match dataset.get(column) {
            Ok(Some(value)) => Some((column.clone(), value)),
            _ => None,
        })
        .collect()
}

impl LocalOverrideStorage {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema: Arc::new(schema),
            ..Default::default()
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LosEntry] {
        &self.entries
    }

    pub fn entry(&self, id: EntryId) -> Option<&LosEntry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.entry(id).is_some()
    }

    fn entry_mut(&mut self, id: EntryId) -> Result<&mut LosEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.id() == id)
            .ok_or_else(|| LosError::selection(format!("Entry {} is not part of the storage", id)))
    }

    fn issue_id(&mut self) -> EntryId {
        self.next_id += 1;
        EntryId(self.next_id)
    }

    fn push(&mut self, entry: LosEntry) -> EntryId {
        let id = entry.id();
        self.entries.push(entry);
        if self.selected.is_none() {
            self.selected = Some(id);
        }
        id
    }

    /// Add `dataset` as a new entry. With `from_background` its values are
    /// kept as snapshot of the background record, otherwise they become
    /// overrides of an entry that exists only here.
    pub fn add(&mut self, dataset: &dyn Dataset, from_background: bool) -> EntryId {
        let id = self.issue_id();
        let values = snapshot(dataset, &self.schema);
        let entry = if from_background {
            LosEntry::linked(id, dataset.key(), self.schema.clone(), values)
        } else {
            let overrides = self
                .schema
                .iter()
                .map(|c| (c.clone(), values.get(c).cloned().unwrap_or_default()))
                .collect();
            LosEntry::override_only(id, dataset.key(), self.schema.clone(), overrides)
        };
        debug!("Adding entry {} with key \"{}\"", id, dataset.key());
        self.push(entry)
    }

    /// Background-linked entries for `datasets`, in order and including
    /// duplicate keys, ready for [`replace_entries`](Self::replace_entries).
    /// The storage itself is not changed apart from issuing ids.
    pub fn linked_entries<'a, I, D>(&mut self, datasets: I) -> Vec<LosEntry>
    where
        I: IntoIterator<Item = &'a D>,
        D: Dataset + ?Sized + 'a,
    {
        datasets
            .into_iter()
            .map(|dataset| {
                let id = self.issue_id();
                let values = snapshot(dataset, &self.schema);
                LosEntry::linked(id, dataset.key(), self.schema.clone(), values)
            })
            .collect()
    }

    /// Add a blank entry where every column shows its own name
    pub fn new_entry(&mut self) -> EntryId {
        let id = self.issue_id();
        let overrides = self.schema.iter().map(|c| (c.clone(), c.clone())).collect();
        let entry =
            LosEntry::override_only(id, generate_local_key(), self.schema.clone(), overrides);
        self.push(entry)
    }

    /// Add an override-only copy of `id` carrying its current values
    pub fn copy_entry(&mut self, id: EntryId) -> Result<EntryId> {
        let values = self
            .entry(id)
            .ok_or_else(|| LosError::selection(format!("Entry {} is not part of the storage", id)))?
            .current_values();
        let copy_id = self.issue_id();
        let entry = LosEntry::override_only(copy_id, generate_local_key(), self.schema.clone(), values);
        Ok(self.push(entry))
    }

    /// Remove an entry; if it was selected, the first remaining entry is
    /// selected instead
    pub fn remove(&mut self, id: EntryId) -> Result<LosEntry> {
        let position = self
            .entries
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| LosError::selection(format!("Entry {} is not part of the storage", id)))?;
        let removed = self.entries.remove(position);
        if self.selected == Some(id) {
            self.selected = self.entries.first().map(LosEntry::id);
        }
        Ok(removed)
    }

    pub fn override_value(&mut self, id: EntryId, column: &str, value: impl Into<String>) -> Result<()> {
        self.entry_mut(id)?.set_override(column, value)
    }

    /// Remove the override of `column`, falling back to the background value
    pub fn drop_override(&mut self, id: EntryId, column: &str) -> Result<()> {
        self.entry_mut(id)?.drop_override(column)
    }

    pub fn is_different_from_background(&self, id: EntryId, column: &str) -> Result<bool> {
        self.entry(id)
            .map(|e| e.is_different_from_background(column))
            .ok_or_else(|| LosError::selection(format!("Entry {} is not part of the storage", id)))
    }

    pub fn select(&mut self, id: EntryId) -> Result<()> {
        if !self.contains(id) {
            return Err(LosError::selection(format!(
                "Entry {} can not be selected, it is not part of the storage",
                id
            )));
        }
        self.selected = Some(id);
        Ok(())
    }

    pub fn selected(&self) -> Option<&LosEntry> {
        self.selected.and_then(|id| self.entry(id))
    }

    pub fn selected_id(&self) -> Option<EntryId> {
        self.selected
    }

    /// Key and same-key ordinal of the selected entry
    pub fn selection_marker(&self) -> Option<SelectionMarker> {
        let selected = self.selected()?;
        let ordinal = self
            .entries
            .iter()
            .take_while(|e| e.id() != selected.id())
            .filter(|e| e.key() == selected.key())
            .count();
        Some(SelectionMarker::new(selected.key(), ordinal))
    }

    fn find_marker(&self, marker: &SelectionMarker) -> Option<EntryId> {
        self.entries
            .iter()
            .filter(|e| e.key() == marker.key)
            .nth(marker.ordinal)
            .map(LosEntry::id)
    }

    /// Select the entry described by `marker`, falling back to the first
    /// entry, or to no selection if the storage is empty
    pub fn restore_selection(&mut self, marker: Option<&SelectionMarker>) {
        let found = marker.and_then(|m| self.find_marker(m));
        if marker.is_some() && found.is_none() {
            debug!("Previous selection {:?} not found, selecting first entry", marker);
        }
        self.selected = found.or_else(|| self.entries.first().map(LosEntry::id));
    }

    /// Replace all entries, keeping the selection if the selected entry or
    /// one with the same key and ordinal is still present
    pub fn replace_entries(&mut self, entries: Vec<LosEntry>) {
        let marker = self.selection_marker();
        let still_selected = self
            .selected
            .filter(|id| entries.iter().any(|e| e.id() == *id));

        let schema = self.schema.clone();
        self.entries = entries
            .into_iter()
            .map(|mut entry| {
                if entry.schema() != schema.as_ref() {
                    let added = schema.missing_from(entry.schema());
                    let removed = entry.schema().missing_from(&schema);
                    entry.reconcile(schema.clone(), &added, &removed);
                }
                entry
            })
            .collect();
        let highest = self.entries.iter().map(|e| e.id().0).max().unwrap_or(0);
        self.next_id = self.next_id.max(highest);

        match still_selected {
            Some(id) => self.selected = Some(id),
            None => self.restore_selection(marker.as_ref()),
        }
    }

    /// Adopt `schema`: columns new to the storage get a blank override on
    /// every entry, columns that disappeared are dropped from every entry
    pub fn reconcile_schema(&mut self, schema: &Schema) -> SchemaDiff {
        let diff = SchemaDiff {
            added: schema.missing_from(&self.schema),
            removed: self.schema.missing_from(schema),
        };
        if diff.is_empty() && self.schema.columns() == schema.columns() {
            return diff;
        }
        if !diff.is_empty() {
            info!(
                "Schema changed, added columns [{}], removed columns [{}]",
                diff.added.join(", "),
                diff.removed.join(", ")
            );
        }

        let schema = Arc::new(schema.clone());
        for entry in &mut self.entries {
            entry.reconcile(schema.clone(), &diff.added, &diff.removed);
        }
        self.schema = schema;
        diff
    }

    /// Look up every entry's key in `source`. Found entries get a fresh
    /// snapshot and become linked; entries with a snapshot that are not
    /// found become lost and keep their values. Afterwards the storage
    /// adopts the schema of `source`.
    pub async fn refresh_from_database(&mut self, source: &dyn Datasource) -> RefreshReport {
        let mut seen = HashSet::new();
        let keys: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.key().to_string())
            .filter(|key| !is_local_key(key) && seen.insert(key.clone()))
            .collect();

        let found: HashMap<String, HashMap<String, String>> = if keys.is_empty() {
            HashMap::new()
        } else {
            match source.get_datasets_by_key(&keys).await {
                Ok(results) => {
                    let mut found = HashMap::new();
                    for dataset in results.iter() {
                        found
                            .entry(dataset.key().to_string())
                            .or_insert_with(|| snapshot(dataset.as_ref(), source.schema()));
                    }
                    found
                }
                Err(e) => {
                    error!(
                        "Failed to refresh from datasource \"{}\", keeping cached values: {}",
                        source.name(),
                        e
                    );
                    HashMap::new()
                }
            }
        };

        let mut report = RefreshReport::default();
        for entry in &mut self.entries {
            match found.get(entry.key()) {
                Some(background) => {
                    entry.relink(background.clone());
                    report.linked += 1;
                }
                None if entry.has_background() => {
                    entry.mark_lost();
                    report.lost.push(entry.key().to_string());
                }
                None => {}
            }
        }
        if !report.lost.is_empty() {
            warn!(
                "{} entries could not be found in datasource \"{}\"",
                report.lost.len(),
                source.name()
            );
        }

        report.schema = self.reconcile_schema(source.schema());
        report
    }

    pub(crate) fn from_parts(
        schema: Schema,
        parts: Vec<(String, Option<HashMap<String, String>>, HashMap<String, String>)>,
        selection: Option<&SelectionMarker>,
    ) -> Self {
        let mut storage = Self::new(schema);
        for (key, background, overrides) in parts {
            let id = storage.issue_id();
            let entry = match background {
                Some(background) => {
                    LosEntry::linked(id, key, storage.schema.clone(), background).with_overrides(overrides)
                }
                None => LosEntry::override_only(id, key, storage.schema.clone(), overrides),
            };
            storage.entries.push(entry);
        }
        storage.restore_selection(selection);
        storage
    }

    pub fn count_by_state(&self, state: EntryState) -> usize {
        self.entries.iter().filter(|e| e.state() == state).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordjoin_query::Record;

    fn storage() -> LocalOverrideStorage {
        LocalOverrideStorage::new(Schema::new(["Vorname", "Nachname"]))
    }

    fn person(key: &str, first: &str, last: &str) -> Record {
        Record::new(key, Arc::new(Schema::new(["Vorname", "Nachname", "Gehalt"])))
            .with_value("Vorname", first)
            .with_value("Nachname", last)
            .with_value("Gehalt", "100")
    }

    #[test]
    fn test_add_from_background() {
        let mut los = storage();
        let id = los.add(&person("1", "Sheldon", "Cooper"), true);

        let entry = los.entry(id).unwrap();
        assert_eq!(entry.state(), EntryState::Linked);
        assert!(entry.overrides().is_empty());
        assert!(!entry.background().unwrap().contains_key("Gehalt"));
        assert_eq!(los.selected_id(), Some(id));
    }

    #[test]
    fn test_new_entry_shows_column_names() {
        let mut los = storage();
        let id = los.new_entry();
        let entry = los.entry(id).unwrap();

        assert!(is_local_key(entry.key()));
        assert_eq!(entry.state(), EntryState::New);
        assert_eq!(entry.get("Nachname").unwrap().as_deref(), Some("Nachname"));
    }

    #[test]
    fn test_copy_entry() {
        let mut los = storage();
        let original = los.add(&person("1", "Sheldon", "Cooper"), true);
        los.override_value(original, "Vorname", "Shelly").unwrap();

        let copy = los.copy_entry(original).unwrap();
        let entry = los.entry(copy).unwrap();
        assert_eq!(entry.state(), EntryState::New);
        assert_ne!(entry.key(), "1");
        assert_eq!(entry.get("Vorname").unwrap().as_deref(), Some("Shelly"));
        assert_eq!(entry.get("Nachname").unwrap().as_deref(), Some("Cooper"));
        assert_eq!(los.selected_id(), Some(original));
    }

    #[test]
    fn test_selection_by_key_and_ordinal() {
        let mut los = storage();
        los.add(&person("1", "Sheldon", "Cooper"), true);
        los.add(&person("2", "Amy", "Fowler"), true);
        let second = los.add(&person("1", "Sheldon", "Cooper"), true);

        los.select(second).unwrap();
        assert_eq!(los.selection_marker(), Some(SelectionMarker::new("1", 1)));

        los.restore_selection(Some(&SelectionMarker::new("2", 0)));
        assert_eq!(los.selected().unwrap().key(), "2");

        // no exact match falls back to the first entry
        los.restore_selection(Some(&SelectionMarker::new("1", 5)));
        assert_eq!(los.selected_id(), Some(los.entries()[0].id()));
    }

    #[test]
    fn test_select_unknown_entry() {
        let mut los = storage();
        let id = los.add(&person("1", "Sheldon", "Cooper"), true);
        los.remove(id).unwrap();

        assert!(matches!(los.select(id), Err(LosError::Selection(_))));
        assert!(los.selected().is_none());
    }

    #[test]
    fn test_remove_selected_selects_first() {
        let mut los = storage();
        let first = los.add(&person("1", "Sheldon", "Cooper"), true);
        let second = los.add(&person("2", "Amy", "Fowler"), true);
        los.select(second).unwrap();

        los.remove(second).unwrap();
        assert_eq!(los.selected_id(), Some(first));
    }

    #[test]
    fn test_empty_override_is_rejected() {
        let mut los = storage();
        let id = los.add(&person("1", "Sheldon", "Cooper"), true);
        los.override_value(id, "Vorname", "Shelly").unwrap();

        let err = los.override_value(id, "Vorname", "").unwrap_err();
        assert!(matches!(err, LosError::EmptyOverride(_)));
        assert_eq!(los.entry(id).unwrap().get("Vorname").unwrap().as_deref(), Some("Shelly"));
    }

    #[test]
    fn test_linked_entries_keep_duplicates() {
        let mut los = storage();
        let existing = los.add(&person("1", "Sheldon", "Cooper"), true);
        let amy = person("2", "Amy", "Fowler");

        let entries = los.linked_entries([&amy, &amy]);
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].id(), entries[1].id());
        assert!(entries.iter().all(|e| e.key() == "2" && e.state() == EntryState::Linked));
        assert!(entries.iter().all(|e| e.id() != existing));
        assert_eq!(los.len(), 1);

        los.replace_entries(entries);
        assert_eq!(los.selected().unwrap().key(), "2");
    }

    #[test]
    fn test_replace_entries_keeps_selection() {
        let mut los = storage();
        los.add(&person("1", "Sheldon", "Cooper"), true);
        let amy = los.add(&person("2", "Amy", "Fowler"), true);
        los.select(amy).unwrap();

        let reversed: Vec<LosEntry> = los.entries().iter().rev().cloned().collect();
        los.replace_entries(reversed);
        assert_eq!(los.selected_id(), Some(amy));
        assert_eq!(los.entries()[0].key(), "2");

        let without_amy: Vec<LosEntry> =
            los.entries().iter().filter(|e| e.key() != "2").cloned().collect();
        los.replace_entries(without_amy);
        assert_eq!(los.selected().unwrap().key(), "1");

        los.replace_entries(Vec::new());
        assert!(los.selected().is_none());
    }

    #[test]
    fn test_reconcile_schema() {
        let mut los = storage();
        let id = los.add(&person("1", "Sheldon", "Cooper"), true);
        los.override_value(id, "Nachname", "Hofstadter").unwrap();

        let diff = los.reconcile_schema(&Schema::new(["Vorname", "Titel"]));
        assert_eq!(diff.added, vec!["Titel"]);
        assert_eq!(diff.removed, vec!["Nachname"]);

        let entry = los.entry(id).unwrap();
        assert!(entry.get("Nachname").is_err());
        assert_eq!(entry.get("Titel").unwrap().as_deref(), Some(""));
        assert!(!entry.overrides().contains_key("Nachname"));

        assert!(los.reconcile_schema(&Schema::new(["Vorname", "Titel"])).is_empty());
    }
}
