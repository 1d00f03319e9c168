use async_trait::async_trait;
use recordjoin_los::{
    cache_file, EntryState, LocalOverrideStorage, LosEntry, LosError, SelectionMarker,
};
use recordjoin_query::{
    DataError, Dataset, Datasource, QueryPart, ResultSet, Schema, TableSource,
};
use std::collections::HashMap;

fn people(columns: &[&str], rows: &[&[&str]]) -> TableSource {
    let rows = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .zip(row.iter())
                .map(|(c, v)| (c.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>()
        })
        .collect();
    TableSource::new(
        "personal",
        Schema::new(columns.iter().copied()),
        &["id".to_string()],
        rows,
    )
    .unwrap()
}

fn background() -> TableSource {
    people(
        &["id", "Vorname", "Nachname"],
        &[
            &["1", "Sheldon", "Cooper"],
            &["2", "Amy", "Fowler"],
            &["3", "Leonard", "Hofstadter"],
        ],
    )
}

async fn imported(source: &dyn Datasource, keys: &[&str]) -> LocalOverrideStorage {
    let mut los = LocalOverrideStorage::new(source.schema().clone());
    for key in keys {
        let found = source.get_datasets_by_key(&[key.to_string()]).await.unwrap();
        for dataset in found.to_vec() {
            los.add(dataset.as_ref(), true);
        }
    }
    los
}

fn snapshot(los: &LocalOverrideStorage) -> Vec<(String, EntryState, Option<Vec<(String, String)>>, Vec<(String, String)>)> {
    fn sorted(map: &HashMap<String, String>) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        pairs.sort();
        pairs
    }
    los.entries()
        .iter()
        .map(|e: &LosEntry| {
            (
                e.key().to_string(),
                e.state(),
                e.background().map(sorted),
                sorted(e.overrides()),
            )
        })
        .collect()
}

struct OfflineSource {
    schema: Schema,
}

#[async_trait]
impl Datasource for OfflineSource {
    fn name(&self) -> &str {
        "offline"
    }

    fn source_type(&self) -> &'static str {
        "offline"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn get_datasets_by_key(&self, _keys: &[String]) -> recordjoin_query::Result<ResultSet> {
        Err(DataError::backend_unavailable("connection refused"))
    }

    async fn find(&self, _query: &[QueryPart]) -> recordjoin_query::Result<ResultSet> {
        Err(DataError::backend_unavailable("connection refused"))
    }

    async fn get_contents(&self) -> recordjoin_query::Result<ResultSet> {
        Err(DataError::backend_unavailable("connection refused"))
    }
}

#[tokio::test]
async fn test_refresh_picks_up_background_changes() {
    let mut los = imported(&background(), &["1", "2"]).await;
    let sheldon = los.entries()[0].id();
    los.override_value(sheldon, "Vorname", "Shelly").unwrap();

    let changed = people(
        &["id", "Vorname", "Nachname"],
        &[&["1", "Sheldon Lee", "Cooper"], &["2", "Amy", "Farrah Fowler"]],
    );
    let report = los.refresh_from_database(&changed).await;

    assert_eq!(report.linked, 2);
    assert!(report.lost.is_empty());
    let entry = los.entry(sheldon).unwrap();
    assert_eq!(entry.get("Vorname").unwrap().as_deref(), Some("Shelly"));
    assert!(entry.is_different_from_background("Vorname"));
    assert_eq!(
        los.entries()[1].get("Nachname").unwrap().as_deref(),
        Some("Farrah Fowler")
    );
}

#[tokio::test]
async fn test_refresh_marks_missing_entries_lost() {
    let mut los = imported(&background(), &["1", "3"]).await;
    let leonard = los.entries()[1].id();
    los.override_value(leonard, "Vorname", "Lenny").unwrap();
    los.select(leonard).unwrap();
    let local = los.new_entry();

    let without_leonard = people(
        &["id", "Vorname", "Nachname"],
        &[&["1", "Sheldon", "Cooper"]],
    );
    let before = snapshot(&los);
    let report = los.refresh_from_database(&without_leonard).await;

    assert_eq!(report.lost, vec!["3"]);
    let entry = los.entry(leonard).unwrap();
    assert_eq!(entry.state(), EntryState::Lost);
    assert_eq!(entry.get("Vorname").unwrap().as_deref(), Some("Lenny"));
    assert_eq!(entry.get("Nachname").unwrap().as_deref(), Some("Hofstadter"));
    assert_eq!(los.entry(local).unwrap().state(), EntryState::New);
    assert_eq!(los.selected_id(), Some(leonard));
    assert_eq!(los.len(), before.len());

    let after_first = snapshot(&los);
    los.refresh_from_database(&without_leonard).await;
    assert_eq!(snapshot(&los), after_first);
}

#[tokio::test]
async fn test_failed_refresh_keeps_cached_values() {
    let mut los = imported(&background(), &["1", "2"]).await;
    let offline = OfflineSource {
        schema: los.schema().clone(),
    };

    let report = los.refresh_from_database(&offline).await;

    assert_eq!(report.lost.len(), 2);
    assert_eq!(los.count_by_state(EntryState::Lost), 2);
    assert_eq!(
        los.entries()[0].get("Vorname").unwrap().as_deref(),
        Some("Sheldon")
    );
}

#[tokio::test]
async fn test_refresh_reconciles_schema() {
    let mut los = imported(&background(), &["1"]).await;
    let id = los.entries()[0].id();
    los.override_value(id, "Nachname", "Hofstadter").unwrap();

    let reshaped = people(
        &["id", "Vorname", "Titel"],
        &[&["1", "Sheldon", "Dr."]],
    );
    let report = los.refresh_from_database(&reshaped).await;

    assert_eq!(report.schema.added, vec!["Titel"]);
    assert_eq!(report.schema.removed, vec!["Nachname"]);
    assert_eq!(los.schema().columns(), &["id", "Vorname", "Titel"]);

    let entry = los.entry(id).unwrap();
    assert!(entry.get("Nachname").unwrap_err().is_column_not_found());
    assert!(!entry.overrides().contains_key("Nachname"));
    // every entry gets a blank override for the new column
    assert_eq!(entry.overrides().get("Titel").map(String::as_str), Some(""));
    assert_eq!(entry.background().unwrap().get("Titel").map(String::as_str), Some("Dr."));
}

#[tokio::test]
async fn test_cache_file_round_trip() {
    let mut los = imported(&background(), &["1", "2", "1"]).await;
    let second_sheldon = los.entries()[2].id();
    los.override_value(second_sheldon, "Nachname", "Cooper-Fowler").unwrap();
    los.select(second_sheldon).unwrap();
    los.new_entry();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    cache_file::save(&los, &path).unwrap();

    let raw = std::fs::read(&path).unwrap();
    assert_eq!(&raw[..3], &[0xef, 0xbb, 0xbf]);

    let loaded = cache_file::load(&path).unwrap();
    assert_eq!(loaded.schema(), los.schema());
    assert_eq!(snapshot(&loaded), snapshot(&los));
    assert_eq!(loaded.selection_marker(), Some(SelectionMarker::new("1", 1)));
    assert_eq!(
        loaded.selected().unwrap().get("Nachname").unwrap().as_deref(),
        Some("Cooper-Fowler")
    );
}

#[test]
fn test_corrupt_cache_starts_empty() {
    let dir = tempfile::tempdir().unwrap();

    let path = dir.path().join("unknown_column.json");
    std::fs::write(
        &path,
        "\u{feff}{\"schema\": [\"Vorname\"], \"data\": [\
         {\"key\": \"1\", \"cache\": {\"Vorname\": \"Amy\"}, \"override\": {}},\
         {\"key\": \"2\", \"cache\": {\"Gehalt\": \"90\"}, \"override\": {}}]}",
    )
    .unwrap();
    assert!(cache_file::load(&path).is_err());
    let los = cache_file::load_or_default(&path);
    assert!(los.is_empty());
    assert!(los.schema().is_empty());

    let garbage = dir.path().join("garbage.json");
    std::fs::write(&garbage, "Schema(\"Vorname\")").unwrap();
    assert!(cache_file::load_or_default(&garbage).is_empty());

    let repeated = dir.path().join("repeated_column.json");
    std::fs::write(
        &repeated,
        "{\"schema\": [\"Vorname\", \"Vorname\"], \"data\": [\
         {\"key\": \"1\", \"cache\": {\"Vorname\": \"Amy\"}, \"override\": {}}]}",
    )
    .unwrap();
    assert!(matches!(
        cache_file::load(&repeated),
        Err(LosError::CacheCorruption(_))
    ));
    assert!(cache_file::load_or_default(&repeated).is_empty());

    assert!(cache_file::load_or_default(&dir.path().join("missing.json")).is_empty());
}

#[tokio::test]
async fn test_selection_restored_from_marker() {
    let los = imported(&background(), &["1", "2"]).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");

    let mut edited = los.clone();
    let amy = edited.entries()[1].id();
    edited.select(amy).unwrap();
    cache_file::save(&edited, &path).unwrap();

    let loaded = cache_file::load(&path).unwrap();
    assert_eq!(loaded.selected().unwrap().key(), "2");
}
