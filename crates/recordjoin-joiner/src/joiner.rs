use crate::error::{JoinerError, Result};
use crate::notifier::{JoinerEvent, Notifier};
use crate::query_string::{self, SearchStrategy};
use crate::search::{join_searches, DefaultSearchStrategy, StaticValues, ValueProvider};
use once_cell::sync::Lazy;
use recordjoin_los::{cache_file, EntryId, LocalOverrideStorage, LosEntry, RefreshReport};
use recordjoin_query::{
    ColumnTransformer, DataError, Dataset, DatasetRef, Datasource, EmptySource, Query, QueryPart,
    QueryResults, ResultSet, Schema, SourceMap,
};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

static SEARCH_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*?[^*]+\*?$").expect("search string pattern is valid"));

fn validate(query: &[QueryPart]) -> Result<()> {
    for part in query {
        if !SEARCH_STRING.is_match(&part.search) {
            return Err(DataError::invalid_query(format!(
                "Illegal search string: \"{}\"",
                part.search
            ))
            .into());
        }
    }
    Ok(())
}

/// One backing datasource plus the local override storage, presented as a
/// single searchable list with one selected entry.
///
/// Every mutating operation delivers exactly one [`JoinerEvent`] and, if a
/// cache path is set, persists the storage.
pub struct Joiner {
    sources: SourceMap,
    main: Arc<dyn Datasource>,
    los: LocalOverrideStorage,
    transformer: Option<ColumnTransformer>,
    strategies: Vec<DefaultSearchStrategy>,
    profile: Arc<dyn ValueProvider>,
    free_text: Option<SearchStrategy>,
    cache_path: Option<PathBuf>,
    notifier: Notifier,
    lost: Vec<String>,
}

impl Joiner {
    /// Attach `los` to the source named `main_source`: entries are looked up
    /// again, the storage adopts the live schema and the previous selection
    /// is restored.
    ///
    /// If the main source is not defined the cached data stays usable
    /// through an empty source with the cached schema; without cache this
    /// is a configuration error.
    pub async fn new(
        mut sources: SourceMap,
        main_source: &str,
        mut los: LocalOverrideStorage,
    ) -> Result<Self> {
        let mut lost = Vec::new();
        let main = match sources.get(main_source).cloned() {
            Some(main) => {
                let marker = los.selection_marker();
                let report = los.refresh_from_database(main.as_ref()).await;
                lost = report.lost;
                los.restore_selection(marker.as_ref());
                main
            }
            None if los.schema().is_empty() => {
                return Err(DataError::invalid_configuration(format!(
                    "Datasource \"{}\" is not defined and no cache is available",
                    main_source
                ))
                .into());
            }
            None => {
                error!(
                    "Datasource \"{}\" is not defined, using cached data",
                    main_source
                );
                let empty: Arc<dyn Datasource> =
                    Arc::new(EmptySource::new(main_source, los.schema().clone()));
                sources.insert(main_source.to_string(), empty.clone());
                empty
            }
        };
        info!(
            "Joiner ready on \"{}\" with {} cached entries ({} lost)",
            main.name(),
            los.len(),
            lost.len()
        );

        Ok(Self {
            sources,
            main,
            los,
            transformer: None,
            strategies: Vec::new(),
            profile: Arc::new(StaticValues::default()),
            free_text: None,
            cache_path: None,
            notifier: Notifier::default(),
            lost,
        })
    }

    pub fn with_transformer(mut self, transformer: ColumnTransformer) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<DefaultSearchStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Profile the fallback default search reads `givenname` and `sn` from
    pub fn with_profile(mut self, profile: Arc<dyn ValueProvider>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_free_text(mut self, strategy: SearchStrategy) -> Self {
        self.free_text = Some(strategy);
        self
    }

    /// Persist the storage to `path` after every change. The storage is
    /// written right away, so the schema adopted on attach reaches the file.
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self.persist();
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JoinerEvent> {
        self.notifier.subscribe()
    }

    pub fn main_source(&self) -> &Arc<dyn Datasource> {
        &self.main
    }

    pub fn source(&self, name: &str) -> Option<&Arc<dyn Datasource>> {
        self.sources.get(name)
    }

    pub fn schema(&self) -> &Schema {
        self.main.schema()
    }

    /// Columns of the main source followed by the pseudo-columns
    pub fn columns(&self) -> Vec<String> {
        let mut columns = self.schema().columns().to_vec();
        if let Some(transformer) = &self.transformer {
            for column in transformer.schema().iter() {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        columns
    }

    pub fn storage(&self) -> &LocalOverrideStorage {
        &self.los
    }

    pub fn entries(&self) -> &[LosEntry] {
        self.los.entries()
    }

    /// Keys of entries that could not be found on the last refresh
    pub fn lost_entries(&self) -> &[String] {
        &self.lost
    }

    fn changed(&mut self) {
        if self.notifier.notify() {
            self.persist();
        }
    }

    /// Run `f` with all of its changes delivered as one event
    fn batch<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.notifier.hold();
        let result = f(self);
        if self.notifier.release() {
            self.persist();
        }
        result
    }

    fn persist(&self) {
        if let Some(path) = &self.cache_path {
            if let Err(e) = cache_file::save(&self.los, path) {
                error!("Failed to write cache {}: {}", path.display(), e);
            }
        }
    }

    pub fn select(&mut self, id: EntryId) -> Result<()> {
        if !self.los.contains(id) {
            return Err(JoinerError::selection(format!(
                "Entry {} is not part of the list",
                id
            )));
        }
        self.los.select(id)?;
        self.changed();
        Ok(())
    }

    pub fn selected(&self) -> Result<&LosEntry> {
        self.los.selected().ok_or(JoinerError::NothingSelected)
    }

    /// Selected entry with pseudo-columns applied
    pub fn selected_transformed(&self) -> Result<DatasetRef> {
        let entry: DatasetRef = Arc::new(self.selected()?.clone());
        Ok(match &self.transformer {
            Some(transformer) => transformer.transform(entry),
            None => entry,
        })
    }

    /// Value of `column` in the selected entry, computed if it is a
    /// pseudo-column
    pub fn current_value(&self, column: &str) -> Result<Option<String>> {
        let entry = self.selected()?;
        let value = match &self.transformer {
            Some(transformer) => transformer.get(column, entry)?,
            None => entry.get(column)?,
        };
        Ok(value)
    }

    /// Replace the entry list, keeping the selection where possible
    pub fn update_entries(&mut self, entries: Vec<LosEntry>) {
        self.los.replace_entries(entries);
        self.changed();
    }

    /// Search the main source. Search strings may only carry a wildcard at
    /// the start or the end.
    pub async fn find(&self, query: &[QueryPart]) -> Result<ResultSet> {
        validate(query)?;
        Ok(self.main.find(query).await?)
    }

    /// Search the source named by `query`
    pub async fn find_in(&self, query: &Query) -> Result<ResultSet> {
        validate(&query.parts)?;
        let source = self.sources.get(&query.source).ok_or_else(|| {
            DataError::invalid_query(format!(
                "Datasource \"{}\" should be searched but is not defined",
                query.source
            ))
        })?;
        Ok(source.find(&query.parts).await?)
    }

    pub async fn contents_of(&self, name: &str) -> Result<ResultSet> {
        let source = self.sources.get(name).ok_or_else(|| {
            DataError::invalid_query(format!(
                "Datasource \"{}\" should be read but is not defined",
                name
            ))
        })?;
        Ok(source.get_contents().await?)
    }

    /// Free-text search with the configured templates against the main
    /// source. `None` if no templates are configured.
    pub async fn search_text(&self, text: &str) -> Result<Option<ResultSet>> {
        let strategy = match &self.free_text {
            Some(strategy) => strategy,
            None => return Ok(None),
        };
        let mut queries = query_string::parse_query(strategy, text);
        for query in &mut queries {
            query.source = self.main.name().to_string();
        }
        let mut sources = SourceMap::new();
        sources.insert(self.main.name().to_string(), self.main.clone());
        Ok(Some(query_string::run_queries(&queries, &sources).await?))
    }

    /// Run every default search strategy at once and replace the entry list
    /// with everything they found, in strategy order and without removing
    /// duplicates. Without configured strategies the user profile is
    /// searched by given name and surname. Returns the number of records
    /// found.
    pub async fn default_search(&mut self) -> usize {
        let strategies = if self.strategies.is_empty() {
            info!("No search strategy configured, searching by profile");
            vec![DefaultSearchStrategy::fallback(self.profile.clone())]
        } else {
            self.strategies.clone()
        };
        let searches = strategies.iter().map(|s| s.search(self.main.clone())).collect();
        let found = join_searches(searches).await;
        debug!("Default search found {} records", found.len());

        self.batch(|joiner| {
            let entries = joiner.los.linked_entries(found.iter().map(|ds| ds.as_ref()));
            joiner.update_entries(entries);
        });
        found.len()
    }

    /// Add search results as entries linked to their background records
    pub fn add_to_cache(&mut self, results: &dyn QueryResults) -> Vec<EntryId> {
        let datasets = results.to_vec();
        self.batch(|joiner| {
            let ids: Vec<EntryId> = datasets
                .iter()
                .map(|ds| joiner.los.add(ds.as_ref(), true))
                .collect();
            if !ids.is_empty() {
                joiner.changed();
            }
            ids
        })
    }

    /// Add a blank entry and select it
    pub fn new_dataset(&mut self) -> EntryId {
        self.batch(|joiner| {
            let id = joiner.los.new_entry();
            if joiner.los.select(id).is_ok() {
                joiner.changed();
            }
            id
        })
    }

    /// Add a local copy of `id` carrying its current values
    pub fn copy_dataset(&mut self, id: EntryId) -> Result<EntryId> {
        let copy = self.los.copy_entry(id)?;
        self.changed();
        Ok(copy)
    }

    pub fn remove_dataset(&mut self, id: EntryId) -> Result<LosEntry> {
        let removed = self.los.remove(id)?;
        self.changed();
        Ok(removed)
    }

    pub fn override_value(&mut self, id: EntryId, column: &str, value: impl Into<String>) -> Result<()> {
        self.los.override_value(id, column, value)?;
        self.changed();
        Ok(())
    }

    pub fn drop_override(&mut self, id: EntryId, column: &str) -> Result<()> {
        self.los.drop_override(id, column)?;
        self.changed();
        Ok(())
    }

    /// Look up every entry again in the main source
    pub async fn refresh(&mut self) -> RefreshReport {
        let marker = self.los.selection_marker();
        let report = self.los.refresh_from_database(self.main.as_ref()).await;
        self.los.restore_selection(marker.as_ref());
        if !report.lost.is_empty() {
            warn!("{} cached entries are no longer found", report.lost.len());
        }
        self.lost = report.lost.clone();
        self.changed();
        report
    }

    pub fn save_cache(&self, path: &Path) -> Result<()> {
        cache_file::save(&self.los, path)?;
        Ok(())
    }

    /// Replace the storage with the one cached at `path` and refresh it
    pub async fn load_cache(&mut self, path: &Path) -> Result<RefreshReport> {
        self.los = cache_file::load(path)?;
        Ok(self.refresh().await)
    }
}
