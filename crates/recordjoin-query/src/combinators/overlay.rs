use super::matching::{lookup_all, MatchPairs};
use crate::config::ConfigNode;
use crate::error::{DataError, Result};
use crate::predicate::{most_restrictive_part, DatasetPredicate};
use crate::registry::{resolve_source, DatasourceFactory, SourceMap};
use crate::results::{QueryResultsList, ResultSet};
use crate::traits::Datasource;
use crate::types::{Dataset, DatasetRef, QueryPart, Schema};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Which side wins for a column both sources have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayMode {
    /// `so`: overlay values are applied after source values
    SourceThenOverlay,
    /// `os`: source values are applied after overlay values
    OverlayThenSource,
}

impl fmt::Display for OverlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayMode::SourceThenOverlay => write!(f, "so"),
            OverlayMode::OverlayThenSource => write!(f, "os"),
        }
    }
}

/// Layout shared by all datasets an overlay produces
#[derive(Debug)]
struct OverlayLayout {
    schema: Schema,
    source_schema: Schema,
    overlay_schema: Schema,
    mode: OverlayMode,
    empty_as_null: bool,
}

/// Source dataset joined with at most one overlay dataset
#[derive(Debug)]
struct OverlayDataset {
    source: DatasetRef,
    overlay: Option<DatasetRef>,
    layout: Arc<OverlayLayout>,
}

impl Dataset for OverlayDataset {
    fn key(&self) -> &str {
        self.source.key()
    }

    fn get(&self, column: &str) -> Result<Option<String>> {
        let layout = &self.layout;
        if !layout.schema.contains(column) {
            return Err(DataError::column_not_found(column));
        }

        let (preferred, fallback, preferred_schema) = match layout.mode {
            OverlayMode::SourceThenOverlay => (
                self.overlay.as_ref(),
                Some(&self.source),
                &layout.overlay_schema,
            ),
            OverlayMode::OverlayThenSource => (
                Some(&self.source),
                self.overlay.as_ref(),
                &layout.source_schema,
            ),
        };

        if let Some(preferred) = preferred {
            if preferred_schema.contains(column) {
                let value = preferred
                    .get(column)?
                    .filter(|v| !(layout.empty_as_null && v.is_empty()));
                if value.is_some() {
                    return Ok(value);
                }
            }
        }

        match fallback {
            None => Ok(None),
            Some(fallback) => match fallback.get(column) {
                Err(e) if e.is_column_not_found() => Ok(None),
                other => other,
            },
        }
    }
}

/// Join of a source with an overlay source on match-key pairs.
///
/// Result keys are always the source's keys; overlay rows without a matching
/// source row are invisible.
pub struct OverlaySource {
    name: String,
    source: Arc<dyn Datasource>,
    overlay: Arc<dyn Datasource>,
    matches: MatchPairs,
    common_match_columns: HashSet<String>,
    layout: Arc<OverlayLayout>,
}

impl OverlaySource {
    /// `mode` is `so` or `os` in any letter case. A lowercase second letter
    /// makes empty strings on the winning side count as absent.
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn Datasource>,
        overlay: Arc<dyn Datasource>,
        mode: &str,
        matches: Vec<(String, String)>,
    ) -> Result<Self> {
        let name = name.into();
        let parsed_mode = match mode.to_lowercase().as_str() {
            "so" => OverlayMode::SourceThenOverlay,
            "os" => OverlayMode::OverlayThenSource,
            _ => {
                return Err(DataError::invalid_configuration(format!(
                    "Incorrect MODE specification in datasource \"{}\": MODE \"{}\" is not allowed",
                    name, mode
                )))
            }
        };
        let empty_as_null = mode.chars().nth(1).map(char::is_lowercase).unwrap_or(false);

        let matches = MatchPairs::new(&name, matches, source.schema(), overlay.schema())?;
        let common_match_columns = matches.common_columns().map(str::to_string).collect();

        let schema: Schema = source
            .schema()
            .iter()
            .chain(overlay.schema().iter())
            .cloned()
            .collect();

        let layout = Arc::new(OverlayLayout {
            schema,
            source_schema: source.schema().clone(),
            overlay_schema: overlay.schema().clone(),
            mode: parsed_mode,
            empty_as_null,
        });

        Ok(Self {
            name,
            source,
            overlay,
            matches,
            common_match_columns,
            layout,
        })
    }

    pub fn mode(&self) -> OverlayMode {
        self.layout.mode
    }

    fn joined(&self, source: DatasetRef, overlay: Option<DatasetRef>) -> DatasetRef {
        Arc::new(OverlayDataset {
            source,
            overlay,
            layout: self.layout.clone(),
        })
    }

    /// Attach the first matching overlay row to every source row that passes `filter`
    async fn overlay_columns(
        &self,
        results: ResultSet,
        filter: &DatasetPredicate,
    ) -> Result<Vec<DatasetRef>> {
        let rows = results.to_vec();
        let queries: Vec<_> = rows
            .iter()
            .map(|ds| self.matches.forward_query(ds.as_ref()))
            .collect();
        let appendices = lookup_all(self.overlay.as_ref(), &queries).await?;

        let mut joined = Vec::with_capacity(rows.len());
        for (row, appendix) in rows.into_iter().zip(appendices) {
            if appendix.is_empty() {
                let candidate = self.joined(row, None);
                if filter.matches(candidate.as_ref()) {
                    joined.push(candidate);
                }
            } else {
                for overlay in appendix.iter() {
                    let candidate = self.joined(row.clone(), Some(overlay));
                    if filter.matches(candidate.as_ref()) {
                        joined.push(candidate);
                        break;
                    }
                }
            }
        }
        Ok(joined)
    }

    /// Find the source rows for overlay results and join every pair passing `filter`
    async fn overlay_columns_reversed(
        &self,
        results: ResultSet,
        filter: &DatasetPredicate,
    ) -> Result<Vec<DatasetRef>> {
        let rows = results.to_vec();
        let queries: Vec<_> = rows
            .iter()
            .map(|ds| self.matches.backward_query(ds.as_ref()))
            .collect();
        let prependices = lookup_all(self.source.as_ref(), &queries).await?;

        let mut joined = Vec::new();
        for (overlay, prependix) in rows.into_iter().zip(prependices) {
            for source in prependix.iter() {
                let candidate = self.joined(source, Some(overlay.clone()));
                if filter.matches(candidate.as_ref()) {
                    joined.push(candidate);
                }
            }
        }
        Ok(joined)
    }
}

#[async_trait]
impl Datasource for OverlaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &'static str {
        "overlay"
    }

    fn schema(&self) -> &Schema {
        &self.layout.schema
    }

    async fn get_datasets_by_key(&self, keys: &[String]) -> Result<ResultSet> {
        let results = self.source.get_datasets_by_key(keys).await?;
        let joined = self
            .overlay_columns(results, &DatasetPredicate::match_all())
            .await?;
        Ok(QueryResultsList::new(joined).boxed())
    }

    async fn find(&self, query: &[QueryPart]) -> Result<ResultSet> {
        if query.is_empty() {
            return Ok(QueryResultsList::empty().boxed());
        }

        let mut only_source = Vec::new();
        let mut only_overlay = Vec::new();
        let mut both = Vec::new();
        for part in query {
            let column = part.column.as_str();
            if self.layout.source_schema.contains(column) {
                if self.layout.overlay_schema.contains(column)
                    && !self.common_match_columns.contains(column)
                {
                    both.push(part.clone());
                } else {
                    only_source.push(part.clone());
                }
            } else {
                only_overlay.push(part.clone());
            }
        }

        // The overlay usually restricts little, so prefer driving the search
        // from the source whenever a source-only condition exists.
        if !only_source.is_empty() {
            let results = self.source.find(&only_source).await?;
            let mut rest = both;
            rest.extend(only_overlay);
            let joined = self
                .overlay_columns(results, &DatasetPredicate::build(&rest))
                .await?;
            return Ok(QueryResultsList::new(joined).boxed());
        }

        if !only_overlay.is_empty() {
            let results = self.overlay.find(&only_overlay).await?;
            let joined = self
                .overlay_columns_reversed(results, &DatasetPredicate::build(&both))
                .await?;
            return Ok(QueryResultsList::new(joined).boxed());
        }

        // Only shared columns: a value may come from either side, so search
        // both with a single condition and filter with the whole query.
        let restricting = match most_restrictive_part(&both) {
            Some(part) => vec![part.clone()],
            None => return Ok(QueryResultsList::empty().boxed()),
        };
        debug!(
            "Overlay {} searching both sides with {}",
            self.name, restricting[0]
        );
        let predicate = DatasetPredicate::build(query);

        let (from_source, from_overlay) = futures::try_join!(
            self.source.find(&restricting),
            self.overlay.find(&restricting)
        )?;
        let results1 = self.overlay_columns(from_source, &predicate).await?;
        let results2 = self
            .overlay_columns_reversed(from_overlay, &predicate)
            .await?;

        let keys1: HashSet<&str> = results1.iter().map(|ds| ds.key()).collect();
        let mut final_results = Vec::with_capacity(results1.len() + results2.len());
        let mut duplicate_keys = Vec::new();
        for ds in &results2 {
            if keys1.contains(ds.key()) {
                duplicate_keys.push(ds.key().to_string());
            } else {
                final_results.push(ds.clone());
            }
        }

        let reread = self.get_datasets_by_key(&duplicate_keys).await?;
        final_results.extend(reread.iter().filter(|ds| predicate.matches(ds.as_ref())));

        let duplicates: HashSet<&str> = duplicate_keys.iter().map(String::as_str).collect();
        final_results.extend(
            results1
                .iter()
                .filter(|ds| !duplicates.contains(ds.key()))
                .cloned(),
        );

        Ok(QueryResultsList::new(final_results).boxed())
    }

    async fn get_contents(&self) -> Result<ResultSet> {
        Ok(QueryResultsList::empty().boxed())
    }
}

pub struct OverlayFactory;

#[async_trait]
impl DatasourceFactory for OverlayFactory {
    fn source_type(&self) -> &'static str {
        "overlay"
    }

    async fn create_source(
        &self,
        config: &ConfigNode,
        sources: &SourceMap,
    ) -> Result<Arc<dyn Datasource>> {
        let name = config.source_name()?;
        let mode = config.require(&name, "MODE")?;
        let source = resolve_source(sources, &name, &config.require(&name, "SOURCE")?)?;
        let overlay = resolve_source(sources, &name, &config.require(&name, "OVERLAY")?)?;
        let matches = config.pairs(&name, "MATCH")?;
        Ok(Arc::new(OverlaySource::new(
            name, source, overlay, &mode, matches,
        )?))
    }
}
