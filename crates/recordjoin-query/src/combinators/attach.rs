use super::matching::{lookup_all, MatchPairs};
use crate::config::ConfigNode;
use crate::error::{DataError, Result};
use crate::predicate::DatasetPredicate;
use crate::registry::{resolve_source, DatasourceFactory, SourceMap};
use crate::results::{QueryResultsList, ResultSet};
use crate::traits::Datasource;
use crate::types::{Dataset, DatasetRef, QueryPart, Schema};
use async_trait::async_trait;
use std::sync::Arc;

/// Separator between the attached source's name and its column names
pub const ATTACH_SEPARATOR: &str = "__";

#[derive(Debug)]
struct AttachLayout {
    schema: Schema,
    prefix: String,
}

#[derive(Debug)]
struct AttachedDataset {
    source: DatasetRef,
    attached: Option<DatasetRef>,
    layout: Arc<AttachLayout>,
}

impl Dataset for AttachedDataset {
    fn key(&self) -> &str {
        self.source.key()
    }

    fn get(&self, column: &str) -> Result<Option<String>> {
        if !self.layout.schema.contains(column) {
            return Err(DataError::column_not_found(column));
        }
        match column.strip_prefix(self.layout.prefix.as_str()) {
            Some(attached_column) => match &self.attached {
                Some(attached) => attached.get(attached_column),
                None => Ok(None),
            },
            None => self.source.get(column),
        }
    }
}

/// Join that keeps both sides apart: the attached source's columns appear
/// as `<name>__<column>` next to the source's columns.
pub struct AttachSource {
    name: String,
    source: Arc<dyn Datasource>,
    attached: Arc<dyn Datasource>,
    matches: MatchPairs,
    layout: Arc<AttachLayout>,
}

impl AttachSource {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn Datasource>,
        attached: Arc<dyn Datasource>,
        matches: Vec<(String, String)>,
    ) -> Result<Self> {
        let name = name.into();
        let prefix = format!("{}{}", attached.name(), ATTACH_SEPARATOR);

        let mut schema = source.schema().clone();
        for column in attached.schema() {
            let prefixed = format!("{}{}", prefix, column);
            if !schema.push(prefixed.clone()) {
                return Err(DataError::invalid_configuration(format!(
                    "Collision with column \"{}\" from datasource \"{}\"",
                    prefixed,
                    source.name()
                )));
            }
        }

        let matches = MatchPairs::new(&name, matches, source.schema(), attached.schema())?;

        Ok(Self {
            name,
            source,
            attached,
            matches,
            layout: Arc::new(AttachLayout { schema, prefix }),
        })
    }

    fn joined(&self, source: DatasetRef, attached: Option<DatasetRef>) -> DatasetRef {
        Arc::new(AttachedDataset {
            source,
            attached,
            layout: self.layout.clone(),
        })
    }

    async fn attach_columns(
        &self,
        results: ResultSet,
        filter: &DatasetPredicate,
    ) -> Result<Vec<DatasetRef>> {
        let rows = results.to_vec();
        let queries: Vec<_> = rows
            .iter()
            .map(|ds| self.matches.forward_query(ds.as_ref()))
            .collect();
        let appendices = lookup_all(self.attached.as_ref(), &queries).await?;

        let mut joined = Vec::with_capacity(rows.len());
        for (row, appendix) in rows.into_iter().zip(appendices) {
            if appendix.is_empty() {
                let candidate = self.joined(row, None);
                if filter.matches(candidate.as_ref()) {
                    joined.push(candidate);
                }
                continue;
            }
            if let Some(candidate) = appendix
                .iter()
                .map(|attached| self.joined(row.clone(), Some(attached)))
                .find(|candidate| filter.matches(candidate.as_ref()))
            {
                joined.push(candidate);
            }
        }
        Ok(joined)
    }

    async fn attach_columns_reversed(&self, results: ResultSet) -> Result<Vec<DatasetRef>> {
        let rows = results.to_vec();
        let queries: Vec<_> = rows
            .iter()
            .map(|ds| self.matches.backward_query(ds.as_ref()))
            .collect();
        let prependices = lookup_all(self.source.as_ref(), &queries).await?;

        let mut joined = Vec::new();
        for (attached, prependix) in rows.into_iter().zip(prependices) {
            for source in prependix.iter() {
                joined.push(self.joined(source, Some(attached.clone())));
            }
        }
        Ok(joined)
    }
}

#[async_trait]
impl Datasource for AttachSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &'static str {
        "attach"
    }

    fn schema(&self) -> &Schema {
        &self.layout.schema
    }

    async fn get_datasets_by_key(&self, keys: &[String]) -> Result<ResultSet> {
        let results = self.source.get_datasets_by_key(keys).await?;
        let joined = self
            .attach_columns(results, &DatasetPredicate::match_all())
            .await?;
        Ok(QueryResultsList::new(joined).boxed())
    }

    async fn find(&self, query: &[QueryPart]) -> Result<ResultSet> {
        if query.is_empty() {
            return Ok(QueryResultsList::empty().boxed());
        }

        let mut source_query = Vec::new();
        let mut attached_query = Vec::new();
        let mut prefixed_query = Vec::new();
        for part in query {
            match part.column.strip_prefix(self.layout.prefix.as_str()) {
                Some(column) => {
                    attached_query.push(QueryPart::new(column, part.search.clone()));
                    prefixed_query.push(part.clone());
                }
                None => source_query.push(part.clone()),
            }
        }

        let joined = if !source_query.is_empty() {
            let results = self.source.find(&source_query).await?;
            self.attach_columns(results, &DatasetPredicate::build(&prefixed_query))
                .await?
        } else {
            let results = self.attached.find(&attached_query).await?;
            self.attach_columns_reversed(results).await?
        };
        Ok(QueryResultsList::new(joined).boxed())
    }

    async fn get_contents(&self) -> Result<ResultSet> {
        Ok(QueryResultsList::empty().boxed())
    }
}

pub struct AttachFactory;

#[async_trait]
impl DatasourceFactory for AttachFactory {
    fn source_type(&self) -> &'static str {
        "attach"
    }

    async fn create_source(
        &self,
        config: &ConfigNode,
        sources: &SourceMap,
    ) -> Result<Arc<dyn Datasource>> {
        let name = config.source_name()?;
        let source = resolve_source(sources, &name, &config.require(&name, "SOURCE")?)?;
        let attached = resolve_source(sources, &name, &config.require(&name, "ATTACH")?)?;
        let matches = config.pairs(&name, "MATCH")?;
        Ok(Arc::new(AttachSource::new(name, source, attached, matches)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinators::test_support::table;

    fn attach() -> AttachSource {
        let people = table(
            "people",
            &["id", "Name", "Raum"],
            &[&["1", "Sheldon", "4A"], &["2", "Penny", "4B"]],
        );
        let rooms = table("rooms", &["Raum", "Etage"], &[&["4A", "4"], &["3C", "3"]]);
        AttachSource::new("mit_raum", people, rooms, vec![("Raum".into(), "Raum".into())]).unwrap()
    }

    #[tokio::test]
    async fn test_prefixed_schema_and_values() {
        let source = attach();
        assert_eq!(
            source.schema().columns(),
            &["id", "Name", "Raum", "rooms__Raum", "rooms__Etage"]
        );

        let rows = source.get_datasets_by_key(&["1".into(), "2".into()]).await.unwrap().to_vec();
        assert_eq!(rows[0].get("rooms__Etage").unwrap().as_deref(), Some("4"));
        assert_eq!(rows[0].get("Raum").unwrap().as_deref(), Some("4A"));
        assert_eq!(rows[1].get("rooms__Etage").unwrap(), None);
        assert!(rows[1].get("Etage").unwrap_err().is_column_not_found());
    }

    #[tokio::test]
    async fn test_find_splits_by_prefix() {
        let source = attach();

        let found = source
            .find(&[QueryPart::new("Name", "*"), QueryPart::new("rooms__Etage", "4")])
            .await
            .unwrap();
        assert_eq!(found.keys(), vec!["1"]);

        let found = source.find(&[QueryPart::new("rooms__Etage", "4")]).await.unwrap();
        assert_eq!(found.keys(), vec!["1"]);

        let found = source.find(&[QueryPart::new("rooms__Etage", "3")]).await.unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_prefix_collision() {
        let people = table("people", &["id", "rooms__Raum"], &[]);
        let rooms = table("rooms", &["Raum"], &[]);
        let err = AttachSource::new("x", people, rooms, vec![("id".into(), "Raum".into())])
            .err()
            .unwrap();
        assert!(err.to_string().contains("Collision"));
    }
}
