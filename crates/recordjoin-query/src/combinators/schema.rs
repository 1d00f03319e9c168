use crate::config::ConfigNode;
use crate::error::{DataError, Result};
use crate::registry::{resolve_source, DatasourceFactory, SourceMap};
use crate::results::{QueryResultsList, ResultSet};
use crate::traits::Datasource;
use crate::types::{is_valid_column_name, Dataset, DatasetRef, QueryPart, Schema};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ColumnOrigin {
    /// Exposed under a new name, read from the underlying column
    Renamed(String),
    /// Exists only in the projected schema, never has a value
    Added,
}

#[derive(Debug)]
struct Projection {
    schema: Schema,
    origins: HashMap<String, ColumnOrigin>,
}

impl Projection {
    /// Underlying column for `column`; `Ok(None)` for added columns
    fn underlying<'a>(&'a self, column: &'a str) -> Result<Option<&'a str>> {
        if !self.schema.contains(column) {
            return Err(DataError::column_not_found(column));
        }
        match self.origins.get(column) {
            Some(ColumnOrigin::Added) => Ok(None),
            Some(ColumnOrigin::Renamed(old)) => Ok(Some(old.as_str())),
            None => Ok(Some(column)),
        }
    }
}

#[derive(Debug)]
struct ProjectedDataset {
    inner: DatasetRef,
    projection: Arc<Projection>,
}

impl Dataset for ProjectedDataset {
    fn key(&self) -> &str {
        self.inner.key()
    }

    fn get(&self, column: &str) -> Result<Option<String>> {
        match self.projection.underlying(column)? {
            Some(old) => self.inner.get(old),
            None => Ok(None),
        }
    }
}

/// Changes of a schema projection. Applied in the order drop, add, rename.
#[derive(Debug, Clone, Default)]
pub struct SchemaChanges {
    pub drop: Vec<String>,
    pub add: Vec<String>,
    pub rename: Vec<(String, String)>,
}

impl SchemaChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drop(mut self, column: impl Into<String>) -> Self {
        self.drop.push(column.into());
        self
    }

    pub fn with_add(mut self, column: impl Into<String>) -> Self {
        self.add.push(column.into());
        self
    }

    pub fn with_rename(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.rename.push((old.into(), new.into()));
        self
    }
}

/// Projection of another source's schema via drop, rename and add
pub struct SchemaSource {
    name: String,
    source: Arc<dyn Datasource>,
    projection: Arc<Projection>,
}

impl SchemaSource {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn Datasource>,
        changes: SchemaChanges,
    ) -> Result<Self> {
        let name = name.into();
        let original = source.schema();

        let mut to_drop: Vec<String> = Vec::new();
        for column in changes.drop {
            if !original.contains(&column) {
                return Err(DataError::invalid_configuration(format!(
                    "DROP column \"{}\" of datasource \"{}\" is not defined in schema",
                    column, name
                )));
            }
            to_drop.push(column);
        }

        let mut to_add: Vec<String> = Vec::new();
        for column in changes.add {
            Self::check_identifier(&name, &column)?;
            to_drop.retain(|c| *c != column);
            to_add.push(column);
        }

        let mut origins = HashMap::new();
        for (old, new) in changes.rename {
            if !original.contains(&old) {
                return Err(DataError::invalid_configuration(format!(
                    "RENAME column \"{}\" of datasource \"{}\" is not defined in schema",
                    old, name
                )));
            }
            Self::check_identifier(&name, &new)?;
            to_drop.push(old.clone());
            to_drop.retain(|c| *c != new);
            to_add.push(new.clone());
            origins.insert(new, ColumnOrigin::Renamed(old));
        }

        for column in &to_add {
            if !original.contains(column) && !origins.contains_key(column) {
                origins.insert(column.clone(), ColumnOrigin::Added);
            }
        }

        let schema: Schema = original
            .iter()
            .filter(|c| !to_drop.contains(*c))
            .chain(to_add.iter())
            .cloned()
            .collect();

        Ok(Self {
            name,
            source,
            projection: Arc::new(Projection { schema, origins }),
        })
    }

    fn check_identifier(owner: &str, column: &str) -> Result<()> {
        if is_valid_column_name(column) {
            Ok(())
        } else {
            Err(DataError::invalid_configuration(format!(
                "\"{}\" in datasource \"{}\" is not a valid column name",
                column, owner
            )))
        }
    }

    fn wrap(&self, results: ResultSet) -> ResultSet {
        let wrapped = results
            .iter()
            .map(|inner| {
                Arc::new(ProjectedDataset {
                    inner,
                    projection: self.projection.clone(),
                }) as DatasetRef
            })
            .collect();
        QueryResultsList::new(wrapped).boxed()
    }
}

#[async_trait]
impl Datasource for SchemaSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &'static str {
        "schema"
    }

    fn schema(&self) -> &Schema {
        &self.projection.schema
    }

    async fn get_datasets_by_key(&self, keys: &[String]) -> Result<ResultSet> {
        let results = self.source.get_datasets_by_key(keys).await?;
        Ok(self.wrap(results))
    }

    async fn find(&self, query: &[QueryPart]) -> Result<ResultSet> {
        let mut translated = Vec::with_capacity(query.len());
        for part in query {
            match self.projection.underlying(&part.column) {
                Ok(Some(old)) => translated.push(QueryPart::new(old, part.search.clone())),
                // dropped, unknown and added columns can never match
                Ok(None) | Err(_) => return Ok(QueryResultsList::empty().boxed()),
            }
        }
        let results = self.source.find(&translated).await?;
        Ok(self.wrap(results))
    }

    async fn get_contents(&self) -> Result<ResultSet> {
        Ok(QueryResultsList::empty().boxed())
    }
}

pub struct SchemaFactory;

#[async_trait]
impl DatasourceFactory for SchemaFactory {
    fn source_type(&self) -> &'static str {
        "schema"
    }

    async fn create_source(
        &self,
        config: &ConfigNode,
        sources: &SourceMap,
    ) -> Result<Arc<dyn Datasource>> {
        let name = config.source_name()?;
        let source = resolve_source(sources, &name, &config.require(&name, "SOURCE")?)?;

        let changes = SchemaChanges {
            drop: config.get_all("DROP").flat_map(ConfigNode::values).collect(),
            add: config.get_all("ADD").flat_map(ConfigNode::values).collect(),
            rename: config.pairs(&name, "RENAME")?,
        };
        Ok(Arc::new(SchemaSource::new(name, source, changes)?))
    }
}
