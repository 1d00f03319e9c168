use crate::config::ConfigNode;
use crate::error::{DataError, Result};
use crate::predicate::DatasetPredicate;
use crate::registry::{DatasourceFactory, SourceMap};
use crate::results::{QueryResultsList, ResultSet};
use crate::traits::Datasource;
use crate::types::{is_valid_column_name, DatasetRef, QueryPart, Record, Schema};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Separator between key column values in a table key
pub const KEY_SEPARATOR: &str = "£#%&|";

/// Datasource holding a fixed set of rows in memory
pub struct TableSource {
    name: String,
    schema: Arc<Schema>,
    rows: Vec<DatasetRef>,
}

impl TableSource {
    /// Build a table from rows given as column/value maps.
    ///
    /// The key of a row is the values of `key_columns` joined by
    /// [`KEY_SEPARATOR`].
    pub fn new(
        name: impl Into<String>,
        schema: Schema,
        key_columns: &[String],
        rows: Vec<HashMap<String, String>>,
    ) -> Result<Self> {
        let name = name.into();
        if key_columns.is_empty() {
            return Err(DataError::invalid_configuration(format!(
                "Missing or incorrect key specification for datasource \"{}\"",
                name
            )));
        }
        for column in key_columns {
            if !schema.contains(column) {
                return Err(DataError::invalid_configuration(format!(
                    "Key column \"{}\" of datasource \"{}\" is not defined in schema",
                    column, name
                )));
            }
        }

        let schema = Arc::new(schema);
        let rows = rows
            .into_iter()
            .map(|values| {
                let key = key_columns
                    .iter()
                    .map(|c| values.get(c).map(String::as_str).unwrap_or(""))
                    .collect::<Vec<_>>()
                    .join(KEY_SEPARATOR);
                Record::from_values(key, schema.clone(), values).into_ref()
            })
            .collect();

        Ok(Self { name, schema, rows })
    }

    /// Build from `NAME`, `Schema`, `Schluessel` and `Data`
    pub fn from_config(config: &ConfigNode) -> Result<Self> {
        let name = config.source_name()?;

        let schema_node = config.get("Schema").ok_or_else(|| {
            DataError::invalid_configuration(format!(
                "Section 'Schema' of datasource \"{}\" is missing",
                name
            ))
        })?;
        let columns = schema_node.values();
        for column in &columns {
            if !is_valid_column_name(column) {
                return Err(DataError::invalid_configuration(format!(
                    "Column \"{}\" of datasource \"{}\" is not a valid identifier",
                    column, name
                )));
            }
        }
        let schema = Schema::try_new(columns.clone())?;

        let key_columns = config
            .get("Schluessel")
            .map(ConfigNode::values)
            .unwrap_or_default();

        let data = config.get("Data").ok_or_else(|| {
            DataError::invalid_configuration(format!(
                "Section 'Data' of datasource \"{}\" is missing",
                name
            ))
        })?;

        let mut rows = Vec::with_capacity(data.children.len());
        for row in &data.children {
            rows.push(Self::parse_row(&name, row, &schema, &columns)?);
        }

        debug!("Table datasource {} loaded with {} rows", name, rows.len());
        Self::new(name, schema, &key_columns, rows)
    }

    fn parse_row(
        name: &str,
        row: &ConfigNode,
        schema: &Schema,
        ordered: &[String],
    ) -> Result<HashMap<String, String>> {
        if !row.name.is_empty() {
            return Err(DataError::invalid_configuration(format!(
                "Row \"{}\" of datasource \"{}\" must be an anonymous list",
                row.name, name
            )));
        }

        let mut values = HashMap::new();
        let positional = row.children.first().map(ConfigNode::is_leaf).unwrap_or(true);
        if positional {
            if row.children.len() > ordered.len() {
                return Err(DataError::invalid_configuration(format!(
                    "Row of datasource \"{}\" has more fields than the schema",
                    name
                )));
            }
            for (column, value) in ordered.iter().zip(&row.children) {
                values.insert(column.clone(), value.name.clone());
            }
        } else {
            for cell in &row.children {
                if !schema.contains(&cell.name) {
                    return Err(DataError::invalid_configuration(format!(
                        "Row of datasource \"{}\" has column \"{}\" which is not defined in the schema",
                        name, cell.name
                    )));
                }
                values.insert(cell.name.clone(), cell.value().to_string());
            }
        }
        Ok(values)
    }

    fn filter(&self, predicate: impl Fn(&DatasetRef) -> bool) -> ResultSet {
        let matches: Vec<DatasetRef> = self.rows.iter().filter(|ds| predicate(ds)).cloned().collect();
        QueryResultsList::new(matches).boxed()
    }
}

#[async_trait]
impl Datasource for TableSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &'static str {
        "table"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn get_datasets_by_key(&self, keys: &[String]) -> Result<ResultSet> {
        let keys: HashSet<&str> = keys.iter().map(String::as_str).collect();
        Ok(self.filter(|ds| keys.contains(ds.key())))
    }

    async fn find(&self, query: &[QueryPart]) -> Result<ResultSet> {
        if query.is_empty() {
            return Ok(QueryResultsList::empty().boxed());
        }
        let predicate = DatasetPredicate::build(query);
        Ok(self.filter(|ds| predicate.matches(ds.as_ref())))
    }

    async fn get_contents(&self) -> Result<ResultSet> {
        Ok(QueryResultsList::new(self.rows.clone()).boxed())
    }
}

pub struct TableFactory;

#[async_trait]
impl DatasourceFactory for TableFactory {
    fn source_type(&self) -> &'static str {
        "table"
    }

    async fn create_source(
        &self,
        config: &ConfigNode,
        _sources: &SourceMap,
    ) -> Result<Arc<dyn Datasource>> {
        Ok(Arc::new(TableSource::from_config(config)?))
    }
}
