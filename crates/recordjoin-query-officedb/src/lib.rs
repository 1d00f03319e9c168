//! Office suite database driver for recordjoin-query
//!
//! Translates queries into SQL text for a table of a registered office
//! database and wraps the returned rows as datasets. The database itself is
//! reached through an [`OfficeDbConnector`], so the crate carries no driver.
//!
//! Keys are built from the key columns of a row as `column#value#` pairs
//! (`%` and `#` escaped), which lets [`Datasource::get_datasets_by_key`]
//! turn them back into equality conditions.

mod sql;

pub use sql::{literal, search_pattern, SqlSyntax};

use async_trait::async_trait;
use recordjoin_query::{
    ConfigNode, DataError, DatasetRef, Datasource, DatasourceFactory, QueryPart,
    QueryResultsList, Record, Result, ResultSet, Schema, SourceMap,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Rows returned by a statement, values addressed by column label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Column names and primary key of a table as reported by the database
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDescription {
    pub columns: Vec<String>,
    pub primary_key: Vec<String>,
}

/// Registered data source name plus login
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub source: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("source", &self.source)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Access to the office database. Statements are passed through unparsed.
#[async_trait]
pub trait OfficeDbConnector: Send + Sync {
    async fn execute(&self, target: &ConnectionTarget, sql: &str) -> Result<SqlRows>;

    async fn describe_table(&self, target: &ConnectionTarget, table: &str)
        -> Result<TableDescription>;
}

/// Settings of an office database source, usually read from its definition
#[derive(Debug, Clone)]
pub struct OfficeDbSettings {
    pub name: String,
    pub target: ConnectionTarget,
    pub table: String,
    pub syntax: SqlSyntax,
    /// Columns from `Schema`; read from the database when absent
    pub schema: Option<Vec<String>>,
    pub key_columns: Vec<String>,
}

impl OfficeDbSettings {
    /// Read `NAME`, `SOURCE`, `TABLE`, `USER`, `PASSWORD`, `SQL_SYNTAX`,
    /// `Schema` and `Schluessel`
    pub fn from_config(config: &ConfigNode) -> Result<Self> {
        let name = config.source_name()?;
        let source = config.require(&name, "SOURCE")?;
        let table = config.require(&name, "TABLE")?;

        let syntax = match config.get_str("SQL_SYNTAX") {
            None => SqlSyntax::default(),
            Some(value) => SqlSyntax::parse(value).ok_or_else(|| {
                DataError::invalid_configuration(format!(
                    "SQL_SYNTAX \"{}\" of datasource \"{}\" is not supported",
                    value, name
                ))
            })?,
        };

        let schema = match config.get("Schema") {
            None => None,
            Some(node) => {
                let columns = node.values();
                if columns.is_empty() {
                    return Err(DataError::invalid_configuration(format!(
                        "Schema of datasource \"{}\" is empty",
                        name
                    )));
                }
                Some(columns)
            }
        };

        let key_columns = config.get("Schluessel").map(ConfigNode::values).unwrap_or_default();
        if schema.is_some() && key_columns.is_empty() {
            return Err(DataError::invalid_configuration(format!(
                "Datasource \"{}\" defines a Schema but no Schluessel",
                name
            )));
        }

        Ok(Self {
            name,
            target: ConnectionTarget {
                source,
                user: config.get_str("USER").map(str::to_string),
                password: config.get_str("PASSWORD").map(str::to_string),
            },
            table,
            syntax,
            schema,
            key_columns,
        })
    }
}

/// Datasource backed by one table of an office database
pub struct OfficeDbSource {
    name: String,
    target: ConnectionTarget,
    table: String,
    syntax: SqlSyntax,
    schema: Arc<Schema>,
    key_columns: Vec<String>,
    connector: Arc<dyn OfficeDbConnector>,
}

impl OfficeDbSource {
    /// Create the source, asking the database for the table layout when the
    /// settings do not define a schema
    pub async fn connect(
        settings: OfficeDbSettings,
        connector: Arc<dyn OfficeDbConnector>,
    ) -> Result<Self> {
        let OfficeDbSettings {
            name,
            target,
            table,
            syntax,
            schema,
            mut key_columns,
        } = settings;

        let columns = match schema {
            Some(columns) => columns,
            None => {
                debug!("Reading layout of table {} for datasource {}", table, name);
                let description = connector
                    .describe_table(&target, &table)
                    .await
                    .map_err(|e| {
                        error!("Failed to read layout of table {}: {}", table, e);
                        DataError::invalid_configuration(format!(
                            "Could not read schema of table \"{}\" for datasource \"{}\": {}",
                            table, name, e
                        ))
                    })?;
                if key_columns.is_empty() {
                    key_columns = description.primary_key;
                }
                description.columns
            }
        };
        let schema = Schema::try_new(columns)?;

        if key_columns.is_empty() {
            return Err(DataError::invalid_configuration(format!(
                "Datasource \"{}\" has no key columns",
                name
            )));
        }
        let mut seen = HashSet::new();
        for column in &key_columns {
            if !schema.contains(column) {
                return Err(DataError::invalid_configuration(format!(
                    "Key column \"{}\" of datasource \"{}\" is not defined in schema",
                    column, name
                )));
            }
            if !seen.insert(column.as_str()) {
                return Err(DataError::invalid_configuration(format!(
                    "Key column \"{}\" of datasource \"{}\" is listed twice",
                    column, name
                )));
            }
        }

        debug!(
            "Office database datasource {} on {}.{} with schema {}",
            name, target.source, table, schema
        );

        Ok(Self {
            name,
            target,
            table,
            syntax,
            schema: Arc::new(schema),
            key_columns,
            connector,
        })
    }

    pub fn syntax(&self) -> SqlSyntax {
        self.syntax
    }

    /// Run a statement. Failures are logged and produce no rows.
    async fn run(&self, sql: &str) -> ResultSet {
        debug!("Executing on {}: {}", self.target.source, sql);
        match self.connector.execute(&self.target, sql).await {
            Ok(rows) => QueryResultsList::new(self.datasets(rows)).boxed(),
            Err(e) => {
                error!("Query on datasource {} failed: {}", self.name, e);
                QueryResultsList::empty().boxed()
            }
        }
    }

    fn datasets(&self, result: SqlRows) -> Vec<DatasetRef> {
        let indices: Vec<(String, usize)> = self
            .schema
            .iter()
            .filter_map(|column| {
                result
                    .columns
                    .iter()
                    .position(|label| label == column)
                    .map(|idx| (column.clone(), idx))
            })
            .collect();

        result
            .rows
            .into_iter()
            .map(|row| {
                let values: HashMap<String, String> = indices
                    .iter()
                    .filter_map(|(column, idx)| {
                        row.get(*idx).cloned().flatten().map(|v| (column.clone(), v))
                    })
                    .collect();
                let key = encode_key(&self.key_columns, &values);
                Record::from_values(key, self.schema.clone(), values).into_ref()
            })
            .collect()
    }
}

#[async_trait]
impl Datasource for OfficeDbSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &'static str {
        "officedb"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn get_datasets_by_key(&self, keys: &[String]) -> Result<ResultSet> {
        let alternatives: Vec<Vec<(String, String)>> = keys
            .iter()
            .map(|key| decode_key(key))
            .filter(|pairs| !pairs.is_empty())
            .collect();
        if alternatives.is_empty() {
            return Ok(QueryResultsList::empty().boxed());
        }
        Ok(self.run(&self.syntax.select_equal(&self.table, &alternatives)).await)
    }

    async fn find(&self, query: &[QueryPart]) -> Result<ResultSet> {
        if query.is_empty() {
            return Ok(QueryResultsList::empty().boxed());
        }
        Ok(self.run(&self.syntax.select_like(&self.table, query)).await)
    }

    async fn get_contents(&self) -> Result<ResultSet> {
        Ok(self.run(&self.syntax.select_all(&self.table)).await)
    }
}

fn encode(value: &str) -> String {
    value.replace('%', "%%").replace('#', "%r")
}

fn decode(value: &str) -> String {
    let mut decoded = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            decoded.push(c);
            continue;
        }
        match chars.next() {
            Some('r') => decoded.push('#'),
            Some(other) => decoded.push(other),
            None => {}
        }
    }
    decoded
}

/// `column#value#` for every key column that has a value
pub fn encode_key(key_columns: &[String], values: &HashMap<String, String>) -> String {
    let mut key = String::new();
    for column in key_columns {
        if let Some(value) = values.get(column) {
            key.push_str(&encode(column));
            key.push('#');
            key.push_str(&encode(value));
            key.push('#');
        }
    }
    key
}

/// Column/value pairs of a key built by [`encode_key`]
pub fn decode_key(key: &str) -> Vec<(String, String)> {
    let parts: Vec<&str> = key.split('#').collect();
    parts
        .chunks_exact(2)
        .map(|pair| (decode(pair[0]), decode(pair[1])))
        .collect()
}

/// Factory for `TYPE officedb`, sharing one connector between all sources
pub struct OfficeDbFactory {
    connector: Arc<dyn OfficeDbConnector>,
}

impl OfficeDbFactory {
    pub fn new(connector: Arc<dyn OfficeDbConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl DatasourceFactory for OfficeDbFactory {
    fn source_type(&self) -> &'static str {
        "officedb"
    }

    async fn create_source(
        &self,
        config: &ConfigNode,
        _sources: &SourceMap,
    ) -> Result<Arc<dyn Datasource>> {
        let settings = OfficeDbSettings::from_config(config)?;
        let source = OfficeDbSource::connect(settings, self.connector.clone()).await?;
        Ok(Arc::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordjoin_query::Dataset;
    use std::sync::Mutex;

    struct MockConnector {
        rows: SqlRows,
        description: TableDescription,
        statements: Mutex<Vec<String>>,
        fail: bool,
    }

    impl MockConnector {
        fn new() -> Self {
            Self {
                rows: SqlRows {
                    columns: vec!["id".into(), "Vorname".into(), "Nachname".into()],
                    rows: vec![
                        vec![Some("1#a".into()), Some("Sheldon".into()), Some("Cooper".into())],
                        vec![Some("50%".into()), Some("Amy".into()), None],
                    ],
                },
                description: TableDescription {
                    columns: vec!["id".into(), "Vorname".into(), "Nachname".into()],
                    primary_key: vec!["id".into()],
                },
                statements: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        fn last_statement(&self) -> Option<String> {
            self.statements.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl OfficeDbConnector for MockConnector {
        async fn execute(&self, _target: &ConnectionTarget, sql: &str) -> Result<SqlRows> {
            self.statements.lock().unwrap().push(sql.to_string());
            if self.fail {
                return Err(DataError::backend_unavailable("connection refused"));
            }
            Ok(self.rows.clone())
        }

        async fn describe_table(
            &self,
            _target: &ConnectionTarget,
            _table: &str,
        ) -> Result<TableDescription> {
            if self.fail {
                return Err(DataError::backend_unavailable("connection refused"));
            }
            Ok(self.description.clone())
        }
    }

    fn definition() -> ConfigNode {
        ConfigNode::new("Datenquelle")
            .with_attribute("NAME", "personen")
            .with_attribute("TYPE", "officedb")
            .with_attribute("SOURCE", "Adressen")
            .with_attribute("TABLE", "Personen")
    }

    async fn source(connector: Arc<MockConnector>, config: ConfigNode) -> OfficeDbSource {
        let settings = OfficeDbSettings::from_config(&config).unwrap();
        OfficeDbSource::connect(settings, connector).await.unwrap()
    }

    #[test]
    fn test_key_encoding() {
        let columns = vec!["id".to_string(), "Ort".to_string()];
        let mut values = HashMap::new();
        values.insert("id".to_string(), "1#a%".to_string());
        let key = encode_key(&columns, &values);
        assert_eq!(key, "id#1%ra%%#");
        assert_eq!(decode_key(&key), vec![("id".to_string(), "1#a%".to_string())]);
        assert!(decode_key("").is_empty());
    }

    #[tokio::test]
    async fn test_schema_from_database() {
        let connector = Arc::new(MockConnector::new());
        let source = source(connector, definition()).await;
        assert_eq!(source.schema().columns(), &["id", "Vorname", "Nachname"]);
        assert_eq!(source.syntax(), SqlSyntax::MySql);

        let rows = source.get_contents().await.unwrap().to_vec();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key(), "id#1%ra#");
        assert_eq!(rows[1].get("Nachname").unwrap(), None);
        assert!(rows[1].get("Telefon").unwrap_err().is_column_not_found());
    }

    #[tokio::test]
    async fn test_find_and_lookup_statements() {
        let connector = Arc::new(MockConnector::new());
        let config = definition()
            .with_attribute("SQL_SYNTAX", "ansi")
            .with_child(ConfigNode::list("Schema", ["id", "Vorname"]))
            .with_child(ConfigNode::list("Schluessel", ["id"]));
        let source = source(connector.clone(), config).await;

        assert!(source.find(&[]).await.unwrap().is_empty());
        assert!(connector.last_statement().is_none());

        let found = source.find(&[QueryPart::new("Vorname", "Shel*")]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(
            connector.last_statement().unwrap(),
            "SELECT * FROM \"Personen\" WHERE (lower(\"Vorname\") LIKE lower('Shel%') ESCAPE '|');"
        );

        let key = found.to_vec()[0].key().to_string();
        source.get_datasets_by_key(&[key]).await.unwrap();
        assert_eq!(
            connector.last_statement().unwrap(),
            "SELECT * FROM \"Personen\" WHERE (\"id\"='1#a');"
        );
    }

    #[tokio::test]
    async fn test_backend_failure_yields_empty_results() {
        let connector = Arc::new(MockConnector::failing());
        let config = definition()
            .with_child(ConfigNode::list("Schema", ["id"]))
            .with_child(ConfigNode::list("Schluessel", ["id"]));
        let source = source(connector, config).await;

        assert!(source.get_contents().await.unwrap().is_empty());
        assert!(source.find(&[QueryPart::new("id", "1")]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_configuration_errors() {
        let no_key = definition().with_child(ConfigNode::list("Schema", ["id"]));
        assert!(OfficeDbSettings::from_config(&no_key).is_err());

        let bad_syntax = definition().with_attribute("SQL_SYNTAX", "db2");
        assert!(OfficeDbSettings::from_config(&bad_syntax).is_err());

        let unknown_key = definition()
            .with_child(ConfigNode::list("Schema", ["id"]))
            .with_child(ConfigNode::list("Schluessel", ["nr"]));
        let settings = OfficeDbSettings::from_config(&unknown_key).unwrap();
        assert!(OfficeDbSource::connect(settings, Arc::new(MockConnector::new()))
            .await
            .is_err());

        let settings = OfficeDbSettings::from_config(&definition()).unwrap();
        assert!(OfficeDbSource::connect(settings, Arc::new(MockConnector::failing()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_factory() {
        let factory = OfficeDbFactory::new(Arc::new(MockConnector::new()));
        let created = factory
            .create_source(&definition(), &SourceMap::new())
            .await
            .ok()
            .unwrap();
        assert_eq!(created.source_type(), "officedb");
        assert_eq!(created.name(), "personen");
    }
}
