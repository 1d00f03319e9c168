use crate::client::{
    first_value, Credentials, DirectoryClient, DirectoryConnector, DirectoryEntry, SearchScope,
};
use crate::filter::Filter;
use crate::key::{absolute_filter, is_valid_key, relative_query, KeyColumn, KeyKind, KeyLayout};
use crate::name::Dn;
use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::Lazy;
use recordjoin_query::{
    is_valid_column_name, ConfigNode, DataError, Dataset, DatasetRef, Datasource, DatasourceFactory,
    QueryPart, QueryResultsList, Record, Result, ResultSet, Schema, SourceMap,
};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error};

static BASE_DN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z]+=[a-zA-ZäÄöÖüÜß \\()-]+(,[a-zA-Z]+=[a-zA-ZäÄöÖüÜß \\()-]+)*$")
        .expect("base dn pattern is valid")
});

static ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]+$").expect("attribute pattern is valid"));

/// Where the value of a column is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub column: String,
    /// 0 for the matched entry, -n for its ancestor n levels up
    pub depth: i32,
    pub attribute: String,
    /// Additional object class the entry holding the attribute must have
    pub object_class: Option<String>,
    /// Separator inside attribute values that is turned into newlines
    pub line_separator: Option<String>,
}

impl ColumnDefinition {
    pub fn new(column: impl Into<String>, depth: i32, attribute: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            depth,
            attribute: attribute.into(),
            object_class: None,
            line_separator: None,
        }
    }

    pub fn with_object_class(mut self, class: impl Into<String>) -> Self {
        self.object_class = Some(class.into());
        self
    }

    pub fn with_line_separator(mut self, separator: impl Into<String>) -> Self {
        self.line_separator = Some(separator.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct LdapSettings {
    pub name: String,
    pub url: String,
    pub base_dn: String,
    pub object_class: String,
    pub credentials: Option<Credentials>,
    pub columns: Vec<ColumnDefinition>,
    pub key_columns: Vec<String>,
}

impl LdapSettings {
    /// Read `URL`, `BASE_DN`, `OBJECT_CLASS`, `USER`, `PASSWORD`, the
    /// `Spalten` section and the last `Schluessel`
    pub fn from_config(config: &ConfigNode) -> Result<Self> {
        let name = config.source_name()?;
        let url = config.require(&name, "URL")?;
        let base_dn = config.require(&name, "BASE_DN")?;
        let object_class = config.require(&name, "OBJECT_CLASS")?;

        let credentials = match (config.get_str("USER"), config.get_str("PASSWORD")) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some(Credentials {
                    user: user.to_string(),
                    password: password.to_string(),
                })
            }
            _ => {
                debug!("No bind credentials for datasource {}", name);
                None
            }
        };

        let mut columns = Vec::new();
        for section in config.get_all("Spalten") {
            for definition in &section.children {
                columns.push(Self::parse_column(&name, definition)?);
            }
        }
        if columns.is_empty() {
            return Err(DataError::invalid_configuration(format!(
                "Section 'Spalten' of datasource \"{}\" is missing",
                name
            )));
        }

        let key_columns = config
            .get("Schluessel")
            .map(ConfigNode::values)
            .ok_or_else(|| {
                DataError::invalid_configuration(format!(
                    "Section 'Schluessel' of datasource \"{}\" is missing",
                    name
                ))
            })?;

        Ok(Self {
            name,
            url,
            base_dn,
            object_class,
            credentials,
            columns,
            key_columns,
        })
    }

    fn parse_column(owner: &str, definition: &ConfigNode) -> Result<ColumnDefinition> {
        let column = definition.require(owner, "DB_SPALTE")?;
        let path = definition.require(owner, "PATH")?;

        let (depth, attribute) = path.split_once(':').ok_or_else(|| {
            DataError::invalid_configuration(format!(
                "Syntax error in PATH \"{}\" of column \"{}\" in datasource \"{}\"",
                path, column, owner
            ))
        })?;
        let depth: i32 = depth.trim().parse().map_err(|_| {
            DataError::invalid_configuration(format!(
                "Syntax error in the depth of PATH \"{}\" of column \"{}\" in datasource \"{}\"",
                path, column, owner
            ))
        })?;

        Ok(ColumnDefinition {
            column,
            depth,
            attribute: attribute.to_string(),
            object_class: definition.get_str("OBJECT_CLASS").map(str::to_string),
            line_separator: definition.get_str("LINE_SEPARATOR").map(str::to_string),
        })
    }
}

/// Datasource on a directory server. Values are read from the matched
/// entries or, for negative depths, from their ancestors.
pub struct LdapSource {
    name: String,
    base: Dn,
    object_class: String,
    schema: Arc<Schema>,
    columns: Vec<ColumnDefinition>,
    keys: KeyLayout,
    client: Arc<dyn DirectoryClient>,
}

/// Anchor below which matching entries are `levels` steps deeper
#[derive(Debug, Clone)]
struct Anchor {
    levels: usize,
    path: Dn,
}

impl Anchor {
    fn target_depth(&self) -> usize {
        self.path.len() + self.levels
    }
}

impl LdapSource {
    pub fn new(settings: LdapSettings, client: Arc<dyn DirectoryClient>) -> Result<Self> {
        let LdapSettings {
            name,
            base_dn,
            object_class,
            columns,
            key_columns,
            ..
        } = settings;
        let config_error =
            |msg: String| DataError::invalid_configuration(format!("Datasource \"{}\": {}", name, msg));

        if !BASE_DN.is_match(&base_dn) {
            return Err(config_error(format!("BASE_DN \"{}\" is invalid", base_dn)));
        }
        if !ATTRIBUTE.is_match(&object_class) {
            return Err(config_error(format!(
                "OBJECT_CLASS \"{}\" contains forbidden characters",
                object_class
            )));
        }

        for definition in &columns {
            if !is_valid_column_name(&definition.column) {
                return Err(config_error(format!(
                    "column \"{}\" is not a valid identifier",
                    definition.column
                )));
            }
            if !ATTRIBUTE.is_match(&definition.attribute) {
                return Err(config_error(format!(
                    "illegal attribute identifier \"{}\"",
                    definition.attribute
                )));
            }
            if definition.depth > 0 {
                return Err(config_error(format!(
                    "column \"{}\" has depth {}, only the entry itself (0) and its ancestors (< 0) are supported",
                    definition.column, definition.depth
                )));
            }
        }
        let schema = Schema::try_new(columns.iter().map(|c| c.column.clone()))?;

        if key_columns.is_empty() {
            return Err(config_error("no key column specified".to_string()));
        }
        let mut seen = HashSet::new();
        let mut layout = Vec::with_capacity(key_columns.len());
        for key in &key_columns {
            let definition = columns.iter().find(|c| &c.column == key).ok_or_else(|| {
                config_error(format!(
                    "key column \"{}\" is not defined in the schema",
                    key
                ))
            })?;
            if seen.insert(key.as_str()) {
                layout.push(KeyColumn {
                    column: definition.column.clone(),
                    attribute: definition.attribute.clone(),
                    depth: definition.depth,
                });
            }
        }

        Ok(Self {
            base: Dn::parse(&base_dn),
            object_class,
            schema: Arc::new(schema),
            columns,
            keys: KeyLayout::new(layout),
            client,
            name,
        })
    }

    /// Search with the datasource's object class (or any object class)
    /// added to `filter`. Failures are logged and yield no entries.
    async fn search(
        &self,
        base: &Dn,
        scope: SearchScope,
        filter: Option<&Filter>,
        only_object_class: bool,
    ) -> Vec<DirectoryEntry> {
        let class = if only_object_class {
            Filter::object_class(&self.object_class)
        } else {
            Filter::object_class("*")
        };
        let filter = match filter {
            Some(filter) => Filter::And(vec![class, filter.clone()]),
            None => class,
        }
        .to_string();

        debug!("Searching {} below {} ({:?})", filter, base, scope);
        match self.client.search(&base.to_string(), scope, &filter).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Search in directory of datasource {} failed: {}", self.name, e);
                Vec::new()
            }
        }
    }

    /// Names of all entries below the base matching `filter`
    async fn paths(&self, filter: &Filter) -> Vec<Dn> {
        let filter = filter.to_string();
        match self
            .client
            .search(&self.base.to_string(), SearchScope::Subtree, &filter)
            .await
        {
            Ok(entries) => entries.iter().map(|e| Dn::parse(&e.dn)).collect(),
            Err(e) => {
                error!("Search for {} in datasource {} failed: {}", filter, self.name, e);
                Vec::new()
            }
        }
    }

    /// Anchors satisfying every ancestor condition. Two anchors are kept
    /// together when they describe the same result depth and one lies below
    /// the other; the deeper one is the tighter bound.
    async fn anchors(&self, levels: BTreeMap<i32, Vec<Filter>>) -> Vec<Anchor> {
        let mut merged: Option<Vec<Anchor>> = None;
        for (depth, filters) in levels {
            let found: Vec<Anchor> = self
                .paths(&Filter::and(filters))
                .await
                .into_iter()
                .map(|path| Anchor {
                    levels: depth.unsigned_abs() as usize,
                    path,
                })
                .collect();

            merged = Some(match merged {
                None => found,
                Some(previous) => {
                    let mut intersection = Vec::new();
                    for current in &previous {
                        for other in &found {
                            if current.target_depth() != other.target_depth() {
                                continue;
                            }
                            let (shorter, longer) = if current.path.len() < other.path.len() {
                                (current, other)
                            } else {
                                (other, current)
                            };
                            if longer.path.starts_with(&shorter.path) {
                                intersection.push(longer.clone());
                            }
                        }
                    }
                    intersection
                }
            });
        }
        merged.unwrap_or_default()
    }

    /// Entries matching `filter` exactly `anchor.levels` below the anchor
    async fn search_below(&self, anchor: &Anchor, filter: Option<&Filter>) -> Vec<DirectoryEntry> {
        let mut seeds = vec![anchor.path.clone()];
        for _ in 1..anchor.levels {
            let children = join_all(
                seeds
                    .iter()
                    .map(|seed| self.search(seed, SearchScope::OneLevel, None, false)),
            )
            .await;
            seeds = children
                .into_iter()
                .flatten()
                .map(|entry| Dn::parse(&entry.dn))
                .collect();
        }

        join_all(
            seeds
                .iter()
                .map(|seed| self.search(seed, SearchScope::OneLevel, filter, true)),
        )
        .await
        .into_iter()
        .flatten()
        .collect()
    }

    async fn datasets(&self, entries: Vec<DirectoryEntry>) -> Vec<DatasetRef> {
        // attribute values of ancestors, shared by all entries of one search
        let mut ancestors: HashMap<(String, String), Option<String>> = HashMap::new();
        let mut datasets = Vec::with_capacity(entries.len());
        for entry in &entries {
            datasets.push(self.dataset(entry, &mut ancestors).await);
        }
        datasets
    }

    async fn dataset(
        &self,
        entry: &DirectoryEntry,
        ancestors: &mut HashMap<(String, String), Option<String>>,
    ) -> DatasetRef {
        let path = Dn::parse(&entry.dn);
        let mut values = HashMap::new();

        for definition in &self.columns {
            let value = if definition.depth == 0 {
                entry.first_value(&definition.attribute).map(str::to_string)
            } else {
                match path.ancestor(definition.depth.unsigned_abs() as usize, self.base.len()) {
                    Some(ancestor) => {
                        self.ancestor_value(ancestor.to_string(), &definition.attribute, ancestors)
                            .await
                    }
                    None => None,
                }
            };

            if let Some(mut value) = value {
                if let Some(separator) = &definition.line_separator {
                    value = value.replace(separator.as_str(), "\n");
                }
                values.insert(definition.column.clone(), value);
            }
        }

        let key = self.keys.generate(&values);
        Record::from_values(key, self.schema.clone(), values).into_ref()
    }

    async fn ancestor_value(
        &self,
        dn: String,
        attribute: &str,
        ancestors: &mut HashMap<(String, String), Option<String>>,
    ) -> Option<String> {
        let cache_key = (dn, attribute.to_string());
        if let Some(value) = ancestors.get(&cache_key) {
            return value.clone();
        }
        let value = match self
            .client
            .read_attributes(&cache_key.0, &[attribute.to_string()])
            .await
        {
            Ok(attributes) => first_value(&attributes, attribute).map(str::to_string),
            Err(e) => {
                debug!("Attribute {} of {} not readable: {}", attribute, cache_key.0, e);
                None
            }
        };
        ancestors.insert(cache_key, value.clone());
        value
    }

    async fn find_entries(&self, query: &[QueryPart]) -> Option<Vec<DirectoryEntry>> {
        let mut own = Vec::new();
        let mut levels: BTreeMap<i32, Vec<Filter>> = BTreeMap::new();
        for part in query {
            let definition = self.columns.iter().find(|c| c.column == part.column)?;
            if part.search.is_empty() {
                continue;
            }
            let mut filter = Filter::equals(&definition.attribute, &part.search);
            if let Some(class) = &definition.object_class {
                filter = Filter::And(vec![filter, Filter::object_class(class)]);
            }
            if definition.depth == 0 {
                own.push(filter);
            } else {
                levels.entry(definition.depth).or_default().push(filter);
            }
        }

        if own.is_empty() && levels.is_empty() {
            return None;
        }
        let filter = (!own.is_empty()).then(|| Filter::and(own));

        if levels.is_empty() {
            return Some(
                self.search(&self.base, SearchScope::Subtree, filter.as_ref(), true)
                    .await,
            );
        }

        let anchors = self.anchors(levels).await;
        debug!("Searching below {} anchors", anchors.len());
        let found = join_all(
            anchors
                .iter()
                .map(|anchor| self.search_below(anchor, filter.as_ref())),
        )
        .await;
        Some(found.into_iter().flatten().collect())
    }
}

#[async_trait]
impl Datasource for LdapSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &'static str {
        "ldap"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn get_datasets_by_key(&self, keys: &[String]) -> Result<ResultSet> {
        if keys.is_empty() {
            return Ok(QueryResultsList::empty().boxed());
        }

        if self.keys.kind() == KeyKind::RelativeOnly {
            let mut datasets = Vec::new();
            for key in keys {
                let found = self.find(&relative_query(key)).await?;
                datasets.extend(found.iter());
            }
            return Ok(QueryResultsList::new(datasets).boxed());
        }

        let filters: Vec<Filter> = keys
            .iter()
            .filter(|key| is_valid_key(key))
            .filter_map(|key| absolute_filter(key))
            .collect();
        if filters.is_empty() {
            return Ok(QueryResultsList::empty().boxed());
        }

        let entries = self
            .search(&self.base, SearchScope::Subtree, Some(&Filter::Or(filters)), true)
            .await;
        let mut datasets = self.datasets(entries).await;
        if self.keys.kind() == KeyKind::Mixed {
            datasets.retain(|ds| keys.iter().any(|key| key == ds.key()));
        }
        Ok(QueryResultsList::new(datasets).boxed())
    }

    async fn find(&self, query: &[QueryPart]) -> Result<ResultSet> {
        let entries = match self.find_entries(query).await {
            Some(entries) => entries,
            None => return Ok(QueryResultsList::empty().boxed()),
        };
        Ok(QueryResultsList::new(self.datasets(entries).await).boxed())
    }

    /// Directories are not listed as a whole
    async fn get_contents(&self) -> Result<ResultSet> {
        Ok(QueryResultsList::empty().boxed())
    }
}

/// Factory for `TYPE ldap`
pub struct LdapFactory {
    connector: Arc<dyn DirectoryConnector>,
}

impl LdapFactory {
    pub fn new(connector: Arc<dyn DirectoryConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl DatasourceFactory for LdapFactory {
    fn source_type(&self) -> &'static str {
        "ldap"
    }

    async fn create_source(
        &self,
        config: &ConfigNode,
        _sources: &SourceMap,
    ) -> Result<Arc<dyn Datasource>> {
        let settings = LdapSettings::from_config(config)?;
        let client = self
            .connector
            .connect(&settings.url, settings.credentials.as_ref())
            .map_err(|e| {
                error!("Cannot connect to directory {}: {}", settings.url, e);
                DataError::invalid_configuration(format!(
                    "Directory URL \"{}\" of datasource \"{}\" is unusable: {}",
                    settings.url, settings.name, e
                ))
            })?;
        Ok(Arc::new(LdapSource::new(settings, client)?))
    }
}
