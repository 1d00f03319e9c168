use crate::error::{DataError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

static COLUMN_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z_0-9]*$").expect("column name pattern is valid")
});

/// Check whether `name` is usable as a column identifier
pub fn is_valid_column_name(name: &str) -> bool {
    COLUMN_NAME.is_match(name)
}

/// Ordered set of unique column names. Deserializing rejects repeated
/// columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    /// Build a schema, silently dropping repeated column names
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Schema::default();
        for column in columns {
            schema.push(column);
        }
        schema
    }

    /// Build a schema, failing on repeated column names
    pub fn try_new<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Schema::default();
        for column in columns {
            let column = column.into();
            if !schema.push(column.clone()) {
                return Err(DataError::invalid_configuration(format!(
                    "Column \"{}\" was defined twice in schema",
                    column
                )));
            }
        }
        Ok(schema)
    }

    /// Append a column; returns false if it was already present
    pub fn push(&mut self, column: impl Into<String>) -> bool {
        let column = column.into();
        if self.contains(&column) {
            return false;
        }
        self.columns.push(column);
        true
    }

    pub fn remove(&mut self, column: &str) -> bool {
        let before = self.columns.len();
        self.columns.retain(|c| c != column);
        before != self.columns.len()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Same columns regardless of order
    pub fn same_columns(&self, other: &Schema) -> bool {
        let mine: HashSet<&String> = self.columns.iter().collect();
        let theirs: HashSet<&String> = other.columns.iter().collect();
        mine == theirs
    }

    /// Columns of `self` that `other` does not have, in schema order
    pub fn missing_from(&self, other: &Schema) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !other.contains(c))
            .cloned()
            .collect()
    }
}

impl TryFrom<Vec<String>> for Schema {
    type Error = DataError;

    fn try_from(columns: Vec<String>) -> Result<Self> {
        Schema::try_new(columns)
    }
}

impl From<Schema> for Vec<String> {
    fn from(schema: Schema) -> Self {
        schema.columns
    }
}

impl<S: Into<String>> FromIterator<S> for Schema {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Schema::new(iter)
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.columns.join(", "))
    }
}

/// A single keyed record exposing column lookups against a fixed schema.
///
/// `get` returns `Ok(None)` for a column that belongs to the schema but
/// carries no value, and [`DataError::ColumnNotFound`] for any other column.
pub trait Dataset: Send + Sync + fmt::Debug {
    /// Source defined key, unique within the owning datasource
    fn key(&self) -> &str;

    fn get(&self, column: &str) -> Result<Option<String>>;
}

pub type DatasetRef = Arc<dyn Dataset>;

/// Materialized dataset backed by a value map
#[derive(Debug, Clone)]
pub struct Record {
    key: String,
    schema: Arc<Schema>,
    values: HashMap<String, String>,
}

impl Record {
    pub fn new(key: impl Into<String>, schema: Arc<Schema>) -> Self {
        Self {
            key: key.into(),
            schema,
            values: HashMap::new(),
        }
    }

    /// Values for columns outside the schema are ignored
    pub fn from_values(
        key: impl Into<String>,
        schema: Arc<Schema>,
        values: HashMap<String, String>,
    ) -> Self {
        let mut record = Self::new(key, schema);
        for (column, value) in values {
            record.set(column, value);
        }
        record
    }

    pub fn with_value(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        if self.schema.contains(&column) {
            self.values.insert(column, value.into());
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_ref(self) -> DatasetRef {
        Arc::new(self)
    }
}

impl Dataset for Record {
    fn key(&self) -> &str {
        &self.key
    }

    fn get(&self, column: &str) -> Result<Option<String>> {
        if !self.schema.contains(column) {
            return Err(DataError::column_not_found(column));
        }
        Ok(self.values.get(column).cloned())
    }
}

/// Search constraint on a single column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryPart {
    pub column: String,
    pub search: String,
}

impl QueryPart {
    pub fn new(column: impl Into<String>, search: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            search: search.into(),
        }
    }
}

impl fmt::Display for QueryPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.column, self.search)
    }
}

/// Ordered query parts addressed to a named datasource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub source: String,
    pub parts: Vec<QueryPart>,
}

impl Query {
    pub fn new(source: impl Into<String>, parts: Vec<QueryPart>) -> Self {
        Self {
            source: source.into(),
            parts,
        }
    }

    pub fn with_part(mut self, column: impl Into<String>, search: impl Into<String>) -> Self {
        self.parts.push(QueryPart::new(column, search));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_keeps_order_and_uniqueness() {
        let mut schema = Schema::new(["Vorname", "Nachname", "Vorname"]);
        assert_eq!(schema.columns(), &["Vorname", "Nachname"]);
        assert!(!schema.push("Nachname"));
        assert!(schema.push("Rolle"));
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.to_string(), "(Vorname, Nachname, Rolle)");
    }

    #[test]
    fn test_schema_try_new_rejects_duplicates() {
        assert!(Schema::try_new(["a", "b"]).is_ok());
        let err = Schema::try_new(["a", "a"]).unwrap_err();
        assert!(matches!(err, DataError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_schema_serde() {
        let schema: Schema = serde_json::from_str(r#"["Vorname", "Nachname"]"#).unwrap();
        assert_eq!(schema.columns(), &["Vorname", "Nachname"]);
        assert_eq!(serde_json::to_string(&schema).unwrap(), r#"["Vorname","Nachname"]"#);

        let err = serde_json::from_str::<Schema>(r#"["Vorname", "Vorname"]"#).unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn test_schema_comparison() {
        let a = Schema::new(["x", "y", "z"]);
        let b = Schema::new(["z", "x", "y"]);
        let c = Schema::new(["x", "y"]);
        assert!(a.same_columns(&b));
        assert!(!a.same_columns(&c));
        assert_eq!(a.missing_from(&c), vec!["z".to_string()]);
        assert!(c.missing_from(&a).is_empty());
    }

    #[test]
    fn test_column_names() {
        assert!(is_valid_column_name("Vorname"));
        assert!(is_valid_column_name("_intern2"));
        assert!(!is_valid_column_name("2fast"));
        assert!(!is_valid_column_name("mit-strich"));
        assert!(!is_valid_column_name(""));
    }

    #[test]
    fn test_record_lookup() {
        let schema = Arc::new(Schema::new(["Vorname", "Nachname"]));
        let record = Record::new("k1", schema)
            .with_value("Vorname", "Sheldon")
            .with_value("Unbekannt", "ignored");

        assert_eq!(record.key(), "k1");
        assert_eq!(record.get("Vorname").unwrap(), Some("Sheldon".to_string()));
        assert_eq!(record.get("Nachname").unwrap(), None);
        assert!(record.get("Unbekannt").unwrap_err().is_column_not_found());
    }

    #[test]
    fn test_query_builder() {
        let query = Query::new("personal", Vec::new())
            .with_part("Nachname", "Coop*")
            .with_part("Vorname", "Sheldon");
        assert_eq!(query.parts.len(), 2);
        assert_eq!(query.parts[0].to_string(), "Nachname=\"Coop*\"");
    }
}
