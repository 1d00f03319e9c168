use crate::types::{Dataset, DatasetRef, Schema};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Finite, read-only sequence of datasets returned by a datasource
pub trait QueryResults: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn iter(&self) -> Box<dyn Iterator<Item = DatasetRef> + '_>;

    /// Schema advertised by the results, if it differs from the producing source
    fn schema(&self) -> Option<&Schema> {
        None
    }

    fn to_vec(&self) -> Vec<DatasetRef> {
        self.iter().collect()
    }

    fn keys(&self) -> Vec<String> {
        self.iter().map(|ds| ds.key().to_string()).collect()
    }
}

pub type ResultSet = Box<dyn QueryResults>;

impl fmt::Debug for dyn QueryResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Results backed by an already materialized list
#[derive(Debug, Clone, Default)]
pub struct QueryResultsList {
    datasets: Vec<DatasetRef>,
}

impl QueryResultsList {
    pub fn new(datasets: Vec<DatasetRef>) -> Self {
        Self { datasets }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn boxed(self) -> ResultSet {
        Box::new(self)
    }
}

impl From<Vec<DatasetRef>> for QueryResultsList {
    fn from(datasets: Vec<DatasetRef>) -> Self {
        Self::new(datasets)
    }
}

impl QueryResults for QueryResultsList {
    fn len(&self) -> usize {
        self.datasets.len()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = DatasetRef> + '_> {
        Box::new(self.datasets.iter().cloned())
    }
}

pub type DatasetComparator = Arc<dyn Fn(&dyn Dataset, &dyn Dataset) -> Ordering + Send + Sync>;

/// Ordered results where datasets comparing equal are kept only once
#[derive(Clone)]
pub struct QueryResultsSet {
    comparator: DatasetComparator,
    datasets: Vec<DatasetRef>,
}

impl QueryResultsSet {
    pub fn new(comparator: DatasetComparator) -> Self {
        Self {
            comparator,
            datasets: Vec::new(),
        }
    }

    /// Deduplicate by dataset key
    pub fn by_key() -> Self {
        Self::new(Arc::new(|a: &dyn Dataset, b: &dyn Dataset| a.key().cmp(b.key())))
    }

    /// Insert a dataset; returns false if an equal one is already present
    pub fn insert(&mut self, dataset: DatasetRef) -> bool {
        let search = self
            .datasets
            .binary_search_by(|existing| (self.comparator)(existing.as_ref(), dataset.as_ref()));
        match search {
            Ok(_) => false,
            Err(pos) => {
                self.datasets.insert(pos, dataset);
                true
            }
        }
    }

    pub fn extend_from(&mut self, results: &dyn QueryResults) {
        for dataset in results.iter() {
            self.insert(dataset);
        }
    }
}

impl fmt::Debug for QueryResultsSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResultsSet")
            .field("datasets", &self.datasets)
            .finish()
    }
}

impl QueryResults for QueryResultsSet {
    fn len(&self) -> usize {
        self.datasets.len()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = DatasetRef> + '_> {
        Box::new(self.datasets.iter().cloned())
    }
}

/// Concatenation of two result sets without deduplication
pub struct QueryResultsUnion {
    first: ResultSet,
    second: ResultSet,
}

impl QueryResultsUnion {
    pub fn new(first: ResultSet, second: ResultSet) -> Self {
        Self { first, second }
    }
}

impl QueryResults for QueryResultsUnion {
    fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    fn is_empty(&self) -> bool {
        self.first.is_empty() && self.second.is_empty()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = DatasetRef> + '_> {
        Box::new(self.first.iter().chain(self.second.iter()))
    }
}

/// Results annotated with an explicit schema
pub struct QueryResultsWithSchema {
    results: ResultSet,
    schema: Schema,
}

impl QueryResultsWithSchema {
    pub fn new(results: ResultSet, schema: Schema) -> Self {
        Self { results, schema }
    }

    pub fn empty(schema: Schema) -> Self {
        Self::new(QueryResultsList::empty().boxed(), schema)
    }

    pub fn into_inner(self) -> (ResultSet, Schema) {
        (self.results, self.schema)
    }
}

impl QueryResults for QueryResultsWithSchema {
    fn len(&self) -> usize {
        self.results.len()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = DatasetRef> + '_> {
        self.results.iter()
    }

    fn schema(&self) -> Option<&Schema> {
        Some(&self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;

    fn records(keys: &[&str]) -> Vec<DatasetRef> {
        let schema = Arc::new(Schema::new(["Name"]));
        keys.iter()
            .map(|k| Record::new(*k, schema.clone()).with_value("Name", *k).into_ref())
            .collect()
    }

    #[test]
    fn test_list_results() {
        let results = QueryResultsList::new(records(&["a", "b"]));
        assert_eq!(results.len(), 2);
        assert!(!results.is_empty());
        assert_eq!(results.keys(), vec!["a", "b"]);
        assert!(QueryResultsList::empty().is_empty());
    }

    #[test]
    fn test_set_deduplicates_with_comparator() {
        let mut set = QueryResultsSet::by_key();
        for ds in records(&["b", "a", "b", "c", "a"]) {
            set.insert(ds);
        }
        assert_eq!(set.keys(), vec!["a", "b", "c"]);

        let mut set = QueryResultsSet::new(Arc::new(|_: &dyn Dataset, _: &dyn Dataset| {
            Ordering::Equal
        }));
        set.extend_from(&QueryResultsList::new(records(&["x", "y"])));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_union_keeps_duplicates() {
        let union = QueryResultsUnion::new(
            QueryResultsList::new(records(&["a", "b"])).boxed(),
            QueryResultsList::new(records(&["b"])).boxed(),
        );
        assert_eq!(union.len(), 3);
        assert_eq!(union.keys(), vec!["a", "b", "b"]);

        let empty = QueryResultsUnion::new(
            QueryResultsList::empty().boxed(),
            QueryResultsList::empty().boxed(),
        );
        assert!(empty.is_empty());
    }

    #[test]
    fn test_schema_annotation() {
        let schema = Schema::new(["Name", "Extra"]);
        let results =
            QueryResultsWithSchema::new(QueryResultsList::new(records(&["a"])).boxed(), schema);
        assert_eq!(results.len(), 1);
        assert_eq!(results.schema().unwrap().columns(), &["Name", "Extra"]);
        assert!(QueryResultsList::empty().schema().is_none());
    }
}
