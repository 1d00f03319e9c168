use crate::config::ConfigNode;
use crate::error::{DataError, Result};
use crate::functions::{parse_function, FunctionRef, Values};
use crate::results::{QueryResults, ResultSet};
use crate::types::{Dataset, DatasetRef, Schema};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// View of a dataset's real columns for function evaluation. Unknown
/// columns read as empty strings.
pub struct DatasetValues<'a> {
    dataset: &'a dyn Dataset,
}

impl<'a> DatasetValues<'a> {
    pub fn new(dataset: &'a dyn Dataset) -> Self {
        Self { dataset }
    }
}

impl Values for DatasetValues<'_> {
    fn has_value(&self, name: &str) -> bool {
        self.dataset.get(name).is_ok()
    }

    fn get_string(&self, name: &str) -> String {
        self.dataset.get(name).ok().flatten().unwrap_or_default()
    }
}

/// Computes pseudo-columns from the real columns of a dataset
#[derive(Clone, Default)]
pub struct ColumnTransformer {
    schema: Schema,
    functions: Arc<HashMap<String, FunctionRef>>,
}

impl ColumnTransformer {
    pub fn new<I>(functions: I) -> Self
    where
        I: IntoIterator<Item = (String, FunctionRef)>,
    {
        let mut schema = Schema::default();
        let mut map = HashMap::new();
        for (column, function) in functions {
            schema.push(column.clone());
            map.insert(column, function);
        }
        Self {
            schema,
            functions: Arc::new(map),
        }
    }

    /// Build from a node whose children are `pseudoColumn (function)` pairs
    pub fn from_config(node: &ConfigNode) -> Result<Self> {
        let mut functions = Vec::with_capacity(node.children.len());
        for child in &node.children {
            let definition = match child.children.as_slice() {
                [single] => single,
                _ => {
                    return Err(DataError::invalid_configuration(format!(
                        "Pseudo-column \"{}\" needs exactly one function",
                        child.name
                    )))
                }
            };
            functions.push((child.name.clone(), parse_function(definition)?));
        }
        Ok(Self::new(functions))
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn has_pseudo_column(&self, column: &str) -> bool {
        self.functions.contains_key(column)
    }

    /// Names of all pseudo-columns
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Value of `column` for `dataset`, computed if it is a pseudo-column
    pub fn get(&self, column: &str, dataset: &dyn Dataset) -> Result<Option<String>> {
        match self.functions.get(column) {
            Some(function) => Ok(Some(function.get_string(&DatasetValues::new(dataset)))),
            None => dataset.get(column),
        }
    }

    /// Dataset with the same key exposing the pseudo-columns as well
    pub fn transform(&self, dataset: DatasetRef) -> DatasetRef {
        Arc::new(TransformedDataset {
            inner: dataset,
            transformer: self.clone(),
        })
    }

    /// Results whose datasets are transformed as they are read
    pub fn transform_results(&self, results: ResultSet) -> ResultSet {
        Box::new(TransformedResults {
            inner: results,
            transformer: self.clone(),
        })
    }
}

impl fmt::Debug for ColumnTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnTransformer")
            .field("pseudo_columns", &self.schema)
            .finish()
    }
}

#[derive(Debug)]
struct TransformedDataset {
    inner: DatasetRef,
    transformer: ColumnTransformer,
}

impl Dataset for TransformedDataset {
    fn key(&self) -> &str {
        self.inner.key()
    }

    fn get(&self, column: &str) -> Result<Option<String>> {
        self.transformer.get(column, self.inner.as_ref())
    }
}

struct TransformedResults {
    inner: ResultSet,
    transformer: ColumnTransformer,
}

impl QueryResults for TransformedResults {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = DatasetRef> + '_> {
        Box::new(self.inner.iter().map(|ds| self.transformer.transform(ds)))
    }

    fn schema(&self) -> Option<&Schema> {
        self.inner.schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{Concat, Literal, ValueOf};
    use crate::results::QueryResultsList;
    use crate::types::Record;

    fn transformer() -> ColumnTransformer {
        let full_name: FunctionRef = Arc::new(Concat::new(vec![
            Arc::new(ValueOf::new("Vorname")),
            Arc::new(Literal::new(" ")),
            Arc::new(ValueOf::new("Nachname")),
            Arc::new(ValueOf::new("Gibtsnicht")),
        ]));
        ColumnTransformer::new([("VollerName".to_string(), full_name)])
    }

    fn sheldon() -> DatasetRef {
        let schema = Arc::new(Schema::new(["Vorname", "Nachname"]));
        Record::new("k1", schema)
            .with_value("Vorname", "Sheldon")
            .with_value("Nachname", "Cooper")
            .into_ref()
    }

    #[test]
    fn test_get_computes_or_delegates() {
        let transformer = transformer();
        let ds = sheldon();
        assert!(transformer.has_pseudo_column("VollerName"));
        assert_eq!(
            transformer.get("VollerName", ds.as_ref()).unwrap().as_deref(),
            Some("Sheldon Cooper")
        );
        assert_eq!(
            transformer.get("Vorname", ds.as_ref()).unwrap().as_deref(),
            Some("Sheldon")
        );
        assert!(transformer.get("Gibtsnicht", ds.as_ref()).is_err());
    }

    #[test]
    fn test_transform_dataset_and_results() {
        let transformer = transformer();
        let transformed = transformer.transform(sheldon());
        assert_eq!(transformed.key(), "k1");
        assert_eq!(
            transformed.get("VollerName").unwrap().as_deref(),
            Some("Sheldon Cooper")
        );
        assert_eq!(transformed.get("Nachname").unwrap().as_deref(), Some("Cooper"));

        let results =
            transformer.transform_results(QueryResultsList::new(vec![sheldon(), sheldon()]).boxed());
        assert_eq!(results.len(), 2);
        for ds in results.iter() {
            assert_eq!(ds.get("VollerName").unwrap().as_deref(), Some("Sheldon Cooper"));
        }
    }

    #[test]
    fn test_from_config() {
        let node = ConfigNode::new("Spaltenumsetzung").with_child(
            ConfigNode::new("Anrede").with_child(
                ConfigNode::new("CAT")
                    .with_child(ConfigNode::new("Dr. "))
                    .with_child(ConfigNode::attribute("VALUE", "Nachname")),
            ),
        );
        let transformer = ColumnTransformer::from_config(&node).unwrap();
        assert_eq!(transformer.schema().columns(), &["Anrede"]);
        assert_eq!(
            transformer.get("Anrede", sheldon().as_ref()).unwrap().as_deref(),
            Some("Dr. Cooper")
        );
    }
}
