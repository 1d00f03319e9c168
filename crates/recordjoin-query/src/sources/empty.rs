use crate::config::ConfigNode;
use crate::error::Result;
use crate::registry::{DatasourceFactory, SourceMap};
use crate::results::{QueryResultsList, ResultSet};
use crate::traits::Datasource;
use crate::types::{QueryPart, Schema};
use async_trait::async_trait;
use std::sync::Arc;

/// Datasource with a fixed schema that never returns anything.
///
/// Stands in for a backing source that cannot be resolved, so callers never
/// have to special-case a missing datasource.
#[derive(Debug, Clone)]
pub struct EmptySource {
    name: String,
    schema: Schema,
}

impl EmptySource {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

#[async_trait]
impl Datasource for EmptySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &'static str {
        "empty"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn get_datasets_by_key(&self, _keys: &[String]) -> Result<ResultSet> {
        Ok(QueryResultsList::empty().boxed())
    }

    async fn find(&self, _query: &[QueryPart]) -> Result<ResultSet> {
        Ok(QueryResultsList::empty().boxed())
    }

    async fn get_contents(&self) -> Result<ResultSet> {
        Ok(QueryResultsList::empty().boxed())
    }
}

pub struct EmptyFactory;

#[async_trait]
impl DatasourceFactory for EmptyFactory {
    fn source_type(&self) -> &'static str {
        "empty"
    }

    async fn create_source(
        &self,
        config: &ConfigNode,
        _sources: &SourceMap,
    ) -> Result<Arc<dyn Datasource>> {
        let name = config.source_name()?;
        let schema = Schema::try_new(config.get("Schema").map(ConfigNode::values).unwrap_or_default())?;
        Ok(Arc::new(EmptySource::new(name, schema)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_always_empty() {
        let source = EmptySource::new("leer", Schema::new(["a", "b"]));
        assert_eq!(source.schema().len(), 2);
        assert!(source.find(&[QueryPart::new("a", "*")]).await.unwrap().is_empty());
        assert!(source.get_datasets_by_key(&["k".into()]).await.unwrap().is_empty());
        assert!(source.get_contents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_factory() {
        let node = ConfigNode::new("Datenquelle")
            .with_attribute("NAME", "leer")
            .with_child(ConfigNode::list("Schema", ["x", "y"]));
        let source = EmptyFactory.create_source(&node, &SourceMap::new()).await.unwrap();
        assert_eq!(source.name(), "leer");
        assert_eq!(source.schema().columns(), &["x", "y"]);
    }
}
