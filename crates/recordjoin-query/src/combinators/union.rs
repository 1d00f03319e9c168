use crate::config::ConfigNode;
use crate::error::{DataError, Result};
use crate::registry::{resolve_source, DatasourceFactory, SourceMap};
use crate::results::{QueryResultsUnion, ResultSet};
use crate::traits::Datasource;
use crate::types::{QueryPart, Schema};
use async_trait::async_trait;
use std::sync::Arc;

/// Two sources with the same columns treated as one
pub struct UnionSource {
    name: String,
    first: Arc<dyn Datasource>,
    second: Arc<dyn Datasource>,
    schema: Schema,
}

impl UnionSource {
    pub fn new(
        name: impl Into<String>,
        first: Arc<dyn Datasource>,
        second: Arc<dyn Datasource>,
    ) -> Result<Self> {
        let name = name.into();
        if !first.schema().same_columns(second.schema()) {
            let missing_in_second = first.schema().missing_from(second.schema());
            let missing_in_first = second.schema().missing_from(first.schema());
            return Err(DataError::invalid_configuration(format!(
                "Schemas of datasource \"{}\" differ: \"{}\" lacks columns [{}], \"{}\" lacks columns [{}]",
                name,
                first.name(),
                missing_in_first.join(", "),
                second.name(),
                missing_in_second.join(", ")
            )));
        }

        let schema = first.schema().clone();
        Ok(Self {
            name,
            first,
            second,
            schema,
        })
    }
}

#[async_trait]
impl Datasource for UnionSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &'static str {
        "union"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn get_datasets_by_key(&self, keys: &[String]) -> Result<ResultSet> {
        let (first, second) = futures::try_join!(
            self.first.get_datasets_by_key(keys),
            self.second.get_datasets_by_key(keys)
        )?;
        Ok(Box::new(QueryResultsUnion::new(first, second)))
    }

    async fn find(&self, query: &[QueryPart]) -> Result<ResultSet> {
        let (first, second) =
            futures::try_join!(self.first.find(query), self.second.find(query))?;
        Ok(Box::new(QueryResultsUnion::new(first, second)))
    }

    async fn get_contents(&self) -> Result<ResultSet> {
        let (first, second) =
            futures::try_join!(self.first.get_contents(), self.second.get_contents())?;
        Ok(Box::new(QueryResultsUnion::new(first, second)))
    }
}

pub struct UnionFactory;

#[async_trait]
impl DatasourceFactory for UnionFactory {
    fn source_type(&self) -> &'static str {
        "union"
    }

    async fn create_source(
        &self,
        config: &ConfigNode,
        sources: &SourceMap,
    ) -> Result<Arc<dyn Datasource>> {
        let name = config.source_name()?;
        let first = resolve_source(sources, &name, &config.require(&name, "SOURCE1")?)?;
        let second = resolve_source(sources, &name, &config.require(&name, "SOURCE2")?)?;
        Ok(Arc::new(UnionSource::new(name, first, second)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinators::test_support::table;

    #[tokio::test]
    async fn test_union_of_equal_schemas() {
        let a = table("a", &["k", "Name"], &[&["1", "Sheldon"], &["2", "Leonard"]]);
        let b = table("b", &["Name", "k"], &[&["Penny", "3"]]);

        let union = UnionSource::new("ab", a, b).unwrap();
        assert_eq!(union.schema().columns(), &["k", "Name"]);

        let contents = union.get_contents().await.unwrap();
        assert_eq!(contents.len(), 3);

        let found = union.find(&[QueryPart::new("Name", "*e*")]).await.unwrap();
        assert_eq!(found.len(), 3);

        let found = union.find(&[QueryPart::new("Name", "Penny")]).await.unwrap();
        assert_eq!(found.keys(), vec!["3"]);

        let by_key = union.get_datasets_by_key(&["1".into(), "3".into()]).await.unwrap();
        assert_eq!(by_key.len(), 2);
    }

    #[test]
    fn test_union_rejects_different_schemas() {
        let a = table("a", &["k", "Name"], &[]);
        let b = table("b", &["k", "Ort"], &[]);
        let err = UnionSource::new("ab", a, b).err().unwrap();
        assert!(matches!(err, DataError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("Ort"));
    }

    #[tokio::test]
    async fn test_factory_requires_sources() {
        let mut sources = SourceMap::new();
        sources.insert("a".into(), table("a", &["k"], &[]));
        let node = ConfigNode::new("Datenquelle")
            .with_attribute("NAME", "ab")
            .with_attribute("SOURCE1", "a");
        assert!(UnionFactory.create_source(&node, &sources).await.is_err());

        let node = node.with_attribute("SOURCE2", "fehlt");
        let err = UnionFactory.create_source(&node, &sources).await.err().unwrap();
        assert!(err.to_string().contains("fehlt"));
    }
}
