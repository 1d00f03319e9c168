use crate::config::ConfigNode;
use crate::error::{DataError, Result};
use crate::registry::{resolve_source, DatasourceFactory, SourceMap};
use crate::results::{QueryResultsList, ResultSet};
use crate::traits::Datasource;
use crate::types::{QueryPart, Schema};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Two sources with the same columns where `preferred` shadows every
/// dataset of `other` that has the same key.
pub struct PreferSource {
    name: String,
    preferred: Arc<dyn Datasource>,
    other: Arc<dyn Datasource>,
    schema: Schema,
}

impl PreferSource {
    pub fn new(
        name: impl Into<String>,
        preferred: Arc<dyn Datasource>,
        other: Arc<dyn Datasource>,
    ) -> Result<Self> {
        let name = name.into();
        if !preferred.schema().same_columns(other.schema()) {
            return Err(DataError::invalid_configuration(format!(
                "In datasource \"{}\" columns [{}] are missing and in datasource \"{}\" columns [{}] are missing",
                preferred.name(),
                other.schema().missing_from(preferred.schema()).join(", "),
                other.name(),
                preferred.schema().missing_from(other.schema()).join(", ")
            )));
        }
        let schema = preferred.schema().clone();
        Ok(Self {
            name,
            preferred,
            other,
            schema,
        })
    }

    async fn shadow(&self, preferred: ResultSet, other: ResultSet) -> Result<ResultSet> {
        let other_keys: Vec<String> = {
            let unique: HashSet<String> = other.keys().into_iter().collect();
            unique.into_iter().collect()
        };
        let known_to_preferred = self.preferred.get_datasets_by_key(&other_keys).await?;

        let shadowed: HashSet<String> = preferred
            .keys()
            .into_iter()
            .chain(known_to_preferred.keys())
            .collect();

        let mut merged = preferred.to_vec();
        merged.extend(other.iter().filter(|ds| !shadowed.contains(ds.key())));
        Ok(QueryResultsList::new(merged).boxed())
    }
}

#[async_trait]
impl Datasource for PreferSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &'static str {
        "prefer"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn get_datasets_by_key(&self, keys: &[String]) -> Result<ResultSet> {
        let (preferred, other) = futures::try_join!(
            self.preferred.get_datasets_by_key(keys),
            self.other.get_datasets_by_key(keys)
        )?;
        self.shadow(preferred, other).await
    }

    async fn find(&self, query: &[QueryPart]) -> Result<ResultSet> {
        let (preferred, other) =
            futures::try_join!(self.preferred.find(query), self.other.find(query))?;
        self.shadow(preferred, other).await
    }

    async fn get_contents(&self) -> Result<ResultSet> {
        Ok(QueryResultsList::empty().boxed())
    }
}

pub struct PreferFactory;

#[async_trait]
impl DatasourceFactory for PreferFactory {
    fn source_type(&self) -> &'static str {
        "prefer"
    }

    async fn create_source(
        &self,
        config: &ConfigNode,
        sources: &SourceMap,
    ) -> Result<Arc<dyn Datasource>> {
        let name = config.source_name()?;
        let preferred = resolve_source(sources, &name, &config.require(&name, "SOURCE")?)?;
        let other = resolve_source(sources, &name, &config.require(&name, "OVER")?)?;
        Ok(Arc::new(PreferSource::new(name, preferred, other)?))
    }
}
