use crate::combinators::{
    AttachFactory, OverlayFactory, PreferFactory, SchemaFactory, UnionFactory,
};
use crate::config::ConfigNode;
use crate::error::{DataError, Result};
use crate::sources::{EmptyFactory, TableFactory};
use crate::traits::Datasource;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Sources that are fully constructed, by name
pub type SourceMap = HashMap<String, Arc<dyn Datasource>>;

/// Factory trait for creating datasources from configuration nodes
#[async_trait]
pub trait DatasourceFactory: Send + Sync {
    /// The `TYPE` value this factory handles
    fn source_type(&self) -> &'static str;

    /// Create a datasource. `sources` holds everything defined before this
    /// node; combinators may only reference those.
    async fn create_source(
        &self,
        config: &ConfigNode,
        sources: &SourceMap,
    ) -> Result<Arc<dyn Datasource>>;
}

/// Resolve a source referenced by a combinator
pub fn resolve_source(
    sources: &SourceMap,
    owner: &str,
    referenced: &str,
) -> Result<Arc<dyn Datasource>> {
    sources
        .get(referenced)
        .cloned()
        .ok_or_else(|| DataError::unresolved_source(owner, referenced))
}

/// Registry for datasource factories and the sources built from them
pub struct SourceRegistry {
    factories: Arc<RwLock<HashMap<String, Arc<dyn DatasourceFactory>>>>,
    sources: Arc<RwLock<SourceMap>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
            sources: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry with the table, empty and combinator factories registered
    pub async fn with_builtin_factories() -> Self {
        let registry = Self::new();
        let builtins: Vec<Arc<dyn DatasourceFactory>> = vec![
            Arc::new(TableFactory),
            Arc::new(EmptyFactory),
            Arc::new(UnionFactory),
            Arc::new(OverlayFactory),
            Arc::new(AttachFactory),
            Arc::new(PreferFactory),
            Arc::new(SchemaFactory),
        ];
        for factory in builtins {
            registry.register_factory(factory).await;
        }
        registry
    }

    /// Register a factory for a source type
    pub async fn register_factory(&self, factory: Arc<dyn DatasourceFactory>) {
        let source_type = factory.source_type();
        let mut factories = self.factories.write().await;

        if factories.contains_key(source_type) {
            warn!("Overwriting existing factory for source type: {}", source_type);
        }

        factories.insert(source_type.to_string(), factory);
        debug!("Registered factory for source type: {}", source_type);
    }

    /// Build a datasource from its definition and remember it by name
    pub async fn create_source(&self, config: &ConfigNode) -> Result<Arc<dyn Datasource>> {
        let name = config.source_name()?;
        let source_type = config.require(&name, "TYPE")?;

        let factory = self
            .factories
            .read()
            .await
            .get(&source_type)
            .cloned()
            .ok_or_else(|| {
                DataError::InvalidConfiguration(format!(
                    "Unknown TYPE \"{}\" of datasource \"{}\"",
                    source_type, name
                ))
            })?;

        debug!("Creating datasource {} of type {}", name, source_type);

        let source = {
            let sources = self.sources.read().await;
            factory.create_source(config, &sources).await?
        };

        let mut sources = self.sources.write().await;
        if sources.insert(name.clone(), source.clone()).is_some() {
            warn!("Datasource {} defined more than once, using the last definition", name);
        }

        Ok(source)
    }

    /// Build every definition in order
    pub async fn build_all(&self, definitions: &[ConfigNode]) -> Result<()> {
        for definition in definitions {
            self.create_source(definition).await?;
        }
        Ok(())
    }

    /// Add an already constructed source
    pub async fn insert_source(&self, source: Arc<dyn Datasource>) {
        let mut sources = self.sources.write().await;
        sources.insert(source.name().to_string(), source);
    }

    pub async fn get_source(&self, name: &str) -> Option<Arc<dyn Datasource>> {
        self.sources.read().await.get(name).cloned()
    }

    /// Snapshot of all sources by name
    pub async fn sources(&self) -> SourceMap {
        self.sources.read().await.clone()
    }

    pub async fn remove_source(&self, name: &str) -> Option<Arc<dyn Datasource>> {
        self.sources.write().await.remove(name)
    }

    pub async fn list_sources(&self) -> Vec<String> {
        self.sources.read().await.keys().cloned().collect()
    }

    pub async fn list_types(&self) -> Vec<String> {
        self.factories.read().await.keys().cloned().collect()
    }

    pub async fn has_type(&self, source_type: &str) -> bool {
        self.factories.read().await.contains_key(source_type)
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
