use crate::error::Result;
use crate::joiner::Joiner;
use crate::query_string::SearchStrategy;
use crate::search::{DefaultSearchStrategy, StaticValues};
use recordjoin_los::cache_file;
use recordjoin_query::{ColumnTransformer, ConfigNode, DataError, Query, QueryPart, SourceRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Where a default search strategy reads its `${name}` variables from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StrategyConfig {
    Env { query: Vec<QueryPart> },
    Profile { query: Vec<QueryPart> },
}

/// Settings of a [`Joiner`], usually read from a JSON file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinerConfig {
    /// Name of the datasource backing the storage
    pub main_source: String,

    /// Datasource definitions in declaration order
    pub datasources: Vec<Value>,

    /// Default search strategies, run concurrently
    pub search_strategies: Vec<StrategyConfig>,

    /// Free-text query templates using `${query1}`, `${query2}`, ...
    pub free_text: Vec<Query>,

    /// Pseudo-column definitions, `{"Column": {"CAT": [...]}}`
    pub pseudo_columns: Option<Value>,

    /// User profile values such as `givenname` and `sn`
    pub profile: HashMap<String, String>,

    pub cache_path: Option<PathBuf>,
}

impl JoinerConfig {
    pub fn new(main_source: impl Into<String>) -> Self {
        Self {
            main_source: main_source.into(),
            ..Default::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DataError::invalid_configuration(format!("Can not read {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&content).map_err(|e| {
            DataError::invalid_configuration(format!("Can not parse {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    pub fn with_datasource(mut self, definition: Value) -> Self {
        self.datasources.push(definition);
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyConfig) -> Self {
        self.search_strategies.push(strategy);
        self
    }

    pub fn with_free_text_template(mut self, template: Query) -> Self {
        self.free_text.push(template);
        self
    }

    pub fn with_pseudo_columns(mut self, definition: Value) -> Self {
        self.pseudo_columns = Some(definition);
        self
    }

    pub fn with_profile_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.profile.insert(name.into(), value.into());
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn definitions(&self) -> Result<Vec<ConfigNode>> {
        let definitions = self
            .datasources
            .iter()
            .map(|value| ConfigNode::from_json("Datenquelle", value))
            .collect::<recordjoin_query::Result<Vec<_>>>()?;
        Ok(definitions)
    }

    /// Build every datasource with `registry`, load the cache and attach
    /// the joiner to the main source
    pub async fn build(&self, registry: &SourceRegistry) -> Result<Joiner> {
        registry.build_all(&self.definitions()?).await?;
        let sources = registry.sources().await;
        debug!("Built {} datasources", sources.len());

        let los = match &self.cache_path {
            Some(path) => cache_file::load_or_default(path),
            None => Default::default(),
        };

        let profile = Arc::new(StaticValues::new(self.profile.clone()));
        let strategies = self
            .search_strategies
            .iter()
            .map(|strategy| match strategy {
                StrategyConfig::Env { query } => DefaultSearchStrategy::env(query.clone()),
                StrategyConfig::Profile { query } => {
                    DefaultSearchStrategy::profile(query.clone(), profile.clone())
                }
            })
            .collect();

        let mut joiner = Joiner::new(sources, &self.main_source, los)
            .await?
            .with_strategies(strategies)
            .with_profile(profile);

        if let Some(definition) = &self.pseudo_columns {
            let node = ConfigNode::from_json("Spaltenumsetzung", definition)?;
            joiner = joiner.with_transformer(ColumnTransformer::from_config(&node)?);
        }
        if !self.free_text.is_empty() {
            let strategy = self
                .free_text
                .iter()
                .cloned()
                .fold(SearchStrategy::new(), SearchStrategy::with_template);
            joiner = joiner.with_free_text(strategy);
        }
        if let Some(path) = &self.cache_path {
            joiner = joiner.with_cache_path(path.clone());
        }
        Ok(joiner)
    }
}
