pub mod list;
pub mod refresh;
pub mod search;
pub mod select;
pub mod show;

pub use list::ListCommand;
pub use refresh::RefreshCommand;
pub use search::SearchCommand;
pub use select::SelectCommand;
pub use show::ShowCommand;

use clap::Args;
use recordjoin_joiner::{Joiner, JoinerConfig};
use recordjoin_query::SourceRegistry;
use std::path::PathBuf;
use tracing::{debug, info};

/// Where the datasources and the cache come from
#[derive(Args, Clone)]
pub struct SourceArgs {
    /// JSON file with the datasource definitions and joiner settings
    #[arg(long, env = "RECORDJOIN_CONFIG")]
    pub config: PathBuf,

    /// Cache file, overrides `cache_path` of the configuration
    #[arg(long, env = "RECORDJOIN_CACHE")]
    pub cache: Option<PathBuf>,
}

impl SourceArgs {
    /// Build the datasources and attach the cache. An empty cache is filled
    /// by the default search.
    pub async fn open(&self) -> anyhow::Result<Joiner> {
        let mut config = JoinerConfig::from_file(&self.config)?;
        if let Some(cache) = &self.cache {
            config = config.with_cache_path(cache.clone());
        }
        if config.cache_path.is_none() {
            info!("No cache file configured, changes will not be kept");
        }

        let registry = SourceRegistry::with_builtin_factories().await;
        debug!("Datasource types: {:?}", registry.list_types().await);
        let mut joiner = config.build(&registry).await?;

        if joiner.entries().is_empty() {
            let found = joiner.default_search().await;
            info!("Default search found {} records", found);
        }
        Ok(joiner)
    }
}

/// Run `f` on a fresh runtime
pub fn block_on<F: std::future::Future>(f: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Runtime::new()?;
    Ok(rt.block_on(f))
}
