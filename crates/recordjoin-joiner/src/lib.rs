//! # recordjoin-joiner
//!
//! Presents a backing datasource and the local override storage as one
//! list of records with a single selected entry.
//!
//! - [`Joiner`]: selection, current values, search and cache persistence
//! - [`search`]: default search strategies running concurrently on tokio tasks
//! - [`query_string`]: free-text search through word-count templates
//! - [`Notifier`]: one change event per mutating operation
//!
//! ```rust,no_run
//! use recordjoin_joiner::JoinerConfig;
//! use recordjoin_query::SourceRegistry;
//! use std::path::Path;
//!
//! # async fn example() -> recordjoin_joiner::Result<()> {
//! let config = JoinerConfig::from_file(Path::new("sources.json"))?;
//! let registry = SourceRegistry::with_builtin_factories().await;
//! let mut joiner = config.build(&registry).await?;
//!
//! if joiner.entries().is_empty() {
//!     joiner.default_search().await;
//! }
//! println!("{:?}", joiner.current_value("Nachname")?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod joiner;
pub mod notifier;
pub mod query_string;
pub mod search;

pub use config::{JoinerConfig, StrategyConfig};
pub use error::{JoinerError, Result};
pub use joiner::Joiner;
pub use notifier::{JoinerEvent, Notifier};
pub use query_string::SearchStrategy;
pub use search::{
    async_search, DefaultSearchStrategy, EnvValues, StaticValues, ValueProvider,
};
