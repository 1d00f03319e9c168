//! # recordjoin-query
//!
//! Core abstractions for treating several heterogeneous record stores as one
//! schema-unified, searchable source.
//!
//! ## Architecture
//!
//! - **Dataset**: a keyed, read-only record answering for the columns of its schema
//! - **Datasource**: async trait every adapter and combinator implements
//! - **QueryResults**: read-only result sequences (list, set, union, schema-annotated)
//! - **DatasetPredicate**: case-insensitive wildcard matching of query parts
//! - **Combinators**: union, overlay, attach, prefer and schema projection
//! - **ColumnTransformer**: pseudo-columns computed from real columns
//!
//! Datasources are described by [`ConfigNode`] trees and built in
//! declaration order by a [`SourceRegistry`]:
//!
//! ```rust
//! use recordjoin_query::{ConfigNode, QueryPart, SourceRegistry};
//!
//! # async fn example() -> recordjoin_query::Result<()> {
//! let registry = SourceRegistry::with_builtin_factories().await;
//!
//! let people = ConfigNode::new("Datenquelle")
//!     .with_attribute("NAME", "people")
//!     .with_attribute("TYPE", "table")
//!     .with_child(ConfigNode::list("Schema", ["id", "Name"]))
//!     .with_child(ConfigNode::list("Schluessel", ["id"]))
//!     .with_child(ConfigNode::new("Data").with_child(ConfigNode::list("", ["1", "Sheldon"])));
//!
//! let source = registry.create_source(&people).await?;
//! let results = source.find(&[QueryPart::new("Name", "shel*")]).await?;
//! assert_eq!(results.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Backend Implementation
//!
//! To add a backend, implement [`Datasource`] for it, wrap its dataset type
//! in the [`Dataset`] trait and register a [`DatasourceFactory`] under the
//! `TYPE` it should answer to. Backend failures are logged and turned into
//! empty results so that sibling sources keep working.
//!
//! Backend crates:
//! - `recordjoin-query-ldap` - directory service
//! - `recordjoin-query-officedb` - office suite database

pub mod combinators;
pub mod config;
pub mod error;
pub mod functions;
pub mod predicate;
pub mod registry;
pub mod results;
pub mod sources;
pub mod traits;
pub mod transform;
pub mod types;

// Re-export commonly used items
pub use combinators::{
    AttachSource, OverlayMode, OverlaySource, PreferSource, SchemaChanges, SchemaSource,
    UnionSource,
};
pub use config::ConfigNode;
pub use error::{DataError, Result};
pub use functions::{Function, FunctionRef, Values};
pub use predicate::{DatasetPredicate, Pattern};
pub use registry::{resolve_source, DatasourceFactory, SourceMap, SourceRegistry};
pub use results::{
    QueryResults, QueryResultsList, QueryResultsSet, QueryResultsUnion, QueryResultsWithSchema,
    ResultSet,
};
pub use sources::{EmptySource, TableSource};
pub use traits::Datasource;
pub use transform::ColumnTransformer;
pub use types::{is_valid_column_name, Dataset, DatasetRef, Query, QueryPart, Record, Schema};
