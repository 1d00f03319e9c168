use crate::error::Result;
use crate::results::ResultSet;
use crate::types::{QueryPart, Schema};
use async_trait::async_trait;

/// Core trait that all datasources (adapters and combinators) implement
#[async_trait]
pub trait Datasource: Send + Sync {
    /// Name under which the source was configured
    fn name(&self) -> &str;

    /// Type identifier of this source, matches the factory's `TYPE`
    fn source_type(&self) -> &'static str;

    /// Every dataset returned by this source answers exactly for these columns
    fn schema(&self) -> &Schema;

    /// Datasets whose keys are in `keys`
    async fn get_datasets_by_key(&self, keys: &[String]) -> Result<ResultSet>;

    /// Datasets matching all query parts. An empty query yields no results.
    async fn find(&self, query: &[QueryPart]) -> Result<ResultSet>;

    /// Everything the source holds; sources that cannot list their content
    /// return an empty result.
    async fn get_contents(&self) -> Result<ResultSet>;
}
