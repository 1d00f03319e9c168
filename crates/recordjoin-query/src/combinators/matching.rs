//! Match-key handling shared by the overlay and attach joins

use crate::error::{DataError, Result};
use crate::results::{QueryResultsList, ResultSet};
use crate::traits::Datasource;
use crate::types::{Dataset, QueryPart, Schema};
use futures::future::join_all;
use tracing::warn;

/// `(source column, other column)` pairs whose values must be equal
#[derive(Debug, Clone)]
pub(crate) struct MatchPairs {
    pairs: Vec<(String, String)>,
}

impl MatchPairs {
    pub(crate) fn new(
        owner: &str,
        pairs: Vec<(String, String)>,
        source_schema: &Schema,
        other_schema: &Schema,
    ) -> Result<Self> {
        if pairs.is_empty() {
            return Err(DataError::invalid_configuration(format!(
                "At least one MATCH specification has to be made in datasource \"{}\"",
                owner
            )));
        }
        for (source_column, other_column) in &pairs {
            if !source_schema.contains(source_column) {
                return Err(DataError::invalid_configuration(format!(
                    "MATCH column \"{}\" of datasource \"{}\" is not defined in schema",
                    source_column, owner
                )));
            }
            if !other_schema.contains(other_column) {
                return Err(DataError::invalid_configuration(format!(
                    "MATCH column \"{}\" of datasource \"{}\" is not defined in schema",
                    other_column, owner
                )));
            }
        }
        Ok(Self { pairs })
    }

    /// Columns matched against a column of the same name
    pub(crate) fn common_columns(&self) -> impl Iterator<Item = &str> {
        self.pairs
            .iter()
            .filter(|(a, b)| a == b)
            .map(|(a, _)| a.as_str())
    }

    /// Query against the other source for rows matching a source dataset
    pub(crate) fn forward_query(&self, dataset: &dyn Dataset) -> Vec<QueryPart> {
        Self::build_query(
            dataset,
            self.pairs.iter().map(|(s, o)| (s.as_str(), o.as_str())),
        )
    }

    /// Query against the source for rows matching a dataset of the other source
    pub(crate) fn backward_query(&self, dataset: &dyn Dataset) -> Vec<QueryPart> {
        Self::build_query(
            dataset,
            self.pairs.iter().map(|(s, o)| (o.as_str(), s.as_str())),
        )
    }

    fn build_query<'a>(
        dataset: &dyn Dataset,
        pairs: impl Iterator<Item = (&'a str, &'a str)>,
    ) -> Vec<QueryPart> {
        let mut query = Vec::new();
        for (from, to) in pairs {
            match dataset.get(from) {
                Ok(Some(value)) => query.push(QueryPart::new(to, value)),
                Ok(None) => return Vec::new(),
                Err(e) => {
                    warn!("Match column {} unreadable on dataset {}: {}", from, dataset.key(), e);
                    return Vec::new();
                }
            }
        }
        query
    }
}

/// Run one lookup per query concurrently; an empty query finds nothing
pub(crate) async fn lookup_all(
    target: &dyn Datasource,
    queries: &[Vec<QueryPart>],
) -> Result<Vec<ResultSet>> {
    let lookups = queries.iter().map(|query| async move {
        if query.is_empty() {
            Ok(QueryResultsList::empty().boxed())
        } else {
            target.find(query).await
        }
    });
    join_all(lookups).await.into_iter().collect()
}
