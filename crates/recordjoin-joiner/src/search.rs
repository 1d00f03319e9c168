//! Concurrent lookups used to fill the storage with the user's own record

use futures::future::{self, BoxFuture, FutureExt};
use once_cell::sync::Lazy;
use recordjoin_query::{DatasetRef, Datasource, QueryPart};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

static VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]*)\}").expect("variable pattern is valid"));

/// Run `query` against `source` on a separate task. Completes immediately
/// with an empty list if either is missing; a failing search yields an
/// empty list as well.
pub fn async_search(
    query: Option<Vec<QueryPart>>,
    source: Option<Arc<dyn Datasource>>,
) -> BoxFuture<'static, Vec<DatasetRef>> {
    let (query, source) = match (query, source) {
        (Some(query), Some(source)) => (query, source),
        _ => return future::ready(Vec::new()).boxed(),
    };

    let name = source.name().to_string();
    let task = tokio::spawn(async move { source.find(&query).await.map(|r| r.to_vec()) });
    async move {
        match task.await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                error!("Search in datasource \"{}\" failed: {}", name, e);
                Vec::new()
            }
            Err(e) => {
                error!("Search task for datasource \"{}\" failed: {}", name, e);
                Vec::new()
            }
        }
    }
    .boxed()
}

/// Start every search at once and concatenate their results in the given
/// order
pub async fn join_searches(searches: Vec<BoxFuture<'static, Vec<DatasetRef>>>) -> Vec<DatasetRef> {
    future::join_all(searches).await.into_iter().flatten().collect()
}

/// Source of the values substituted for `${name}` variables
pub trait ValueProvider: Send + Sync {
    fn value(&self, name: &str) -> Option<String>;
}

/// Values from the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvValues;

impl ValueProvider for EnvValues {
    fn value(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed values, e.g. the user profile
#[derive(Debug, Clone, Default)]
pub struct StaticValues {
    values: HashMap<String, String>,
}

impl StaticValues {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl ValueProvider for StaticValues {
    fn value(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Replace every `${name}` in `template`. Unknown names become empty and
/// variable delimiters inside values are neutralized.
pub fn evaluate(template: &str, provider: &dyn ValueProvider) -> String {
    VARIABLE
        .replace_all(template, |caps: &Captures| {
            provider
                .value(&caps[1])
                .unwrap_or_default()
                .replace("${", "<")
                .replace('}', ">")
        })
        .into_owned()
}

/// Query whose search strings are filled in from a [`ValueProvider`]
#[derive(Clone)]
pub struct DefaultSearchStrategy {
    label: &'static str,
    parts: Vec<QueryPart>,
    provider: Arc<dyn ValueProvider>,
}

impl DefaultSearchStrategy {
    /// Variables are read from the process environment
    pub fn env(parts: Vec<QueryPart>) -> Self {
        Self {
            label: "environment",
            parts,
            provider: Arc::new(EnvValues),
        }
    }

    /// Variables are read from the user profile
    pub fn profile(parts: Vec<QueryPart>, profile: Arc<dyn ValueProvider>) -> Self {
        Self {
            label: "profile",
            parts,
            provider: profile,
        }
    }

    /// `Vorname=${givenname}`, `Nachname=${sn}` against the profile
    pub fn fallback(profile: Arc<dyn ValueProvider>) -> Self {
        Self::profile(
            vec![
                QueryPart::new("Vorname", "${givenname}"),
                QueryPart::new("Nachname", "${sn}"),
            ],
            profile,
        )
    }

    pub fn with_provider(mut self, provider: Arc<dyn ValueProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// The query with all variables substituted; `None` if the strategy has
    /// no parts or any substituted search string is empty
    pub fn evaluate(&self) -> Option<Vec<QueryPart>> {
        if self.parts.is_empty() {
            return None;
        }
        let mut query = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            let search = evaluate(&part.search, self.provider.as_ref());
            if search.is_empty() {
                debug!(
                    "Skipping {} search, no value for {}",
                    self.label, part.column
                );
                return None;
            }
            query.push(QueryPart::new(part.column.clone(), search));
        }
        Some(query)
    }

    pub fn search(&self, source: Arc<dyn Datasource>) -> BoxFuture<'static, Vec<DatasetRef>> {
        async_search(self.evaluate(), Some(source))
    }
}

impl std::fmt::Debug for DefaultSearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultSearchStrategy")
            .field("label", &self.label)
            .field("parts", &self.parts)
            .finish()
    }
}
