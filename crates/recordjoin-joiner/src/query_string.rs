//! Free-text search: the words a user typed are substituted into the query
//! templates registered for that number of words.

use once_cell::sync::Lazy;
use recordjoin_query::{
    DataError, Query, QueryPart, QueryResultsList, QueryResultsSet, ResultSet,
    SourceMap,
};
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

static WORD_VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{query(\d+)\}").expect("word variable pattern is valid"));

/// Query templates by the number of words they consume
#[derive(Debug, Clone, Default)]
pub struct SearchStrategy {
    templates: BTreeMap<usize, Vec<Query>>,
}

impl SearchStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `template` for the highest `${queryN}` it references
    pub fn with_template(mut self, template: Query) -> Self {
        let words = template
            .parts
            .iter()
            .flat_map(|part| WORD_VARIABLE.captures_iter(&part.search))
            .filter_map(|caps| caps[1].parse::<usize>().ok())
            .max()
            .unwrap_or(0);
        self.templates.entry(words).or_default().push(template);
        self
    }

    pub fn template(&self, words: usize) -> Option<&[Query]> {
        self.templates.get(&words).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Normalize a typed word: a trailing `.` or `*` becomes a single trailing
/// wildcard, other wildcards are removed
fn format_word(word: &str) -> String {
    let suffix_star = word.ends_with('*') || word.ends_with('.');
    let mut formatted = word.strip_suffix('.').unwrap_or(word).replace('*', "");
    if suffix_star {
        formatted.push('*');
    }
    formatted
}

/// Queries for `text`, built from the templates for the largest word count
/// not above the number of words
pub fn parse_query(strategy: &SearchStrategy, text: &str) -> Vec<Query> {
    let words: Vec<String> = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|w| !w.is_empty())
        .map(format_word)
        .filter(|w| !w.is_empty())
        .collect();

    let chosen = strategy
        .templates
        .range(..=words.len())
        .next_back()
        .map(|(count, templates)| (*count, templates));
    let (count, templates) = match chosen {
        Some(chosen) => chosen,
        None => return Vec::new(),
    };

    templates
        .iter()
        .map(|template| {
            let parts = template
                .parts
                .iter()
                .map(|part| {
                    let mut search = part.search.clone();
                    for (i, word) in words.iter().take(count).enumerate() {
                        search = search.replace(&format!("${{query{}}}", i + 1), word);
                    }
                    QueryPart::new(part.column.clone(), search)
                })
                .collect();
            Query::new(template.source.clone(), parts)
        })
        .collect()
}

/// Run `queries` against their sources. A query without parts reads the
/// whole source. Several result sets are merged without duplicate keys.
pub async fn run_queries(queries: &[Query], sources: &SourceMap) -> recordjoin_query::Result<ResultSet> {
    let mut results = Vec::with_capacity(queries.len());
    for query in queries {
        let source = sources.get(&query.source).ok_or_else(|| {
            DataError::invalid_query(format!(
                "Datasource \"{}\" should be searched but is not defined",
                query.source
            ))
        })?;
        debug!("Searching {} with {} parts", query.source, query.parts.len());
        let found = if query.is_empty() {
            source.get_contents().await?
        } else {
            source.find(&query.parts).await?
        };
        results.push(found);
    }

    if results.len() == 1 {
        return Ok(results.remove(0));
    }
    if results.is_empty() {
        return Ok(QueryResultsList::empty().boxed());
    }
    let mut merged = QueryResultsSet::by_key();
    for found in &results {
        merged.extend_from(found.as_ref());
    }
    Ok(Box::new(merged))
}

/// Free-text search; `None` if text or strategy is missing
pub async fn search(
    text: Option<&str>,
    strategy: Option<&SearchStrategy>,
    sources: &SourceMap,
) -> recordjoin_query::Result<Option<ResultSet>> {
    let (text, strategy) = match (text, strategy) {
        (Some(text), Some(strategy)) => (text, strategy),
        _ => return Ok(None),
    };
    let queries = parse_query(strategy, text);
    run_queries(&queries, sources).await.map(Some)
}
