//! Wildcard predicates over datasets.
//!
//! A search string may start and/or end with `*`. Everything in between is
//! compared literally and case-insensitively, so `Co*per` only matches the
//! text `co*per`.

use crate::types::{Dataset, QueryPart};

/// Compiled form of a single search string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl Pattern {
    pub fn compile(search: &str) -> Self {
        let leading = search.starts_with('*');
        let rest = search.trim_start_matches('*');
        let trailing = !rest.is_empty() && rest.ends_with('*');
        let core = rest.trim_end_matches('*').to_lowercase();

        match (leading, trailing) {
            (false, false) => Pattern::Exact(core),
            (false, true) => Pattern::Prefix(core),
            (true, false) => Pattern::Suffix(core),
            (true, true) => Pattern::Contains(core),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        let value = value.to_lowercase();
        match self {
            Pattern::Exact(s) => value == *s,
            Pattern::Prefix(s) => value.starts_with(s.as_str()),
            Pattern::Suffix(s) => value.ends_with(s.as_str()),
            Pattern::Contains(s) => value.contains(s.as_str()),
        }
    }

    /// Number of literal characters; used to rank how restrictive a search is
    pub fn literal_len(&self) -> usize {
        match self {
            Pattern::Exact(s) | Pattern::Prefix(s) | Pattern::Suffix(s) | Pattern::Contains(s) => {
                s.chars().count()
            }
        }
    }

    pub fn wildcard_count(&self) -> usize {
        match self {
            Pattern::Exact(_) => 0,
            Pattern::Prefix(_) | Pattern::Suffix(_) => 1,
            Pattern::Contains(_) => 2,
        }
    }
}

#[derive(Debug, Clone)]
struct ColumnGroup {
    column: String,
    alternatives: Vec<Pattern>,
}

/// Conjunction over columns of disjunctions over patterns
#[derive(Debug, Clone, Default)]
pub struct DatasetPredicate {
    groups: Vec<ColumnGroup>,
}

impl DatasetPredicate {
    /// Predicate accepting every dataset
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn build(parts: &[QueryPart]) -> Self {
        let mut groups: Vec<ColumnGroup> = Vec::new();
        for part in parts {
            let pattern = Pattern::compile(&part.search);
            match groups.iter_mut().find(|g| g.column == part.column) {
                Some(group) => group.alternatives.push(pattern),
                None => groups.push(ColumnGroup {
                    column: part.column.clone(),
                    alternatives: vec![pattern],
                }),
            }
        }
        Self { groups }
    }

    pub fn is_match_all(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn matches(&self, dataset: &dyn Dataset) -> bool {
        self.groups.iter().all(|group| match dataset.get(&group.column) {
            Ok(Some(value)) => group.alternatives.iter().any(|p| p.matches(&value)),
            Ok(None) | Err(_) => false,
        })
    }
}

/// The part that narrows a search down the most: exact matches first,
/// then the most literal characters, then the fewest wildcards.
pub fn most_restrictive_part(parts: &[QueryPart]) -> Option<&QueryPart> {
    let mut best: Option<(&QueryPart, usize, usize)> = None;
    for part in parts {
        let pattern = Pattern::compile(&part.search);
        let stars = pattern.wildcard_count();
        let literal = pattern.literal_len();
        let better = match best {
            None => true,
            Some((_, best_stars, best_literal)) => {
                (stars == 0 && best_stars > 0)
                    || literal > best_literal
                    || (literal == best_literal && stars < best_stars)
            }
        };
        if better {
            best = Some((part, stars, literal));
        }
    }
    best.map(|(part, _, _)| part)
}
