//! Dataset keys of the directory source.
//!
//! A key consists of the filter for the key columns read from the entry
//! itself, [`ABSOLUTE_SEPARATOR`], and one `column=value` followed by
//! [`RELATIVE_SEPARATOR`] per key column read from an ancestor. Key columns
//! are sorted by attribute and depth so that the key does not depend on the
//! order of declaration.

use crate::filter::{escape, Filter};
use once_cell::sync::Lazy;
use recordjoin_query::QueryPart;
use regex::Regex;
use std::collections::HashMap;

pub const ABSOLUTE_SEPARATOR: &str = "==%§%==";
pub const RELATIVE_SEPARATOR: &str = "&:=&:%";

static KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\(&(\([^()=]+[^()]*\))+\))?==%§%==([a-zA-Z_][a-zA-Z0-9_]*=.*&:=&:%)?$")
        .expect("key pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    AbsoluteOnly,
    Mixed,
    RelativeOnly,
}

#[derive(Debug, Clone)]
pub(crate) struct KeyColumn {
    pub column: String,
    pub attribute: String,
    pub depth: i32,
}

#[derive(Debug, Clone)]
pub(crate) struct KeyLayout {
    columns: Vec<KeyColumn>,
    kind: KeyKind,
}

impl KeyLayout {
    pub fn new(mut columns: Vec<KeyColumn>) -> Self {
        columns.sort_by(|a, b| {
            a.attribute
                .cmp(&b.attribute)
                .then_with(|| a.depth.cmp(&b.depth))
        });
        let absolute = columns.iter().any(|c| c.depth == 0);
        let relative = columns.iter().any(|c| c.depth != 0);
        let kind = match (absolute, relative) {
            (true, true) => KeyKind::Mixed,
            (false, true) => KeyKind::RelativeOnly,
            _ => KeyKind::AbsoluteOnly,
        };
        Self { columns, kind }
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn generate(&self, values: &HashMap<String, String>) -> String {
        let absolute: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.depth == 0)
            .map(|c| {
                let value = values.get(&c.column).map(String::as_str).unwrap_or("*");
                format!("({}={})", escape(&c.attribute), escape(value))
            })
            .collect();

        let mut key = String::new();
        if !absolute.is_empty() {
            key.push_str("(&");
            key.push_str(&absolute.concat());
            key.push(')');
        }
        key.push_str(ABSOLUTE_SEPARATOR);
        for c in self.columns.iter().filter(|c| c.depth != 0) {
            let value = values.get(&c.column).map(String::as_str).unwrap_or("");
            key.push_str(&c.column);
            key.push('=');
            key.push_str(&value.replace('*', "").replace(RELATIVE_SEPARATOR, ""));
            key.push_str(RELATIVE_SEPARATOR);
        }
        key
    }
}

pub fn is_valid_key(key: &str) -> bool {
    KEY_PATTERN.is_match(key)
}

/// Filter part of a key, `None` if the key has no absolute columns
pub fn absolute_filter(key: &str) -> Option<Filter> {
    key.split_once(ABSOLUTE_SEPARATOR)
        .map(|(absolute, _)| absolute)
        .filter(|absolute| !absolute.is_empty())
        .map(|absolute| Filter::Raw(absolute.to_string()))
}

/// Query for the relative columns of a key
pub fn relative_query(key: &str) -> Vec<QueryPart> {
    let relative = match key.split_once(ABSOLUTE_SEPARATOR) {
        Some((_, relative)) => relative,
        None => return Vec::new(),
    };
    relative
        .split(RELATIVE_SEPARATOR)
        .filter_map(|part| part.split_once('='))
        .map(|(column, value)| QueryPart::new(column, value))
        .collect()
}
