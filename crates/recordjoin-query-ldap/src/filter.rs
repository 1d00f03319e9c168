//! Search filters in the string form of RFC 4515.

use std::fmt;

/// Escape a filter value. `*` is left alone and keeps its meaning as
/// substring wildcard.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\5c"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\0' => escaped.push_str("\\00"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Equals { attribute: String, value: String },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    /// Already rendered filter text, e.g. taken from a dataset key
    Raw(String),
}

impl Filter {
    pub fn equals(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Conjunction; a single filter is returned unchanged
    pub fn and(mut filters: Vec<Filter>) -> Self {
        if filters.len() == 1 {
            filters.remove(0)
        } else {
            Filter::And(filters)
        }
    }

    pub fn object_class(class: &str) -> Self {
        Self::equals("objectClass", class)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Equals { attribute, value } => {
                write!(f, "({}={})", escape(attribute), escape(value))
            }
            Filter::And(parts) => {
                write!(f, "(&")?;
                for part in parts {
                    write!(f, "{}", part)?;
                }
                write!(f, ")")
            }
            Filter::Or(parts) => {
                write!(f, "(|")?;
                for part in parts {
                    write!(f, "{}", part)?;
                }
                write!(f, ")")
            }
            Filter::Raw(text) => write!(f, "{}", text),
        }
    }
}
