//! Function library used to compute pseudo-columns

use crate::config::ConfigNode;
use crate::error::{DataError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Named values a function is evaluated against
pub trait Values {
    /// Whether `name` is known at all. Only then are `get_string` and
    /// `get_boolean` meaningful.
    fn has_value(&self, name: &str) -> bool;

    /// Value of `name`, empty if unknown or unset
    fn get_string(&self, name: &str) -> String;

    fn get_boolean(&self, name: &str) -> bool {
        self.get_string(name).eq_ignore_ascii_case("true")
    }
}

impl Values for HashMap<String, String> {
    fn has_value(&self, name: &str) -> bool {
        self.contains_key(name)
    }

    fn get_string(&self, name: &str) -> String {
        self.get(name).cloned().unwrap_or_default()
    }
}

pub trait Function: Send + Sync + fmt::Debug {
    /// Names of the values the function reads
    fn parameters(&self) -> Vec<String>;

    fn get_string(&self, values: &dyn Values) -> String;

    fn get_boolean(&self, values: &dyn Values) -> bool {
        self.get_string(values).eq_ignore_ascii_case("true")
    }
}

pub type FunctionRef = Arc<dyn Function>;

/// Value of a column
#[derive(Debug, Clone)]
pub struct ValueOf {
    column: String,
}

impl ValueOf {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

impl Function for ValueOf {
    fn parameters(&self) -> Vec<String> {
        vec![self.column.clone()]
    }

    fn get_string(&self, values: &dyn Values) -> String {
        if values.has_value(&self.column) {
            values.get_string(&self.column)
        } else {
            String::new()
        }
    }
}

/// Constant text
#[derive(Debug, Clone)]
pub struct Literal {
    text: String,
}

impl Literal {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Function for Literal {
    fn parameters(&self) -> Vec<String> {
        Vec::new()
    }

    fn get_string(&self, _values: &dyn Values) -> String {
        self.text.clone()
    }
}

/// Concatenation of the results of several functions
#[derive(Debug, Clone)]
pub struct Concat {
    parts: Vec<FunctionRef>,
}

impl Concat {
    pub fn new(parts: Vec<FunctionRef>) -> Self {
        Self { parts }
    }
}

impl Function for Concat {
    fn parameters(&self) -> Vec<String> {
        let mut params: Vec<String> = Vec::new();
        for param in self.parts.iter().flat_map(|p| p.parameters()) {
            if !params.contains(&param) {
                params.push(param);
            }
        }
        params
    }

    fn get_string(&self, values: &dyn Values) -> String {
        self.parts.iter().map(|p| p.get_string(values)).collect()
    }
}

/// `primary`, or `fallback` if `primary` evaluates to an empty string
#[derive(Debug, Clone)]
pub struct IfEmpty {
    primary: FunctionRef,
    fallback: FunctionRef,
}

impl IfEmpty {
    pub fn new(primary: FunctionRef, fallback: FunctionRef) -> Self {
        Self { primary, fallback }
    }
}

impl Function for IfEmpty {
    fn parameters(&self) -> Vec<String> {
        Concat::new(vec![self.primary.clone(), self.fallback.clone()]).parameters()
    }

    fn get_string(&self, values: &dyn Values) -> String {
        let value = self.primary.get_string(values);
        if value.is_empty() {
            self.fallback.get_string(values)
        } else {
            value
        }
    }
}

/// Parse a function definition.
///
/// Leaves are literals; `VALUE "column"`, `CAT (...)` and
/// `IF_EMPTY (primary fallback)` build the corresponding functions.
pub fn parse_function(node: &ConfigNode) -> Result<FunctionRef> {
    if node.is_leaf() {
        return Ok(Arc::new(Literal::new(node.name.clone())));
    }
    match node.name.as_str() {
        "VALUE" => Ok(Arc::new(ValueOf::new(node.value()))),
        "CAT" | "" => {
            let parts = node
                .children
                .iter()
                .map(parse_function)
                .collect::<Result<Vec<_>>>()?;
            Ok(Arc::new(Concat::new(parts)))
        }
        "IF_EMPTY" => match node.children.as_slice() {
            [primary, fallback] => Ok(Arc::new(IfEmpty::new(
                parse_function(primary)?,
                parse_function(fallback)?,
            ))),
            _ => Err(DataError::invalid_configuration(
                "IF_EMPTY requires exactly two arguments",
            )),
        },
        other => Err(DataError::invalid_configuration(format!(
            "Unknown function \"{}\"",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> HashMap<String, String> {
        HashMap::from([
            ("Vorname".to_string(), "Sheldon".to_string()),
            ("Nachname".to_string(), "Cooper".to_string()),
            ("Titel".to_string(), String::new()),
            ("Aktiv".to_string(), "TRUE".to_string()),
        ])
    }

    #[test]
    fn test_builtin_functions() {
        let values = values();
        let name: FunctionRef = Arc::new(Concat::new(vec![
            Arc::new(ValueOf::new("Vorname")),
            Arc::new(Literal::new(" ")),
            Arc::new(ValueOf::new("Nachname")),
        ]));
        assert_eq!(name.get_string(&values), "Sheldon Cooper");
        assert_eq!(name.parameters(), vec!["Vorname", "Nachname"]);

        let title = IfEmpty::new(Arc::new(ValueOf::new("Titel")), Arc::new(Literal::new("Dr.")));
        assert_eq!(title.get_string(&values), "Dr.");

        assert_eq!(ValueOf::new("Unbekannt").get_string(&values), "");
        assert!(ValueOf::new("Aktiv").get_boolean(&values));
        assert!(!ValueOf::new("Vorname").get_boolean(&values));
    }

    #[test]
    fn test_parse_function() {
        let node = ConfigNode::new("CAT")
            .with_child(ConfigNode::attribute("VALUE", "Nachname"))
            .with_child(ConfigNode::new(", "))
            .with_child(ConfigNode::attribute("VALUE", "Vorname"));
        let function = parse_function(&node).unwrap();
        assert_eq!(function.get_string(&values()), "Cooper, Sheldon");

        let bad = ConfigNode::new("IF_EMPTY").with_child(ConfigNode::new("x"));
        assert!(parse_function(&bad).is_err());
        let unknown = ConfigNode::new("EVAL").with_child(ConfigNode::new("x"));
        assert!(parse_function(&unknown).is_err());
    }
}
