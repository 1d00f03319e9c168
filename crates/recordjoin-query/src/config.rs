//! Already-parsed configuration trees for datasource definitions.
//!
//! A [`ConfigNode`] is a name with ordered children. An attribute such as
//! `NAME "personal"` is a node called `NAME` whose single child is the leaf
//! `personal`. Lists (`Schema`, `DROP`, ...) are nodes with several leaf
//! children; tables (`Data`, `MATCH` pairs) nest anonymous nodes.

use crate::error::{DataError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConfigNode>,
}

impl ConfigNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Node `name` holding the single leaf `value`
    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name).with_child(Self::new(value))
    }

    /// Node `name` holding one leaf per value
    pub fn list<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut node = Self::new(name);
        for value in values {
            node.children.push(Self::new(value));
        }
        node
    }

    pub fn with_child(mut self, child: ConfigNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_attribute(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_child(Self::attribute(name, value))
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Last direct child called `name`
    pub fn get(&self, name: &str) -> Option<&ConfigNode> {
        self.children.iter().rev().find(|c| c.name == name)
    }

    /// All direct children called `name`, in order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ConfigNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Value of a leaf-holding node: the first child's name
    pub fn value(&self) -> &str {
        self.children.first().map(|c| c.name.as_str()).unwrap_or("")
    }

    /// Names of all direct children
    pub fn values(&self) -> Vec<String> {
        self.children.iter().map(|c| c.name.clone()).collect()
    }

    /// Value of attribute `attr`, if present
    pub fn get_str(&self, attr: &str) -> Option<&str> {
        self.get(attr).map(|n| n.value())
    }

    /// The datasource's `NAME`
    pub fn source_name(&self) -> Result<String> {
        self.get_str("NAME")
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DataError::invalid_configuration("NAME of datasource is missing"))
    }

    /// Value of a mandatory attribute of datasource `owner`
    pub fn require(&self, owner: &str, attr: &str) -> Result<String> {
        self.get_str(attr)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                DataError::invalid_configuration(format!(
                    "{} specification of datasource \"{}\" is missing",
                    attr, owner
                ))
            })
    }

    /// Pairs such as `MATCH ("a" "b")`. Accepts both one node per pair and a
    /// single node with anonymous pair children.
    pub fn pairs(&self, owner: &str, attr: &str) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        for node in self.get_all(attr) {
            if node.children.iter().all(ConfigNode::is_leaf) {
                pairs.push(Self::pair_of(node, owner, attr)?);
            } else {
                for child in &node.children {
                    pairs.push(Self::pair_of(child, owner, attr)?);
                }
            }
        }
        Ok(pairs)
    }

    fn pair_of(node: &ConfigNode, owner: &str, attr: &str) -> Result<(String, String)> {
        match node.children.as_slice() {
            [first, second] if first.is_leaf() && second.is_leaf() => {
                Ok((first.name.clone(), second.name.clone()))
            }
            _ => Err(DataError::invalid_configuration(format!(
                "Incorrect {} specification in datasource \"{}\"",
                attr, owner
            ))),
        }
    }

    /// Convert a JSON document into a configuration tree.
    ///
    /// Objects become children in key order, arrays become anonymous
    /// children (or leaves for scalars), scalars become leaves.
    pub fn from_json(name: impl Into<String>, value: &Value) -> Result<Self> {
        let mut node = Self::new(name);
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    node.children.push(Self::from_json(key.clone(), child)?);
                }
            }
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::Object(_) | Value::Array(_) => {
                            node.children.push(Self::from_json("", item)?)
                        }
                        scalar => node.children.push(Self::new(Self::scalar(scalar)?)),
                    }
                }
            }
            scalar => node.children.push(Self::new(Self::scalar(scalar)?)),
        }
        Ok(node)
    }

    fn scalar(value: &Value) -> Result<String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null => Ok(String::new()),
            other => Err(DataError::invalid_configuration(format!(
                "Expected a scalar value, got {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attributes() {
        let node = ConfigNode::new("Datenquelle")
            .with_attribute("NAME", "personal")
            .with_attribute("TYPE", "union")
            .with_attribute("TYPE", "overlay");

        assert_eq!(node.source_name().unwrap(), "personal");
        assert_eq!(node.get_str("TYPE"), Some("overlay"));
        assert_eq!(node.get_all("TYPE").count(), 2);
        assert!(node.get("SOURCE").is_none());

        let err = node.require("personal", "SOURCE").unwrap_err();
        assert!(err.to_string().contains("SOURCE"));
    }

    #[test]
    fn test_missing_name() {
        let err = ConfigNode::new("x").source_name().unwrap_err();
        assert!(matches!(err, DataError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_pairs_both_layouts() {
        let node = ConfigNode::new("x")
            .with_child(ConfigNode::list("MATCH", ["a", "b"]))
            .with_child(ConfigNode::list("MATCH", ["c", "d"]));
        assert_eq!(
            node.pairs("x", "MATCH").unwrap(),
            vec![("a".into(), "b".into()), ("c".into(), "d".into())]
        );

        let node = ConfigNode::from_json("x", &json!({"MATCH": [["a", "b"], ["c", "d"]]})).unwrap();
        assert_eq!(node.pairs("x", "MATCH").unwrap().len(), 2);

        let node = ConfigNode::new("x").with_child(ConfigNode::list("MATCH", ["a"]));
        assert!(node.pairs("x", "MATCH").is_err());
    }

    #[test]
    fn test_from_json() {
        let value = json!({
            "NAME": "tabelle",
            "Schema": ["Vorname", "Nachname"],
            "Data": [["Sheldon", "Cooper"], {"Vorname": "Amy"}],
            "Limit": 5
        });
        let node = ConfigNode::from_json("Datenquelle", &value).unwrap();

        assert_eq!(node.get_str("NAME"), Some("tabelle"));
        assert_eq!(node.get("Schema").unwrap().values(), vec!["Vorname", "Nachname"]);
        let data = node.get("Data").unwrap();
        assert_eq!(data.children.len(), 2);
        assert_eq!(data.children[0].name, "");
        assert_eq!(data.children[0].values(), vec!["Sheldon", "Cooper"]);
        assert_eq!(data.children[1].get_str("Vorname"), Some("Amy"));
        assert_eq!(node.get_str("Limit"), Some("5"));
    }
}
