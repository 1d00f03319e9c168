use async_trait::async_trait;
use recordjoin_query::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Direct children of the base entry
    OneLevel,
    /// The base entry and everything below it
    Subtree,
}

/// Entry returned by a directory search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Full distinguished name
    pub dn: String,
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// First value of an attribute, attribute names compared ignoring case
    pub fn first_value(&self, name: &str) -> Option<&str> {
        first_value(&self.attributes, name)
    }
}

pub(crate) fn first_value<'a>(
    attributes: &'a HashMap<String, Vec<String>>,
    name: &str,
) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(attribute, _)| attribute.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}

/// Bind credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Connection to a directory server
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn search(
        &self,
        base: &str,
        scope: SearchScope,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>>;

    /// Attributes of the entry `dn`, restricted to `attributes`
    async fn read_attributes(
        &self,
        dn: &str,
        attributes: &[String],
    ) -> Result<HashMap<String, Vec<String>>>;
}

/// Creates clients for the `URL` of a datasource definition
pub trait DirectoryConnector: Send + Sync {
    fn connect(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<dyn DirectoryClient>>;
}
