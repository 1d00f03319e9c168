//! Distinguished names as sequences of relative names.

use std::fmt;

/// A distinguished name. Components are stored root first, so the name of
/// an ancestor is a prefix of the name of its descendants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dn {
    components: Vec<String>,
}

impl Dn {
    /// Parse `cn=x,ou=y,o=z`. Escaped commas stay inside their component and
    /// a surrounding pair of double quotes is removed.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let text = text
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .unwrap_or(text);

        let mut components = Vec::new();
        let mut current = String::new();
        let mut escaped = false;
        for c in text.chars() {
            match c {
                _ if escaped => {
                    current.push(c);
                    escaped = false;
                }
                '\\' => {
                    current.push(c);
                    escaped = true;
                }
                ',' => components.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        components.push(current);

        let mut components: Vec<String> = components
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        components.reverse();
        Self { components }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Whether `self` is `other` or lies below it
    pub fn starts_with(&self, other: &Dn) -> bool {
        other.len() <= self.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// The entry `levels` steps up, as long as it does not leave the
    /// subtree of the first `floor` components
    pub fn ancestor(&self, levels: usize, floor: usize) -> Option<Dn> {
        let keep = self.len().checked_sub(levels)?;
        if keep < floor {
            return None;
        }
        Some(Self {
            components: self.components[..keep].to_vec(),
        })
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for component in self.components.iter().rev() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}", component)?;
            first = false;
        }
        Ok(())
    }
}
