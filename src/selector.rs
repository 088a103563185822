//! Path identity for nodes in the component, environment and diff trees

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A root-to-node path of component names
///
/// `Selector::new("network").child("subnet")` addresses the `subnet`
/// component of the `network` build. Two selectors are equal when their
/// whole chain of names is equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Selector {
    path: Vec<String>,
}

impl Selector {
    /// Selector for a top-level component
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            path: vec![name.into()],
        }
    }

    /// Build a selector from a full path; `None` if the path is empty
    pub fn from_path<I, S>(path: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        if path.is_empty() {
            None
        } else {
            Some(Self { path })
        }
    }

    /// Selector for a component nested in this one
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(name.into());
        Self { path }
    }

    /// Last name in the chain
    pub fn name(&self) -> &str {
        self.path.last().map_or("", String::as_str)
    }

    /// Enclosing build, `None` for top-level components
    pub fn parent(&self) -> Option<Self> {
        Self::from_path(self.scope().iter().cloned())
    }

    /// Names of the enclosing builds, outermost first
    pub fn scope(&self) -> &[String] {
        match self.path.split_last() {
            Some((_, scope)) => scope,
            None => &[],
        }
    }

    /// The full chain, outermost first
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Nesting depth (1 for top-level components)
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Whether `self` is strictly inside `other`
    pub fn is_descendant_of(&self, other: &Self) -> bool {
        self.path.len() > other.path.len() && self.path.starts_with(&other.path)
    }

    /// Enclosing builds, innermost first
    pub fn ancestors(&self) -> impl Iterator<Item = Self> + '_ {
        (1..self.path.len())
            .rev()
            .filter_map(|len| Self::from_path(self.path[..len].iter().cloned()))
    }
}

impl TryFrom<Vec<String>> for Selector {
    type Error = Error;

    fn try_from(path: Vec<String>) -> Result<Self> {
        Self::from_path(path).ok_or(Error::EmptySelector)
    }
}

impl From<Selector> for Vec<String> {
    fn from(selector: Selector) -> Self {
        selector.path
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_and_parent() {
        let net = Selector::new("network");
        let subnet = net.child("subnet");

        assert_eq!(subnet.name(), "subnet");
        assert_eq!(subnet.parent(), Some(net.clone()));
        assert_eq!(net.parent(), None);
        assert_eq!(subnet.to_string(), "network.subnet");
    }

    #[test]
    fn test_equality_is_structural() {
        let a = Selector::new("a").child("b");
        let b = Selector::from_path(["a", "b"]).unwrap();
        let other = Selector::new("x").child("b");

        assert_eq!(a, b);
        assert_ne!(a, other);
        assert!(Selector::from_path(Vec::<String>::new()).is_none());
    }

    #[test]
    fn test_ancestors_innermost_first() {
        let s = Selector::from_path(["a", "b", "c"]).unwrap();
        let ancestors: Vec<String> = s.ancestors().map(|a| a.to_string()).collect();

        assert_eq!(ancestors, vec!["a.b", "a"]);
        assert!(s.is_descendant_of(&Selector::new("a")));
        assert!(!Selector::new("a").is_descendant_of(&Selector::new("a")));
    }

    #[test]
    fn test_deserialize_rejects_empty_path() {
        let s: Selector = serde_json::from_str(r#"["network","subnet"]"#).unwrap();
        assert_eq!(s, Selector::new("network").child("subnet"));
        assert_eq!(serde_json::to_string(&s).unwrap(), r#"["network","subnet"]"#);

        let err = serde_json::from_str::<Selector>("[]").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_top_level_scope_is_empty() {
        let s = Selector::new("a");
        assert!(s.scope().is_empty());
        assert_eq!(s.parent(), None);
        assert_eq!(s.ancestors().count(), 0);
    }
}
