//! Typed values produced by evaluation and consumed by the diff algorithm

use crate::environment::Environment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A resolved (or partially resolved) value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Bool(bool),
    Map(BTreeMap<String, Value>),
    List(Vec<Value>),
    Resource(Box<Resource>),
    /// Backend-assigned name of a resource
    Identifier(String),
    /// File contents, compared verbatim
    File(String),
    /// A value that cannot change in place
    Immutable(Box<Value>),
    Provider(Provider),
    /// Resolved children of a nested build
    Environment(Box<Environment>),
    Nil,
    /// Not resolvable until another node finishes
    Unknown(Unknown),
}

impl Value {
    /// Shorthand for `Value::String`
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Build a map value from key/value pairs
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Shorthand for `Value::Immutable`
    pub fn immutable(value: Value) -> Self {
        Self::Immutable(Box::new(value))
    }

    /// Variant name, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Bool(_) => "bool",
            Self::Map(_) => "map",
            Self::List(_) => "list",
            Self::Resource(_) => "resource",
            Self::Identifier(_) => "identifier",
            Self::File(_) => "file",
            Self::Immutable(_) => "immutable",
            Self::Provider(_) => "provider",
            Self::Environment(_) => "environment",
            Self::Nil => "nil",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Whether this is the zero value of its type
    pub fn is_zero(&self) -> bool {
        match self {
            Self::String(s) | Self::Identifier(s) | Self::File(s) => s.is_empty(),
            Self::Bool(b) => !b,
            Self::Map(m) => m.is_empty(),
            Self::List(l) => l.is_empty(),
            Self::Immutable(v) => v.is_zero(),
            Self::Provider(p) => *p == Provider::default(),
            Self::Nil => true,
            Self::Resource(_) | Self::Environment(_) | Self::Unknown(_) => false,
        }
    }

    /// The zero value of this value's type
    pub fn zero_like(&self) -> Self {
        match self {
            Self::String(_) => Self::String(String::new()),
            Self::Bool(_) => Self::Bool(false),
            Self::Map(_) => Self::Map(BTreeMap::new()),
            Self::List(_) => Self::List(Vec::new()),
            Self::Resource(r) => Self::Resource(Box::new(r.absent())),
            Self::Identifier(_) => Self::Identifier(String::new()),
            Self::File(_) => Self::File(String::new()),
            Self::Immutable(v) => Self::immutable(v.zero_like()),
            Self::Provider(_) => Self::Provider(Provider::default()),
            Self::Environment(_) => Self::Environment(Box::default()),
            Self::Nil | Self::Unknown(_) => Self::Nil,
        }
    }

    /// Whether no `Unknown` appears anywhere in this value
    pub fn is_known(&self) -> bool {
        match self {
            Self::Unknown(_) => false,
            Self::Map(m) => m.values().all(Self::is_known),
            Self::List(l) => l.iter().all(Self::is_known),
            Self::Immutable(v) => v.is_known(),
            Self::Resource(r) => r.identifier.is_known() && r.config.is_known(),
            _ => true,
        }
    }

    /// The resource payload, if this is a resource
    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Self::Resource(r) => Some(&**r),
            _ => None,
        }
    }

    /// The environment payload, if this is a nested build
    pub fn as_environment(&self) -> Option<&Environment> {
        match self {
            Self::Environment(env) => Some(&**env),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Nil
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Resource> for Value {
    fn from(r: Resource) -> Self {
        Self::Resource(Box::new(r))
    }
}

/// A plugin that manages some kind of resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
}

impl Provider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: BTreeMap::new(),
        }
    }
}

/// A managed piece of infrastructure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub provider: Provider,
    /// Resource type within the provider, e.g. `bucket`
    pub kind: String,
    /// `Value::Identifier`, or `Value::Unknown` before it is resolvable
    pub identifier: Value,
    /// User-declared settings
    pub config: Value,
    /// Backend-computed attributes
    pub attrs: Value,
    pub exists: bool,
}

impl Resource {
    /// An existing resource with empty config and attrs
    pub fn new(provider: Provider, kind: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            provider,
            kind: kind.into(),
            identifier: Value::Identifier(identifier.into()),
            config: Value::Map(BTreeMap::new()),
            attrs: Value::Nil,
            exists: true,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_attrs(mut self, attrs: Value) -> Self {
        self.attrs = attrs;
        self
    }

    /// Same identity, marked as not existing
    pub fn absent(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            kind: self.kind.clone(),
            identifier: self.identifier.clone(),
            config: Value::Nil,
            attrs: Value::Nil,
            exists: false,
        }
    }

    /// Identifier string, if resolved
    pub fn identifier_str(&self) -> Option<&str> {
        match &self.identifier {
            Value::Identifier(id) => Some(id),
            _ => None,
        }
    }

    /// `provider/kind/identifier`, for logs
    pub fn address(&self) -> String {
        format!(
            "{}/{}/{}",
            self.provider.name,
            self.kind,
            self.identifier_str().unwrap_or("<unknown>")
        )
    }
}

/// A value that depends on something not yet resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unknown {
    pub name: String,
    pub reference: Reference,
}

impl Unknown {
    pub fn new(reference: Reference) -> Self {
        Self {
            name: reference.to_string(),
            reference,
        }
    }
}

/// What an expression or unknown value points at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Reference {
    /// A property of a sibling component in the same build
    Component { alias: String, path: Vec<String> },
    /// A property of the enclosing build's runtime config
    Runtime { path: Vec<String> },
}

impl Reference {
    pub fn component<I, S>(alias: impl Into<String>, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Component {
            alias: alias.into(),
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    pub fn runtime<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Runtime {
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// Sibling alias this reference depends on
    pub fn alias(&self) -> Option<&str> {
        match self {
            Self::Component { alias, .. } => Some(alias),
            Self::Runtime { .. } => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Component { alias, path } if path.is_empty() => write!(f, "{alias}"),
            Self::Component { alias, path } => write!(f, "{alias}.{}", path.join(".")),
            Self::Runtime { path } => write!(f, "runtime.{}", path.join(".")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values() {
        assert!(Value::string("").is_zero());
        assert!(!Value::string("a").is_zero());
        assert!(Value::Bool(false).is_zero());
        assert!(Value::map(Vec::<(String, Value)>::new()).is_zero());
        assert!(Value::Nil.is_zero());
        assert_eq!(Value::Bool(true).zero_like(), Value::Bool(false));
        assert_eq!(
            Value::immutable(Value::string("x")).zero_like(),
            Value::immutable(Value::string(""))
        );
    }

    #[test]
    fn test_is_known_looks_inside_containers() {
        let unknown = Value::Unknown(Unknown::new(Reference::component("db", ["attrs", "host"])));
        let nested = Value::map([("host", Value::List(vec![unknown]))]);

        assert!(!nested.is_known());
        assert!(Value::map([("a", Value::from("b"))]).is_known());
    }

    #[test]
    fn test_absent_keeps_identity() {
        let r = Resource::new(Provider::new("cloud"), "bucket", "assets")
            .with_config(Value::map([("name", Value::from("foo"))]));
        let absent = r.absent();

        assert!(!absent.exists);
        assert_eq!(absent.identifier_str(), Some("assets"));
        assert_eq!(absent.config, Value::Nil);
        assert_eq!(r.address(), "cloud/bucket/assets");
    }

    #[test]
    fn test_reference_display() {
        assert_eq!(
            Reference::component("db", ["attrs", "host"]).to_string(),
            "db.attrs.host"
        );
        assert_eq!(Reference::runtime(["region"]).to_string(), "runtime.region");
    }
}
