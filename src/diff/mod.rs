//! Typed structural diffs between observed and desired values
//!
//! A [`Diff`] mirrors the shape of the [`Value`]s it compares. Leaves carry
//! their own [`Operation`]; containers derive theirs from their children
//! with [`aggregate`], so a container's operation can never disagree with
//! what is inside it.

mod compute;
mod tree;

pub use compute::diff;
pub use tree::DiffTree;

use crate::environment::Environment;
use crate::value::{Provider, Resource, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What has to happen to move a value from `from` to `to`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Noop,
    Create,
    Update,
    Delete,
    /// Cannot be decided until an unknown value is resolved
    Unknown,
}

impl Operation {
    pub fn is_noop(self) -> bool {
        self == Self::Noop
    }

    /// Symbol used in plan listings
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Noop => " ",
            Self::Create => "+",
            Self::Update => "~",
            Self::Delete => "-",
            Self::Unknown => "?",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Noop => "noop",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Combine child operations into a container operation
///
/// Any `Unknown` child makes the container `Unknown`. Otherwise a
/// container is `Create` only if every child is `Create`, `Delete` only if
/// every child is `Delete`, `Noop` if every child is `Noop` (or there are
/// none), and `Update` in every other case.
pub fn aggregate<I>(operations: I) -> Operation
where
    I: IntoIterator<Item = Operation>,
{
    let mut seen: Option<Operation> = None;
    let mut mixed = false;
    for op in operations {
        if op == Operation::Unknown {
            return Operation::Unknown;
        }
        match seen {
            None => seen = Some(op),
            Some(prev) if prev != op => mixed = true,
            Some(_) => {}
        }
    }
    if mixed {
        Operation::Update
    } else {
        seen.unwrap_or(Operation::Noop)
    }
}

/// Diff of a scalar value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarDiff<T> {
    pub from: T,
    pub to: T,
    pub operation: Operation,
}

/// Key-by-key diff of two maps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapDiff {
    pub from: BTreeMap<String, Value>,
    pub to: BTreeMap<String, Value>,
    pub entries: BTreeMap<String, Diff>,
}

/// Index-by-index diff of two lists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDiff {
    pub from: Vec<Value>,
    pub to: Vec<Value>,
    pub entries: Vec<Diff>,
}

/// Diff of a managed resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDiff {
    pub from: Resource,
    pub to: Resource,
    /// Not part of the resource operation; identifiers are not expected to change
    pub identifier: Diff,
    pub config: Diff,
    pub exists: Diff,
}

impl ResourceDiff {
    /// Unknown wins, then a change of existence, then the container rule
    pub fn operation(&self) -> Operation {
        let exists = self.exists.operation();
        let config = self.config.operation();
        if exists == Operation::Unknown || config == Operation::Unknown {
            return Operation::Unknown;
        }
        match exists {
            Operation::Create | Operation::Delete => exists,
            _ => aggregate([exists, config]),
        }
    }

    /// An update touching an immutable field must delete and recreate
    pub fn requires_replacement(&self) -> bool {
        self.operation() == Operation::Update && self.config.has_immutable_change()
    }
}

/// Diff of an immutable value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmutableDiff {
    pub from: Value,
    pub to: Value,
    pub inner: Box<Diff>,
}

/// Diff where at least one side is not resolved yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownDiff {
    pub from: Value,
    pub to: Value,
}

/// Diff of a nested build, filled in as its children finish
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDiff {
    pub from: Environment,
    pub to: Environment,
    pub children: BTreeMap<String, Diff>,
}

impl EnvironmentDiff {
    pub fn new(from: Environment, to: Environment) -> Self {
        Self {
            from,
            to,
            children: BTreeMap::new(),
        }
    }

    pub fn operation(&self) -> Operation {
        aggregate(self.children.values().map(Diff::operation))
    }
}

/// Result of comparing two values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "diff", rename_all = "snake_case")]
pub enum Diff {
    /// Both sides nil
    Nil,
    String(ScalarDiff<String>),
    Bool(ScalarDiff<bool>),
    Identifier(ScalarDiff<String>),
    File(ScalarDiff<String>),
    Provider(ScalarDiff<Provider>),
    Map(MapDiff),
    List(ListDiff),
    Resource(Box<ResourceDiff>),
    Immutable(ImmutableDiff),
    Unknown(UnknownDiff),
    Environment(Box<EnvironmentDiff>),
}

impl Diff {
    /// Operation of this diff, aggregated for containers
    pub fn operation(&self) -> Operation {
        match self {
            Self::Nil => Operation::Noop,
            Self::String(d) | Self::Identifier(d) | Self::File(d) => d.operation,
            Self::Bool(d) => d.operation,
            Self::Provider(d) => d.operation,
            Self::Map(d) => aggregate(d.entries.values().map(Self::operation)),
            Self::List(d) => aggregate(d.entries.iter().map(Self::operation)),
            Self::Resource(d) => d.operation(),
            Self::Immutable(d) => d.inner.operation(),
            Self::Unknown(_) => Operation::Unknown,
            Self::Environment(d) => d.operation(),
        }
    }

    /// The observed side
    pub fn from(&self) -> Value {
        match self {
            Self::Nil => Value::Nil,
            Self::String(d) => Value::String(d.from.clone()),
            Self::Bool(d) => Value::Bool(d.from),
            Self::Identifier(d) => Value::Identifier(d.from.clone()),
            Self::File(d) => Value::File(d.from.clone()),
            Self::Provider(d) => Value::Provider(d.from.clone()),
            Self::Map(d) => Value::Map(d.from.clone()),
            Self::List(d) => Value::List(d.from.clone()),
            Self::Resource(d) => Value::Resource(Box::new(d.from.clone())),
            Self::Immutable(d) => d.from.clone(),
            Self::Unknown(d) => d.from.clone(),
            Self::Environment(d) => Value::Environment(Box::new(d.from.clone())),
        }
    }

    /// The desired side
    pub fn to(&self) -> Value {
        match self {
            Self::Nil => Value::Nil,
            Self::String(d) => Value::String(d.to.clone()),
            Self::Bool(d) => Value::Bool(d.to),
            Self::Identifier(d) => Value::Identifier(d.to.clone()),
            Self::File(d) => Value::File(d.to.clone()),
            Self::Provider(d) => Value::Provider(d.to.clone()),
            Self::Map(d) => Value::Map(d.to.clone()),
            Self::List(d) => Value::List(d.to.clone()),
            Self::Resource(d) => Value::Resource(Box::new(d.to.clone())),
            Self::Immutable(d) => d.to.clone(),
            Self::Unknown(d) => d.to.clone(),
            Self::Environment(d) => Value::Environment(Box::new(d.to.clone())),
        }
    }

    /// Whether any immutable value below this diff changes
    pub fn has_immutable_change(&self) -> bool {
        match self {
            Self::Immutable(d) => !d.inner.operation().is_noop(),
            Self::Map(d) => d.entries.values().any(Self::has_immutable_change),
            Self::List(d) => d.entries.iter().any(Self::has_immutable_change),
            _ => false,
        }
    }

    /// Whether this diff, and everything below it, is a no-op
    pub fn is_noop(&self) -> bool {
        self.operation().is_noop()
    }

    pub fn as_resource(&self) -> Option<&ResourceDiff> {
        match self {
            Self::Resource(d) => Some(&**d),
            _ => None,
        }
    }

    pub fn as_environment(&self) -> Option<&EnvironmentDiff> {
        match self {
            Self::Environment(d) => Some(&**d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Operation::{Create, Delete, Noop, Unknown, Update};

    #[test]
    fn test_aggregate_all_or_nothing() {
        assert_eq!(aggregate([Create, Create]), Create);
        assert_eq!(aggregate([Delete, Delete]), Delete);
        assert_eq!(aggregate([Create, Delete]), Update);
        assert_eq!(aggregate([Create, Noop]), Update);
        assert_eq!(aggregate([Noop, Noop]), Noop);
        assert_eq!(aggregate([Update]), Update);
        assert_eq!(aggregate(Vec::new()), Noop);
    }

    #[test]
    fn test_aggregate_unknown_wins() {
        assert_eq!(aggregate([Create, Unknown, Delete]), Unknown);
        assert_eq!(aggregate([Noop, Unknown]), Unknown);
    }

    #[test]
    fn test_empty_environment_is_noop() {
        assert_eq!(EnvironmentDiff::default().operation(), Noop);
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Create.to_string(), "create");
        assert_eq!(Delete.symbol(), "-");
    }
}
