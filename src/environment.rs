//! Resolved value trees, one level per build

use crate::error::{Error, Result};
use crate::selector::Selector;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolved values of one build level
///
/// Nested builds appear as `Value::Environment` entries, so a whole run
/// is a single tree addressed by [`Selector`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Evaluated runtime config of the build owning this level
    #[serde(default)]
    pub runtime: Value,
    /// Child alias to resolved value
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl Environment {
    /// An empty level with the given runtime config
    pub fn new(runtime: Value) -> Self {
        Self {
            runtime,
            values: BTreeMap::new(),
        }
    }

    /// Value of a direct child
    pub fn get(&self, alias: &str) -> Option<&Value> {
        self.values.get(alias)
    }

    /// The level `selector` lives in
    pub fn scope(&self, selector: &Selector) -> Result<&Self> {
        let mut env = self;
        for name in selector.scope() {
            env = match env.values.get(name) {
                Some(Value::Environment(nested)) => &**nested,
                _ => return Err(Error::SelectorNotFound(selector.clone())),
            };
        }
        Ok(env)
    }

    /// Mutable access to the level `selector` lives in
    pub fn scope_mut(&mut self, selector: &Selector) -> Result<&mut Self> {
        let mut env = self;
        for name in selector.scope() {
            env = match env.values.get_mut(name) {
                Some(Value::Environment(nested)) => &mut **nested,
                _ => return Err(Error::SelectorNotFound(selector.clone())),
            };
        }
        Ok(env)
    }

    /// Value stored at `selector`
    pub fn select(&self, selector: &Selector) -> Result<&Value> {
        self.scope(selector)?
            .values
            .get(selector.name())
            .ok_or_else(|| Error::SelectorNotFound(selector.clone()))
    }

    /// Nested environment of the build at `selector`
    pub fn select_environment(&self, selector: &Selector) -> Result<&Self> {
        match self.select(selector)? {
            Value::Environment(env) => Ok(&**env),
            other => Err(Error::TypeMismatch {
                expected: "environment",
                found: other.kind(),
            }),
        }
    }

    /// Whether a value is stored at `selector`
    pub fn contains(&self, selector: &Selector) -> bool {
        self.select(selector).is_ok()
    }

    /// Store a value; the enclosing levels must already exist
    pub fn insert(&mut self, selector: &Selector, value: Value) -> Result<Option<Value>> {
        Ok(self
            .scope_mut(selector)?
            .values
            .insert(selector.name().to_string(), value))
    }
}
