//! The desired component tree
//!
//! A [`Spec`] is what a blueprint interpreter hands to the engine: named
//! components (resources or nested builds) plus the data dependencies
//! between them. It is immutable once built.

use crate::error::{Error, Result};
use crate::selector::Selector;
use crate::value::{Provider, Reference, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An unevaluated value that may reference other components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "expr", content = "value", rename_all = "snake_case")]
pub enum Expr {
    Literal(Value),
    Map(BTreeMap<String, Expr>),
    List(Vec<Expr>),
    Reference(Reference),
    Immutable(Box<Expr>),
}

impl Expr {
    /// Build a map expression from key/expression pairs
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Expr)>,
        K: Into<String>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Reference to a sibling component property
    pub fn reference<I, S>(alias: impl Into<String>, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Reference(Reference::component(alias, path))
    }

    /// Reference to the enclosing build's runtime config
    pub fn runtime<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Reference(Reference::runtime(path))
    }

    pub fn immutable(expr: Expr) -> Self {
        Self::Immutable(Box::new(expr))
    }

    /// Every reference in this expression
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Self::Literal(_) => {}
            Self::Map(m) => m.values().for_each(|e| e.collect_references(out)),
            Self::List(l) => l.iter().for_each(|e| e.collect_references(out)),
            Self::Reference(r) => out.push(r),
            Self::Immutable(e) => e.collect_references(out),
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Self::Literal(Value::from(s))
    }
}

/// Desired declaration of a single resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceComponent {
    pub provider: Provider,
    pub kind: String,
    pub identifier: Expr,
    pub config: Expr,
    /// `false` asks for the resource to be removed
    #[serde(default = "default_exists")]
    pub exists: bool,
}

fn default_exists() -> bool {
    true
}

impl ResourceComponent {
    pub fn new(provider: &str, kind: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            provider: Provider::new(provider),
            kind: kind.into(),
            identifier: Expr::Literal(Value::Identifier(identifier.into())),
            config: Expr::Map(BTreeMap::new()),
            exists: true,
        }
    }

    pub fn with_config(mut self, config: Expr) -> Self {
        self.config = config;
        self
    }

    pub fn with_identifier(mut self, identifier: Expr) -> Self {
        self.identifier = identifier;
        self
    }

    /// Same declaration, requesting removal
    pub fn absent(mut self) -> Self {
        self.exists = false;
        self
    }
}

/// A nested blueprint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub spec: Spec,
    /// Inputs passed to the nested blueprint, evaluated in the parent scope
    #[serde(default)]
    pub runtime_config: Option<Expr>,
    /// `false` removes everything the build contains
    #[serde(default = "default_exists")]
    pub exists: bool,
}

impl Build {
    pub fn new(spec: Spec) -> Self {
        Self {
            spec,
            runtime_config: None,
            exists: true,
        }
    }

    pub fn with_runtime_config(mut self, config: Expr) -> Self {
        self.runtime_config = Some(config);
        self
    }

    pub fn absent(mut self) -> Self {
        self.exists = false;
        self
    }
}

/// A node of the desired tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "component", rename_all = "snake_case")]
pub enum Component {
    Resource(ResourceComponent),
    Build(Build),
}

impl Component {
    pub fn exists(&self) -> bool {
        match self {
            Self::Resource(r) => r.exists,
            Self::Build(b) => b.exists,
        }
    }

    pub fn is_build(&self) -> bool {
        matches!(self, Self::Build(_))
    }

    /// References evaluated in the scope this component is declared in
    pub fn references(&self) -> Vec<&Reference> {
        match self {
            Self::Resource(r) => {
                let mut refs = r.identifier.references();
                refs.extend(r.config.references());
                refs
            }
            Self::Build(b) => b
                .runtime_config
                .as_ref()
                .map(Expr::references)
                .unwrap_or_default(),
        }
    }
}

impl From<ResourceComponent> for Component {
    fn from(r: ResourceComponent) -> Self {
        Self::Resource(r)
    }
}

impl From<Build> for Component {
    fn from(b: Build) -> Self {
        Self::Build(b)
    }
}

/// Components of one build level and their data dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    #[serde(default)]
    pub components: BTreeMap<String, Component>,
    /// Alias to the sibling aliases it reads from
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<String>>,
}

impl Spec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component
    pub fn with(mut self, alias: impl Into<String>, component: impl Into<Component>) -> Self {
        self.components.insert(alias.into(), component.into());
        self
    }

    /// Declare that `alias` reads from each of `dependencies`
    pub fn depends_on<I, S>(mut self, alias: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.dependencies.entry(alias.into()).or_default();
        for dep in dependencies {
            let dep = dep.into();
            if !entry.contains(&dep) {
                entry.push(dep);
            }
        }
        self
    }

    /// Fill the dependency map from references, at every level
    pub fn infer_dependencies(mut self) -> Self {
        let mut inferred: Vec<(String, Vec<String>)> = Vec::new();
        for (alias, component) in &self.components {
            let deps: BTreeSet<String> = component
                .references()
                .into_iter()
                .filter_map(Reference::alias)
                .filter(|dep| *dep != alias.as_str() && self.components.contains_key(*dep))
                .map(str::to_string)
                .collect();
            if !deps.is_empty() {
                inferred.push((alias.clone(), deps.into_iter().collect()));
            }
        }
        for (alias, deps) in inferred {
            self = self.depends_on(alias, deps);
        }
        for component in self.components.values_mut() {
            if let Component::Build(build) = component {
                build.spec = std::mem::take(&mut build.spec).infer_dependencies();
            }
        }
        self
    }

    pub fn get(&self, alias: &str) -> Option<&Component> {
        self.components.get(alias)
    }

    /// The `Spec` that `selector` is declared in
    pub fn scope(&self, selector: &Selector) -> Result<&Self> {
        let mut spec = self;
        for name in selector.scope() {
            spec = match spec.components.get(name) {
                Some(Component::Build(build)) => &build.spec,
                _ => return Err(Error::SelectorNotFound(selector.clone())),
            };
        }
        Ok(spec)
    }

    /// Component at `selector`
    pub fn select(&self, selector: &Selector) -> Result<&Component> {
        self.scope(selector)?
            .components
            .get(selector.name())
            .ok_or_else(|| Error::SelectorNotFound(selector.clone()))
    }

    /// Declared dependencies of `alias`
    pub fn dependencies_of(&self, alias: &str) -> &[String] {
        self.dependencies.get(alias).map_or(&[][..], Vec::as_slice)
    }

    /// Siblings that declare a dependency on `alias`
    pub fn dependents_of(&self, alias: &str) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|(_, deps)| deps.iter().any(|d| d == alias))
            .map(|(dependent, _)| dependent.clone())
            .collect()
    }

    /// Check that every dependency names a sibling
    pub fn validate(&self, scope: Option<&Selector>) -> Result<()> {
        for (alias, deps) in &self.dependencies {
            let selector = scope.map_or_else(|| Selector::new(alias), |s| s.child(alias));
            if !self.components.contains_key(alias) {
                return Err(Error::SelectorNotFound(selector));
            }
            if let Some(missing) = deps.iter().find(|d| !self.components.contains_key(*d)) {
                return Err(Error::MissingDependency {
                    selector,
                    dependency: missing.clone(),
                });
            }
        }
        Ok(())
    }
}
