//! Evaluation of components into values
//!
//! The diff scheduler runs two evaluators over the same component tree:
//! one producing the desired values (target) and one reading the observed
//! state from the backend. Both see the environment of the build level the
//! component is declared in, holding the runtime config of that build and
//! the values of siblings evaluated so far.

use crate::component::{Build, Component, Expr, ResourceComponent};
use crate::context::Context;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::resource::ResourceApi;
use crate::selector::Selector;
use crate::value::{Reference, Resource, Unknown, Value};

/// Turns one component into a value
pub trait Evaluator: Send + Sync {
    /// Evaluate `component` at `selector` against its enclosing environment
    ///
    /// For a build, the returned value must be a `Value::Environment`
    /// holding the build's evaluated runtime config; its children are
    /// filled in as they are evaluated.
    fn eval(
        &self,
        ctx: &Context,
        env: &Environment,
        selector: &Selector,
        component: &Component,
    ) -> Result<Value>;
}

/// Evaluate an expression, leaving unresolvable references as unknowns
pub fn evaluate(expr: &Expr, env: &Environment) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Map(m) => Value::Map(
            m.iter()
                .map(|(k, e)| (k.clone(), evaluate(e, env)))
                .collect(),
        ),
        Expr::List(l) => Value::List(l.iter().map(|e| evaluate(e, env)).collect()),
        Expr::Reference(reference) => lookup(reference, env),
        Expr::Immutable(e) => Value::immutable(evaluate(e, env)),
    }
}

/// Value a reference points at, or an unknown if it is not available
pub(crate) fn lookup(reference: &Reference, env: &Environment) -> Value {
    let found = match reference {
        Reference::Component { alias, path } => env
            .get(alias)
            .and_then(|value| navigate(value, path)),
        Reference::Runtime { path } => navigate(&env.runtime, path),
    };
    match found {
        Some(value) if value.is_known() => value,
        _ => Value::Unknown(Unknown::new(reference.clone())),
    }
}

fn navigate(value: &Value, path: &[String]) -> Option<Value> {
    let Some((head, rest)) = path.split_first() else {
        return Some(value.clone());
    };
    match value {
        Value::Resource(r) => {
            let field = match head.as_str() {
                "identifier" => r.identifier.clone(),
                "config" => r.config.clone(),
                "attrs" => r.attrs.clone(),
                "exists" => Value::Bool(r.exists),
                _ => return None,
            };
            navigate(&field, rest)
        }
        Value::Environment(env) => navigate(env.get(head)?, rest),
        Value::Map(m) => navigate(m.get(head)?, rest),
        Value::List(l) => navigate(l.get(head.parse::<usize>().ok()?)?, rest),
        Value::Immutable(inner) => navigate(inner, path),
        _ => None,
    }
}

fn runtime_of(build: &Build, env: &Environment) -> Value {
    build
        .runtime_config
        .as_ref()
        .map_or(Value::Nil, |expr| evaluate(expr, env))
}

/// Produces the desired value of each component
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetEvaluator;

impl TargetEvaluator {
    fn resource(component: &ResourceComponent, env: &Environment, selector: &Selector) -> Resource {
        let mut resource = Resource {
            provider: component.provider.clone(),
            kind: component.kind.clone(),
            identifier: evaluate(&component.identifier, env),
            config: evaluate(&component.config, env),
            attrs: Value::Unknown(Unknown::new(Reference::component(
                selector.name(),
                ["attrs"],
            ))),
            exists: true,
        };
        if !component.exists {
            resource = resource.absent();
        }
        resource
    }
}

impl Evaluator for TargetEvaluator {
    fn eval(
        &self,
        ctx: &Context,
        env: &Environment,
        selector: &Selector,
        component: &Component,
    ) -> Result<Value> {
        ctx.check()?;
        Ok(match component {
            Component::Resource(r) => Value::from(Self::resource(r, env, selector)),
            Component::Build(b) => Value::Environment(Box::new(Environment::new(runtime_of(b, env)))),
        })
    }
}

/// Reads the observed state of each component from a backend
#[derive(Debug, Clone)]
pub struct ObservedEvaluator<A> {
    api: A,
}

impl<A: ResourceApi> ObservedEvaluator<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }
}

impl<A: ResourceApi> Evaluator for ObservedEvaluator<A> {
    fn eval(
        &self,
        ctx: &Context,
        env: &Environment,
        selector: &Selector,
        component: &Component,
    ) -> Result<Value> {
        ctx.check()?;
        let component = match component {
            Component::Resource(r) => r,
            Component::Build(b) => {
                return Ok(Value::Environment(Box::new(Environment::new(runtime_of(b, env)))));
            }
        };

        let probe = Resource {
            provider: component.provider.clone(),
            kind: component.kind.clone(),
            identifier: evaluate(&component.identifier, env),
            config: Value::Nil,
            attrs: Value::Nil,
            exists: true,
        };
        if !probe.identifier.is_known() {
            // Depends on a sibling that does not exist yet, so neither can this
            log::debug!("{selector}: identifier not resolvable, treating as absent");
            return Ok(Value::from(probe.absent()));
        }

        match self.api.get_resource(ctx, &probe) {
            Ok(mut observed) => {
                observed.exists = true;
                Ok(Value::from(observed))
            }
            Err(e) if e.is_not_found() => {
                log::debug!("{selector}: {} not found", probe.address());
                Ok(Value::from(probe.absent()))
            }
            Err(source) => Err(Error::Backend {
                selector: selector.clone(),
                operation: "get",
                source,
            }),
        }
    }
}
