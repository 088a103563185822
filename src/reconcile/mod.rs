//! Reconciliation: turning diffs into backend calls
//!
//! [`ReconcileEngine`] handles a single node; [`Reconciler`] walks a whole
//! diff tree in dependency order.

mod executor;

pub use executor::Reconciler;

use crate::context::Context;
use crate::diff::{self, Diff, Operation, ResourceDiff};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::mask::{Field, derive_mask};
use crate::resolve::resolve;
use crate::resource::{ApiError, ResourceApi};
use crate::selector::Selector;
use crate::types::Action;
use crate::value::{Resource, Value};

/// Applies the diff of one node through a [`ResourceApi`]
#[derive(Debug, Clone)]
pub struct ReconcileEngine<A> {
    api: A,
}

impl<A: ResourceApi> ReconcileEngine<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Reconcile `diff` for the node at `selector`
    ///
    /// `env` is the enclosing level of the reconcile tree. Returns the value
    /// to store for the node (as returned by the backend) and what was done.
    pub fn reconcile(
        &self,
        ctx: &Context,
        env: &Environment,
        selector: &Selector,
        diff: &Diff,
    ) -> Result<(Value, Action)> {
        ctx.check()?;
        match diff {
            Diff::Resource(d) => self.reconcile_resource(ctx, env, selector, d),
            Diff::Environment(d) => {
                if let Some(existing @ Value::Environment(_)) = env.get(selector.name()) {
                    return Ok((existing.clone(), Action::Environment));
                }
                let runtime = resolve(&d.to.runtime, env)?;
                Ok((
                    Value::Environment(Box::new(Environment::new(runtime))),
                    Action::Environment,
                ))
            }
            other => Err(Error::TypeMismatch {
                expected: "resource",
                found: other.to().kind(),
            }),
        }
    }

    fn reconcile_resource(
        &self,
        ctx: &Context,
        env: &Environment,
        selector: &Selector,
        d: &ResourceDiff,
    ) -> Result<(Value, Action)> {
        let mut operation = d.operation();
        let mut d = d.clone();
        if operation == Operation::Unknown {
            let to = resolve(&Value::from(d.to.clone()), env)?;
            let recomputed = diff::diff(&Value::from(d.from.clone()), &to)?;
            let Diff::Resource(resolved) = recomputed else {
                return Err(Error::TypeMismatch {
                    expected: "resource",
                    found: recomputed.to().kind(),
                });
            };
            d = *resolved;
            operation = d.operation();
            log::debug!("{selector}: resolved to {operation}");
        }

        match operation {
            Operation::Noop => Ok((Value::from(d.from), Action::Unchanged)),
            Operation::Create => {
                let to = desired(&d.to, env)?;
                log::info!("{selector}: creating {}", to.address());
                let created = self
                    .api
                    .create_resource(ctx, &to)
                    .map_err(|e| backend(selector, "create", e))?;
                Ok((Value::from(created), Action::Created))
            }
            Operation::Delete => {
                let mut to = d.to.clone();
                if !to.identifier.is_known() {
                    to.identifier = d.from.identifier.clone();
                }
                log::info!("{selector}: deleting {}", to.address());
                self.api
                    .delete_resource(ctx, &to)
                    .map_err(|e| backend(selector, "delete", e))?;
                Ok((Value::from(to), Action::Deleted))
            }
            Operation::Update => {
                let to = desired(&d.to, env)?;
                if d.requires_replacement() {
                    log::info!("{selector}: replacing {}", to.address());
                    self.api
                        .delete_resource(ctx, &d.from)
                        .map_err(|e| backend(selector, "delete", e))?;
                    let created = self
                        .api
                        .create_resource(ctx, &to)
                        .map_err(|e| backend(selector, "create", e))?;
                    return Ok((Value::from(created), Action::Replaced));
                }
                let mask: Vec<Field> = derive_mask(&Diff::Resource(Box::new(d.clone())));
                log::info!(
                    "{selector}: updating {} ({})",
                    to.address(),
                    Field::paths(&mask).join(", ")
                );
                let updated = self
                    .api
                    .update_resource(ctx, &to, &mask)
                    .map_err(|e| backend(selector, "update", e))?;
                Ok((Value::from(updated), Action::Updated))
            }
            Operation::Unknown => Err(Error::unresolved(selector, "diff still unknown after resolution")),
        }
    }
}

/// The desired resource with every reference resolved and attrs cleared
fn desired(to: &Resource, env: &Environment) -> Result<Resource> {
    match resolve(&Value::from(to.clone()), env)? {
        Value::Resource(r) => Ok(Resource {
            attrs: Value::Nil,
            ..*r
        }),
        other => Err(Error::TypeMismatch {
            expected: "resource",
            found: other.kind(),
        }),
    }
}

fn backend(selector: &Selector, operation: &'static str, source: ApiError) -> Error {
    Error::Backend {
        selector: selector.clone(),
        operation,
        source,
    }
}
