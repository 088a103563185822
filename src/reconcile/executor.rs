//! Reconcile scheduler - applies a diff tree in dependency order

use super::ReconcileEngine;
use crate::component::{Component, Spec};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::controller::children_of;
use crate::diff::{Diff, DiffTree, Operation};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::resource::ResourceApi;
use crate::schedule::{self, Process, Visit};
use crate::selector::Selector;
use crate::types::{ApplyReport, ApplySummary};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Walks a completed diff tree and reconciles every node
///
/// Dependencies come from the component tree, directions from the
/// recorded operations: a node whose diff is a delete waits on its
/// dependents instead of its dependencies.
pub struct Reconciler<'a, A> {
    spec: &'a Spec,
    diffs: &'a DiffTree,
    engine: &'a ReconcileEngine<A>,
    env: Mutex<Environment>,
    summary: Mutex<ApplySummary>,
}

impl<'a, A: ResourceApi> Reconciler<'a, A> {
    pub fn new(spec: &'a Spec, diffs: &'a DiffTree, engine: &'a ReconcileEngine<A>) -> Self {
        Self {
            spec,
            diffs,
            engine,
            env: Mutex::new(Environment::new(diffs.root.to.runtime.clone())),
            summary: Mutex::new(ApplySummary::default()),
        }
    }

    /// Reconcile the whole tree
    pub fn run(self, ctx: &Context, config: &EngineConfig) -> Result<ApplyReport> {
        let seeds = Self::children(self.spec, None, &self.diffs.root.children);
        log::info!("reconciling {} top-level components", seeds.len());

        let status = schedule::run(&self, ctx, config, seeds)?;

        let mut summary = self.summary.into_inner().unwrap_or_else(PoisonError::into_inner);
        summary.failed = status.failures.len();
        log::info!(
            "reconciled: {} created, {} updated, {} replaced, {} deleted, {} unchanged, {} failed",
            summary.created,
            summary.updated,
            summary.replaced,
            summary.deleted,
            summary.unchanged,
            summary.failed
        );
        Ok(ApplyReport {
            environment: self.env.into_inner().unwrap_or_else(PoisonError::into_inner),
            summary,
            status,
        })
    }

    /// Children with a recorded diff, ordered by the declared dependencies
    fn children(
        spec: &Spec,
        scope: Option<&Selector>,
        diffs: &BTreeMap<String, Diff>,
    ) -> Vec<(Selector, Vec<Selector>)> {
        let deleting = |alias: &str| diffs.get(alias).is_some_and(|d| d.operation() == Operation::Delete);
        children_of(spec, scope, deleting)
            .into_iter()
            .filter(|(s, _)| diffs.contains_key(s.name()))
            .map(|(s, deps)| {
                let deps = deps
                    .into_iter()
                    .filter(|d| diffs.contains_key(d.name()))
                    .collect();
                (s, deps)
            })
            .collect()
    }
}

impl<A: ResourceApi> Process for Reconciler<'_, A> {
    fn visit(&self, ctx: &Context, selector: &Selector) -> Result<Visit> {
        let diff = self
            .diffs
            .get(selector)
            .ok_or_else(|| Error::SelectorNotFound(selector.clone()))?;
        let scope = lock(&self.env).scope(selector)?.clone();

        let (value, action) = self.engine.reconcile(ctx, &scope, selector, diff)?;
        lock(&self.env).insert(selector, value)?;
        lock(&self.summary).add_action(action);

        match (diff, self.spec.select(selector)?) {
            (Diff::Environment(env_diff), Component::Build(build)) => Ok(Visit::Expand(
                Self::children(&build.spec, Some(selector), &env_diff.children),
            )),
            _ => Ok(Visit::Done),
        }
    }

    fn finish(&self, _ctx: &Context, selector: &Selector) -> Result<()> {
        log::debug!("{selector}: build reconciled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Build, Expr, ResourceComponent};
    use crate::controller::Controller;
    use crate::eval::{ObservedEvaluator, TargetEvaluator};
    use crate::memory::{Call, MemoryApi};
    use crate::value::{Provider, Resource, Value};

    fn bucket(name: &str) -> ResourceComponent {
        ResourceComponent::new("cloud", "bucket", name)
            .with_config(Expr::map([("name", Expr::from(name))]))
    }

    fn apply(spec: &Spec, api: &MemoryApi) -> ApplyReport {
        let ctx = Context::new();
        let config = EngineConfig::default();
        let observed = ObservedEvaluator::new(api.clone());
        let report = Controller::new(spec, &TargetEvaluator, &observed)
            .run(&ctx, &config)
            .unwrap();
        let engine = ReconcileEngine::new(api.clone());
        Reconciler::new(spec, &report.diff, &engine)
            .run(&ctx, &config)
            .unwrap()
    }

    fn position(calls: &[Call], call: &Call) -> usize {
        calls.iter().position(|c| c == call).unwrap()
    }

    #[test]
    fn test_dependency_created_first() {
        let api = MemoryApi::new();
        let spec = Spec::new()
            .with("bucket", bucket("assets"))
            .with(
                "policy",
                ResourceComponent::new("cloud", "policy", "p").with_config(Expr::map([(
                    "target",
                    Expr::reference("bucket", ["attrs", "id"]),
                )])),
            )
            .infer_dependencies();

        let report = apply(&spec, &api);
        assert!(report.is_success());
        assert_eq!(report.summary.created, 2);

        let calls = api.mutations();
        assert!(
            position(&calls, &Call::Create("cloud/bucket/assets".into()))
                < position(&calls, &Call::Create("cloud/policy/p".into()))
        );
        let policy = api.resource("cloud/policy/p").unwrap();
        assert_eq!(policy.config, Value::map([("target", Value::from("bucket/assets"))]));
    }

    #[test]
    fn test_delete_waits_for_dependent() {
        let api = MemoryApi::new();
        api.seed(
            Resource::new(Provider::new("cloud"), "bucket", "x")
                .with_config(Value::map([("name", Value::from("x"))])),
        );
        let spec = Spec::new()
            .with("x", bucket("x").absent())
            .with("y", bucket("y"))
            .depends_on("y", ["x"]);

        let report = apply(&spec, &api);
        assert!(report.is_success());
        assert_eq!(report.summary.deleted, 1);

        let calls = api.mutations();
        assert!(
            position(&calls, &Call::Create("cloud/bucket/y".into()))
                < position(&calls, &Call::Delete("cloud/bucket/x".into()))
        );
    }

    #[test]
    fn test_nested_build_environment_is_populated() {
        let api = MemoryApi::new();
        let spec = Spec::new().with(
            "site",
            Build::new(Spec::new().with("a", bucket("a")))
                .with_runtime_config(Expr::map([("env", Expr::from("prod"))])),
        );

        let report = apply(&spec, &api);
        assert!(report.is_success());

        let site = report
            .environment
            .select_environment(&Selector::new("site"))
            .unwrap();
        assert_eq!(site.runtime, Value::map([("env", Value::from("prod"))]));
        assert!(site.get("a").unwrap().as_resource().unwrap().attrs.is_known());
    }

    #[test]
    fn test_failure_blocks_dependents_but_not_siblings() {
        let api = MemoryApi::new();
        api.fail_on("cloud/bucket/a");
        let spec = Spec::new()
            .with("a", bucket("a"))
            .with(
                "b",
                bucket("b").with_config(Expr::map([("peer", Expr::reference("a", ["attrs", "id"]))])),
            )
            .with("c", bucket("c"))
            .infer_dependencies();

        let report = apply(&spec, &api);
        assert!(!report.is_success());
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.created, 1);
        assert_eq!(report.status.blocked, vec![Selector::new("b")]);
        assert!(matches!(
            report.first_error(),
            Some(Error::Backend { operation: "create", .. })
        ));
        assert!(api.resource("cloud/bucket/c").is_some());
    }
}
