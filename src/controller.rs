//! Diff scheduler
//!
//! Walks the component tree in dependency order, evaluating each node
//! twice (desired and observed), diffing the two values and recording the
//! result in a [`DiffTree`]. Builds are expanded into their children on
//! first visit and their environment diff is finalized once every child
//! is done.

use crate::component::{Component, Spec};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::diff::{self, Diff, DiffTree, EnvironmentDiff};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::eval::Evaluator;
use crate::schedule::{self, Process, Visit};
use crate::selector::Selector;
use crate::types::DiffReport;
use crate::value::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Children of one build level with their scheduling dependencies
///
/// A child being deleted waits on the siblings that depend on it, so it is
/// removed only after they are reconciled. Edges from other children onto
/// a deleting sibling are dropped, which keeps the schedule acyclic.
pub(crate) fn children_of(
    spec: &Spec,
    scope: Option<&Selector>,
    deleting: impl Fn(&str) -> bool,
) -> Vec<(Selector, Vec<Selector>)> {
    let select = |alias: &str| scope.map_or_else(|| Selector::new(alias), |s| s.child(alias));
    spec.components
        .keys()
        .map(|alias| {
            let deps: Vec<Selector> = if deleting(alias.as_str()) {
                spec.dependents_of(alias)
                    .iter()
                    .map(|d| select(d.as_str()))
                    .collect()
            } else {
                spec.dependencies_of(alias)
                    .iter()
                    .filter(|d| !deleting(d.as_str()))
                    .map(|d| select(d.as_str()))
                    .collect()
            };
            (select(alias.as_str()), deps)
        })
        .collect()
}

/// Drives the diff phase over one component tree
pub struct Controller<'a> {
    spec: &'a Spec,
    target_eval: &'a dyn Evaluator,
    observed_eval: &'a dyn Evaluator,
    target: Mutex<Environment>,
    observed: Mutex<Environment>,
    diffs: Mutex<DiffTree>,
}

impl<'a> Controller<'a> {
    pub fn new(
        spec: &'a Spec,
        target_eval: &'a dyn Evaluator,
        observed_eval: &'a dyn Evaluator,
    ) -> Self {
        Self {
            spec,
            target_eval,
            observed_eval,
            target: Mutex::new(Environment::default()),
            observed: Mutex::new(Environment::default()),
            diffs: Mutex::new(DiffTree::default()),
        }
    }

    /// Compute the diff of every component
    ///
    /// Top-level components are seeded with their declared dependencies;
    /// deeper levels are added as their builds expand.
    pub fn run(self, ctx: &Context, config: &EngineConfig) -> Result<DiffReport> {
        self.spec.validate(None)?;
        let seeds = children_of(self.spec, None, |alias| {
            self.spec.get(alias).is_some_and(|c| !c.exists())
        });
        log::info!("diffing {} top-level components", seeds.len());

        let status = schedule::run(&self, ctx, config, seeds)?;

        let diff = self.diffs.into_inner().unwrap_or_else(PoisonError::into_inner);
        let target = self.target.into_inner().unwrap_or_else(PoisonError::into_inner);
        let observed = self.observed.into_inner().unwrap_or_else(PoisonError::into_inner);
        Ok(DiffReport {
            diff: DiffTree {
                root: EnvironmentDiff {
                    from: observed.clone(),
                    to: target.clone(),
                    children: diff.root.children,
                },
            },
            target,
            observed,
            status,
        })
    }

    /// Whether `selector` or any enclosing build is declared absent
    fn absent_ancestor(&self, selector: &Selector) -> Result<bool> {
        for ancestor in selector.ancestors() {
            if !self.spec.select(&ancestor)?.exists() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn record(&self, selector: &Selector, from: Value, to: Value, diff: Diff) -> Result<()> {
        lock(&self.observed).insert(selector, from)?;
        lock(&self.target).insert(selector, to)?;
        lock(&self.diffs).insert(selector, diff)
    }
}

impl Process for Controller<'_> {
    fn visit(&self, ctx: &Context, selector: &Selector) -> Result<Visit> {
        if lock(&self.diffs).get(selector).is_some_and(|d| !d.is_noop()) {
            log::debug!("{selector}: diff already recorded");
            return Ok(Visit::Done);
        }

        let component = self.spec.select(selector)?;
        let absent = self.absent_ancestor(selector)?;

        // Evaluate against snapshots so no lock is held across evaluator calls
        let target_scope = lock(&self.target).scope(selector)?.clone();
        let observed_scope = lock(&self.observed).scope(selector)?.clone();
        let mut to = self.target_eval.eval(ctx, &target_scope, selector, component)?;
        let from = self.observed_eval.eval(ctx, &observed_scope, selector, component)?;

        match component {
            Component::Resource(_) => {
                if absent && let Value::Resource(r) = &to {
                    to = Value::from(r.absent());
                }
                let d = diff::diff(&from, &to)?;
                log::debug!("{selector}: {}", d.operation());
                self.record(selector, from, to, d)?;
                Ok(Visit::Done)
            }
            Component::Build(build) => {
                let (Value::Environment(observed_env), Value::Environment(target_env)) = (&from, &to)
                else {
                    return Err(Error::TypeMismatch {
                        expected: "environment",
                        found: if from.as_environment().is_some() { to.kind() } else { from.kind() },
                    });
                };
                let d = Diff::Environment(Box::new(EnvironmentDiff::new(
                    (**observed_env).clone(),
                    (**target_env).clone(),
                )));
                self.record(selector, from, to, d)?;

                build.spec.validate(Some(selector))?;
                let deleting_build = absent || !build.exists;
                let children = children_of(&build.spec, Some(selector), |alias| {
                    deleting_build || build.spec.get(alias).is_some_and(|c| !c.exists())
                });
                Ok(Visit::Expand(children))
            }
        }
    }

    fn finish(&self, _ctx: &Context, selector: &Selector) -> Result<()> {
        let from = lock(&self.observed).select_environment(selector)?.clone();
        let to = lock(&self.target).select_environment(selector)?.clone();
        let mut diffs = lock(&self.diffs);
        diffs.finish_environment(selector, from, to)?;
        if let Some(d) = diffs.get(selector) {
            log::debug!("{selector}: {}", d.operation());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Build, Expr, ResourceComponent};
    use crate::diff::Operation;
    use crate::eval::{ObservedEvaluator, TargetEvaluator};
    use crate::memory::{Call, MemoryApi};
    use crate::value::{Provider, Resource};

    fn plan(spec: &Spec, api: &MemoryApi) -> DiffReport {
        let observed = ObservedEvaluator::new(api.clone());
        Controller::new(spec, &TargetEvaluator, &observed)
            .run(&Context::new(), &EngineConfig::default())
            .unwrap()
    }

    fn bucket(name: &str) -> ResourceComponent {
        ResourceComponent::new("cloud", "bucket", name)
            .with_config(Expr::map([("name", Expr::from(name))]))
    }

    #[test]
    fn test_children_of_reverses_edges_for_deletes() {
        let spec = Spec::new()
            .with("x", bucket("x").absent())
            .with("y", bucket("y"))
            .depends_on("y", ["x"]);

        let children = children_of(&spec, None, |alias| alias == "x");
        assert_eq!(
            children,
            vec![
                (Selector::new("x"), vec![Selector::new("y")]),
                (Selector::new("y"), vec![]),
            ]
        );
    }

    #[test]
    fn test_new_resource_is_create() {
        let spec = Spec::new().with("bucket", bucket("foo"));
        let report = plan(&spec, &MemoryApi::new());

        assert!(report.is_success());
        let d = report.diff.get(&Selector::new("bucket")).unwrap();
        assert_eq!(d.operation(), Operation::Create);
        assert!(report.target.contains(&Selector::new("bucket")));
    }

    #[test]
    fn test_unknown_reference_to_new_sibling() {
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
        let report = plan(&spec, &MemoryApi::new());

        assert_eq!(
            report.diff.get(&Selector::new("policy")).unwrap().operation(),
            Operation::Unknown
        );
    }

    #[test]
    fn test_nested_build_diff_is_assembled_from_children() {
        let api = MemoryApi::new();
        api.seed(
            Resource::new(Provider::new("cloud"), "bucket", "a")
                .with_config(Value::map([("name", Value::from("a"))])),
        );
        let spec = Spec::new().with(
            "site",
            Build::new(Spec::new().with("a", bucket("a")).with("b", bucket("b"))),
        );
        let report = plan(&spec, &api);

        let site = Selector::new("site");
        assert_eq!(
            report.diff.get(&site.child("a")).unwrap().operation(),
            Operation::Noop
        );
        assert_eq!(
            report.diff.get(&site.child("b")).unwrap().operation(),
            Operation::Create
        );
        let env = report.diff.environment(&site).unwrap();
        assert_eq!(env.operation(), Operation::Update);
        assert_eq!(env.to.values.len(), 2);
    }

    #[test]
    fn test_absent_build_cascades_to_children() {
        let api = MemoryApi::new();
        api.seed(
            Resource::new(Provider::new("cloud"), "bucket", "a")
                .with_config(Value::map([("name", Value::from("a"))])),
        );
        let spec = Spec::new().with(
            "site",
            Build::new(Spec::new().with("a", bucket("a"))).absent(),
        );
        let report = plan(&spec, &api);

        let a = Selector::new("site").child("a");
        assert_eq!(report.diff.get(&a).unwrap().operation(), Operation::Delete);
        assert!(!report.target.select(&a).unwrap().as_resource().unwrap().exists);
    }

    #[test]
    fn test_reprocessing_recorded_selector_is_done() {
        let api = MemoryApi::new();
        let observed = ObservedEvaluator::new(api.clone());
        let spec = Spec::new().with("bucket", bucket("foo"));
        let controller = Controller::new(&spec, &TargetEvaluator, &observed);
        let ctx = Context::new();
        let selector = Selector::new("bucket");

        assert!(matches!(controller.visit(&ctx, &selector), Ok(Visit::Done)));
        assert!(matches!(controller.visit(&ctx, &selector), Ok(Visit::Done)));

        let gets = api
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Get(_)))
            .count();
        assert_eq!(gets, 1);
        assert_eq!(
            lock(&controller.diffs).get(&selector).unwrap().operation(),
            Operation::Create
        );
    }

    #[test]
    fn test_missing_dependency_fails_fast() {
        let spec = Spec::new().with("a", bucket("a")).depends_on("a", ["ghost"]);
        let observed = ObservedEvaluator::new(MemoryApi::new());
        let result = Controller::new(&spec, &TargetEvaluator, &observed)
            .run(&Context::new(), &EngineConfig::default());

        assert!(matches!(result, Err(Error::MissingDependency { .. })));
    }
}
