//! Engine facade - plan and apply a component tree against one backend

use crate::component::Spec;
use crate::config::EngineConfig;
use crate::context::Context;
use crate::controller::Controller;
use crate::diff::DiffTree;
use crate::error::Result;
use crate::eval::{ObservedEvaluator, TargetEvaluator};
use crate::planner::Plan;
use crate::reconcile::{ReconcileEngine, Reconciler};
use crate::resource::ResourceApi;
use crate::types::{ApplyReport, DiffReport};

/// Plans and applies component trees against a [`ResourceApi`]
///
/// # Example
///
/// ```
/// use formation::memory::MemoryApi;
/// use formation::{Context, Engine, EngineConfig, Expr, ResourceComponent, Spec};
///
/// let spec = Spec::new().with(
///     "bucket",
///     ResourceComponent::new("cloud", "bucket", "assets")
///         .with_config(Expr::map([("name", Expr::from("foo"))])),
/// );
///
/// let api = MemoryApi::new();
/// let engine = Engine::new(EngineConfig::default(), api.clone());
/// let (plan, applied) = engine.plan_and_apply(&Context::new(), &spec)?;
///
/// assert_eq!(plan.changes().len(), 1);
/// assert_eq!(applied.unwrap().summary.created, 1);
/// # Ok::<(), formation::Error>(())
/// ```
#[derive(Debug)]
pub struct Engine<A> {
    config: EngineConfig,
    observed: ObservedEvaluator<A>,
    reconcile: ReconcileEngine<A>,
}

impl<A: ResourceApi + Clone> Engine<A> {
    pub fn new(config: EngineConfig, api: A) -> Self {
        Self {
            config,
            observed: ObservedEvaluator::new(api.clone()),
            reconcile: ReconcileEngine::new(api),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Diff the desired tree against the observed state
    pub fn plan(&self, ctx: &Context, spec: &Spec) -> Result<DiffReport> {
        self.config.validate()?;
        Controller::new(spec, &TargetEvaluator, &self.observed).run(ctx, &self.config)
    }

    /// Reconcile a diff tree produced by [`Engine::plan`] for the same spec
    pub fn apply(&self, ctx: &Context, spec: &Spec, diffs: &DiffTree) -> Result<ApplyReport> {
        self.config.validate()?;
        Reconciler::new(spec, diffs, &self.reconcile).run(ctx, &self.config)
    }

    /// Plan, then apply if planning succeeded and something changes
    ///
    /// Returns the ordered plan and, if reconciliation ran, its report. A
    /// diff phase with failures is returned as its first error.
    pub fn plan_and_apply(&self, ctx: &Context, spec: &Spec) -> Result<(Plan, Option<ApplyReport>)> {
        let mut report = self.plan(ctx, spec)?;
        if !report.status.failures.is_empty() {
            return Err(report.status.failures.remove(0).error);
        }
        let plan = Plan::from_diff(spec, &report.diff)?;
        if plan.changes().is_empty() {
            log::info!("nothing to do");
            return Ok((plan, None));
        }
        let applied = self.apply(ctx, spec, &report.diff)?;
        Ok((plan, Some(applied)))
    }
}
