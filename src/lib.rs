//! # formation
//!
//! A dependency-ordered diff and reconcile engine for declarative
//! infrastructure.
//!
//! A [`Spec`] describes the desired components: resources and nested
//! builds, with the data dependencies between them. Planning walks the
//! tree in dependency order, evaluates every component twice (desired and
//! observed through a [`ResourceApi`]) and records a typed [`Diff`] per
//! node. Applying walks the resulting [`DiffTree`] in the same order
//! (reversed for deletions) and issues create, update and delete calls,
//! with update masks derived from the diff.
//!
//! ## Example
//!
//! ```
//! use formation::memory::{Call, MemoryApi};
//! use formation::{Context, Engine, EngineConfig, Expr, Operation, ResourceComponent, Selector, Spec};
//!
//! let spec = Spec::new().with(
//!     "bucket",
//!     ResourceComponent::new("cloud", "bucket", "assets")
//!         .with_config(Expr::map([("name", Expr::from("foo"))])),
//! );
//!
//! let api = MemoryApi::new();
//! let engine = Engine::new(EngineConfig::default(), api.clone());
//! let ctx = Context::new();
//!
//! let report = engine.plan(&ctx, &spec)?;
//! let diff = report.diff.get(&Selector::new("bucket")).unwrap();
//! assert_eq!(diff.operation(), Operation::Create);
//!
//! engine.apply(&ctx, &spec, &report.diff)?;
//! assert_eq!(api.mutations(), vec![Call::Create("cloud/bucket/assets".into())]);
//! # Ok::<(), formation::Error>(())
//! ```

pub mod component;
pub mod config;
pub mod context;
pub mod controller;
pub mod diff;
pub mod engine;
pub mod environment;
pub mod error;
pub mod eval;
pub mod mask;
pub mod memory;
pub mod planner;
pub mod reconcile;
pub mod resolve;
pub mod resource;
pub mod schedule;
pub mod selector;
pub mod types;
pub mod value;

pub use component::{Build, Component, Expr, ResourceComponent, Spec};
pub use config::EngineConfig;
pub use context::Context;
pub use controller::Controller;
pub use diff::{Diff, DiffTree, Operation, diff};
pub use engine::Engine;
pub use environment::Environment;
pub use error::{Error, ErrorCategory, Result};
pub use eval::{Evaluator, ObservedEvaluator, TargetEvaluator, evaluate};
pub use mask::{Field, FieldOperation, derive_mask};
pub use planner::{Plan, Step};
pub use reconcile::{ReconcileEngine, Reconciler};
pub use resolve::resolve;
pub use resource::{ApiError, ApiResult, ResourceApi};
pub use selector::Selector;
pub use types::{Action, ApplyReport, ApplySummary, DiffReport, NodeFailure, NodeState, RunStatus};
pub use value::{Provider, Reference, Resource, Unknown, Value};
