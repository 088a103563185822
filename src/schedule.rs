//! Selector-addressed in-degree scheduling
//!
//! Both the diff and the reconcile phase declare their dependencies
//! explicitly per build level, so they share this one-shot schedule
//! instead of the two-phase walk. A build is visited twice: the first
//! visit expands it into its children (added here with their
//! dependencies) and re-adds the build as a dependent of all of them; the
//! second visit, once every child is done, finalizes it.

use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::selector::Selector;
use crate::types::{NodeFailure, NodeState, RunStatus};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// In-degree counts over selectors
#[derive(Debug, Default)]
pub struct Schedule {
    indegree: BTreeMap<Selector, usize>,
    dependents: BTreeMap<Selector, Vec<Selector>>,
    finished: BTreeSet<Selector>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `selector`, waiting on each of `dependencies`
    ///
    /// Dependencies that already finished are not counted.
    pub fn add(&mut self, selector: Selector, dependencies: &[Selector]) {
        let count = self.indegree.entry(selector.clone()).or_insert(0);
        for dep in dependencies {
            if self.finished.contains(dep) {
                continue;
            }
            *count += 1;
            self.dependents
                .entry(dep.clone())
                .or_default()
                .push(selector.clone());
        }
    }

    /// Mark `selector` finished, releasing its dependents
    pub fn done(&mut self, selector: &Selector) {
        self.finished.insert(selector.clone());
        for dependent in self.dependents.remove(selector).unwrap_or_default() {
            if let Some(count) = self.indegree.get_mut(&dependent) {
                *count = count.saturating_sub(1);
            }
        }
    }

    /// Drain every selector with no outstanding dependencies
    pub fn next_batch(&mut self) -> Vec<Selector> {
        let ready: Vec<Selector> = self
            .indegree
            .iter()
            .filter(|&(_, count)| *count == 0)
            .map(|(s, _)| s.clone())
            .collect();
        for selector in &ready {
            self.indegree.remove(selector);
        }
        ready
    }

    /// Selectors added but not drained yet
    pub fn pending(&self) -> Vec<Selector> {
        self.indegree.keys().cloned().collect()
    }

    pub fn is_finished(&self, selector: &Selector) -> bool {
        self.finished.contains(selector)
    }
}

/// Outcome of visiting a node
pub(crate) enum Visit {
    /// The node is finished
    Done,
    /// The node is a build; finish it after these children
    Expand(Vec<(Selector, Vec<Selector>)>),
}

/// Per-node work of one phase
pub(crate) trait Process: Sync {
    /// First (and for resources, only) visit of a node
    fn visit(&self, ctx: &Context, selector: &Selector) -> Result<Visit>;

    /// Second visit of an expanded build, after all its children finished
    fn finish(&self, ctx: &Context, selector: &Selector) -> Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs a [`Process`] over a schedule on a pool of worker threads
struct Driver<'a, P> {
    process: &'a P,
    ctx: &'a Context,
    halt_on_error: bool,
    schedule: Mutex<Schedule>,
    expanded: Mutex<BTreeSet<Selector>>,
    status: Mutex<RunStatus>,
    /// Drained but never run because the run was stopping
    skipped: Mutex<Vec<Selector>>,
    halted: AtomicBool,
}

impl<P: Process> Driver<'_, P> {
    fn set_state(&self, selector: &Selector, state: NodeState) {
        lock(&self.status).states.insert(selector.clone(), state);
    }

    fn stopping(&self) -> bool {
        self.halted.load(Ordering::SeqCst) || self.ctx.is_cancelled()
    }

    fn next_batch(&self) -> Vec<Selector> {
        let batch = lock(&self.schedule).next_batch();
        if !batch.is_empty() {
            log::debug!("ready: {batch:?}");
        }
        batch
    }

    fn spawn_ready<'s>(&'s self, scope: &rayon::Scope<'s>, ready: Vec<Selector>) {
        for selector in ready {
            if self.stopping() {
                lock(&self.skipped).push(selector);
                continue;
            }
            scope.spawn(move |s| {
                self.step(&selector);
                let next = self.next_batch();
                self.spawn_ready(s, next);
            });
        }
    }

    fn step(&self, selector: &Selector) {
        self.set_state(selector, NodeState::Evaluating);
        let expanded = lock(&self.expanded).contains(selector);

        let result = if expanded {
            self.process.finish(self.ctx, selector).map(|()| Visit::Done)
        } else {
            self.process.visit(self.ctx, selector)
        };

        match result {
            Ok(Visit::Done) => {
                log::debug!("{selector}: done");
                lock(&self.schedule).done(selector);
                self.set_state(selector, NodeState::Done);
            }
            Ok(Visit::Expand(children)) => {
                log::debug!("{selector}: expanding {} children", children.len());
                let names: Vec<Selector> = children.iter().map(|(s, _)| s.clone()).collect();
                lock(&self.expanded).insert(selector.clone());
                {
                    let mut status = lock(&self.status);
                    for child in &names {
                        status.states.insert(child.clone(), NodeState::Pending);
                    }
                }
                let mut schedule = lock(&self.schedule);
                for (child, deps) in children {
                    schedule.add(child, &deps);
                }
                schedule.add(selector.clone(), &names);
            }
            Err(error) => self.fail(selector, error),
        }
    }

    fn fail(&self, selector: &Selector, error: Error) {
        log::warn!("{selector}: {error}");
        let fatal = !error.category().is_node_local();
        {
            let mut status = lock(&self.status);
            status
                .states
                .insert(selector.clone(), NodeState::Failed(error.to_string()));
            status.failures.push(NodeFailure {
                selector: selector.clone(),
                error,
            });
        }
        if fatal || self.halt_on_error {
            log::info!("halting after failure of {selector}");
            self.halted.store(true, Ordering::SeqCst);
            if self.halt_on_error {
                self.ctx.cancel();
            }
        }
    }
}

/// Run `process` until no node is ready
///
/// Node failures are recorded in the returned status rather than
/// returned. Nodes that can never run because a dependency failed are
/// reported as blocked. If nothing failed and nodes are still waiting,
/// the dependencies form a cycle and the run fails with `Stalled`.
pub(crate) fn run<P: Process>(
    process: &P,
    ctx: &Context,
    config: &EngineConfig,
    seeds: Vec<(Selector, Vec<Selector>)>,
) -> Result<RunStatus> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .build()?;

    let mut schedule = Schedule::new();
    let mut status = RunStatus::default();
    for (selector, deps) in seeds {
        status.states.insert(selector.clone(), NodeState::Pending);
        schedule.add(selector, &deps);
    }
    log::debug!("seeded {} nodes", status.states.len());

    let driver = Driver {
        process,
        ctx,
        halt_on_error: config.halt_on_error,
        schedule: Mutex::new(schedule),
        expanded: Mutex::new(BTreeSet::new()),
        status: Mutex::new(status),
        skipped: Mutex::new(Vec::new()),
        halted: AtomicBool::new(false),
    };

    pool.scope(|s| {
        let ready = driver.next_batch();
        driver.spawn_ready(s, ready);
    });

    let stopped = driver.stopping();
    let mut blocked = driver
        .schedule
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .pending();
    blocked.extend(
        driver
            .skipped
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner),
    );
    blocked.sort();

    let mut status = driver
        .status
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    status.cancelled = ctx.is_cancelled();

    if !blocked.is_empty() && status.failures.is_empty() && !stopped {
        return Err(Error::Stalled { pending: blocked });
    }
    if status.cancelled {
        log::info!("run cancelled with {} nodes left", blocked.len());
    }
    status.blocked = blocked;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(name: &str) -> Selector {
        Selector::new(name)
    }

    #[test]
    fn test_indegree_ordering() {
        let mut schedule = Schedule::new();
        schedule.add(sel("a"), &[]);
        schedule.add(sel("b"), &[sel("a")]);
        schedule.add(sel("c"), &[sel("a"), sel("b")]);

        assert_eq!(schedule.next_batch(), vec![sel("a")]);
        assert!(schedule.next_batch().is_empty());

        schedule.done(&sel("a"));
        assert_eq!(schedule.next_batch(), vec![sel("b")]);
        schedule.done(&sel("b"));
        assert_eq!(schedule.next_batch(), vec![sel("c")]);
        assert!(schedule.pending().is_empty());
    }

    #[test]
    fn test_finished_dependencies_are_not_counted() {
        let mut schedule = Schedule::new();
        schedule.add(sel("a"), &[]);
        schedule.next_batch();
        schedule.done(&sel("a"));

        schedule.add(sel("b"), &[sel("a")]);
        assert!(schedule.is_finished(&sel("a")));
        assert_eq!(schedule.next_batch(), vec![sel("b")]);
    }

    /// Expands `root` into two children and records the order of events
    struct Recorder {
        events: Mutex<Vec<String>>,
        fail: Option<&'static str>,
    }

    impl Recorder {
        fn new(fail: Option<&'static str>) -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail,
            }
        }

        fn events(&self) -> Vec<String> {
            lock(&self.events).clone()
        }
    }

    impl Process for Recorder {
        fn visit(&self, _ctx: &Context, selector: &Selector) -> Result<Visit> {
            lock(&self.events).push(format!("visit {selector}"));
            if Some(selector.name()) == self.fail {
                return Err(Error::unresolved(selector, "boom"));
            }
            if selector.name() == "root" {
                let a = selector.child("a");
                let b = selector.child("b");
                return Ok(Visit::Expand(vec![(a.clone(), vec![]), (b, vec![a])]));
            }
            Ok(Visit::Done)
        }

        fn finish(&self, _ctx: &Context, selector: &Selector) -> Result<()> {
            lock(&self.events).push(format!("finish {selector}"));
            Ok(())
        }
    }

    #[test]
    fn test_build_finishes_after_children() {
        let recorder = Recorder::new(None);
        let status = run(
            &recorder,
            &Context::new(),
            &EngineConfig::default(),
            vec![(sel("root"), vec![])],
        )
        .unwrap();

        assert_eq!(
            recorder.events(),
            vec!["visit root", "visit root.a", "visit root.b", "finish root"]
        );
        assert!(status.is_success());
        assert!(status.states.values().all(NodeState::is_done));
    }

    #[test]
    fn test_failure_blocks_dependents_only() {
        let recorder = Recorder::new(Some("a"));
        let status = run(
            &recorder,
            &Context::new(),
            &EngineConfig::default(),
            vec![
                (sel("a"), vec![]),
                (sel("b"), vec![sel("a")]),
                (sel("c"), vec![]),
            ],
        )
        .unwrap();

        assert_eq!(status.failures.len(), 1);
        assert_eq!(status.blocked, vec![sel("b")]);
        assert!(status.state(&sel("a")).unwrap().is_failed());
        assert!(status.state(&sel("c")).unwrap().is_done());
        assert_eq!(status.state(&sel("b")), Some(&NodeState::Pending));
    }

    #[test]
    fn test_cycle_is_stalled() {
        let recorder = Recorder::new(None);
        let result = run(
            &recorder,
            &Context::new(),
            &EngineConfig::default(),
            vec![(sel("a"), vec![sel("b")]), (sel("b"), vec![sel("a")])],
        );

        assert!(matches!(result, Err(Error::Stalled { pending }) if pending.len() == 2));
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_cancelled_context_runs_nothing() {
        let recorder = Recorder::new(None);
        let ctx = Context::new();
        ctx.cancel();

        let status = run(
            &recorder,
            &ctx,
            &EngineConfig::default(),
            vec![(sel("a"), vec![])],
        )
        .unwrap();

        assert!(status.cancelled);
        assert_eq!(status.blocked, vec![sel("a")]);
        assert!(recorder.events().is_empty());
    }
}
