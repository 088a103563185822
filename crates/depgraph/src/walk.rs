//! Two-phase traversal over a [`Graph`]
//!
//! Every node is emitted twice. The first emission *starts* the node: its
//! forward neighbours are released once all of their parents have started,
//! and the node itself becomes blocked on those neighbours. The second
//! emission *finishes* it, which releases its parents once all of their
//! children have finished. The result is a descend-then-collapse order in
//! which structure can be discovered on the way down (edges may be added
//! while the walk is running) and finalized on the way up.
//!
//! All mutable state sits behind one mutex, so any number of workers may
//! pull batches with [`Walk::next_batch`] and report back concurrently.

use crate::error::{Error, Result};
use crate::graph::Graph;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Which visit a call to [`Walk::visit`] performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// First visit, children released
    Start,
    /// Second visit, parents notified
    Done,
}

#[derive(Debug)]
struct NodeState<N> {
    visited: bool,
    remaining: BTreeSet<N>,
}

#[derive(Debug)]
struct Inner<N> {
    graph: Graph<N>,
    states: HashMap<N, NodeState<N>>,
    ready: BTreeSet<N>,
}

impl<N: Clone + Eq + Hash + Ord + Debug> Inner<N> {
    /// State is created on first touch from the backward edges known then.
    fn state(&mut self, node: &N) -> Result<&mut NodeState<N>> {
        if !self.states.contains_key(node) {
            let backward = self
                .graph
                .backward(node)
                .ok_or_else(|| Error::UnknownNode(format!("{node:?}")))?
                .clone();
            self.states.insert(
                node.clone(),
                NodeState {
                    visited: false,
                    remaining: backward,
                },
            );
        }
        self.states
            .get_mut(node)
            .ok_or_else(|| Error::UnknownNode(format!("{node:?}")))
    }

    fn start(&mut self, node: &N) -> Result<()> {
        self.state(node)?.visited = true;

        let children: Vec<N> = self
            .graph
            .forward(node)
            .map(|f| f.iter().cloned().collect())
            .unwrap_or_default();

        if children.is_empty() {
            self.ready.insert(node.clone());
            return Ok(());
        }

        for child in children {
            let state = self.state(&child)?;
            state.visited = false;
            state.remaining.remove(node);
            if state.remaining.is_empty() {
                self.ready.insert(child.clone());
            }
            self.state(node)?.remaining.insert(child);
        }
        Ok(())
    }

    fn done(&mut self, node: &N) -> Result<()> {
        if !self.state(node)?.visited {
            return Err(Error::NotStarted(format!("{node:?}")));
        }

        let parents: Vec<N> = self
            .graph
            .backward(node)
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();

        for parent in parents {
            let state = self.state(&parent)?;
            state.remaining.remove(node);
            if state.remaining.is_empty() {
                self.ready.insert(parent);
            }
        }
        Ok(())
    }
}

/// Concurrent two-phase walk over a dependency graph
#[derive(Debug)]
pub struct Walk<N> {
    inner: Mutex<Inner<N>>,
}

impl<N: Clone + Eq + Hash + Ord + Debug> Walk<N> {
    /// Create a walk; nodes without incoming edges are ready immediately
    pub fn new(graph: Graph<N>) -> Self {
        let ready = graph.roots().into_iter().collect();
        Self {
            inner: Mutex::new(Inner {
                graph,
                states: HashMap::new(),
                ready,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<N>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drain and return every node that is currently ready
    pub fn next_batch(&self) -> Vec<N> {
        std::mem::take(&mut self.lock().ready).into_iter().collect()
    }

    /// Whether the node has had its first visit (and not been reset since)
    pub fn visited(&self, node: &N) -> Result<bool> {
        Ok(self.lock().state(node)?.visited)
    }

    /// First visit: release children, block the node on them
    pub fn start(&self, node: &N) -> Result<()> {
        self.lock().start(node)
    }

    /// Second visit: notify parents that this node finished
    pub fn done(&self, node: &N) -> Result<()> {
        self.lock().done(node)
    }

    /// Start the node if it has not been visited yet, otherwise finish it
    pub fn visit(&self, node: &N) -> Result<Phase> {
        let mut inner = self.lock();
        if inner.state(node)?.visited {
            inner.done(node)?;
            Ok(Phase::Done)
        } else {
            inner.start(node)?;
            Ok(Phase::Start)
        }
    }

    /// Grow the graph while the walk is running
    ///
    /// Edges must be added before their source node is started. A target
    /// that already has walk state picks up the new parent as a pending
    /// dependency unless that parent has already started.
    pub fn add_edges<I>(&self, edges: I)
    where
        I: IntoIterator<Item = (N, N)>,
    {
        let mut inner = self.lock();
        for (from, to) in edges {
            inner.graph.add_edge(from.clone(), to.clone());
            let from_started = inner.states.get(&from).is_some_and(|s| s.visited);
            if !from_started && let Some(state) = inner.states.get_mut(&to) {
                state.remaining.insert(from);
            }
        }
    }
}
