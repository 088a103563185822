//! Per-node states, failures and run reports

use crate::diff::{DiffTree, Operation};
use crate::environment::Environment;
use crate::error::Error;
use crate::selector::Selector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle of a node within one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Evaluating,
    Done,
    Failed(String),
}

impl NodeState {
    /// Check if the node finished without error
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Check if the node failed
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// A node whose processing returned an error
#[derive(Debug)]
pub struct NodeFailure {
    pub selector: Selector,
    pub error: Error,
}

/// What the reconciler did for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Unchanged,
    Created,
    Updated,
    /// Deleted and created again because an immutable field changed
    Replaced,
    Deleted,
    /// A nested build's environment was materialized
    Environment,
}

/// Summary of reconciliation results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl ApplySummary {
    /// Total number of resources changed
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.replaced + self.deleted
    }

    /// Check if reconciliation was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Add an action to the summary
    pub fn add_action(&mut self, action: Action) {
        match action {
            Action::Unchanged => self.unchanged += 1,
            Action::Created => self.created += 1,
            Action::Updated => self.updated += 1,
            Action::Replaced => self.replaced += 1,
            Action::Deleted => self.deleted += 1,
            Action::Environment => {}
        }
    }
}

/// Node bookkeeping shared by both schedulers
#[derive(Debug, Default)]
pub struct RunStatus {
    pub states: BTreeMap<Selector, NodeState>,
    /// In the order they occurred
    pub failures: Vec<NodeFailure>,
    /// Nodes that never ran because a prerequisite failed or the run stopped
    pub blocked: Vec<Selector>,
    pub cancelled: bool,
}

impl RunStatus {
    /// The first error of the run, if any
    pub fn first_error(&self) -> Option<&Error> {
        self.failures.first().map(|f| &f.error)
    }

    /// Check if every node finished
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.blocked.is_empty() && !self.cancelled
    }

    pub fn state(&self, selector: &Selector) -> Option<&NodeState> {
        self.states.get(selector)
    }
}

/// Result of the diff phase
#[derive(Debug)]
pub struct DiffReport {
    pub diff: DiffTree,
    /// Desired values
    pub target: Environment,
    /// Observed values
    pub observed: Environment,
    pub status: RunStatus,
}

impl DiffReport {
    pub fn first_error(&self) -> Option<&Error> {
        self.status.first_error()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Selectors with something to do
    pub fn changes(&self) -> Vec<(Selector, Operation)> {
        self.diff.changes()
    }
}

/// Result of the reconcile phase
#[derive(Debug)]
pub struct ApplyReport {
    /// Values returned by the backend, one level per build
    pub environment: Environment,
    pub summary: ApplySummary,
    pub status: RunStatus,
}

impl ApplyReport {
    pub fn first_error(&self) -> Option<&Error> {
        self.status.first_error()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_actions() {
        let mut summary = ApplySummary::default();
        for action in [
            Action::Created,
            Action::Updated,
            Action::Replaced,
            Action::Deleted,
            Action::Unchanged,
            Action::Environment,
        ] {
            summary.add_action(action);
        }

        assert_eq!(summary.total_changes(), 4);
        assert_eq!(summary.unchanged, 1);
        assert!(summary.is_success());
    }

    #[test]
    fn test_first_error_keeps_occurrence_order() {
        let mut status = RunStatus::default();
        assert!(status.is_success());

        status.failures.push(NodeFailure {
            selector: Selector::new("a"),
            error: Error::unresolved("a.attrs.id", "first"),
        });
        status.failures.push(NodeFailure {
            selector: Selector::new("b"),
            error: Error::Cancelled,
        });

        assert!(matches!(status.first_error(), Some(Error::Unresolved { .. })));
        assert!(!status.is_success());
    }
}
