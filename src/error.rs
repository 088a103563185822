//! Error types for planning and reconciliation.
//!
//! Errors are categorized so schedulers can decide whether a failure is
//! local to one node (the branch stops, siblings continue) or a contract
//! violation that should surface immediately.

use crate::resource::ApiError;
use crate::selector::Selector;
use thiserror::Error;

/// Categories of engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Selector missing from a tree or malformed
    Lookup,
    /// Referenced value not resolvable yet
    Resolution,
    /// Resource backend call failed
    Backend,
    /// Value of an unexpected variant reached a typed path
    TypeMismatch,
    /// Scheduling could not make progress or was stopped
    Scheduling,
    /// Configuration or environment problems
    Other,
}

impl ErrorCategory {
    /// Whether the failure is confined to the node that raised it.
    pub fn is_node_local(&self) -> bool {
        matches!(self, Self::Resolution | Self::Backend)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Lookup => "Lookup failure",
            Self::Resolution => "Unresolved reference",
            Self::Backend => "Backend failure",
            Self::TypeMismatch => "Type mismatch",
            Self::Scheduling => "Scheduling failure",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors that can occur while planning or reconciling
#[derive(Debug, Error)]
pub enum Error {
    /// Selector does not address a node in the tree it was looked up in
    #[error("selector not found: {0}")]
    SelectorNotFound(Selector),

    /// Selector path with no names
    #[error("selector path is empty")]
    EmptySelector,

    /// Dependency map names a component outside the build
    #[error("{selector} depends on `{dependency}`, which is not part of the same build")]
    MissingDependency {
        selector: Selector,
        dependency: String,
    },

    /// Reference points at something that is not known yet
    #[error("cannot resolve `{reference}`: {reason}")]
    Unresolved { reference: String, reason: String },

    /// Backend call failed
    #[error("{operation} failed for {selector}: {source}")]
    Backend {
        selector: Selector,
        operation: &'static str,
        #[source]
        source: ApiError,
    },

    /// Value of an unexpected variant
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Values of this variant are not diffed structurally
    #[error("cannot diff {0} values directly")]
    UnsupportedDiff(&'static str),

    /// External evaluator failure
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] anyhow::Error),

    /// Nodes remain but none can become ready
    #[error("no runnable nodes left, still waiting on: {}", join(.pending))]
    Stalled { pending: Vec<Selector> },

    /// The run context was cancelled
    #[error("run cancelled")]
    Cancelled,

    /// Worker pool could not be created
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Walk over the dependency graph failed
    #[error("dependency graph: {0}")]
    Graph(#[from] depgraph::Error),

    /// Invalid engine configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// The category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SelectorNotFound(_) | Self::EmptySelector | Self::MissingDependency { .. } => {
                ErrorCategory::Lookup
            }
            Self::Unresolved { .. } => ErrorCategory::Resolution,
            Self::Backend { .. } => ErrorCategory::Backend,
            Self::TypeMismatch { .. } | Self::UnsupportedDiff(_) => ErrorCategory::TypeMismatch,
            Self::Stalled { .. } | Self::Cancelled | Self::Graph(_) => ErrorCategory::Scheduling,
            Self::Evaluation(_) | Self::ThreadPool(_) | Self::Config(_) => ErrorCategory::Other,
        }
    }

    pub(crate) fn unresolved(reference: impl ToString, reason: impl Into<String>) -> Self {
        Self::Unresolved {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}

fn join(selectors: &[Selector]) -> String {
    selectors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::SelectorNotFound(Selector::new("a")).category(),
            ErrorCategory::Lookup
        );
        assert!(Error::unresolved("db.attrs.host", "not created yet")
            .category()
            .is_node_local());
        assert!(!Error::Cancelled.category().is_node_local());
    }

    #[test]
    fn test_stalled_message_lists_selectors() {
        let err = Error::Stalled {
            pending: vec![Selector::new("a"), Selector::new("b").child("c")],
        };
        assert_eq!(
            err.to_string(),
            "no runnable nodes left, still waiting on: a, b.c"
        );
    }
}
