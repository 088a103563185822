//! Error types for the depgraph crate

use thiserror::Error;

/// Errors that can occur while driving a walk
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Node has never been added to the graph
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// `done` was called for a node that was never started
    #[error("node finished before it was started: {0}")]
    NotStarted(String),
}

/// Result type for depgraph operations
pub type Result<T> = std::result::Result<T, Error>;
