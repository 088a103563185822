//! # depgraph
//!
//! A directed dependency graph and a two-phase walk over it that several
//! workers can consume at once.
//!
//! ```
//! use depgraph::{Graph, Phase, Walk};
//!
//! let mut graph = Graph::new();
//! graph.add_edge("app", "db");
//!
//! let walk = Walk::new(graph);
//! let mut finished = Vec::new();
//! loop {
//!     let batch = walk.next_batch();
//!     if batch.is_empty() {
//!         break;
//!     }
//!     for node in batch {
//!         if walk.visit(&node)? == Phase::Done {
//!             finished.push(node);
//!         }
//!     }
//! }
//! assert_eq!(finished, vec!["db", "app"]);
//! # Ok::<(), depgraph::Error>(())
//! ```

mod error;
mod graph;
mod walk;

pub use error::{Error, Result};
pub use graph::{Edges, Graph};
pub use walk::{Phase, Walk};
