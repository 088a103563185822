//! Directed graph with symmetric forward/backward adjacency

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

/// Adjacency sets of a single node
#[derive(Debug, Clone)]
pub struct Edges<N> {
    /// Nodes this node points to
    pub forward: BTreeSet<N>,
    /// Nodes pointing to this node
    pub backward: BTreeSet<N>,
}

impl<N: Ord> Default for Edges<N> {
    fn default() -> Self {
        Self {
            forward: BTreeSet::new(),
            backward: BTreeSet::new(),
        }
    }
}

/// A directed graph keyed by node ID
///
/// Both directions are maintained on every insertion, and a node without
/// edges still owns (empty) adjacency sets so it can be walked.
#[derive(Debug, Clone)]
pub struct Graph<N> {
    nodes: HashMap<N, Edges<N>>,
}

impl<N> Default for Graph<N> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }
}

impl<N: Clone + Eq + Hash + Ord> Graph<N> {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with no edges (no-op if present)
    pub fn add_node(&mut self, node: N) {
        self.nodes.entry(node).or_default();
    }

    /// Add an edge `from -> to`, creating either node if needed
    pub fn add_edge(&mut self, from: N, to: N) {
        self.nodes
            .entry(from.clone())
            .or_default()
            .forward
            .insert(to.clone());
        self.nodes.entry(to).or_default().backward.insert(from);
    }

    /// Whether the node exists
    pub fn contains(&self, node: &N) -> bool {
        self.nodes.contains_key(node)
    }

    /// Nodes `node` points to
    pub fn forward(&self, node: &N) -> Option<&BTreeSet<N>> {
        self.nodes.get(node).map(|e| &e.forward)
    }

    /// Nodes pointing to `node`
    pub fn backward(&self, node: &N) -> Option<&BTreeSet<N>> {
        self.nodes.get(node).map(|e| &e.backward)
    }

    /// Nodes with no incoming edges, in order
    pub fn roots(&self) -> Vec<N> {
        let mut roots: Vec<N> = self
            .nodes
            .iter()
            .filter(|(_, e)| e.backward.is_empty())
            .map(|(n, _)| n.clone())
            .collect();
        roots.sort();
        roots
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_are_symmetric() {
        let mut graph = Graph::new();
        graph.add_edge("a", "b");
        graph.add_edge("a", "c");

        assert!(graph.forward(&"a").unwrap().contains(&"b"));
        assert!(graph.backward(&"b").unwrap().contains(&"a"));
        assert!(graph.backward(&"a").unwrap().is_empty());
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_isolated_node_has_empty_sets() {
        let mut graph = Graph::new();
        graph.add_node("solo");

        assert!(graph.forward(&"solo").unwrap().is_empty());
        assert!(graph.backward(&"solo").unwrap().is_empty());
        assert_eq!(graph.roots(), vec!["solo"]);
    }

    #[test]
    fn test_roots_sorted() {
        let mut graph = Graph::new();
        graph.add_edge("z", "m");
        graph.add_edge("a", "m");

        assert_eq!(graph.roots(), vec!["a", "z"]);
    }
}
