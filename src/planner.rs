//! Ordered plans - a sequential rendering of a diff tree
//!
//! Walks the diff tree with the two-phase [`depgraph::Walk`]: builds are
//! started top-down, which is when their children and the dependency
//! edges between them are added to the graph, and finished bottom-up. The
//! order in which nodes finish is the order a sequential apply would use.

use crate::component::{Component, Spec};
use crate::diff::{Diff, DiffTree, EnvironmentDiff, Operation};
use crate::error::{Error, Result};
use crate::selector::Selector;
use depgraph::{Graph, Phase, Walk};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One node of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub selector: Selector,
    pub operation: Operation,
    /// Update carried out as delete and create
    #[serde(default)]
    pub replace: bool,
}

/// Every node of a diff tree in application order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
}

/// Dependency edges among the children of one level, `from` finishing after `to`
fn level_edges(
    spec: &Spec,
    scope: Option<&Selector>,
    diffs: &EnvironmentDiff,
) -> Vec<(Selector, Selector)> {
    let select = |alias: &str| scope.map_or_else(|| Selector::new(alias), |s| s.child(alias));
    let deleting = |alias: &str| {
        diffs
            .children
            .get(alias)
            .is_some_and(|d| d.operation() == Operation::Delete)
    };

    let mut edges = Vec::new();
    for (dependent, deps) in &spec.dependencies {
        if !diffs.children.contains_key(dependent) {
            continue;
        }
        for dep in deps.iter().filter(|d| diffs.children.contains_key(*d)) {
            if deleting(dep.as_str()) {
                edges.push((select(dep.as_str()), select(dependent.as_str())));
            } else {
                edges.push((select(dependent.as_str()), select(dep.as_str())));
            }
        }
    }
    edges
}

impl Plan {
    /// Order the nodes of `diffs`, using the dependencies declared in `spec`
    pub fn from_diff(spec: &Spec, diffs: &DiffTree) -> Result<Self> {
        let mut graph = Graph::new();
        for alias in diffs.root.children.keys() {
            graph.add_node(Selector::new(alias.as_str()));
        }
        for (from, to) in level_edges(spec, None, &diffs.root) {
            graph.add_edge(from, to);
        }
        let expected = graph.len();

        let walk = Walk::new(graph);
        let mut finished = BTreeSet::new();
        let mut steps = Vec::new();
        let mut discovered = expected;
        loop {
            let batch = walk.next_batch();
            if batch.is_empty() {
                break;
            }
            for selector in batch {
                let diff = diffs
                    .get(&selector)
                    .ok_or_else(|| Error::SelectorNotFound(selector.clone()))?;

                if !walk.visited(&selector)?
                    && let Diff::Environment(env) = diff
                    && let Component::Build(build) = spec.select(&selector)?
                {
                    let mut edges: Vec<(Selector, Selector)> = env
                        .children
                        .keys()
                        .map(|alias| (selector.clone(), selector.child(alias.as_str())))
                        .collect();
                    discovered += edges.len();
                    edges.extend(level_edges(&build.spec, Some(&selector), env));
                    walk.add_edges(edges);
                }

                if walk.visit(&selector)? == Phase::Done && finished.insert(selector.clone()) {
                    steps.push(Step {
                        operation: diff.operation(),
                        replace: diff.as_resource().is_some_and(|r| r.requires_replacement()),
                        selector,
                    });
                }
            }
        }

        if finished.len() < discovered {
            let pending = diffs
                .entries()
                .into_iter()
                .map(|(s, _)| s)
                .filter(|s| !finished.contains(s))
                .collect();
            return Err(Error::Stalled { pending });
        }
        Ok(Self { steps })
    }

    /// Steps that change something
    pub fn changes(&self) -> Vec<&Step> {
        self.steps
            .iter()
            .filter(|s| !s.operation.is_noop())
            .collect()
    }

    /// Render the plan as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "{} {} ({})", step.operation.symbol(), step.selector, step.operation)?;
            if step.replace {
                write!(f, " [replace]")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
