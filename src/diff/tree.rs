//! Diffs of a whole run, one level per build

use super::{Diff, EnvironmentDiff, Operation};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::selector::Selector;
use serde::{Deserialize, Serialize};

/// Root of the diff tree produced by a plan
///
/// Nested builds are `Diff::Environment` entries, addressed like the
/// environment tree by [`Selector`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffTree {
    pub root: EnvironmentDiff,
}

impl DiffTree {
    pub fn new(from: Environment, to: Environment) -> Self {
        Self {
            root: EnvironmentDiff::new(from, to),
        }
    }

    /// The level `selector` lives in
    fn scope(&self, selector: &Selector) -> Option<&EnvironmentDiff> {
        let mut level = &self.root;
        for name in selector.scope() {
            level = level.children.get(name)?.as_environment()?;
        }
        Some(level)
    }

    fn scope_mut(&mut self, selector: &Selector) -> Result<&mut EnvironmentDiff> {
        let mut level = &mut self.root;
        for name in selector.scope() {
            level = match level.children.get_mut(name) {
                Some(Diff::Environment(nested)) => &mut **nested,
                _ => return Err(Error::SelectorNotFound(selector.clone())),
            };
        }
        Ok(level)
    }

    /// Diff recorded for `selector`
    pub fn get(&self, selector: &Selector) -> Option<&Diff> {
        self.scope(selector)?.children.get(selector.name())
    }

    /// Nested diff of the build at `selector`
    pub fn environment(&self, selector: &Selector) -> Option<&EnvironmentDiff> {
        self.get(selector)?.as_environment()
    }

    /// Record a diff; enclosing builds must already be recorded
    pub fn insert(&mut self, selector: &Selector, diff: Diff) -> Result<()> {
        self.scope_mut(selector)?
            .children
            .insert(selector.name().to_string(), diff);
        Ok(())
    }

    /// Fill in the observed and desired sides of a recorded build
    pub(crate) fn finish_environment(
        &mut self,
        selector: &Selector,
        from: Environment,
        to: Environment,
    ) -> Result<()> {
        match self
            .scope_mut(selector)?
            .children
            .get_mut(selector.name())
        {
            Some(Diff::Environment(env)) => {
                env.from = from;
                env.to = to;
                Ok(())
            }
            _ => Err(Error::SelectorNotFound(selector.clone())),
        }
    }

    /// Aggregate operation of the whole run
    pub fn operation(&self) -> Operation {
        self.root.operation()
    }

    /// Every recorded diff, parents before their children
    pub fn entries(&self) -> Vec<(Selector, &Diff)> {
        let mut out = Vec::new();
        collect(&self.root, &[], &mut out);
        out
    }

    /// Recorded diffs whose operation is not a no-op
    pub fn changes(&self) -> Vec<(Selector, Operation)> {
        self.entries()
            .into_iter()
            .filter(|(_, d)| !d.is_noop() && d.as_environment().is_none())
            .map(|(s, d)| (s, d.operation()))
            .collect()
    }
}

fn collect<'a>(level: &'a EnvironmentDiff, scope: &[String], out: &mut Vec<(Selector, &'a Diff)>) {
    for (name, diff) in &level.children {
        let mut path = scope.to_vec();
        path.push(name.clone());
        if let Some(selector) = Selector::from_path(path.iter().cloned()) {
            out.push((selector, diff));
        }
        if let Diff::Environment(nested) = diff {
            collect(nested, &path, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::value::Value;

    #[test]
    fn test_nested_insert_and_lookup() {
        let mut tree = DiffTree::default();
        let net = Selector::new("network");
        let subnet = net.child("subnet");

        tree.insert(&net, Diff::Environment(Box::default())).unwrap();
        tree.insert(&subnet, diff(&Value::from(""), &Value::from("10.0.0.0/24")).unwrap())
            .unwrap();

        assert_eq!(tree.get(&subnet).unwrap().operation(), Operation::Create);
        assert!(tree.environment(&net).is_some());
        assert_eq!(tree.operation(), Operation::Create);
        assert!(matches!(
            tree.insert(&Selector::new("missing").child("x"), Diff::Nil),
            Err(Error::SelectorNotFound(_))
        ));
    }

    #[test]
    fn test_iter_parents_first_and_changes() {
        let mut tree = DiffTree::default();
        let net = Selector::new("network");
        tree.insert(&net, Diff::Environment(Box::default())).unwrap();
        tree.insert(&net.child("a"), diff(&Value::from("x"), &Value::from("x")).unwrap())
            .unwrap();
        tree.insert(&net.child("b"), diff(&Value::from("x"), &Value::from("y")).unwrap())
            .unwrap();

        let order: Vec<String> = tree.entries().iter().map(|(s, _)| s.to_string()).collect();
        assert_eq!(order, vec!["network", "network.a", "network.b"]);
        assert_eq!(tree.changes(), vec![(net.child("b"), Operation::Update)]);
    }
}
