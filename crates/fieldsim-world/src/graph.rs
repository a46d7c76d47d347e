//! Variable table and dependency graph
//!
//! Edges run from a Derived variable to every registered variable named in
//! its expression. Symbols that are not registered variables are not edges;
//! they read as undefined (or as runtime names such as `time`).

use crate::{Error, Result, Variable};
use fieldsim_core::{Identified, Identifier, Layered, Scope, Value, ValueMap};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Storage for all variables of a world
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableTable {
    variables: IndexMap<Identifier, Variable>,
}

/// Replacement dependency set used to test an edit before committing it
type Override<'a> = (&'a Identifier, &'a IndexSet<String>);

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Identifier) -> Option<&Variable> {
        self.variables.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &Identifier) -> Option<&mut Variable> {
        self.variables.get_mut(id)
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.variables.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Iterate over variables in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &Identifier> {
        self.variables.keys()
    }

    /// Insert an already-identified variable
    ///
    /// The caller is responsible for checking the graph first.
    pub(crate) fn insert(&mut self, var: Variable) {
        self.variables.insert(var.id().clone(), var);
    }

    pub(crate) fn remove(&mut self, id: &Identifier) -> Option<Variable> {
        self.variables.shift_remove(id)
    }

    /// Search for a dependency loop reachable from `start`
    ///
    /// Returns the loop from the first repeated variable to its repeat,
    /// inclusive, or `None` if every path from `start` ends.
    pub fn find_cycle(&self, start: &Identifier) -> Option<Vec<Identifier>> {
        self.search(start, None)
    }

    /// Like [`find_cycle`](Self::find_cycle), with `id` assumed to depend on
    /// `deps` instead of its current dependencies
    ///
    /// `id` does not need to be in the table yet.
    pub fn find_cycle_with(
        &self,
        id: &Identifier,
        deps: &IndexSet<String>,
    ) -> Option<Vec<Identifier>> {
        self.search(id, Some((id, deps)))
    }

    /// Check the whole table for loops
    pub fn validate(&self) -> Result<()> {
        let mut done = HashSet::new();
        for id in self.variables.keys() {
            let path = Vec::new();
            if let Some(cycle_path) = self.visit(id, path, &mut done, None) {
                return Err(Error::CircularDependency { cycle_path });
            }
        }
        Ok(())
    }

    fn search(&self, start: &Identifier, over: Option<Override<'_>>) -> Option<Vec<Identifier>> {
        let mut done = HashSet::new();
        self.visit(start, Vec::new(), &mut done, over)
    }

    /// Depth first walk; `path` is owned per branch so siblings never see
    /// each other's nodes, `done` is shared so finished nodes are skipped.
    fn visit(
        &self,
        id: &Identifier,
        mut path: Vec<Identifier>,
        done: &mut HashSet<Identifier>,
        over: Option<Override<'_>>,
    ) -> Option<Vec<Identifier>> {
        if let Some(first) = path.iter().position(|p| p == id) {
            let mut cycle = path.split_off(first);
            cycle.push(id.clone());
            return Some(cycle);
        }
        if done.contains(id) {
            return None;
        }

        let deps = match over {
            Some((target, deps)) if target == id => Some(deps),
            _ => self.variables.get(id).and_then(Variable::dependencies),
        };

        if let Some(deps) = deps {
            path.push(id.clone());
            for dep in deps {
                let dep_id = Identifier::from(dep.as_str());
                let known = self.variables.contains_key(&dep_id)
                    || matches!(over, Some((target, _)) if *target == dep_id);
                if !known {
                    continue;
                }
                if let Some(cycle) = self.visit(&dep_id, path.clone(), done, over) {
                    return Some(cycle);
                }
            }
        }

        done.insert(id.clone());
        None
    }

    /// Evaluate one variable against an empty runtime scope
    pub fn value(&self, id: &Identifier) -> Result<Value> {
        self.evaluate(id, &ValueMap::new())
    }

    /// Evaluate one variable, resolving dependencies recursively
    ///
    /// `runtime` supplies names such as `time` and `dt`; dependencies that are
    /// not registered variables read as undefined. Each variable is computed
    /// at most once per call.
    pub fn evaluate(&self, id: &Identifier, runtime: &dyn Scope) -> Result<Value> {
        let mut memo = Memo::default();
        self.evaluate_memo(id, runtime, &mut memo)
    }

    /// Evaluate every variable, mapping failures to undefined
    pub fn snapshot(&self, runtime: &dyn Scope) -> ValueMap {
        let mut memo = Memo::default();
        let mut out = ValueMap::with_capacity(self.variables.len());
        for id in self.variables.keys() {
            let value = match self.evaluate_memo(id, runtime, &mut memo) {
                Ok(v) => v,
                Err(e) => {
                    debug!(variable = %id, error = %e, "variable evaluation failed");
                    Value::Undefined
                }
            };
            out.insert(id.to_string(), value);
        }
        out
    }

    fn evaluate_memo(&self, id: &Identifier, runtime: &dyn Scope, memo: &mut Memo) -> Result<Value> {
        if let Some(v) = memo.values.get(id) {
            return Ok(*v);
        }
        let var = self
            .variables
            .get(id)
            .ok_or_else(|| Error::VariableNotFound(id.clone()))?;

        let value = match var.expression() {
            None => var.literal_value().unwrap_or_default(),
            Some(expr) => {
                if !memo.in_progress.insert(id.clone()) {
                    return Err(Error::CircularDependency {
                        cycle_path: vec![id.clone(), id.clone()],
                    });
                }
                let mut deps = ValueMap::with_capacity(expr.dependencies().len());
                for dep in expr.dependencies() {
                    let dep_id = Identifier::from(dep.as_str());
                    let v = if self.variables.contains_key(&dep_id) {
                        self.evaluate_memo(&dep_id, runtime, memo)?
                    } else if let Some(v) = runtime.lookup(dep) {
                        v
                    } else {
                        Value::Undefined
                    };
                    deps.insert(dep.clone(), v);
                }
                memo.in_progress.remove(id);
                expr.evaluate(&Layered::new(&deps, runtime))?
            }
        };

        memo.values.insert(id.clone(), value);
        Ok(value)
    }
}

#[derive(Default)]
struct Memo {
    values: HashMap<Identifier, Value>,
    in_progress: HashSet<Identifier>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsim_core::extract_dependencies;
    use proptest::prelude::*;

    fn named(id: &str, mut var: Variable) -> Variable {
        var.assign_id(Identifier::new(id)).unwrap();
        var
    }

    fn table(vars: Vec<Variable>) -> VariableTable {
        let mut t = VariableTable::new();
        for v in vars {
            t.insert(v);
        }
        t
    }

    fn ids(path: &[&str]) -> Vec<Identifier> {
        path.iter().map(|s| Identifier::from(*s)).collect()
    }

    #[test]
    fn test_evaluate_chain() {
        let t = table(vec![
            named("a", Variable::literal("a", 2.0)),
            named("b", Variable::derived("b", "a * 3").unwrap()),
            named("c", Variable::derived("c", "b + a").unwrap()),
        ]);
        assert_eq!(t.value(&"c".into()).unwrap(), Value::Scalar(8.0));
    }

    #[test]
    fn test_missing_dependency_is_undefined() {
        let t = table(vec![named("a", Variable::derived("a", "ghost").unwrap())]);
        assert_eq!(t.value(&"a".into()).unwrap(), Value::Undefined);

        let t = table(vec![named("a", Variable::derived("a", "ghost + 1").unwrap())]);
        assert!(t.value(&"a".into()).is_err());
    }

    #[test]
    fn test_runtime_names() {
        let t = table(vec![named("a", Variable::derived("a", "2 * time").unwrap())]);
        let mut runtime = ValueMap::new();
        runtime.insert("time".to_string(), Value::Scalar(1.5));
        assert_eq!(t.evaluate(&"a".into(), &runtime).unwrap(), Value::Scalar(3.0));
    }

    #[test]
    fn test_find_cycle_with_override() {
        let t = table(vec![
            named("x", Variable::derived("x", "y + 1").unwrap()),
            named("y", Variable::literal("y", 1.0)),
        ]);
        assert!(t.validate().is_ok());

        let deps = extract_dependencies("x + 1").unwrap();
        let cycle = t.find_cycle_with(&"y".into(), &deps).unwrap();
        assert_eq!(cycle, ids(&["y", "x", "y"]));

        let deps = extract_dependencies("5").unwrap();
        assert!(t.find_cycle_with(&"y".into(), &deps).is_none());
    }

    #[test]
    fn test_self_reference() {
        let t = VariableTable::new();
        let deps = extract_dependencies("me * 2").unwrap();
        assert_eq!(t.find_cycle_with(&"me".into(), &deps).unwrap(), ids(&["me", "me"]));
    }

    #[test]
    fn test_cycle_path_excludes_lead_in() {
        let t = table(vec![
            named("a", Variable::derived("a", "b").unwrap()),
            named("b", Variable::derived("b", "c").unwrap()),
            named("c", Variable::derived("c", "b").unwrap()),
        ]);
        assert_eq!(t.find_cycle(&"a".into()).unwrap(), ids(&["b", "c", "b"]));
        let err = t.validate().unwrap_err();
        assert!(matches!(err, Error::CircularDependency { .. }));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let t = table(vec![
            named("base", Variable::literal("base", 1.0)),
            named("l", Variable::derived("l", "base + 1").unwrap()),
            named("r", Variable::derived("r", "base + 2").unwrap()),
            named("top", Variable::derived("top", "l * r").unwrap()),
        ]);
        assert!(t.validate().is_ok());
        assert_eq!(t.value(&"top".into()).unwrap(), Value::Scalar(6.0));
    }

    #[test]
    fn test_snapshot_maps_failures_to_undefined() {
        let t = table(vec![
            named("ok", Variable::literal("ok", [1.0, 2.0])),
            named("bad", Variable::derived("bad", "ok + true").unwrap()),
        ]);
        let snap = t.snapshot(&ValueMap::new());
        assert_eq!(snap["ok"], Value::Vector([1.0, 2.0]));
        assert_eq!(snap["bad"], Value::Undefined);
    }

    proptest! {
        #[test]
        fn prop_chain_sums(len in 1usize..30, start in -100.0f64..100.0) {
            let mut vars = vec![named("v0", Variable::literal("v0", start))];
            for i in 1..len {
                let source = format!("v{} + 1", i - 1);
                vars.push(named(&format!("v{i}"), Variable::derived("v", &source).unwrap()));
            }
            let t = table(vars);
            prop_assert!(t.validate().is_ok());
            let last = Identifier::new(format!("v{}", len - 1));
            let expected = start + (len - 1) as f64;
            let got = t.value(&last).unwrap().as_scalar().unwrap();
            prop_assert!((got - expected).abs() < 1e-9);
        }

        #[test]
        fn prop_closing_a_chain_is_a_cycle(len in 1usize..20) {
            let mut vars = vec![named("v0", Variable::literal("v0", 0.0))];
            for i in 1..len {
                let source = format!("v{}", i - 1);
                vars.push(named(&format!("v{i}"), Variable::derived("v", &source).unwrap()));
            }
            let t = table(vars);
            let deps = extract_dependencies(&format!("v{}", len - 1)).unwrap();
            let cycle = t.find_cycle_with(&"v0".into(), &deps).unwrap();
            prop_assert_eq!(cycle.len(), len + 1);
            prop_assert_eq!(cycle.first(), cycle.last());
        }
    }
}
