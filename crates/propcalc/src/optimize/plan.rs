//! Building the optimization plan
//!
//! Decides, once for the whole formula set, which formulas can be cached and
//! recomputed only when something they read changes, and which must be
//! recomputed on every pass.

use ahash::{AHashMap, AHashSet};
use indexmap::{IndexMap, IndexSet};
use propcalc_core::{children_of, is_valid_name, parents_of};
use propcalc_formula::{
    classify, find_dependencies, DependencyGraph, DependencyInfo, DependencyKind,
    EvaluationContext, Expression,
};
use std::sync::Arc;

/// Result of optimization, keyed purely by strings so it can be handed to
/// another calculator holding the same formulas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizationPlan {
    /// Formulas recomputed on every pass
    pub not_optimizable: IndexSet<String>,
    /// Formulas recomputed only when one of their inputs changes
    pub optimizable: IndexSet<String>,
    /// Formulas whose text is a bare variable name
    pub object_references: IndexSet<String>,
    /// Changed key to the formulas that must be recomputed
    pub event_graph: IndexMap<String, IndexSet<String>>,
    /// Optimizable formulas, each after the formulas it reads
    pub order: IndexSet<String>,
}

impl OptimizationPlan {
    pub fn is_optimizable(&self, key: &str) -> bool {
        self.optimizable.contains(key)
    }

    /// Formulas queued when `key` changes
    pub fn listeners(&self, key: &str) -> Option<&IndexSet<String>> {
        self.event_graph.get(key)
    }

    /// Sort `keys` so that every formula comes after the formulas it reads.
    ///
    /// Keys outside the order keep their relative position and go first.
    pub fn sort_by_order(&self, keys: &mut [String]) {
        keys.sort_by_key(|key| self.order.get_index_of(key.as_str()));
    }

    /// Names of the variables whose changes the plan watches
    pub fn watched_variables(&self, separator: char) -> IndexSet<&str> {
        self.event_graph
            .keys()
            .map(|key| key.split(separator).next().unwrap_or(key))
            .collect()
    }

    /// Drop every formula key for which `keep` returns false
    pub fn retain_formulas(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.not_optimizable.retain(|key| keep(key));
        self.optimizable.retain(|key| keep(key));
        self.object_references.retain(|key| keep(key));
        self.order.retain(|key| keep(key));
        for formulas in self.event_graph.values_mut() {
            formulas.retain(|key| keep(key));
        }
        self.event_graph.retain(|_, formulas| !formulas.is_empty());
    }
}

/// Analyze `expressions` and build their plan
pub fn build_plan(
    expressions: &[Arc<Expression>],
    ctx: &dyn EvaluationContext,
) -> OptimizationPlan {
    let mut builder = PlanBuilder {
        ctx,
        sep: ctx.separator(),
        graph: DependencyGraph::new(),
        not_optimizable: IndexSet::new(),
    };

    builder.collect(expressions);
    builder.propagate_taint();
    builder.remove_cycles();
    builder.finish(expressions)
}

struct PlanBuilder<'a> {
    ctx: &'a dyn EvaluationContext,
    sep: char,
    graph: DependencyGraph,
    not_optimizable: IndexSet<String>,
}

impl PlanBuilder<'_> {
    fn join(&self, name: &str, property: &str) -> String {
        format!("{}{}{}", name, self.sep, property)
    }

    fn host_is_optimizable(&self, key: &str) -> bool {
        let name = key.split(self.sep).next().unwrap_or(key);
        self.ctx
            .variable(name)
            .map_or(false, |var| var.as_optimizable().is_some())
    }

    /// Keys of the properties derived from `key` inside its host
    fn derived_keys(&self, key: &str) -> Vec<String> {
        let Some((name, property)) = key.split_once(self.sep) else {
            return Vec::new();
        };
        match self.ctx.variable(name) {
            Some(var) => children_of(var.as_ref(), property)
                .map(|child| self.join(name, child))
                .collect(),
            None => Vec::new(),
        }
    }

    fn collect(&mut self, expressions: &[Arc<Expression>]) {
        for expression in expressions {
            match self.analyze(expression) {
                Some(deps) => {
                    self.graph.insert(DependencyInfo::new(
                        expression.key(),
                        DependencyKind::Expression,
                        deps,
                    ));
                }
                None => {
                    tracing::trace!(key = expression.key(), "not optimizable");
                    self.not_optimizable.insert(expression.key().to_string());
                }
            }
        }
    }

    /// Dependencies of an optimizable formula, or `None`
    fn analyze(&mut self, expression: &Expression) -> Option<Vec<String>> {
        let analysis = find_dependencies(
            expression.key(),
            expression.tree(),
            expression.variable().name(),
            self.ctx,
        );
        if !analysis.optimizable {
            return None;
        }

        let mut deps = analysis.keys;
        for key in self.derived_keys(expression.key()) {
            if !deps.contains(&key) {
                deps.push(key);
            }
        }

        for dep in &deps {
            if self.graph.contains(dep) {
                continue;
            }
            let kind = classify(dep, self.ctx);
            let accepted = match kind {
                DependencyKind::NotLegal => false,
                DependencyKind::Variable | DependencyKind::Property => {
                    self.host_is_optimizable(dep)
                }
                DependencyKind::Expression => true,
            };
            if !accepted {
                tracing::trace!(key = expression.key(), dependency = %dep, ?kind, "rejected");
                return None;
            }
            self.graph.insert(DependencyInfo::new(dep, kind, Vec::new()));
        }

        Some(deps)
    }

    /// Move every formula reading a not-optimizable key out of the graph,
    /// until nothing moves.
    fn propagate_taint(&mut self) {
        for key in &self.not_optimizable {
            self.graph.remove(key);
        }

        let mut last: IndexSet<String> = self.not_optimizable.clone();
        while !last.is_empty() {
            let mut tainted: IndexSet<String> = IndexSet::new();
            for info in self.graph.iter() {
                if info.kind != DependencyKind::Expression {
                    continue;
                }
                for dep in info.deps.iter().filter(|dep| last.contains(*dep)) {
                    tainted.insert(info.key.clone());
                    tainted.extend(self.derived_keys(dep));
                }
            }

            last.clear();
            for key in tainted {
                self.graph.remove(&key);
                if self.not_optimizable.insert(key.clone()) {
                    last.insert(key);
                }
            }
        }
    }

    fn remove_cycles(&mut self) {
        let roots: Vec<usize> = self.graph.indices().collect();
        let mut processed = AHashMap::new();
        for idx in roots {
            let mut path = AHashSet::new();
            self.walk(idx, &mut path, &mut processed);
        }

        for key in &self.not_optimizable {
            self.graph.remove(key);
        }
    }

    /// Depth-first walk from `idx`; returns true if it lies on a cycle or
    /// reads a formula that does.
    ///
    /// `path` holds the `(from, to)` edges of the current chain. `processed`
    /// is shared by every root, so each node is walked once.
    fn walk(
        &mut self,
        idx: usize,
        path: &mut AHashSet<(usize, usize)>,
        processed: &mut AHashMap<usize, bool>,
    ) -> bool {
        if let Some(&cyclic) = processed.get(&idx) {
            return cyclic;
        }
        let Some(info) = self.graph.node(idx) else {
            return false;
        };
        if self.not_optimizable.contains(&info.key) {
            processed.insert(idx, true);
            return true;
        }
        let key = info.key.clone();
        let deps: Vec<(String, Option<usize>)> = info
            .deps
            .iter()
            .map(|dep| (dep.clone(), self.graph.index_of(dep)))
            .collect();

        let mut cyclic = false;
        for (dep, dep_idx) in &deps {
            let repeated = dep_idx.map_or(false, |d| path.contains(&(idx, d)));
            if repeated || self.aliased_on_path(idx, dep, path) {
                tracing::trace!(key = %key, dependency = %dep, "cycle");
                self.not_optimizable.insert(dep.clone());
                cyclic = true;
            }
        }

        for (dep, dep_idx) in &deps {
            let Some(d) = *dep_idx else { continue };
            if self.not_optimizable.contains(dep) {
                cyclic = true;
                continue;
            }
            path.insert((idx, d));
            if self.walk(d, path, processed) {
                cyclic = true;
            } else {
                path.remove(&(idx, d));
            }
        }

        if cyclic {
            self.not_optimizable.insert(key);
        }
        processed.insert(idx, cyclic);
        cyclic
    }

    /// Whether a property `dep` is derived from is already on the path
    fn aliased_on_path(&self, from: usize, dep: &str, path: &AHashSet<(usize, usize)>) -> bool {
        let Some((name, property)) = dep.split_once(self.sep) else {
            return false;
        };
        let Some(var) = self.ctx.variable(name) else {
            return false;
        };
        let found = parents_of(var.as_ref(), property).any(|parent| {
            self.graph
                .index_of(&self.join(name, parent))
                .map_or(false, |p| path.contains(&(from, p)))
        });
        found
    }

    fn finish(self, expressions: &[Arc<Expression>]) -> OptimizationPlan {
        let mut plan = OptimizationPlan::default();

        for info in self.graph.iter() {
            if info.kind != DependencyKind::Expression || !self.ctx.has_expression(&info.key) {
                continue;
            }
            plan.optimizable.insert(info.key.clone());

            let mut visited = AHashSet::new();
            self.add_listeners(&info.key, &info.deps, &mut plan.event_graph, &mut visited);

            // Recompute when the target is changed from outside
            if self.host_is_optimizable(&info.key) {
                plan.event_graph
                    .entry(info.key.clone())
                    .or_default()
                    .insert(info.key.clone());
            }
        }

        plan.order = self.topological_order(&plan.optimizable);

        for expression in expressions {
            let key = expression.key();
            if !self.not_optimizable.contains(key) {
                continue;
            }
            if is_valid_name(expression.formula().trim()) {
                plan.object_references.insert(key.to_string());
            } else {
                plan.not_optimizable.insert(key.to_string());
            }
        }

        tracing::debug!(
            optimizable = plan.optimizable.len(),
            not_optimizable = plan.not_optimizable.len(),
            object_references = plan.object_references.len(),
            watched_keys = plan.event_graph.len(),
            "optimization plan built"
        );
        plan
    }

    /// Optimizable formulas in dependency order, sources first
    fn topological_order(&self, optimizable: &IndexSet<String>) -> IndexSet<String> {
        let mut order = IndexSet::with_capacity(optimizable.len());
        let mut entered = AHashSet::new();
        for key in optimizable {
            self.visit_in_order(key, optimizable, &mut entered, &mut order);
        }
        order
    }

    fn visit_in_order(
        &self,
        key: &str,
        optimizable: &IndexSet<String>,
        entered: &mut AHashSet<String>,
        order: &mut IndexSet<String>,
    ) {
        if !entered.insert(key.to_string()) {
            return;
        }
        if let Some(info) = self.graph.get(key) {
            for dep in info.deps.iter().filter(|dep| optimizable.contains(*dep)) {
                self.visit_in_order(dep, optimizable, entered, order);
            }
        }
        order.insert(key.to_string());
    }

    /// Add `formula` to the bucket of every key in `deps`, following
    /// dependencies that are themselves formulas.
    fn add_listeners(
        &self,
        formula: &str,
        deps: &[String],
        event_graph: &mut IndexMap<String, IndexSet<String>>,
        visited: &mut AHashSet<String>,
    ) {
        for dep in deps {
            event_graph
                .entry(dep.clone())
                .or_default()
                .insert(formula.to_string());
            if !visited.insert(dep.clone()) {
                continue;
            }
            if let Some(info) = self.graph.get(dep) {
                if info.kind == DependencyKind::Expression {
                    self.add_listeners(formula, &info.deps, event_graph, visited);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Calculator;
    use pretty_assertions::assert_eq;
    use propcalc_core::{Record, ValueType};

    fn set(keys: &[&str]) -> IndexSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn calculator() -> Calculator {
        let mut calc = Calculator::new();
        calc.add_variable(
            Record::new("a", "Box")
                .with_property("p", ValueType::Number, 1.0)
                .with_property("q", ValueType::Number, 2.0)
                .with_property("r", ValueType::Number, 0.0)
                .shared(),
        )
        .unwrap();
        calc.add_variable(
            Record::new("b", "Box")
                .with_property("p", ValueType::Number, 1.0)
                .with_property("q", ValueType::Number, 2.0)
                .with_property("r", ValueType::Number, 0.0)
                .shared(),
        )
        .unwrap();
        calc
    }

    fn plan_of(calc: &Calculator) -> OptimizationPlan {
        build_plan(&calc.expressions().snapshot(), calc)
    }

    #[test]
    fn test_chain_is_optimizable() {
        let mut calc = calculator();
        calc.add_expression("b.q", "a.p * 2").unwrap();
        calc.add_expression("b.r", "b.q + 1").unwrap();

        let plan = plan_of(&calc);
        assert_eq!(plan.optimizable, set(&["b.q", "b.r"]));
        assert!(plan.not_optimizable.is_empty());

        // b.r is reachable from a.p through b.q
        assert_eq!(plan.listeners("a.p"), Some(&set(&["b.q", "b.r"])));
        assert_eq!(plan.listeners("b.q"), Some(&set(&["b.q", "b.r"])));
        assert_eq!(plan.listeners("b.r"), Some(&set(&["b.r"])));
    }

    #[test]
    fn test_self_reference_is_not_optimizable() {
        let mut calc = calculator();
        calc.add_expression("a.p", "a.p + 1").unwrap();

        let plan = plan_of(&calc);
        assert_eq!(plan.not_optimizable, set(&["a.p"]));
        assert!(plan.event_graph.is_empty());
    }

    #[test]
    fn test_taint_reaches_readers() {
        let mut calc = calculator();
        calc.add_expression("a.q", "random()").unwrap();
        calc.add_expression("a.r", "a.q + 1").unwrap();
        calc.add_expression("b.p", "a.r * 2").unwrap();
        calc.add_expression("b.q", "a.p").unwrap();

        let plan = plan_of(&calc);
        assert_eq!(plan.not_optimizable, set(&["a.q", "a.r", "b.p"]));
        assert_eq!(plan.optimizable, set(&["b.q"]));
    }

    #[test]
    fn test_cycle_is_removed() {
        let mut calc = calculator();
        calc.add_expression("a.p", "b.q + 1").unwrap();
        calc.add_expression("b.q", "a.p + 1").unwrap();
        calc.add_expression("b.r", "a.q").unwrap();

        let plan = plan_of(&calc);
        assert_eq!(plan.not_optimizable, set(&["a.p", "b.q"]));
        assert_eq!(plan.optimizable, set(&["b.r"]));
    }

    #[test]
    fn test_cycle_through_property_dependency() {
        let mut calc = Calculator::new();
        calc.add_variable(
            Record::new("a", "Box")
                .with_property("p", ValueType::Number, 1.0)
                .with_property("q", ValueType::Number, 1.0)
                .with_dependency("p", "q")
                .shared(),
        )
        .unwrap();
        calc.add_variable(
            Record::new("b", "Box")
                .with_property("x", ValueType::Number, 1.0)
                .shared(),
        )
        .unwrap();
        // a.q is derived from a.p inside the host, so b.x -> a.q -> a.p -> b.x
        calc.add_expression("a.p", "b.x").unwrap();
        calc.add_expression("b.x", "a.q * 2").unwrap();

        let plan = build_plan(&calc.expressions().snapshot(), &calc);
        assert!(plan.optimizable.is_empty());
        assert_eq!(plan.not_optimizable, set(&["a.p", "b.x"]));
    }

    #[test]
    fn test_reader_of_cycle_is_not_optimizable() {
        let mut calc = calculator();
        calc.add_expression("a.p", "b.q + 1").unwrap();
        calc.add_expression("b.q", "a.p + 1").unwrap();
        calc.add_expression("b.r", "b.q * 2").unwrap();

        let plan = plan_of(&calc);
        assert_eq!(plan.not_optimizable, set(&["a.p", "b.q", "b.r"]));
        assert!(plan.optimizable.is_empty());
        assert!(plan.order.is_empty());
    }

    #[test]
    fn test_order_puts_sources_first() {
        let mut calc = calculator();
        calc.add_expression("a.r", ".q").unwrap();
        calc.add_expression("a.q", ".p + 1").unwrap();
        calc.add_expression("b.p", "a.r + a.q").unwrap();
        calc.add_expression("a.p", "5").unwrap();

        let plan = plan_of(&calc);
        let order: Vec<&str> = plan.order.iter().map(String::as_str).collect();
        assert_eq!(order, vec!["a.p", "a.q", "a.r", "b.p"]);

        let mut keys = vec![
            "b.p".to_string(),
            "c.link".to_string(),
            "a.r".to_string(),
            "a.p".to_string(),
        ];
        plan.sort_by_order(&mut keys);
        assert_eq!(keys, vec!["c.link", "a.p", "a.r", "b.p"]);
    }

    #[test]
    fn test_untracked_host_is_not_optimizable() {
        let mut calc = calculator();
        calc.add_variable(
            Record::new("c", "Box")
                .with_property("p", ValueType::Number, 1.0)
                .untracked()
                .shared(),
        )
        .unwrap();
        calc.add_expression("a.p", "c.p").unwrap();
        calc.add_expression("a.q", "c.p + 1").unwrap();

        let plan = plan_of(&calc);
        assert!(plan.object_references.is_empty());
        assert_eq!(plan.not_optimizable, set(&["a.p", "a.q"]));
    }

    #[test]
    fn test_bare_name_is_object_reference() {
        let mut calc = calculator();
        calc.add_variable(
            Record::new("c", "Box")
                .with_property("link", ValueType::Object, propcalc_core::Value::Empty)
                .shared(),
        )
        .unwrap();
        calc.add_expression("c.link", " a ").unwrap();

        let plan = plan_of(&calc);
        assert_eq!(plan.object_references, set(&["c.link"]));
        assert!(plan.not_optimizable.is_empty());
    }

    #[test]
    fn test_retain_formulas() {
        let mut calc = calculator();
        calc.add_expression("b.q", "a.p * 2").unwrap();
        calc.add_expression("b.r", "a.p + 1").unwrap();

        let mut plan = plan_of(&calc);
        plan.retain_formulas(|key| key != "b.r");
        assert_eq!(plan.optimizable, set(&["b.q"]));
        assert_eq!(plan.listeners("a.p"), Some(&set(&["b.q"])));
        assert!(plan.listeners("b.r").is_none());
        assert_eq!(plan.order, set(&["b.q"]));
    }
}
