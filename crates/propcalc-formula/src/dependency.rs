//! Dependency analysis
//!
//! Finds the keys a formula reads, decides whether the formula can be cached
//! and recomputed selectively, and stores the result in an index-based graph.

use crate::ast::{Node, NodeKind};
use crate::evaluator::EvaluationContext;
use crate::functions::FunctionDef;
use ahash::AHashMap;
use indexmap::IndexSet;
use propcalc_core::parents_of;

/// Keys a formula depends on and whether it is optimizable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyAnalysis {
    pub keys: Vec<String>,
    pub optimizable: bool,
}

/// Find the dependencies of the formula `node` registered under `expr_key`.
///
/// `relative_name` names the variable owning the formula; it resolves paths
/// with a leading separator.
pub fn find_dependencies(
    expr_key: &str,
    node: &Node,
    relative_name: &str,
    ctx: &dyn EvaluationContext,
) -> DependencyAnalysis {
    let mut finder = Finder {
        expr_key,
        relative_name,
        ctx,
        sep: ctx.separator(),
        keys: IndexSet::new(),
        optimizable: true,
    };
    finder.visit(node, None, false);

    DependencyAnalysis {
        keys: finder.keys.into_iter().collect(),
        optimizable: finder.optimizable,
    }
}

struct Finder<'a> {
    expr_key: &'a str,
    relative_name: &'a str,
    ctx: &'a dyn EvaluationContext,
    sep: char,
    keys: IndexSet<String>,
    optimizable: bool,
}

impl Finder<'_> {
    fn visit(&mut self, node: &Node, call: Option<&FunctionDef>, slack: bool) {
        match node.kind() {
            NodeKind::Number(_) | NodeKind::Text(_) => {}
            NodeKind::Variable(path) => self.visit_path(path, call, slack),
            NodeKind::Operator { .. } | NodeKind::Call { .. } => {
                let name = node.function_name().unwrap_or_default();
                let Some(def) = self.ctx.functions().get(name).cloned() else {
                    log::debug!("{}: unknown function {}", self.expr_key, name);
                    self.optimizable = false;
                    return;
                };
                if def.capabilities.random {
                    self.optimizable = false;
                    return;
                }

                let call = if node.is_call() { Some(def.as_ref()) } else { None };
                let slack = slack || def.capabilities.slack;
                for child in node.children() {
                    self.visit(child, call, slack);
                }
            }
        }
    }

    fn visit_path(&mut self, path: &str, call: Option<&FunctionDef>, slack: bool) {
        let absolute = if path.starts_with(self.sep) {
            format!("{}{}", self.relative_name, path)
        } else {
            path.to_string()
        };

        let Some((name, rest)) = absolute.split_once(self.sep) else {
            self.visit_object(&absolute, call);
            return;
        };

        // Sub-properties are tracked at the property level
        let property = rest.split(self.sep).next().unwrap_or(rest);
        let key = format!("{}{}{}", name, self.sep, property);

        if key == self.expr_key {
            if !slack {
                self.optimizable = false;
            }
            return;
        }

        let Some(variable) = self.ctx.variable(name) else {
            self.optimizable = false;
            return;
        };

        self.keys.insert(key);
        for parent in parents_of(variable.as_ref(), property) {
            self.keys.insert(format!("{}{}{}", name, self.sep, parent));
        }
    }

    /// A bare variable name: implicit property reads, or an opaque reference
    fn visit_object(&mut self, name: &str, call: Option<&FunctionDef>) {
        let variable = self.ctx.variable(name);
        let implicit = variable.as_ref().and_then(|var| {
            call.and_then(|f| f.implicit_properties_for(var.kind()))
        });

        match (variable.as_ref(), implicit) {
            (Some(var), Some(properties)) => {
                let mut pending: Vec<&str> = properties.iter().map(String::as_str).collect();
                let mut seen: IndexSet<String> = IndexSet::new();
                while let Some(property) = pending.pop() {
                    if !seen.insert(property.to_string()) {
                        continue;
                    }
                    let key = format!("{}{}{}", name, self.sep, property);
                    if key == self.expr_key {
                        self.optimizable = false;
                    }
                    self.keys.insert(key);
                    pending.extend(parents_of(var.as_ref(), property));
                }
            }
            _ => self.optimizable = false,
        }
    }
}

/// Classification of a dependency key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// A bare host variable
    Variable,
    /// `variable.property`
    Property,
    /// A key with a registered formula, whatever its shape
    Expression,
    /// Anything deeper than `variable.property`
    NotLegal,
}

/// Classify `key`
pub fn classify(key: &str, ctx: &dyn EvaluationContext) -> DependencyKind {
    if ctx.has_expression(key) {
        return DependencyKind::Expression;
    }
    match key.matches(ctx.separator()).count() {
        0 => DependencyKind::Variable,
        1 => DependencyKind::Property,
        _ => DependencyKind::NotLegal,
    }
}

/// A node of the dependency graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyInfo {
    pub key: String,
    pub kind: DependencyKind,
    /// Keys this one depends on; empty for raw variables and properties
    pub deps: Vec<String>,
}

impl DependencyInfo {
    pub fn new(key: &str, kind: DependencyKind, deps: Vec<String>) -> Self {
        Self {
            key: key.to_string(),
            kind,
            deps,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    info: DependencyInfo,
    active: bool,
}

/// Dependency graph stored as an arena.
///
/// Indices are stable: removing a key only deactivates its slot, and
/// inserting it again reuses the slot.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    slots: Vec<Slot>,
    index: AHashMap<String, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the node for `info.key`, returning its index
    pub fn insert(&mut self, info: DependencyInfo) -> usize {
        if let Some(&idx) = self.index.get(&info.key) {
            self.slots[idx] = Slot { info, active: true };
            return idx;
        }
        let idx = self.slots.len();
        self.index.insert(info.key.clone(), idx);
        self.slots.push(Slot { info, active: true });
        idx
    }

    /// Index of an active key
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.index
            .get(key)
            .copied()
            .filter(|&idx| self.slots[idx].active)
    }

    pub fn get(&self, key: &str) -> Option<&DependencyInfo> {
        self.index_of(key).map(|idx| &self.slots[idx].info)
    }

    /// Node at `idx`, active or not
    pub fn node(&self, idx: usize) -> Option<&DependencyInfo> {
        self.slots.get(idx).map(|slot| &slot.info)
    }

    pub fn is_active(&self, idx: usize) -> bool {
        self.slots.get(idx).map_or(false, |slot| slot.active)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index_of(key).is_some()
    }

    /// Deactivate a key; returns false if it was not active
    pub fn remove(&mut self, key: &str) -> bool {
        match self.index_of(key) {
            Some(idx) => {
                self.slots[idx].active = false;
                true
            }
            None => false,
        }
    }

    /// Active nodes in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &DependencyInfo> {
        self.slots
            .iter()
            .filter(|slot| slot.active)
            .map(|slot| &slot.info)
    }

    /// Indices of active nodes in insertion order
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.active)
            .map(|(idx, _)| idx)
    }

    /// Number of active nodes
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.active).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExpressionResult, FormulaResult};
    use crate::functions::FunctionRegistry;
    use crate::operators::OperatorTable;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;
    use propcalc_core::{Record, Value, ValueType, VariableRef, VariableSet};

    struct Scene {
        functions: FunctionRegistry,
        variables: VariableSet,
        formulas: Vec<&'static str>,
    }

    impl EvaluationContext for Scene {
        fn functions(&self) -> &FunctionRegistry {
            &self.functions
        }

        fn variable(&self, name: &str) -> Option<VariableRef> {
            self.variables.get(name).cloned()
        }

        fn has_expression(&self, key: &str) -> bool {
            self.formulas.iter().any(|f| *f == key)
        }

        fn compute_variable(
            &self,
            _path: &str,
            _relative: Option<&VariableRef>,
        ) -> ExpressionResult<Value> {
            Ok(Value::Empty)
        }

        fn compute_expressions(&self, _keys: &[String]) {}
    }

    fn first(args: &[Value]) -> FormulaResult<Value> {
        Ok(args.first().cloned().unwrap_or_default())
    }

    /// `a` is a Rect whose `w` is derived from `base`; `b` is a plain Box
    fn scene() -> Scene {
        let mut functions = FunctionRegistry::new();
        functions.register(FunctionDef::new("keep", 1, Some(1), first).slack());
        functions.register(
            FunctionDef::new("area", 1, Some(1), first).reads_properties("Rect", &["w", "h"]),
        );
        functions.register(FunctionDef::new("plain", 1, Some(1), first));

        let mut variables = VariableSet::new();
        variables
            .add(
                Record::new("a", "Rect")
                    .with_property("base", ValueType::Number, 1.0)
                    .with_property("w", ValueType::Number, 1.0)
                    .with_property("h", ValueType::Number, 1.0)
                    .with_property("p", ValueType::Number, 0.0)
                    .with_property("link", ValueType::Object, Value::Empty)
                    .with_dependency("base", "w")
                    .shared(),
            )
            .unwrap();
        variables
            .add(
                Record::new("b", "Box")
                    .with_property("q", ValueType::Number, 0.0)
                    .shared(),
            )
            .unwrap();

        Scene {
            functions,
            variables,
            formulas: vec!["b.q"],
        }
    }

    fn analyze(scene: &Scene, key: &str, formula: &str) -> DependencyAnalysis {
        let tree = parse(formula, &OperatorTable::standard()).unwrap();
        let owner = key.split('.').next().unwrap();
        find_dependencies(key, &tree, owner, scene)
    }

    fn sorted(mut keys: Vec<String>) -> Vec<String> {
        keys.sort();
        keys
    }

    #[test]
    fn test_self_reference_needs_slack() {
        let scene = scene();
        assert!(!analyze(&scene, "a.p", "a.p + 1").optimizable);
        assert!(!analyze(&scene, "a.p", ".p * 2").optimizable);

        let slack = analyze(&scene, "a.p", "keep(a.p + 1)");
        assert!(slack.optimizable);
        assert!(slack.keys.is_empty());

        // The flag reaches through nested operators and calls
        let nested = analyze(&scene, "a.p", "keep(1 + abs(.p * 2)) + b.q");
        assert!(nested.optimizable);
        assert_eq!(nested.keys, vec!["b.q".to_string()]);
    }

    #[test]
    fn test_implicit_properties_fold_in_parents() {
        let scene = scene();
        let analysis = analyze(&scene, "b.q", "area(a) * 2");
        assert!(analysis.optimizable);
        assert_eq!(sorted(analysis.keys), vec!["a.base", "a.h", "a.w"]);
    }

    #[test]
    fn test_bare_variable_without_implicit_properties_is_opaque() {
        let scene = scene();
        assert!(!analyze(&scene, "b.q", "plain(a)").optimizable);
        assert!(!analyze(&scene, "b.q", "a").optimizable);
        // Implicit properties are declared for Rect only
        assert!(!analyze(&scene, "a.p", "area(b)").optimizable);
    }

    #[test]
    fn test_sub_property_is_tracked_at_property_level() {
        let scene = scene();
        let analysis = analyze(&scene, "b.q", "a.link.p + .link.h");
        assert!(analysis.optimizable);
        assert_eq!(analysis.keys, vec!["a.link".to_string()]);
    }

    #[test]
    fn test_derived_property_depends_on_parent() {
        let scene = scene();
        let analysis = analyze(&scene, "b.q", "a.w + a.h");
        assert_eq!(analysis.keys, vec!["a.w", "a.base", "a.h"]);

        let relative = analyze(&scene, "a.p", ".w");
        assert_eq!(relative.keys, vec!["a.w", "a.base"]);
    }

    #[test]
    fn test_unknown_names_and_random_are_not_optimizable() {
        let scene = scene();
        assert!(!analyze(&scene, "b.q", "c.x + 1").optimizable);
        assert!(!analyze(&scene, "b.q", "nosuch(a.w)").optimizable);
        assert!(!analyze(&scene, "b.q", "a.w + random()").optimizable);
    }

    #[test]
    fn test_classify() {
        let scene = scene();
        assert_eq!(classify("b.q", &scene), DependencyKind::Expression);
        assert_eq!(classify("a", &scene), DependencyKind::Variable);
        assert_eq!(classify("a.w", &scene), DependencyKind::Property);
        assert_eq!(classify("a.link.p", &scene), DependencyKind::NotLegal);
    }

    fn info(key: &str, deps: &[&str]) -> DependencyInfo {
        DependencyInfo::new(
            key,
            DependencyKind::Expression,
            deps.iter().map(|d| d.to_string()).collect(),
        )
    }

    #[test]
    fn test_graph_indices_are_stable() {
        let mut graph = DependencyGraph::new();
        let a = graph.insert(info("a.p", &["b.q"]));
        let b = graph.insert(info("b.q", &[]));
        assert_eq!((a, b), (0, 1));

        assert!(graph.remove("a.p"));
        assert!(!graph.contains("a.p"));
        assert_eq!(graph.index_of("b.q"), Some(1));
        assert_eq!(graph.len(), 1);

        assert_eq!(graph.insert(info("a.p", &[])), 0);
        assert_eq!(graph.get("a.p").map(|i| i.deps.len()), Some(0));
    }

    #[test]
    fn test_graph_iterates_active_in_order() {
        let mut graph = DependencyGraph::new();
        graph.insert(info("x.a", &[]));
        graph.insert(info("x.b", &[]));
        graph.insert(info("x.c", &[]));
        graph.remove("x.b");

        let keys: Vec<&str> = graph.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["x.a", "x.c"]);
    }
}
