//! Formula evaluator

use crate::ast::{Node, NodeKind};
use crate::error::{ExpressionError, ExpressionResult, FormulaError};
use crate::functions::{FunctionDef, FunctionImpl, FunctionRegistry};
use indexmap::IndexSet;
use propcalc_core::{parents_of, Value, VariableRef};
use std::sync::Arc;

/// What the evaluator needs from its surroundings.
///
/// Implemented by the calculator that owns the variables and registered
/// expressions; [`StandaloneContext`] covers formulas without variables.
pub trait EvaluationContext {
    fn functions(&self) -> &FunctionRegistry;

    fn separator(&self) -> char {
        propcalc_core::DEFAULT_SEPARATOR
    }

    /// Recompute formula-backed inputs before reading them
    fn live_update(&self) -> bool {
        false
    }

    /// Look up a registered variable by name
    fn variable(&self, name: &str) -> Option<VariableRef>;

    /// Whether a formula is registered under `key`
    fn has_expression(&self, key: &str) -> bool;

    /// Resolve a key: a registered formula computes, anything else is read
    /// from its variable.
    fn compute_variable(&self, path: &str, relative: Option<&VariableRef>)
        -> ExpressionResult<Value>;

    /// Recompute the formulas under `keys` and write their results back
    fn compute_expressions(&self, keys: &[String]);
}

/// Evaluate a tree without a relative variable
pub fn evaluate(node: &Node, ctx: &dyn EvaluationContext) -> ExpressionResult<Value> {
    calc(node, ctx, None, None)
}

/// Evaluate `node`.
///
/// `relative` is the variable owning the formula being evaluated; `calling`
/// is the function whose argument `node` is, if any.
pub fn calc(
    node: &Node,
    ctx: &dyn EvaluationContext,
    relative: Option<&VariableRef>,
    calling: Option<&FunctionDef>,
) -> ExpressionResult<Value> {
    let result = match node.kind() {
        NodeKind::Number(n) => Ok(Value::Number(*n)),
        NodeKind::Text(s) => Ok(Value::Text(s.clone())),
        NodeKind::Variable(path) => calc_variable(node, path, ctx, relative, calling),
        NodeKind::Operator { .. } | NodeKind::Call { .. } => calc_function(node, ctx, relative),
    };
    result.map_err(|e| e.at(node.span()))
}

fn resolve(node: &Node, ctx: &dyn EvaluationContext) -> ExpressionResult<Arc<FunctionDef>> {
    let name = node.function_name().unwrap_or_default();
    node.function_cache()
        .get_or_try_init(|| {
            ctx.functions().get(name).cloned().ok_or_else(|| {
                log::debug!("unknown function {}", name);
                ExpressionError::new(FormulaError::UnknownFunction(name.to_string()))
            })
        })
        .map(Arc::clone)
}

fn calc_function(
    node: &Node,
    ctx: &dyn EvaluationContext,
    relative: Option<&VariableRef>,
) -> ExpressionResult<Value> {
    let def = resolve(node, ctx)?;
    let children = node.children();
    def.check_arity(children.len())?;

    match def.implementation {
        FunctionImpl::Intelligence(f) => f(children, ctx, relative),
        FunctionImpl::Values(f) => {
            let args = children
                .iter()
                .map(|child| calc(child, ctx, relative, Some(&def)))
                .collect::<ExpressionResult<Vec<_>>>()?;
            f(&args).map_err(ExpressionError::from)
        }
    }
}

fn calc_variable(
    node: &Node,
    path: &str,
    ctx: &dyn EvaluationContext,
    relative: Option<&VariableRef>,
    calling: Option<&FunctionDef>,
) -> ExpressionResult<Value> {
    let sep = ctx.separator();

    if let Some(rel) = relative {
        if ctx.live_update() {
            let keys = node
                .refresh_cache()
                .get_or_init(|| refresh_keys(path, rel, calling, ctx));
            if !keys.is_empty() {
                ctx.compute_expressions(keys);
            }
            return match path.strip_prefix(sep) {
                Some(property) => Ok(rel.get_property(property)?),
                None => ctx.compute_variable(path, None),
            };
        }

        if let Some((name, property)) = path.split_once(sep) {
            if name.is_empty() || name == rel.name() {
                return Ok(rel.get_property(property)?);
            }
        }
    }

    ctx.compute_variable(path, relative)
}

/// Formula keys feeding `path` that must be recomputed before it is read.
///
/// A property reference pulls in the formulas of the properties it is
/// derived from; a bare variable passed to a function declaring implicit
/// property usage pulls in those properties and their sources.
fn refresh_keys(
    path: &str,
    relative: &VariableRef,
    calling: Option<&FunctionDef>,
    ctx: &dyn EvaluationContext,
) -> Vec<String> {
    let sep = ctx.separator();

    let (name, roots, include_roots) = match path.split_once(sep) {
        Some((name, _)) if name.is_empty() || name == relative.name() => return Vec::new(),
        Some((name, rest)) => {
            let property = rest.split(sep).next().unwrap_or(rest);
            (name, vec![property.to_string()], false)
        }
        None => {
            if path == relative.name() {
                return Vec::new();
            }
            let implicit = ctx.variable(path).and_then(|var| {
                calling
                    .and_then(|f| f.implicit_properties_for(var.kind()))
                    .map(<[String]>::to_vec)
            });
            match implicit {
                Some(properties) => (path, properties, true),
                None => return Vec::new(),
            }
        }
    };

    let Some(variable) = ctx.variable(name) else {
        return Vec::new();
    };

    let mut seen: IndexSet<String> = IndexSet::new();
    let mut keys = Vec::new();
    let mut pending: Vec<(String, bool)> = roots.into_iter().map(|p| (p, true)).collect();
    while let Some((property, is_root)) = pending.pop() {
        if !seen.insert(property.clone()) {
            continue;
        }
        let key = format!("{}{}{}", name, sep, property);
        if (include_roots || !is_root) && ctx.has_expression(&key) {
            keys.push(key);
        }
        pending.extend(parents_of(variable.as_ref(), &property).map(|p| (p.to_string(), false)));
    }

    // Sources first
    keys.reverse();
    keys
}

/// Context for formulas that reference no variables
pub struct StandaloneContext<'a> {
    functions: &'a FunctionRegistry,
}

impl<'a> StandaloneContext<'a> {
    pub fn new(functions: &'a FunctionRegistry) -> Self {
        Self { functions }
    }
}

impl EvaluationContext for StandaloneContext<'_> {
    fn functions(&self) -> &FunctionRegistry {
        self.functions
    }

    fn variable(&self, _name: &str) -> Option<VariableRef> {
        None
    }

    fn has_expression(&self, _key: &str) -> bool {
        false
    }

    fn compute_variable(
        &self,
        path: &str,
        _relative: Option<&VariableRef>,
    ) -> ExpressionResult<Value> {
        let name = path.split(self.separator()).next().unwrap_or(path);
        Err(FormulaError::VariableNotFound(name.to_string()).into())
    }

    fn compute_expressions(&self, _keys: &[String]) {}
}
