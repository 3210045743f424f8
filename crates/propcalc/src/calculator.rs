//! Calculator facade
//!
//! Owns the variables, the registered formulas, the function and operator
//! tables, and the recompute engine.
//!
//! # Example
//!
//! ```rust
//! use propcalc::prelude::*;
//!
//! let mut calc = Calculator::new();
//! let square = Record::new("sq", "Square")
//!     .with_property("side", ValueType::Number, 3.0)
//!     .with_property("area", ValueType::Number, 0.0)
//!     .shared();
//! calc.add_variable(square.clone()).unwrap();
//! calc.add_expression("sq.area", ".side ^ 2").unwrap();
//!
//! calc.optimize();
//! calc.recompute_all();
//! assert_eq!(square.get_property("area").unwrap(), Value::Number(9.0));
//!
//! square.set_property("side", Value::Number(4.0)).unwrap();
//! assert_eq!(calc.recompute(), 1);
//! assert_eq!(square.get_property("area").unwrap(), Value::Number(16.0));
//! ```

use crate::error::Result;
use crate::exceptions::ExpressionErrors;
use crate::expressions::ExpressionSet;
use crate::optimize::{build_plan, OptimizationPlan, OptimizeManager};
use ahash::AHashSet;
use propcalc_core::{
    parents_of, Error as CoreError, Value, VariableRef, VariableSet, DEFAULT_SEPARATOR,
};
use propcalc_formula::{
    calc, EvaluationContext, Expression, ExpressionError, ExpressionResult, FormulaError,
    FunctionRegistry, Node, NodeKind, OperatorTable, Parser, Span, DEFAULT_MAX_DEPTH,
};
use std::borrow::Cow;
use std::sync::Arc;

/// Calculator configuration
#[derive(Debug, Clone)]
pub struct CalculatorOptions {
    /// Character between a variable name and a property (default: `.`)
    pub separator: char,
    /// Token for paths above the current variable; handed to the host as is (default: `$`)
    pub up: String,
    /// Recompute formula-backed inputs before reading them during evaluation
    pub live_update: bool,
    /// Match function names exactly instead of ignoring case
    pub case_sensitive_functions: bool,
    /// Maximum nesting depth accepted by the parser
    pub max_depth: usize,
}

impl Default for CalculatorOptions {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            up: "$".to_string(),
            live_update: false,
            case_sensitive_functions: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Formula calculator over host variables
pub struct Calculator {
    options: CalculatorOptions,
    variables: VariableSet,
    expressions: Arc<ExpressionSet>,
    functions: FunctionRegistry,
    operators: OperatorTable,
    exceptions: ExpressionErrors,
    engine: OptimizeManager,
}

impl Calculator {
    /// Calculator with default options and the built-in functions
    pub fn new() -> Self {
        Self::with_options(CalculatorOptions::default())
    }

    pub fn with_options(options: CalculatorOptions) -> Self {
        let functions = FunctionRegistry::new().case_sensitive(options.case_sensitive_functions);
        Self::with_functions(options, functions)
    }

    /// Calculator using a prepared function registry
    pub fn with_functions(options: CalculatorOptions, functions: FunctionRegistry) -> Self {
        let expressions = Arc::new(ExpressionSet::new());
        Self {
            variables: VariableSet::with_separator(options.separator),
            engine: OptimizeManager::new(Arc::clone(&expressions), options.separator),
            expressions,
            functions,
            operators: OperatorTable::standard(),
            exceptions: ExpressionErrors::new(),
            options,
        }
    }

    pub fn options(&self) -> &CalculatorOptions {
        &self.options
    }

    pub fn set_live_update(&mut self, live_update: bool) {
        self.options.live_update = live_update;
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    pub fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    pub fn operators_mut(&mut self) -> &mut OperatorTable {
        &mut self.operators
    }

    fn parser(&self) -> Parser<'_> {
        Parser::new(&self.operators)
            .separator(self.options.separator)
            .up_token(&self.options.up)
            .max_depth(self.options.max_depth)
    }

    // ===== Variables =====

    /// Register a host variable
    pub fn add_variable(&mut self, variable: VariableRef) -> Result<()> {
        Ok(self.variables.add(variable)?)
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<VariableRef> {
        self.variables.remove(name)
    }

    /// Look up a variable; a key resolves to its variable part
    pub fn variable(&self, name: &str) -> Option<&VariableRef> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }

    /// Unused variable name built from `prefix`
    pub fn generate_new_name(&self, prefix: &str) -> String {
        self.variables.generate_new_name(prefix)
    }

    /// Whether `name` matches the variable name grammar
    pub fn is_valid_name(name: &str) -> bool {
        propcalc_core::is_valid_name(name)
    }

    // ===== Expressions =====

    fn parse_expression(&self, key: &str, formula: &str) -> Result<Expression> {
        Ok(Expression::parse(key, formula, &self.parser(), &self.variables)?)
    }

    /// Register a formula under `key`; fails if one is already registered
    pub fn add_expression(&mut self, key: &str, formula: &str) -> Result<()> {
        if self.expressions.contains(key) {
            return Err(
                ExpressionError::new(FormulaError::DuplicateExpression(key.to_string()))
                    .with_key(key)
                    .into(),
            );
        }
        let expression = self.parse_expression(key, formula)?;
        self.expressions.insert(expression);
        Ok(())
    }

    /// Register or replace the formula under `key`.
    ///
    /// A replaced formula keeps its position; the installed plan is not
    /// updated until the next [`optimize`](Self::optimize).
    pub fn set_expression(&mut self, key: &str, formula: &str) -> Result<()> {
        let expression = self.parse_expression(key, formula)?;
        if self.expressions.insert(expression).is_some() && self.engine.is_installed() {
            tracing::debug!(key, "formula replaced after optimize");
        }
        Ok(())
    }

    pub fn remove_expression(&mut self, key: &str) -> bool {
        self.expressions.remove(key).is_some()
    }

    pub fn contains_expression(&self, key: &str) -> bool {
        self.expressions.contains(key)
    }

    /// Source text of the formula under `key`
    pub fn formula(&self, key: &str) -> Option<String> {
        self.expressions.get(key).map(|e| e.formula().to_string())
    }

    pub fn expression(&self, key: &str) -> Option<Arc<Expression>> {
        self.expressions.get(key)
    }

    pub fn expression_keys(&self) -> Vec<String> {
        self.expressions.keys()
    }

    pub fn expressions(&self) -> &ExpressionSet {
        &self.expressions
    }

    /// Remove every variable and formula, and uninstall the plan
    pub fn clear(&mut self) {
        self.engine.reset();
        self.expressions.clear();
        self.variables.clear();
    }

    // ===== Evaluation =====

    /// Parse and evaluate a formula without registering it.
    ///
    /// `relative` names the variable `.property` paths refer to.
    pub fn compute(&self, formula: &str, relative: Option<&str>) -> Result<Value> {
        let tree = self.parser().parse(formula)?;
        let relative = match relative {
            Some(name) => Some(
                self.variables
                    .get(name)
                    .cloned()
                    .ok_or_else(|| FormulaError::VariableNotFound(name.to_string()))?,
            ),
            None => None,
        };
        Ok(calc(&tree, self, relative.as_ref(), None)?)
    }

    /// Resolve a path.
    ///
    /// A key with a registered formula computes it; a bare variable name
    /// yields the variable itself as [`Value::Object`]; anything else reads
    /// the property, walking sub-properties through object values.
    pub fn compute_variable(
        &self,
        path: &str,
        relative: Option<&VariableRef>,
    ) -> ExpressionResult<Value> {
        let sep = self.options.separator;
        let absolute: Cow<'_, str> = match relative {
            Some(rel) if path.starts_with(sep) => Cow::Owned(format!("{}{}", rel.name(), path)),
            _ => Cow::Borrowed(path),
        };

        if let Some(expression) = self.expressions.get(&absolute) {
            return expression.calc(self);
        }

        // Up paths belong to the host
        if !self.options.up.is_empty() && absolute.starts_with(self.options.up.as_str()) {
            return match relative {
                Some(rel) => Ok(rel.get_property(&absolute)?),
                None => Err(FormulaError::VariableNotFound(absolute.into_owned()).into()),
            };
        }

        let mut segments = absolute.split(sep);
        let name = segments.next().unwrap_or_default();
        let variable = self
            .variables
            .get(name)
            .cloned()
            .ok_or_else(|| FormulaError::VariableNotFound(name.to_string()))?;

        let mut value = Value::Object(variable);
        for property in segments {
            let Value::Object(host) = value else {
                return Err(FormulaError::Evaluation(format!(
                    "'{}' does not resolve to an object",
                    absolute
                ))
                .into());
            };
            value = host.get_property(property)?;
        }
        Ok(value)
    }

    /// Recompute the formulas under `keys` and write the results to their
    /// properties.
    ///
    /// Failures, including values the property cannot hold, are collected in
    /// [`exceptions`](Self::exceptions); the remaining formulas still run.
    pub fn compute_expressions(&self, keys: &[String]) {
        for expression in self.expressions.select(keys) {
            if let Err(e) = self.write_back(&expression) {
                self.exceptions.push(e);
            }
        }
    }

    /// Recompute every registered formula from scratch
    pub fn compute_all_expressions(&self) {
        self.expressions.reset_buffers();
        let keys = self.expressions.keys();
        self.compute_expressions(&keys);
    }

    fn write_back(&self, expression: &Expression) -> ExpressionResult<()> {
        let value = expression.calc(self)?;
        expression
            .variable()
            .set_property(expression.property(), value)
            .map_err(|e| {
                ExpressionError::from(e)
                    .at(Span::new(0, expression.formula().chars().count()))
                    .with_key(expression.key())
            })
    }

    fn split_key<'k>(&self, key: &'k str) -> std::result::Result<(&'k str, &'k str), CoreError> {
        key.split_once(self.options.separator)
            .ok_or_else(|| CoreError::other(format!("Key '{}' names no property", key)))
    }

    fn variable_of(&self, name: &str) -> std::result::Result<VariableRef, CoreError> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::VariableNotFound(name.to_string()))
    }

    /// Compute `formula` relative to the variable of `key` and write the
    /// result to that property. Failures are collected, not returned.
    pub fn assign(&self, key: &str, formula: &str) {
        if let Err(e) = self.try_assign(key, formula) {
            self.exceptions.push(e.with_key(key));
        }
    }

    fn try_assign(&self, key: &str, formula: &str) -> ExpressionResult<()> {
        let (name, property) = self.split_key(key)?;
        let variable = self.variable_of(name)?;
        let tree = self.parser().parse(formula)?;
        let value = calc(&tree, self, Some(&variable), None)?;
        variable
            .set_property(property, value)
            .map_err(|e| ExpressionError::from(e).at(Span::new(0, formula.chars().count())))
    }

    /// Write a value to the property named by `key`
    pub fn assign_value(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let (name, property) = self.split_key(key)?;
        let variable = self.variable_of(name)?;
        variable.set_property(property, value.into())?;
        Ok(())
    }

    /// Invalidate every buffered formula result
    pub fn reset_buffers(&self) {
        self.expressions.reset_buffers();
    }

    /// Whether neither `key` nor a property it is derived from carries a
    /// formula
    pub fn is_expression_free(&self, key: &str) -> Result<bool> {
        if self.expressions.contains(key) {
            return Ok(false);
        }
        let (name, property) = self.split_key(key)?;
        let variable = self.variable_of(name)?;
        let sep = self.options.separator;
        let free = !parents_of(variable.as_ref(), property)
            .any(|parent| self.expressions.contains(&format!("{}{}{}", name, sep, parent)));
        Ok(free)
    }

    /// Whether `formula`, followed through registered formulas, reads `key`
    pub fn is_recursive(&self, key: &str, formula: &str) -> Result<bool> {
        let tree = self.parser().parse(formula)?;
        let owner = key.split(self.options.separator).next().unwrap_or(key);
        let mut visited = AHashSet::new();
        Ok(self.references(&tree, owner, key, &mut visited))
    }

    fn references(
        &self,
        node: &Node,
        owner: &str,
        target: &str,
        visited: &mut AHashSet<String>,
    ) -> bool {
        let NodeKind::Variable(path) = node.kind() else {
            return node
                .children()
                .iter()
                .any(|child| self.references(child, owner, target, visited));
        };

        let absolute = if path.starts_with(self.options.separator) {
            format!("{}{}", owner, path)
        } else {
            path.clone()
        };
        if absolute == target {
            return true;
        }
        match self.expressions.get(&absolute) {
            Some(expression) if visited.insert(absolute) => self.references(
                expression.tree(),
                expression.variable().name(),
                target,
                visited,
            ),
            _ => false,
        }
    }

    /// Errors collected by batch recomputation and [`assign`](Self::assign)
    pub fn exceptions(&self) -> &ExpressionErrors {
        &self.exceptions
    }

    // ===== Selective recomputation =====

    /// Analyze every formula and install the resulting plan.
    ///
    /// Must be called again after formulas or variables change.
    pub fn optimize(&mut self) -> &OptimizationPlan {
        let expressions = self.expressions.snapshot();
        let _span = tracing::debug_span!("optimize", formulas = expressions.len()).entered();

        let plan = build_plan(&expressions, &*self);
        self.engine.install(plan, &self.variables);
        self.engine.plan()
    }

    /// The installed plan; empty before [`optimize`](Self::optimize)
    pub fn plan(&self) -> &OptimizationPlan {
        self.engine.plan()
    }

    /// Install a plan built by another calculator holding the same formulas.
    ///
    /// Keys without a formula here are dropped from the plan.
    pub fn adopt_plan(&mut self, mut plan: OptimizationPlan) {
        let expressions = &self.expressions;
        plan.retain_formulas(|key| expressions.contains(key));
        self.engine.install(plan, &self.variables);
    }

    pub fn engine(&self) -> &OptimizeManager {
        &self.engine
    }

    /// Run a compute pass; returns how many formulas had been queued
    pub fn recompute(&self) -> usize {
        self.engine.compute(self)
    }

    /// Queue every formula the plan knows about and run a compute pass
    pub fn recompute_all(&self) -> usize {
        self.engine.compute_all(self)
    }

    /// Report a property change for hosts without change notification
    pub fn property_changed(&self, variable: &str, property: &str) {
        self.engine.property_changed(variable, property);
    }

    /// Number of formulas queued for the next pass
    pub fn pending(&self) -> usize {
        self.engine.pending()
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Calculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Calculator")
            .field("options", &self.options)
            .field("variables", &self.variables.len())
            .field("expressions", &self.expressions.len())
            .field("engine", &self.engine)
            .finish()
    }
}

impl EvaluationContext for Calculator {
    fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    fn separator(&self) -> char {
        self.options.separator
    }

    fn live_update(&self) -> bool {
        self.options.live_update
    }

    fn variable(&self, name: &str) -> Option<VariableRef> {
        self.variables.get(name).cloned()
    }

    fn has_expression(&self, key: &str) -> bool {
        self.expressions.contains(key)
    }

    fn compute_variable(
        &self,
        path: &str,
        relative: Option<&VariableRef>,
    ) -> ExpressionResult<Value> {
        Calculator::compute_variable(self, path, relative)
    }

    fn compute_expressions(&self, keys: &[String]) {
        Calculator::compute_expressions(self, keys);
    }
}
