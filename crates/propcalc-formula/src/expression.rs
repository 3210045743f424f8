//! Formulas registered under a `variable.property` key

use crate::ast::Node;
use crate::error::{ExpressionError, ExpressionResult, FormulaError};
use crate::evaluator::{calc, EvaluationContext};
use crate::parser::Parser;
use parking_lot::Mutex;
use propcalc_core::{Value, VariableRef, VariableSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// A parsed formula bound to the property it computes.
///
/// The last computed value is buffered until [`reset_buffer`](Self::reset_buffer).
pub struct Expression {
    key: String,
    formula: String,
    tree: Node,
    variable: VariableRef,
    property: String,
    buffer: Mutex<Option<Value>>,
    evaluating: AtomicBool,
}

impl Expression {
    /// Parse `formula` for `key`, resolving the key's variable in `variables`
    pub fn parse(
        key: &str,
        formula: &str,
        parser: &Parser<'_>,
        variables: &VariableSet,
    ) -> ExpressionResult<Self> {
        let (name, property) = key.split_once(variables.separator()).ok_or_else(|| {
            ExpressionError::new(FormulaError::Argument(format!(
                "expression key '{}' names no property",
                key
            )))
            .with_key(key)
        })?;

        let variable = variables
            .get(name)
            .cloned()
            .ok_or_else(|| {
                ExpressionError::new(FormulaError::VariableNotFound(name.to_string())).with_key(key)
            })?;

        let tree = parser.parse(formula).map_err(|e| e.with_key(key))?;

        Ok(Self::new(key, formula, tree, variable, property))
    }

    pub fn new(key: &str, formula: &str, tree: Node, variable: VariableRef, property: &str) -> Self {
        Self {
            key: key.to_string(),
            formula: formula.to_string(),
            tree,
            variable,
            property: property.to_string(),
            buffer: Mutex::new(None),
            evaluating: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Source text
    pub fn formula(&self) -> &str {
        &self.formula
    }

    pub fn tree(&self) -> &Node {
        &self.tree
    }

    /// Variable owning the target property
    pub fn variable(&self) -> &VariableRef {
        &self.variable
    }

    /// Target property name
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Compute the value, answering from the buffer while it is valid.
    ///
    /// Errors carry this expression's key unless an inner expression already
    /// set one.
    pub fn calc(&self, ctx: &dyn EvaluationContext) -> ExpressionResult<Value> {
        if let Some(value) = self.buffer.lock().clone() {
            return Ok(value);
        }

        if self.evaluating.swap(true, Ordering::SeqCst) {
            return Err(
                ExpressionError::new(FormulaError::CircularReference(self.key.clone()))
                    .with_key(&self.key),
            );
        }
        let result = calc(&self.tree, ctx, Some(&self.variable), None);
        self.evaluating.store(false, Ordering::SeqCst);

        match result {
            Ok(value) => {
                *self.buffer.lock() = Some(value.clone());
                Ok(value)
            }
            Err(e) => Err(e.with_key(&self.key)),
        }
    }

    /// Invalidate the buffered value
    pub fn reset_buffer(&self) {
        *self.buffer.lock() = None;
    }

    pub fn is_buffered(&self) -> bool {
        self.buffer.lock().is_some()
    }

    /// Buffered value, if valid
    pub fn buffer(&self) -> Option<Value> {
        self.buffer.lock().clone()
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("key", &self.key)
            .field("formula", &self.formula)
            .field("tree", &self.tree)
            .field("buffered", &self.is_buffered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::StandaloneContext;
    use crate::functions::FunctionRegistry;
    use crate::operators::OperatorTable;
    use propcalc_core::{Record, ValueType};

    fn variables() -> VariableSet {
        let mut set = VariableSet::new();
        set.add(
            Record::new("p1", "Point")
                .with_property("x", ValueType::Number, 2.0)
                .shared(),
        )
        .unwrap();
        set
    }

    #[test]
    fn test_buffer_lifecycle() {
        let ops = OperatorTable::standard();
        let parser = Parser::new(&ops);
        let expr = Expression::parse("p1.x", "1 + 2", &parser, &variables()).unwrap();
        let registry = FunctionRegistry::new();
        let ctx = StandaloneContext::new(&registry);

        assert!(!expr.is_buffered());
        assert_eq!(expr.calc(&ctx).unwrap(), Value::Number(3.0));
        assert_eq!(expr.buffer(), Some(Value::Number(3.0)));

        expr.reset_buffer();
        assert!(!expr.is_buffered());
    }

    #[test]
    fn test_parse_errors_carry_key() {
        let ops = OperatorTable::standard();
        let parser = Parser::new(&ops);
        let vars = variables();

        let err = Expression::parse("p1.x", "max(1;2", &parser, &vars).unwrap_err();
        assert_eq!(err.key.as_deref(), Some("p1.x"));
        assert!(err.is_syntax());

        let err = Expression::parse("p9.x", "1", &parser, &vars).unwrap_err();
        assert_eq!(err.error, FormulaError::VariableNotFound("p9".into()));

        assert!(Expression::parse("p1", "1", &parser, &vars).is_err());
    }

    #[test]
    fn test_evaluation_error_carries_key() {
        let ops = OperatorTable::standard();
        let parser = Parser::new(&ops);
        let expr = Expression::parse("p1.x", "1/0", &parser, &variables()).unwrap();
        let registry = FunctionRegistry::new();
        let ctx = StandaloneContext::new(&registry);

        let err = expr.calc(&ctx).unwrap_err();
        assert_eq!(err.to_string(), "p1.x (0,3): Evaluation error: Division by zero");
        assert!(!expr.is_buffered());
    }
}
