//! Comparison operators and logical functions

use crate::ast::Node;
use crate::error::{ExpressionError, ExpressionResult, FormulaError, FormulaResult};
use crate::evaluator::{calc, EvaluationContext};
use propcalc_core::{Value, VariableRef};
use std::cmp::Ordering;

/// Compare numerically when both sides are numbers, otherwise as text
fn compare(args: &[Value]) -> FormulaResult<Ordering> {
    let (left, right) = match args {
        [left, right] => (left, right),
        _ => {
            return Err(FormulaError::Argument(
                "comparison needs two operands".into(),
            ))
        }
    };

    let numeric = |v: &Value| match v {
        Value::Number(n) => Some(*n),
        Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Empty => Some(0.0),
        _ => None,
    };

    match (numeric(left), numeric(right)) {
        (Some(a), Some(b)) => a
            .partial_cmp(&b)
            .ok_or_else(|| FormulaError::Evaluation("cannot compare NaN".into())),
        _ => Ok(left.as_text().cmp(&right.as_text())),
    }
}

pub fn fn_less(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Boolean(compare(args)? == Ordering::Less))
}

pub fn fn_more(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Boolean(compare(args)? == Ordering::Greater))
}

pub fn fn_equal(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Boolean(compare(args)? == Ordering::Equal))
}

pub fn fn_not_equal(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Boolean(compare(args)? != Ordering::Equal))
}

pub fn fn_less_or_equal(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Boolean(compare(args)? != Ordering::Greater))
}

pub fn fn_more_or_equal(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Boolean(compare(args)? != Ordering::Less))
}

fn bool_arg(value: &Value, function: &str) -> FormulaResult<bool> {
    value.as_bool().ok_or_else(|| {
        FormulaError::Argument(format!(
            "{} expects a boolean, got {}",
            function,
            value.type_name()
        ))
    })
}

pub fn fn_and(args: &[Value]) -> FormulaResult<Value> {
    for arg in args {
        if !bool_arg(arg, "And")? {
            return Ok(Value::Boolean(false));
        }
    }
    Ok(Value::Boolean(true))
}

pub fn fn_or(args: &[Value]) -> FormulaResult<Value> {
    for arg in args {
        if bool_arg(arg, "Or")? {
            return Ok(Value::Boolean(true));
        }
    }
    Ok(Value::Boolean(false))
}

pub fn fn_not(args: &[Value]) -> FormulaResult<Value> {
    let value = args
        .first()
        .ok_or_else(|| FormulaError::Argument("Not requires an argument".into()))?;
    Ok(Value::Boolean(!bool_arg(value, "Not")?))
}

/// IF(condition; then; [else])
///
/// Only the chosen branch is evaluated.
pub fn fn_if(
    args: &[Node],
    ctx: &dyn EvaluationContext,
    relative: Option<&VariableRef>,
) -> ExpressionResult<Value> {
    let [condition, then, rest @ ..] = args else {
        return Err(FormulaError::Argument("if requires at least 2 arguments".into()).into());
    };

    let value = calc(condition, ctx, relative, None)?;
    let chosen =
        bool_arg(&value, "if").map_err(|e| ExpressionError::from(e).at(condition.span()))?;

    if chosen {
        calc(then, ctx, relative, None)
    } else {
        match rest.first() {
            Some(otherwise) => calc(otherwise, ctx, relative, None),
            None => Ok(Value::Boolean(false)),
        }
    }
}
