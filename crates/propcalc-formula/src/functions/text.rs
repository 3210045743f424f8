//! Text functions

use super::number_arg;
use crate::error::{FormulaError, FormulaResult};
use propcalc_core::Value;

fn text_arg(args: &[Value], function: &str) -> FormulaResult<String> {
    args.first()
        .map(Value::as_text)
        .ok_or_else(|| FormulaError::Argument(format!("{} requires an argument", function)))
}

/// CONCAT(value; ...)
pub fn fn_concat(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Text(args.iter().map(Value::as_text).collect()))
}

/// LEN(text), in characters
pub fn fn_len(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Number(text_arg(args, "len")?.chars().count() as f64))
}

pub fn fn_upper(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Text(text_arg(args, "upper")?.to_uppercase()))
}

pub fn fn_lower(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Text(text_arg(args, "lower")?.to_lowercase()))
}

/// TEXT(value; [decimals])
pub fn fn_text(args: &[Value]) -> FormulaResult<Value> {
    if args.len() < 2 {
        return Ok(Value::Text(text_arg(args, "text")?));
    }
    let n = number_arg(args, 0, "text")?;
    let decimals = number_arg(args, 1, "text")?;
    if decimals < 0.0 {
        return Err(FormulaError::Argument(
            "text decimals must not be negative".into(),
        ));
    }
    Ok(Value::Text(format!("{:.*}", decimals as usize, n)))
}
