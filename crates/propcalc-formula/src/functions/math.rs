//! Arithmetic operators and math functions

use super::number_arg;
use crate::error::{FormulaError, FormulaResult};
use propcalc_core::Value;
use rand::Rng;

fn numbers<'a>(
    args: &'a [Value],
    function: &'a str,
) -> impl Iterator<Item = FormulaResult<f64>> + 'a {
    (0..args.len()).map(move |i| number_arg(args, i, function))
}

fn finite(result: f64, function: &str) -> FormulaResult<Value> {
    if result.is_finite() {
        Ok(Value::Number(result))
    } else {
        Err(FormulaError::Evaluation(format!(
            "{} produced a non-finite result",
            function
        )))
    }
}

/// `+`: numeric addition, or concatenation when either side is text
pub fn fn_add(args: &[Value]) -> FormulaResult<Value> {
    match args {
        [left @ Value::Text(_), right] | [left, right @ Value::Text(_)] => {
            Ok(Value::Text(format!("{}{}", left, right)))
        }
        _ => Ok(Value::Number(
            number_arg(args, 0, "Add")? + number_arg(args, 1, "Add")?,
        )),
    }
}

/// `-`: subtraction, or negation with a single argument
pub fn fn_subtract(args: &[Value]) -> FormulaResult<Value> {
    let first = number_arg(args, 0, "Subtract")?;
    if args.len() == 1 {
        return Ok(Value::Number(-first));
    }
    Ok(Value::Number(first - number_arg(args, 1, "Subtract")?))
}

pub fn fn_multiply(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Number(
        number_arg(args, 0, "Multiply")? * number_arg(args, 1, "Multiply")?,
    ))
}

pub fn fn_divide(args: &[Value]) -> FormulaResult<Value> {
    let divisor = number_arg(args, 1, "Divide")?;
    if divisor == 0.0 {
        return Err(FormulaError::Evaluation("Division by zero".into()));
    }
    Ok(Value::Number(number_arg(args, 0, "Divide")? / divisor))
}

pub fn fn_power(args: &[Value]) -> FormulaResult<Value> {
    let base = number_arg(args, 0, "Power")?;
    let exponent = number_arg(args, 1, "Power")?;
    finite(base.powf(exponent), "Power")
}

pub fn fn_mod(args: &[Value]) -> FormulaResult<Value> {
    let divisor = number_arg(args, 1, "Mod")?;
    if divisor == 0.0 {
        return Err(FormulaError::Evaluation("Division by zero".into()));
    }
    Ok(Value::Number(number_arg(args, 0, "Mod")? % divisor))
}

pub fn fn_abs(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Number(number_arg(args, 0, "abs")?.abs()))
}

pub fn fn_sqrt(args: &[Value]) -> FormulaResult<Value> {
    let n = number_arg(args, 0, "sqrt")?;
    if n < 0.0 {
        return Err(FormulaError::Evaluation(format!(
            "sqrt of negative number {}",
            n
        )));
    }
    Ok(Value::Number(n.sqrt()))
}

/// ROUND(number; [digits]), halves away from zero
pub fn fn_round(args: &[Value]) -> FormulaResult<Value> {
    let n = number_arg(args, 0, "round")?;
    let digits = if args.len() > 1 {
        number_arg(args, 1, "round")?.trunc() as i32
    } else {
        0
    };
    let factor = 10f64.powi(digits);
    finite((n * factor).round() / factor, "round")
}

pub fn fn_floor(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Number(number_arg(args, 0, "floor")?.floor()))
}

pub fn fn_ceiling(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Number(number_arg(args, 0, "ceiling")?.ceil()))
}

pub fn fn_min(args: &[Value]) -> FormulaResult<Value> {
    let mut min = f64::INFINITY;
    for n in numbers(args, "min") {
        min = min.min(n?);
    }
    Ok(Value::Number(min))
}

pub fn fn_max(args: &[Value]) -> FormulaResult<Value> {
    let mut max = f64::NEG_INFINITY;
    for n in numbers(args, "max") {
        max = max.max(n?);
    }
    Ok(Value::Number(max))
}

pub fn fn_sum(args: &[Value]) -> FormulaResult<Value> {
    let mut sum = 0.0;
    for n in numbers(args, "sum") {
        sum += n?;
    }
    Ok(Value::Number(sum))
}

pub fn fn_average(args: &[Value]) -> FormulaResult<Value> {
    if args.is_empty() {
        return Err(FormulaError::Evaluation("average of no values".into()));
    }
    let mut sum = 0.0;
    for n in numbers(args, "average") {
        sum += n?;
    }
    Ok(Value::Number(sum / args.len() as f64))
}

pub fn fn_pi(_args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Number(std::f64::consts::PI))
}

pub fn fn_sin(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Number(number_arg(args, 0, "sin")?.sin()))
}

pub fn fn_cos(args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Number(number_arg(args, 0, "cos")?.cos()))
}

pub fn fn_tan(args: &[Value]) -> FormulaResult<Value> {
    finite(number_arg(args, 0, "tan")?.tan(), "tan")
}

/// RANDOM(): uniform in [0, 1)
pub fn fn_random(_args: &[Value]) -> FormulaResult<Value> {
    Ok(Value::Number(rand::thread_rng().gen::<f64>()))
}

/// RANDBETWEEN(low; high): uniform integer in [low, high]
pub fn fn_randbetween(args: &[Value]) -> FormulaResult<Value> {
    let low = number_arg(args, 0, "randbetween")?.ceil() as i64;
    let high = number_arg(args, 1, "randbetween")?.floor() as i64;
    if low > high {
        return Err(FormulaError::Argument(format!(
            "randbetween range {}..{} is empty",
            low, high
        )));
    }
    Ok(Value::Number(rand::thread_rng().gen_range(low..=high) as f64))
}
