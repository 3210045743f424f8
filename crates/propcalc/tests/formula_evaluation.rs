//! Tests for formula evaluation through the calculator

use pretty_assertions::assert_eq;
use propcalc::prelude::*;
use propcalc::{parse, OperatorTable};
use std::sync::Arc;

fn calculator() -> (Calculator, Arc<Record>) {
    let mut calc = Calculator::new();
    let line = Record::new("line1", "Line")
        .with_property("length", ValueType::Number, 12.0)
        .with_property("width", ValueType::Integer, 2)
        .with_property("label", ValueType::Text, "main")
        .with_property("visible", ValueType::Boolean, true)
        .shared();
    calc.add_variable(line.clone()).unwrap();
    (calc, line)
}

/// Test basic formula evaluation without variables
#[test]
fn test_evaluate_simple_formulas() {
    let calc = Calculator::new();

    assert_eq!(calc.compute("1+2*3", None).unwrap(), Value::Number(7.0));
    assert_eq!(calc.compute("2^3^2", None).unwrap(), Value::Number(64.0));
    assert_eq!(calc.compute("5>3", None).unwrap(), Value::Boolean(true));
    assert_eq!(
        calc.compute(r#""Hello " + "World""#, None).unwrap(),
        Value::text("Hello World")
    );
}

#[test]
fn test_doubled_quote_is_escaped() {
    let calc = Calculator::new();
    assert_eq!(calc.compute(r#""ab""cd""#, None).unwrap(), Value::text("ab\"cd"));
}

#[test]
fn test_precedence_tree_and_value() {
    let tree = parse("2+3*4", &OperatorTable::standard()).unwrap();
    assert_eq!(format!("{:?}", tree), "Add(2, Multiply(3, 4))");
    assert_eq!(
        Calculator::new().compute("2+3*4", None).unwrap(),
        Value::Number(14.0)
    );
}

#[test]
fn test_evaluate_functions() {
    let calc = Calculator::new();

    assert_eq!(calc.compute("sum(1;2;3;4;5)", None).unwrap(), Value::Number(15.0));
    assert_eq!(calc.compute("average(2, 4)", None).unwrap(), Value::Number(3.0));
    assert_eq!(calc.compute("round(2.5)", None).unwrap(), Value::Number(3.0));
    assert_eq!(
        calc.compute(r#"if(1>0; "Yes"; "No")"#, None).unwrap(),
        Value::text("Yes")
    );
    assert_eq!(
        calc.compute(r#"concat("a"; 1; "b")"#, None).unwrap(),
        Value::text("a1b")
    );
    assert_eq!(calc.compute(r#"len("héllo")"#, None).unwrap(), Value::Number(5.0));
}

#[test]
fn test_random_functions_stay_in_range() {
    let calc = Calculator::new();
    for _ in 0..20 {
        let n = calc.compute("randbetween(3; 5)", None).unwrap();
        let n = n.as_number().unwrap();
        assert!((3.0..=5.0).contains(&n) && n.fract() == 0.0);
    }
}

/// Test formula evaluation with variable references
#[test]
fn test_evaluate_with_variables() {
    let (calc, _) = calculator();

    assert_eq!(
        calc.compute("line1.length * line1.width", None).unwrap(),
        Value::Number(24.0)
    );
    assert_eq!(
        calc.compute(r#"upper(.label) + "!""#, Some("line1")).unwrap(),
        Value::text("MAIN!")
    );
    assert_eq!(
        calc.compute("if(.visible; .length; 0)", Some("line1")).unwrap(),
        Value::Number(12.0)
    );
}

#[test]
fn test_registered_formula_writes_back() {
    let (mut calc, line) = calculator();
    calc.add_expression("line1.width", ".length / 5").unwrap();
    calc.add_expression("line1.label", r#""w=" + .width"#).unwrap();

    calc.compute_all_expressions();

    // Integer properties round the computed value, and `.width` reads the
    // stored property rather than the formula result
    assert_eq!(line.get_property("width").unwrap(), Value::Number(2.0));
    assert_eq!(line.get_property("label").unwrap(), Value::text("w=2"));
}

#[test]
fn test_unterminated_call_is_syntax_error() {
    let calc = Calculator::new();
    let err = calc.compute("f(1;2", None).unwrap_err();
    let err = err.as_expression().unwrap();
    assert!(err.is_syntax());
    assert_eq!(err.column(), 1);
}

#[test]
fn test_errors_point_into_formula() {
    let (calc, _) = calculator();

    let err = calc.compute("1 + nosuch(2)", None).unwrap_err();
    assert_eq!(
        err.formula_error(),
        Some(&FormulaError::UnknownFunction("nosuch".into()))
    );
    assert_eq!(err.as_expression().map(|e| e.column()), Some(4));

    let err = calc.compute("line1.length + line9.length", None).unwrap_err();
    assert_eq!(
        err.formula_error(),
        Some(&FormulaError::VariableNotFound("line9".into()))
    );
    assert_eq!(err.as_expression().map(|e| e.column()), Some(15));
}

#[test]
fn test_custom_function() {
    fn double(args: &[Value]) -> propcalc::FormulaResult<Value> {
        Ok(Value::Number(args[0].to_number()? * 2.0))
    }

    let (mut calc, _) = calculator();
    calc.functions_mut()
        .register(FunctionDef::new("double", 1, Some(1), double));

    assert_eq!(
        calc.compute("double(line1.length)", None).unwrap(),
        Value::Number(24.0)
    );
}

#[test]
fn test_custom_operator() {
    let mut calc = Calculator::new();
    calc.operators_mut().add_binary("**", "Power", 3);
    assert_eq!(calc.compute("2 ** 3 + 1", None).unwrap(), Value::Number(9.0));
}
