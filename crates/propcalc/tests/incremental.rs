//! Tests for optimization and change-driven recomputation

use pretty_assertions::assert_eq;
use propcalc::prelude::*;
use propcalc::FormulaResult;
use std::cell::Cell;
use std::sync::Arc;

thread_local! {
    static TICKS: Cell<usize> = Cell::new(0);
}

/// Identity function that counts its calls on the current thread
fn tick(args: &[Value]) -> FormulaResult<Value> {
    TICKS.with(|t| t.set(t.get() + 1));
    Ok(args.first().cloned().unwrap_or_default())
}

fn ticks() -> usize {
    TICKS.with(Cell::get)
}

fn number(var: &Arc<Record>, property: &str) -> f64 {
    var.get_property(property).unwrap().as_number().unwrap()
}

fn record(name: &str, properties: &[&str]) -> Arc<Record> {
    properties
        .iter()
        .fold(Record::new(name, "Node"), |rec, p| {
            rec.with_property(*p, ValueType::Number, 0.0)
        })
        .shared()
}

/// src.v feeds mid.a and mid.b; out.t reads both and src.v directly
fn diamond() -> (Calculator, Arc<Record>, Arc<Record>, Arc<Record>) {
    let mut calc = Calculator::new();
    calc.functions_mut()
        .register(FunctionDef::new("tick", 1, Some(1), tick));

    let src = record("src", &["v"]);
    let mid = record("mid", &["a", "b"]);
    let out = record("out", &["t"]);
    calc.add_variable(src.clone()).unwrap();
    calc.add_variable(mid.clone()).unwrap();
    calc.add_variable(out.clone()).unwrap();

    calc.add_expression("mid.a", "src.v * 2").unwrap();
    calc.add_expression("mid.b", "src.v + 1").unwrap();
    calc.add_expression("out.t", "tick(mid.a + mid.b + src.v)").unwrap();
    (calc, src, mid, out)
}

#[test]
fn test_self_reference_recomputes_every_pass() {
    let mut calc = Calculator::new();
    let x = record("x", &["y"]);
    calc.add_variable(x.clone()).unwrap();
    calc.add_expression("x.y", "x.y + 1").unwrap();

    let plan = calc.optimize();
    assert!(plan.not_optimizable.contains("x.y"));
    assert!(!plan.is_optimizable("x.y"));

    assert_eq!(calc.recompute_all(), 0);
    assert_eq!(number(&x, "y"), 1.0);
    assert_eq!(calc.recompute(), 0);
    assert_eq!(number(&x, "y"), 2.0);
}

#[test]
fn test_cycle_is_excluded() {
    let mut calc = Calculator::new();
    calc.add_variable(record("a", &["p"])).unwrap();
    calc.add_variable(record("b", &["q"])).unwrap();
    calc.add_expression("a.p", "b.q + 1").unwrap();
    calc.add_expression("b.q", "a.p + 1").unwrap();

    let plan = calc.optimize().clone();
    assert!(plan.optimizable.is_empty());
    assert!(plan.not_optimizable.contains("a.p"));
    assert!(plan.not_optimizable.contains("b.q"));

    // Evaluation stops at the re-entered formula instead of recursing
    calc.recompute();
    let errors = calc.exceptions().take();
    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .all(|e| matches!(e.error, FormulaError::CircularReference(_))));
}

#[test]
fn test_change_triggers_each_formula_once() {
    let (mut calc, src, mid, out) = diamond();
    calc.optimize();

    let listeners = calc.plan().listeners("src.v").cloned().unwrap_or_default();
    let mut keys: Vec<&str> = listeners.iter().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["mid.a", "mid.b", "out.t"]);

    calc.recompute_all();
    let before = ticks();

    src.set_property("v", Value::Number(5.0)).unwrap();
    assert_eq!(calc.pending(), 3);
    assert_eq!(calc.recompute(), 3);

    assert_eq!(ticks() - before, 1);
    assert_eq!(number(&mid, "a"), 10.0);
    assert_eq!(number(&mid, "b"), 6.0);
    assert_eq!(number(&out, "t"), 21.0);
    assert!(calc.exceptions().is_empty());
}

#[test]
fn test_compute_after_compute_all_is_empty() {
    let (mut calc, _src, _mid, out) = diamond();
    calc.optimize();

    assert_eq!(calc.recompute_all(), 3);
    assert_eq!(calc.pending(), 0);
    assert_eq!(number(&out, "t"), 1.0);

    let before = ticks();
    assert_eq!(calc.recompute(), 0);
    assert_eq!(ticks(), before);
}

#[test]
fn test_unchanged_write_queues_nothing() {
    let (mut calc, src, _mid, _out) = diamond();
    calc.optimize();
    calc.recompute_all();

    src.set_property("v", Value::Number(0.0)).unwrap();
    assert_eq!(calc.pending(), 0);
}

#[test]
fn test_readers_see_sources_computed_in_same_pass() {
    let mut calc = Calculator::new();
    let p = record("p", &["base", "x", "y", "w"]);
    calc.add_variable(p.clone()).unwrap();
    p.set_property("base", Value::Number(5.0)).unwrap();

    // Readers registered before the formulas they read
    calc.add_expression("p.w", ".y").unwrap();
    calc.add_expression("p.y", ".x + 1").unwrap();
    calc.add_expression("p.x", ".base").unwrap();
    calc.optimize();

    assert_eq!(calc.recompute_all(), 3);
    assert_eq!(number(&p, "x"), 5.0);
    assert_eq!(number(&p, "y"), 6.0);
    assert_eq!(number(&p, "w"), 6.0);
    assert_eq!(calc.recompute(), 0);
    assert_eq!(number(&p, "w"), 6.0);

    p.set_property("base", Value::Number(10.0)).unwrap();
    assert_eq!(calc.recompute(), 3);
    assert_eq!(number(&p, "y"), 11.0);
    assert_eq!(number(&p, "w"), 11.0);
    assert!(calc.exceptions().is_empty());
}

#[test]
fn test_external_write_to_target_recomputes_it() {
    let (mut calc, src, mid, _out) = diamond();
    src.set_property("v", Value::Number(5.0)).unwrap();
    calc.optimize();
    calc.recompute_all();

    mid.set_property("a", Value::Number(99.0)).unwrap();
    assert_eq!(calc.recompute(), 2);
    assert_eq!(number(&mid, "a"), 10.0);
}

#[test]
fn test_manual_change_report() {
    let (mut calc, _src, _mid, _out) = diamond();
    calc.optimize();
    calc.recompute_all();

    calc.property_changed("mid", "b");
    assert_eq!(
        calc.engine().queued_keys(),
        vec!["mid.b".to_string(), "out.t".to_string()]
    );
    calc.property_changed("nosuch", "x");
    assert_eq!(calc.recompute(), 2);
}

#[test]
fn test_one_subscription_per_host() {
    let (mut calc, _src, _mid, _out) = diamond();
    calc.optimize();
    calc.optimize();

    let mut hosts: Vec<&str> = calc.engine().subscribed_variables().collect();
    hosts.sort_unstable();
    assert_eq!(hosts, vec!["mid", "out", "src"]);
}

#[test]
fn test_batch_errors_do_not_stop_siblings() {
    let mut calc = Calculator::new();
    let a = record("a", &["x", "y", "z"]);
    calc.add_variable(a.clone()).unwrap();
    calc.add_expression("a.x", "1/0").unwrap();
    calc.add_expression("a.y", "nosuch(1)").unwrap();
    calc.add_expression("a.z", "2+3").unwrap();

    calc.optimize();
    calc.recompute_all();

    assert_eq!(number(&a, "z"), 5.0);
    let errors = calc.exceptions().snapshot();
    assert_eq!(errors.len(), 2);

    // Formulas recomputed on every pass run first
    assert_eq!(errors[0].key.as_deref(), Some("a.y"));
    assert_eq!(errors[0].error, FormulaError::UnknownFunction("nosuch".into()));
    assert_eq!(errors[0].span.map(|s| s.column), Some(0));
    assert_eq!(
        errors[1].to_string(),
        "a.x (0,3): Evaluation error: Division by zero"
    );
}

#[test]
fn test_object_reference_is_redirected() {
    let mut calc = Calculator::new();
    let target = record("target", &["v"]);
    let holder = Record::new("holder", "Holder")
        .with_property("link", ValueType::Object, Value::Empty)
        .shared();
    calc.add_variable(target.clone()).unwrap();
    calc.add_variable(holder.clone()).unwrap();
    calc.add_expression("holder.link", "target").unwrap();

    let plan = calc.optimize().clone();
    assert!(plan.object_references.contains("holder.link"));
    assert!(plan.not_optimizable.is_empty());

    target.set_property("v", Value::Number(4.0)).unwrap();
    calc.recompute_all();
    assert_eq!(calc.compute("holder.link.v", None).unwrap(), Value::Number(4.0));
    assert_eq!(calc.recompute(), 0);
    assert!(calc.exceptions().is_empty());
}

#[test]
fn test_adopt_plan_from_twin() {
    let (mut first, _, _, _) = diamond();
    let plan = first.optimize().clone();

    let (mut second, src, mid, out) = diamond();
    second.adopt_plan(plan.clone());
    assert_eq!(second.plan(), &plan);

    second.recompute_all();
    src.set_property("v", Value::Number(1.0)).unwrap();
    assert_eq!(second.recompute(), 3);
    assert_eq!(number(&mid, "a"), 2.0);
    assert_eq!(number(&out, "t"), 5.0);
}

#[test]
fn test_adopt_plan_drops_unknown_formulas() {
    let (mut first, _, _, _) = diamond();
    first.add_expression("src.v", "3").unwrap();
    let plan = first.optimize().clone();
    assert!(plan.is_optimizable("src.v"));

    let (mut second, _, _, _) = diamond();
    second.adopt_plan(plan);
    assert!(!second.plan().is_optimizable("src.v"));
    assert!(second.plan().is_optimizable("mid.a"));
}

#[test]
fn test_live_update_refreshes_sources() {
    fn setup(live: bool) -> (Calculator, Arc<Record>, Arc<Record>) {
        let mut calc = Calculator::with_options(CalculatorOptions {
            live_update: live,
            ..Default::default()
        });
        let s = record("s", &["v"]);
        let r = Record::new("r", "Rect")
            .with_property("w", ValueType::Number, 0.0)
            .with_property("area", ValueType::Number, 0.0)
            .with_dependency("w", "area")
            .shared();
        calc.add_variable(s.clone()).unwrap();
        calc.add_variable(r.clone()).unwrap();
        calc.add_variable(record("t", &["x"])).unwrap();
        calc.add_expression("r.w", "s.v + 1").unwrap();
        (calc, s, r)
    }

    let (calc, s, r) = setup(true);
    s.set_property("v", Value::Number(4.0)).unwrap();
    calc.compute("r.area", Some("t")).unwrap();
    assert_eq!(number(&r, "w"), 5.0);

    let (calc, s, r) = setup(false);
    s.set_property("v", Value::Number(4.0)).unwrap();
    calc.compute("r.area", Some("t")).unwrap();
    assert_eq!(number(&r, "w"), 0.0);
}
