//! Structural properties of the parser

use propcalc_formula::{parse, NodeKind, OperatorTable};
use proptest::prelude::*;

const BINARY: &[&str] = &[
    "^", "*", "/", "-", "+", "%", "<", ">", "=", "<>", "!=", "<=", ">=", "==", "&&", "||",
];

fn leaf() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u32..1000).prop_map(|n| n.to_string()),
        "[a-z]{1,4}[0-9]?\\.[a-z]{1,4}",
        "\\.[a-z]{1,4}",
        "\"[a-z ;,()]{0,6}\"",
    ]
}

fn formula() -> impl Strategy<Value = String> {
    leaf().prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (inner.clone(), prop::sample::select(BINARY), inner.clone())
                .prop_map(|(a, op, b)| format!("{} {} {}", a, op, b)),
            ("[a-z]{2,6}", prop::collection::vec(inner.clone(), 0..3))
                .prop_map(|(name, args)| format!("{}({})", name, args.join("; "))),
            inner.clone().prop_map(|a| format!("({})", a)),
            inner.prop_map(|a| format!("-{}", a)),
        ]
    })
}

proptest! {
    #[test]
    fn parentheses_are_transparent(f in formula()) {
        let ops = OperatorTable::standard();
        let plain = parse(&f, &ops).unwrap();
        let grouped = parse(&format!("({})", f), &ops).unwrap();
        prop_assert_eq!(plain, grouped);
    }

    #[test]
    fn lower_precedence_becomes_root(
        op1 in prop::sample::select(BINARY),
        op2 in prop::sample::select(BINARY),
    ) {
        let ops = OperatorTable::standard();
        let first = ops.binary(op1).unwrap();
        let second = ops.binary(op2).unwrap();

        let tree = parse(&format!("a {} b {} c", op1, op2), &ops).unwrap();
        let expected = if first.precedence < second.precedence {
            &first.function
        } else {
            &second.function
        };

        match tree.kind() {
            NodeKind::Operator { function, operands } => {
                prop_assert_eq!(function, expected);
                prop_assert_eq!(operands.len(), 2);
            }
            other => prop_assert!(false, "expected an operator, got {:?}", other),
        }
    }
}

#[test]
fn addition_binds_looser_than_multiplication() {
    let tree = parse("2+3*4", &OperatorTable::standard()).unwrap();
    assert_eq!(format!("{:?}", tree), "Add(2, Multiply(3, 4))");
}
