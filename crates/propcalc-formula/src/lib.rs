//! # propcalc-formula
//!
//! Formula parser, evaluator and dependency analysis for propcalc.
//!
//! This crate provides:
//! - Formula parsing (text → tree) driven by an [`OperatorTable`]
//! - Evaluation against an [`EvaluationContext`]
//! - A [`FunctionRegistry`] with capability-tagged built-in functions
//! - [`Expression`]: a formula bound to a `variable.property` key with a buffered result
//! - Dependency analysis and the dependency graph used for selective recomputation
//!
//! ## Example
//!
//! ```rust
//! use propcalc_formula::{evaluate, parse, FunctionRegistry, OperatorTable, StandaloneContext};
//! use propcalc_core::Value;
//!
//! let tree = parse("2 + 3 * 4", &OperatorTable::standard()).unwrap();
//! let functions = FunctionRegistry::new();
//! let value = evaluate(&tree, &StandaloneContext::new(&functions)).unwrap();
//! assert_eq!(value, Value::Number(14.0));
//! ```

pub mod ast;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod functions;
pub mod operators;
pub mod parser;

pub use ast::{Node, NodeKind};
pub use dependency::{
    classify, find_dependencies, DependencyAnalysis, DependencyGraph, DependencyInfo,
    DependencyKind,
};
pub use error::{ExpressionError, ExpressionResult, FormulaError, FormulaResult, Span};
pub use evaluator::{calc, evaluate, EvaluationContext, StandaloneContext};
pub use expression::Expression;
pub use functions::{Capabilities, FunctionDef, FunctionRegistry, SharedFunctions};
pub use operators::{Operator, OperatorTable};
pub use parser::{parse, Parser, DEFAULT_MAX_DEPTH};
