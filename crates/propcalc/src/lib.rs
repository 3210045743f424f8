//! # propcalc
//!
//! Formulas over the properties of host objects, recomputed selectively when
//! the properties they read change.
//!
//! ## Features
//!
//! - Formulas registered under `variable.property` keys, with results written
//!   back to the host property
//! - Built-in math, logical and text functions, extensible function and
//!   operator tables
//! - Dependency analysis that separates cacheable formulas from those that
//!   must recompute on every pass, including cycle detection
//! - Change-driven compute queue fed by host change notifications
//! - Batch failures collected per formula instead of aborting the pass
//!
//! ## Example
//!
//! ```rust
//! use propcalc::prelude::*;
//!
//! let mut calc = Calculator::new();
//! let order = Record::new("order", "Order")
//!     .with_property("qty", ValueType::Integer, 3)
//!     .with_property("price", ValueType::Number, 2.5)
//!     .with_property("total", ValueType::Number, 0.0)
//!     .shared();
//! calc.add_variable(order.clone()).unwrap();
//! calc.add_expression("order.total", ".qty * .price").unwrap();
//!
//! calc.optimize();
//! calc.recompute_all();
//! assert_eq!(order.get_property("total").unwrap(), Value::Number(7.5));
//! ```

pub mod calculator;
pub mod error;
pub mod exceptions;
pub mod expressions;
pub mod optimize;
pub mod prelude;

pub use calculator::{Calculator, CalculatorOptions};
pub use error::{Error, Result};
pub use exceptions::ExpressionErrors;
pub use expressions::ExpressionSet;
pub use optimize::{build_plan, ChangeDispatcher, ComputeQueue, OptimizationPlan, OptimizeManager};

// Re-export core types
pub use propcalc_core::{
    children_of, is_valid_name, parents_of, ChangeNotifier, Error as CoreError, Optimizable,
    PropertyDependency, PropertyListener, Record, Subscription, Value, ValueType, Variable,
    VariableRef, VariableSet, DEFAULT_SEPARATOR,
};

// Re-export formula types
pub use propcalc_formula::{
    evaluate, parse, Capabilities, EvaluationContext, Expression, ExpressionError,
    ExpressionResult, FormulaError, FormulaResult, FunctionDef, FunctionRegistry, Node, NodeKind,
    Operator, OperatorTable, Parser, SharedFunctions, Span,
};
