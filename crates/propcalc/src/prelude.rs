//! Common imports for propcalc users
//!
//! ```rust
//! use propcalc::prelude::*;
//! ```

pub use crate::{
    // Calculator
    Calculator,
    CalculatorOptions,
    // Errors
    Error,
    ExpressionError,
    FormulaError,
    Result,
    // Functions
    FunctionDef,
    FunctionRegistry,
    // Recomputation
    OptimizationPlan,
    // Host side
    Optimizable,
    PropertyDependency,
    Record,
    Value,
    ValueType,
    Variable,
    VariableRef,
};
