//! # propcalc-core
//!
//! The contract between propcalc and the application that embeds it.
//!
//! The application owns the objects ("variables") and their properties. This
//! crate defines what the formula engine needs from them:
//! - [`Value`] - values flowing between properties and formulas
//! - [`Variable`] - named property get/set, implemented by host objects
//! - [`Optimizable`] - change notification plus internal [`PropertyDependency`] declarations
//! - [`ChangeNotifier`] / [`Subscription`] - observer registration with cancellation
//! - [`Record`] - a ready-made host object with typed properties
//! - [`VariableSet`] - the registry of variables by name
//!
//! ## Example
//!
//! ```rust
//! use propcalc_core::{Record, Value, ValueType, Variable, VariableSet};
//!
//! let mut variables = VariableSet::new();
//! variables
//!     .add(Record::new("p1", "Point").with_property("x", ValueType::Number, 1.0).shared())
//!     .unwrap();
//!
//! let p1 = variables.get("p1.x").unwrap();
//! assert_eq!(p1.get_property("x").unwrap(), Value::Number(1.0));
//! ```

pub mod error;
pub mod notify;
pub mod record;
pub mod registry;
pub mod value;
pub mod variable;

// Re-exports for convenience
pub use error::{Error, Result};
pub use notify::{ChangeNotifier, PropertyListener, Subscription};
pub use record::Record;
pub use registry::{is_valid_name, VariableSet, DEFAULT_SEPARATOR};
pub use value::{Value, ValueType};
pub use variable::{
    children_of, parents_of, Optimizable, PropertyDependency, Variable, VariableRef,
};
