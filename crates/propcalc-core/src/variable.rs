//! Capability interfaces implemented by host objects ("variables")

use crate::error::Result;
use crate::notify::{PropertyListener, Subscription};
use crate::value::Value;
use std::sync::Arc;

/// Shared handle to a host variable
pub type VariableRef = Arc<dyn Variable>;

/// A named host object whose properties formulas can read and write.
///
/// Implementations use interior mutability: properties are set through `&self`
/// so that a variable can be shared between the registry, formulas and the host.
pub trait Variable: Send + Sync {
    /// Registered name of the variable
    fn name(&self) -> &str;

    /// Host type of the variable.
    ///
    /// Functions declaring implicit property usage look up the properties they
    /// read by this name.
    fn kind(&self) -> &str;

    /// Read a property by name
    fn get_property(&self, property: &str) -> Result<Value>;

    /// Write a property by name.
    ///
    /// The value is converted to the property's declared type on a best-effort
    /// basis; fails with [`Error::IncompatibleType`](crate::Error::IncompatibleType)
    /// when it cannot be.
    fn set_property(&self, property: &str, value: Value) -> Result<()>;

    /// The `Optimizable` capability, if this variable supports change tracking
    fn as_optimizable(&self) -> Option<&dyn Optimizable> {
        None
    }
}

/// Declares that the value of `child` is derived from `parent` inside the
/// same host object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyDependency {
    pub parent: String,
    pub child: String,
}

impl PropertyDependency {
    /// Create a new property dependency
    pub fn new<P: Into<String>, C: Into<String>>(parent: P, child: C) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
        }
    }
}

/// Change tracking capability.
///
/// Variables implementing this report property changes and declare their
/// internal property relationships, which makes formulas reading them eligible
/// for selective recomputation.
pub trait Optimizable {
    /// Internal `parent -> child` property relationships
    fn property_dependencies(&self) -> Option<&[PropertyDependency]>;

    /// Register a listener for property changes.
    ///
    /// The listener stays registered until the returned handle is dropped.
    fn subscribe(&self, listener: Arc<dyn PropertyListener>) -> Subscription;
}

/// Names of the properties of `variable` declared as derived from `property`
pub fn children_of<'a>(
    variable: &'a dyn Variable,
    property: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    variable
        .as_optimizable()
        .and_then(|opt| opt.property_dependencies())
        .unwrap_or(&[])
        .iter()
        .filter(move |dep| dep.parent == property)
        .map(|dep| dep.child.as_str())
}

/// Names of the properties `property` of `variable` is declared as derived from
pub fn parents_of<'a>(
    variable: &'a dyn Variable,
    property: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    variable
        .as_optimizable()
        .and_then(|opt| opt.property_dependencies())
        .unwrap_or(&[])
        .iter()
        .filter(move |dep| dep.child == property)
        .map(|dep| dep.parent.as_str())
}
