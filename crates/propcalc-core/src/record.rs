//! A general-purpose host variable with declared, typed properties

use crate::error::{Error, Result};
use crate::notify::{ChangeNotifier, PropertyListener, Subscription};
use crate::value::{Value, ValueType};
use crate::variable::{Optimizable, PropertyDependency, Variable};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Property {
    ty: ValueType,
    value: Value,
}

/// Host variable holding a fixed set of typed properties.
///
/// A `Record` is optimizable by default: it reports every property change that
/// actually alters a value, and declares the property dependencies it was built
/// with.
///
/// ```rust
/// use propcalc_core::{Record, Value, ValueType, Variable};
///
/// let line = Record::new("line1", "Line")
///     .with_property("length", ValueType::Number, 0.0)
///     .with_property("label", ValueType::Text, "")
///     .with_dependency("length", "label");
///
/// line.set_property("length", Value::text("12")).unwrap();
/// assert_eq!(line.get_property("length").unwrap(), Value::Number(12.0));
/// ```
#[derive(Debug)]
pub struct Record {
    name: String,
    kind: String,
    properties: RwLock<IndexMap<String, Property>>,
    dependencies: Vec<PropertyDependency>,
    notifier: Option<ChangeNotifier>,
}

impl Record {
    /// Create an optimizable record with no properties
    pub fn new<N: Into<String>, K: Into<String>>(name: N, kind: K) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            properties: RwLock::new(IndexMap::new()),
            dependencies: Vec::new(),
            notifier: Some(ChangeNotifier::new()),
        }
    }

    /// Declare a property with its type and initial value
    pub fn with_property<V: Into<Value>>(
        self,
        name: impl Into<String>,
        ty: ValueType,
        initial: V,
    ) -> Self {
        self.properties.write().insert(
            name.into(),
            Property {
                ty,
                value: initial.into(),
            },
        );
        self
    }

    /// Declare that `child` is derived from `parent`
    pub fn with_dependency(mut self, parent: &str, child: &str) -> Self {
        self.dependencies
            .push(PropertyDependency::new(parent, child));
        self
    }

    /// Drop change tracking; the record no longer implements `Optimizable`
    pub fn untracked(mut self) -> Self {
        self.notifier = None;
        self
    }

    /// Wrap in an `Arc` for registration
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Names of the declared properties, in declaration order
    pub fn property_names(&self) -> Vec<String> {
        self.properties.read().keys().cloned().collect()
    }

    /// Declared type of a property
    pub fn property_type(&self, property: &str) -> Option<ValueType> {
        self.properties.read().get(property).map(|p| p.ty)
    }

    fn unknown(&self, property: &str) -> Error {
        Error::UnknownProperty {
            variable: self.name.clone(),
            property: property.to_string(),
        }
    }
}

impl Variable for Record {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn get_property(&self, property: &str) -> Result<Value> {
        self.properties
            .read()
            .get(property)
            .map(|p| p.value.clone())
            .ok_or_else(|| self.unknown(property))
    }

    fn set_property(&self, property: &str, value: Value) -> Result<()> {
        let changed = {
            let mut properties = self.properties.write();
            let slot = properties
                .get_mut(property)
                .ok_or_else(|| self.unknown(property))?;
            let value = value.convert(slot.ty, property)?;
            if slot.value == value {
                false
            } else {
                slot.value = value;
                true
            }
        };

        // Notify with the lock released; listeners may read this record.
        if changed {
            if let Some(notifier) = &self.notifier {
                notifier.notify(&self.name, property);
            }
        }
        Ok(())
    }

    fn as_optimizable(&self) -> Option<&dyn Optimizable> {
        self.notifier.as_ref().map(|_| self as &dyn Optimizable)
    }
}

impl Optimizable for Record {
    fn property_dependencies(&self) -> Option<&[PropertyDependency]> {
        if self.dependencies.is_empty() {
            None
        } else {
            Some(&self.dependencies)
        }
    }

    fn subscribe(&self, listener: Arc<dyn PropertyListener>) -> Subscription {
        match &self.notifier {
            Some(notifier) => notifier.subscribe(listener),
            // Untracked records are never exposed as Optimizable; hand out a
            // subscription on a notifier that is dropped immediately.
            None => ChangeNotifier::new().subscribe(listener),
        }
    }
}
