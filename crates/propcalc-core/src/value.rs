//! Property value types

use crate::error::{Error, Result};
use crate::variable::VariableRef;
use std::fmt;
use std::sync::Arc;

/// A value read from or written to a variable property, or produced by a formula
#[derive(Clone)]
pub enum Value {
    /// No value
    Empty,

    /// Boolean value
    Boolean(bool),

    /// Numeric value (all numbers stored as f64)
    Number(f64),

    /// Text value
    Text(String),

    /// Reference to a host variable (a bare variable name evaluates to this)
    Object(VariableRef),
}

impl Value {
    /// Create a new text value
    pub fn text<S: Into<String>>(s: S) -> Self {
        Value::Text(s.into())
    }

    /// Check if the value is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Name of the value's type, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Object(_) => "object",
        }
    }

    /// Convert to number, if possible
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Boolean(true) => Some(1.0),
            Value::Boolean(false) => Some(0.0),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Empty => Some(0.0),
            Value::Object(_) => None,
        }
    }

    /// Force conversion to number for arithmetic
    pub fn to_number(&self) -> Result<f64> {
        self.as_number().ok_or(Error::InvalidValueType {
            expected: "number",
            actual: self.type_name(),
        })
    }

    /// Convert to boolean, if possible
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Number(n) => Some(*n != 0.0),
            Value::Text(s) => {
                if s.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }
            Value::Empty => Some(false),
            Value::Object(_) => None,
        }
    }

    /// Force conversion to boolean for logical operators
    pub fn to_bool(&self) -> Result<bool> {
        self.as_bool().ok_or(Error::InvalidValueType {
            expected: "boolean",
            actual: self.type_name(),
        })
    }

    /// Convert to text
    pub fn as_text(&self) -> String {
        self.to_string()
    }

    /// Get the referenced variable if this is an object value
    pub fn as_object(&self) -> Option<&VariableRef> {
        match self {
            Value::Object(var) => Some(var),
            _ => None,
        }
    }

    /// Best-effort conversion to a declared property type.
    ///
    /// `property` is only used to label the error.
    pub fn convert(self, ty: ValueType, property: &str) -> Result<Value> {
        let incompatible = |value: &Value| Error::IncompatibleType {
            property: property.to_string(),
            expected: ty.name(),
            actual: format!("{:?}", value),
        };

        match ty {
            ValueType::Any => Ok(self),
            ValueType::Number => match self.as_number() {
                Some(n) => Ok(Value::Number(n)),
                None => Err(incompatible(&self)),
            },
            ValueType::Integer => match self.as_number() {
                Some(n) if n.is_finite() => Ok(Value::Number(n.round())),
                _ => Err(incompatible(&self)),
            },
            ValueType::Boolean => match self.as_bool() {
                Some(b) => Ok(Value::Boolean(b)),
                None => Err(incompatible(&self)),
            },
            ValueType::Text => Ok(Value::Text(self.as_text())),
            ValueType::Object => match self {
                Value::Object(_) => Ok(self),
                _ => Err(incompatible(&self)),
            },
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Empty
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "Empty"),
            Value::Boolean(b) => write!(f, "Boolean({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::Text(s) => write!(f, "Text({:?})", s),
            Value::Object(var) => write!(f, "Object({})", var.name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Text(s) => write!(f, "{}", s),
            Value::Object(var) => write!(f, "{}", var.name()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<VariableRef> for Value {
    fn from(var: VariableRef) -> Self {
        Value::Object(var)
    }
}

/// Declared type of a host property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Accepts any value unchanged
    Any,
    Number,
    /// Number rounded to the nearest integer on assignment
    Integer,
    Boolean,
    Text,
    Object,
}

impl ValueType {
    /// Type name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Any => "any",
            ValueType::Number => "number",
            ValueType::Integer => "integer",
            ValueType::Boolean => "boolean",
            ValueType::Text => "text",
            ValueType::Object => "object",
        }
    }

    /// Infer the declared type from an initial value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Empty => ValueType::Any,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Number(_) => ValueType::Number,
            Value::Text(_) => ValueType::Text,
            Value::Object(_) => ValueType::Object,
        }
    }
}
