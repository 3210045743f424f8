//! JSON model files
//!
//! ```json
//! {
//!   "separator": ".",
//!   "variables": [
//!     {
//!       "name": "sq",
//!       "kind": "Square",
//!       "properties": { "side": 3, "area": { "type": "number", "value": 0 } },
//!       "dependencies": [{ "parent": "side", "child": "area" }]
//!     }
//!   ],
//!   "formulas": [{ "key": "sq.area", "formula": ".side ^ 2" }]
//! }
//! ```

use anyhow::{bail, Context, Result};
use propcalc::{Calculator, CalculatorOptions, Record, Value, ValueType, Variable};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Model {
    #[serde(default)]
    pub separator: Option<char>,
    #[serde(default)]
    pub live: bool,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub formulas: Vec<FormulaDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableDef {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Untracked variables report no changes, so formulas reading them are
    /// recomputed on every pass
    #[serde(default = "default_tracked")]
    pub tracked: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDef>,
    #[serde(default)]
    pub dependencies: Vec<DependencyDef>,
}

fn default_kind() -> String {
    "Record".to_string()
}

fn default_tracked() -> bool {
    true
}

/// A property given either as a bare value or with an explicit type
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PropertyDef {
    Typed {
        #[serde(rename = "type")]
        ty: TypeName,
        #[serde(default)]
        value: serde_json::Value,
    },
    Plain(serde_json::Value),
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeName {
    Any,
    Number,
    Integer,
    Boolean,
    Text,
    Object,
}

impl From<TypeName> for ValueType {
    fn from(name: TypeName) -> Self {
        match name {
            TypeName::Any => ValueType::Any,
            TypeName::Number => ValueType::Number,
            TypeName::Integer => ValueType::Integer,
            TypeName::Boolean => ValueType::Boolean,
            TypeName::Text => ValueType::Text,
            TypeName::Object => ValueType::Object,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyDef {
    pub parent: String,
    pub child: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormulaDef {
    pub key: String,
    pub formula: String,
}

/// Convert a JSON scalar to a property value
fn to_value(json: &serde_json::Value) -> Result<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Empty,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(n) => Value::Number(n),
            None => bail!("number {} is out of range", n),
        },
        serde_json::Value::String(s) => Value::text(s.as_str()),
        other => bail!("unsupported property value {}", other),
    })
}

/// Type of a property given without one
fn infer_type(json: &serde_json::Value) -> ValueType {
    match json {
        serde_json::Value::Bool(_) => ValueType::Boolean,
        serde_json::Value::Number(_) => ValueType::Number,
        serde_json::Value::String(_) => ValueType::Text,
        _ => ValueType::Any,
    }
}

impl Model {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid model '{}'", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Calculator options taken from the model
    pub fn options(&self) -> CalculatorOptions {
        let defaults = CalculatorOptions::default();
        CalculatorOptions {
            separator: self.separator.unwrap_or(defaults.separator),
            live_update: self.live,
            ..defaults
        }
    }

    /// Build the records of the model
    pub fn records(&self) -> Result<Vec<Arc<Record>>> {
        self.variables
            .iter()
            .map(|def| {
                let mut record = Record::new(def.name.as_str(), def.kind.as_str());
                for (name, property) in &def.properties {
                    let (ty, value) = match property {
                        PropertyDef::Typed { ty, value } => (ValueType::from(*ty), value),
                        PropertyDef::Plain(value) => (infer_type(value), value),
                    };
                    let value = to_value(value)
                        .with_context(|| format!("property '{}' of '{}'", name, def.name))?;
                    record = record.with_property(name.as_str(), ty, value);
                }
                for dep in &def.dependencies {
                    record = record.with_dependency(&dep.parent, &dep.child);
                }
                if !def.tracked {
                    record = record.untracked();
                }
                Ok(record.shared())
            })
            .collect()
    }

    /// Register the records and formulas of the model with a new calculator
    pub fn build(&self, options: CalculatorOptions) -> Result<(Calculator, Vec<Arc<Record>>)> {
        let mut calc = Calculator::with_options(options);
        let records = self.records()?;
        for record in &records {
            calc.add_variable(record.clone())
                .with_context(|| format!("Failed to add variable '{}'", record.name()))?;
        }
        for formula in &self.formulas {
            calc.add_expression(&formula.key, &formula.formula)
                .with_context(|| format!("Failed to add formula for '{}'", formula.key))?;
        }
        Ok((calc, records))
    }
}

/// Parse a command-line value: `true`/`false`, a number, or text
pub fn parse_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(b) = trimmed.parse::<bool>() {
        return Value::Boolean(b);
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        return Value::Number(n);
    }
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    Value::text(unquoted)
}
