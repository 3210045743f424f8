//! Registry of host variables by name

use crate::error::{Error, Result};
use crate::variable::VariableRef;
use indexmap::IndexMap;
use lazy_regex::regex_is_match;

/// Default separator between a variable name and a property name
pub const DEFAULT_SEPARATOR: char = '.';

/// Returns true if `name` is a valid variable name (`^[A-Za-z]+[0-9]*$`)
pub fn is_valid_name(name: &str) -> bool {
    regex_is_match!(r"^[A-Za-z]+[0-9]*$", name)
}

/// Variables registered with a calculator, in registration order
#[derive(Clone)]
pub struct VariableSet {
    variables: IndexMap<String, VariableRef, ahash::RandomState>,
    separator: char,
}

impl VariableSet {
    /// Create an empty set using the default separator
    pub fn new() -> Self {
        Self::with_separator(DEFAULT_SEPARATOR)
    }

    /// Create an empty set; `separator` splits keys into variable and property
    pub fn with_separator(separator: char) -> Self {
        Self {
            variables: IndexMap::with_hasher(ahash::RandomState::new()),
            separator,
        }
    }

    /// Register a variable
    pub fn add(&mut self, variable: VariableRef) -> Result<()> {
        let name = variable.name().to_string();
        if !is_valid_name(&name) {
            return Err(Error::InvalidName(name));
        }
        if self.variables.contains_key(&name) {
            return Err(Error::DuplicateVariable(name));
        }
        self.variables.insert(name, variable);
        Ok(())
    }

    /// Remove a variable by name
    pub fn remove(&mut self, name: &str) -> Option<VariableRef> {
        self.variables.shift_remove(name)
    }

    /// Look up a variable.
    ///
    /// A key such as `"line1.length"` resolves to its variable part.
    pub fn get(&self, name: &str) -> Option<&VariableRef> {
        let name = match name.find(self.separator) {
            Some(idx) => &name[..idx],
            None => name,
        };
        self.variables.get(name)
    }

    /// Check whether a variable is registered
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate over the registered variables
    pub fn iter(&self) -> impl Iterator<Item = &VariableRef> {
        self.variables.values()
    }

    /// Number of registered variables
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Check whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Remove every variable
    pub fn clear(&mut self) {
        self.variables.clear();
    }

    /// Generate an unused name of the form `<prefix><n>`, starting at 1
    pub fn generate_new_name(&self, prefix: &str) -> String {
        (1..)
            .map(|i| format!("{}{}", prefix, i))
            .find(|name| !self.variables.contains_key(name))
            .unwrap_or_else(|| prefix.to_string())
    }

    /// The separator this set splits keys on
    pub fn separator(&self) -> char {
        self.separator
    }
}

impl Default for VariableSet {
    fn default() -> Self {
        Self::new()
    }
}
