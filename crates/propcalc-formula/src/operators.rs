//! Operator tables
//!
//! Operators are plain functions with a symbol and a precedence. The parser
//! turns `a + b` into an operator node naming `Add`, which evaluates through
//! the same function lookup as `Add(a; b)`.

use indexmap::IndexMap;

/// An operator symbol bound to a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub identifier: String,
    pub function: String,
    /// Lower binds looser
    pub precedence: i32,
}

impl Operator {
    pub fn new(identifier: &str, function: &str, precedence: i32) -> Self {
        Self {
            identifier: identifier.to_string(),
            function: function.to_string(),
            precedence,
        }
    }
}

/// Unary and binary operators known to the parser
#[derive(Debug, Clone, Default)]
pub struct OperatorTable {
    unary: IndexMap<String, Operator>,
    binary: IndexMap<String, Operator>,
}

impl OperatorTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// The default operator set
    pub fn standard() -> Self {
        let mut table = Self::new();

        table.add_binary("^", "Power", 3);
        table.add_binary("*", "Multiply", 2);
        table.add_binary("/", "Divide", 2);
        table.add_binary("-", "Subtract", 1);
        table.add_binary("+", "Add", 1);
        table.add_binary("%", "Mod", 1);
        table.add_binary("<", "Less", 0);
        table.add_binary(">", "More", 0);
        table.add_binary("=", "Equal", 0);
        table.add_binary("<>", "NotEqual", 0);
        table.add_binary("!=", "NotEqual", 0);
        table.add_binary("<=", "LessOrEqual", 0);
        table.add_binary(">=", "MoreOrEqual", 0);
        table.add_binary("==", "Equal", 0);
        table.add_binary("&&", "And", -1);
        table.add_binary("||", "Or", -2);

        table.add_unary("-", "Subtract", 1);
        table.add_unary("!", "Not", 2);

        table
    }

    pub fn add_unary(&mut self, identifier: &str, function: &str, precedence: i32) {
        self.unary.insert(
            identifier.to_string(),
            Operator::new(identifier, function, precedence),
        );
    }

    pub fn add_binary(&mut self, identifier: &str, function: &str, precedence: i32) {
        self.binary.insert(
            identifier.to_string(),
            Operator::new(identifier, function, precedence),
        );
    }

    pub fn remove_unary(&mut self, identifier: &str) -> Option<Operator> {
        self.unary.shift_remove(identifier)
    }

    pub fn remove_binary(&mut self, identifier: &str) -> Option<Operator> {
        self.binary.shift_remove(identifier)
    }

    pub fn unary(&self, identifier: &str) -> Option<&Operator> {
        self.unary.get(identifier)
    }

    pub fn binary(&self, identifier: &str) -> Option<&Operator> {
        self.binary.get(identifier)
    }

    /// Longest unary identifier that `run` starts with
    pub fn unary_prefix(&self, run: &str) -> Option<&Operator> {
        self.unary
            .values()
            .filter(|op| run.starts_with(op.identifier.as_str()))
            .max_by_key(|op| op.identifier.len())
    }

    /// Longest unary identifier that `run` ends with
    pub fn unary_suffix(&self, run: &str) -> Option<&Operator> {
        self.unary
            .values()
            .filter(|op| run.ends_with(op.identifier.as_str()))
            .max_by_key(|op| op.identifier.len())
    }

    pub fn unary_operators(&self) -> impl Iterator<Item = &Operator> {
        self.unary.values()
    }

    pub fn binary_operators(&self) -> impl Iterator<Item = &Operator> {
        self.binary.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_precedence() {
        let table = OperatorTable::standard();
        assert_eq!(table.binary("^").map(|o| o.precedence), Some(3));
        assert_eq!(table.binary("*").map(|o| o.precedence), Some(2));
        assert_eq!(table.binary("%").map(|o| o.precedence), Some(1));
        assert_eq!(table.binary("<>").map(|o| o.function.as_str()), Some("NotEqual"));
        assert_eq!(table.binary("||").map(|o| o.precedence), Some(-2));
        assert_eq!(table.unary("!").map(|o| o.function.as_str()), Some("Not"));
        assert!(table.unary("+").is_none());
    }

    #[test]
    fn test_unary_affixes() {
        let table = OperatorTable::standard();
        assert_eq!(table.unary_prefix("-(").map(|o| o.identifier.as_str()), Some("-"));
        assert_eq!(table.unary_suffix("*-").map(|o| o.identifier.as_str()), Some("-"));
        assert!(table.unary_suffix("*").is_none());
    }

    #[test]
    fn test_remove_operator() {
        let mut table = OperatorTable::standard();
        assert!(table.remove_binary("%").is_some());
        assert!(table.binary("%").is_none());
    }
}
