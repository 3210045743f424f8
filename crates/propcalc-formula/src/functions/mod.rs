//! Function registry and built-in functions
//!
//! Every operator evaluates through a function of this registry, so
//! `1 + 2` and `Add(1; 2)` are the same call.

pub mod logical;
pub mod math;
pub mod text;

use crate::ast::Node;
use crate::error::{ExpressionResult, FormulaError, FormulaResult};
use crate::evaluator::EvaluationContext;
use ahash::AHashMap;
use parking_lot::RwLock;
use propcalc_core::{Value, VariableRef};
use std::fmt;
use std::sync::Arc;

/// Function receiving evaluated arguments
pub type ValueFn = fn(&[Value]) -> FormulaResult<Value>;

/// Function receiving its unevaluated argument nodes.
///
/// It evaluates arguments itself with [`calc`](crate::evaluator::calc), in
/// whatever order and as often as it needs.
pub type IntelligenceFn =
    fn(&[Node], &dyn EvaluationContext, Option<&VariableRef>) -> ExpressionResult<Value>;

/// How a function receives its arguments
#[derive(Clone, Copy)]
pub enum FunctionImpl {
    Values(ValueFn),
    Intelligence(IntelligenceFn),
}

/// Capability tags of a function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// One instance per [`SharedFunctions`], deduplicated by name
    pub shared: bool,
    /// Result differs between calls; formulas using it are never optimizable
    pub random: bool,
    /// Arguments may reference the formula's own key
    pub slack: bool,
}

/// Function definition
pub struct FunctionDef {
    pub name: String,
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    pub implementation: FunctionImpl,
    pub capabilities: Capabilities,
    /// Properties a bare variable argument implicitly reads, per variable kind
    pub implicit_properties: Option<AHashMap<String, Vec<String>>>,
}

impl FunctionDef {
    pub fn new(name: &str, min_args: usize, max_args: Option<usize>, f: ValueFn) -> Self {
        Self {
            name: name.to_string(),
            min_args,
            max_args,
            implementation: FunctionImpl::Values(f),
            capabilities: Capabilities::default(),
            implicit_properties: None,
        }
    }

    pub fn intelligence(
        name: &str,
        min_args: usize,
        max_args: Option<usize>,
        f: IntelligenceFn,
    ) -> Self {
        Self {
            implementation: FunctionImpl::Intelligence(f),
            ..Self::new(name, min_args, max_args, |_| Ok(Value::Empty))
        }
    }

    pub fn shared(mut self) -> Self {
        self.capabilities.shared = true;
        self
    }

    pub fn random(mut self) -> Self {
        self.capabilities.random = true;
        self
    }

    pub fn slack(mut self) -> Self {
        self.capabilities.slack = true;
        self
    }

    /// Declare that a bare argument of kind `kind` reads `properties`
    pub fn reads_properties(mut self, kind: &str, properties: &[&str]) -> Self {
        self.implicit_properties
            .get_or_insert_with(AHashMap::new)
            .insert(
                kind.to_string(),
                properties.iter().map(|p| p.to_string()).collect(),
            );
        self
    }

    pub fn is_intelligence(&self) -> bool {
        matches!(self.implementation, FunctionImpl::Intelligence(_))
    }

    /// Implicitly read properties for a variable kind, if any are declared
    pub fn implicit_properties_for(&self, kind: &str) -> Option<&[String]> {
        self.implicit_properties
            .as_ref()
            .and_then(|map| map.get(kind))
            .map(Vec::as_slice)
    }

    /// Fail with `ArgumentCount` unless `count` arguments are accepted
    pub fn check_arity(&self, count: usize) -> FormulaResult<()> {
        let too_many = self.max_args.map_or(false, |max| count > max);
        if count < self.min_args || too_many {
            let expected = match self.max_args {
                Some(max) if max == self.min_args => max.to_string(),
                Some(max) => format!("{}..{}", self.min_args, max),
                None => format!("at least {}", self.min_args),
            };
            return Err(FormulaError::ArgumentCount {
                function: self.name.clone(),
                expected,
                actual: count,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("intelligence", &self.is_intelligence())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Instances of `shared` functions, deduplicated by name.
///
/// Registries built with the same `SharedFunctions` hand out the same
/// instance for a shared function; independent registries never interfere.
#[derive(Clone, Default)]
pub struct SharedFunctions {
    functions: Arc<RwLock<AHashMap<String, Arc<FunctionDef>>>>,
}

impl SharedFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the instance registered under the function's name, adding it first if needed
    pub fn intern(&self, def: FunctionDef) -> Arc<FunctionDef> {
        let key = def.name.to_lowercase();
        if let Some(existing) = self.functions.read().get(&key) {
            return Arc::clone(existing);
        }
        Arc::clone(
            self.functions
                .write()
                .entry(key)
                .or_insert_with(|| Arc::new(def)),
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<FunctionDef>> {
        self.functions.read().get(&name.to_lowercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }
}

/// Function registry
pub struct FunctionRegistry {
    functions: AHashMap<String, Arc<FunctionDef>>,
    shared: SharedFunctions,
    case_sensitive: bool,
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        Self::with_shared(SharedFunctions::new())
    }

    /// Create a registry with the built-ins, drawing shared functions from `shared`
    pub fn with_shared(shared: SharedFunctions) -> Self {
        let mut registry = Self {
            functions: AHashMap::new(),
            shared,
            case_sensitive: false,
        };

        registry.register_operator_functions();
        registry.register_math_functions();
        registry.register_logical_functions();
        registry.register_text_functions();

        registry
    }

    /// Create a registry without any functions
    pub fn empty() -> Self {
        Self {
            functions: AHashMap::new(),
            shared: SharedFunctions::new(),
            case_sensitive: false,
        }
    }

    /// Match function names exactly instead of ignoring case
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&Arc<FunctionDef>> {
        self.functions
            .get(&name.to_lowercase())
            .filter(|def| !self.case_sensitive || def.name == name)
    }

    /// Register a function, replacing any function of the same name
    pub fn register(&mut self, def: FunctionDef) {
        let key = def.name.to_lowercase();
        let def = if def.capabilities.shared {
            self.shared.intern(def)
        } else {
            Arc::new(def)
        };
        self.functions.insert(key, def);
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<FunctionDef>> {
        if self.get(name).is_none() {
            return None;
        }
        self.functions.remove(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered function names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.values().map(|f| f.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn shared_functions(&self) -> &SharedFunctions {
        &self.shared
    }

    fn register_operator_functions(&mut self) {
        let binary: [(&str, ValueFn); 13] = [
            ("Add", math::fn_add),
            ("Multiply", math::fn_multiply),
            ("Divide", math::fn_divide),
            ("Power", math::fn_power),
            ("Mod", math::fn_mod),
            ("Less", logical::fn_less),
            ("More", logical::fn_more),
            ("Equal", logical::fn_equal),
            ("NotEqual", logical::fn_not_equal),
            ("LessOrEqual", logical::fn_less_or_equal),
            ("MoreOrEqual", logical::fn_more_or_equal),
            ("And", logical::fn_and),
            ("Or", logical::fn_or),
        ];
        for (name, f) in binary {
            self.register(FunctionDef::new(name, 2, Some(2), f).shared());
        }

        // Subtract doubles as unary minus
        self.register(FunctionDef::new("Subtract", 1, Some(2), math::fn_subtract).shared());
        self.register(FunctionDef::new("Not", 1, Some(1), logical::fn_not).shared());
    }

    fn register_math_functions(&mut self) {
        self.register(FunctionDef::new("abs", 1, Some(1), math::fn_abs));
        self.register(FunctionDef::new("sqrt", 1, Some(1), math::fn_sqrt));
        self.register(FunctionDef::new("round", 1, Some(2), math::fn_round));
        self.register(FunctionDef::new("floor", 1, Some(1), math::fn_floor));
        self.register(FunctionDef::new("ceiling", 1, Some(1), math::fn_ceiling));
        self.register(FunctionDef::new("min", 1, None, math::fn_min));
        self.register(FunctionDef::new("max", 1, None, math::fn_max));
        self.register(FunctionDef::new("sum", 1, None, math::fn_sum));
        self.register(FunctionDef::new("average", 1, None, math::fn_average));
        self.register(FunctionDef::new("pi", 0, Some(0), math::fn_pi));
        self.register(FunctionDef::new("sin", 1, Some(1), math::fn_sin));
        self.register(FunctionDef::new("cos", 1, Some(1), math::fn_cos));
        self.register(FunctionDef::new("tan", 1, Some(1), math::fn_tan));

        self.register(FunctionDef::new("random", 0, Some(0), math::fn_random).random());
        self.register(FunctionDef::new("randbetween", 2, Some(2), math::fn_randbetween).random());
    }

    fn register_logical_functions(&mut self) {
        self.register(FunctionDef::intelligence("if", 2, Some(3), logical::fn_if));
    }

    fn register_text_functions(&mut self) {
        self.register(FunctionDef::new("concat", 1, None, text::fn_concat));
        self.register(FunctionDef::new("len", 1, Some(1), text::fn_len));
        self.register(FunctionDef::new("upper", 1, Some(1), text::fn_upper));
        self.register(FunctionDef::new("lower", 1, Some(1), text::fn_lower));
        self.register(FunctionDef::new("text", 1, Some(2), text::fn_text));
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .field("case_sensitive", &self.case_sensitive)
            .finish()
    }
}

/// Numeric argument at `index`, failing with an `Argument` error
pub(crate) fn number_arg(args: &[Value], index: usize, function: &str) -> FormulaResult<f64> {
    let value = args.get(index).ok_or_else(|| {
        FormulaError::Argument(format!("{} is missing argument {}", function, index + 1))
    })?;
    value.as_number().ok_or_else(|| {
        FormulaError::Argument(format!(
            "{} expects a number, got {}",
            function,
            value.type_name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = FunctionRegistry::new();
        assert!(registry.contains("ABS"));
        assert!(registry.contains("add"));
        assert_eq!(registry.get("Max").map(|f| f.name.as_str()), Some("max"));
    }

    #[test]
    fn test_case_sensitive_lookup() {
        let registry = FunctionRegistry::new().case_sensitive(true);
        assert!(registry.contains("abs"));
        assert!(!registry.contains("ABS"));
    }

    #[test]
    fn test_shared_functions_deduplicated() {
        let shared = SharedFunctions::new();
        let a = FunctionRegistry::with_shared(shared.clone());
        let b = FunctionRegistry::with_shared(shared.clone());

        let add_a = a.get("Add").unwrap();
        let add_b = b.get("Add").unwrap();
        assert!(Arc::ptr_eq(add_a, add_b));

        let abs_a = a.get("abs").unwrap();
        let abs_b = b.get("abs").unwrap();
        assert!(!Arc::ptr_eq(abs_a, abs_b));
    }

    #[test]
    fn test_register_and_remove() {
        fn double(args: &[Value]) -> FormulaResult<Value> {
            Ok(Value::Number(number_arg(args, 0, "double")? * 2.0))
        }

        let mut registry = FunctionRegistry::empty();
        registry.register(FunctionDef::new("double", 1, Some(1), double));
        assert_eq!(registry.names(), vec!["double"]);
        assert!(registry.remove("DOUBLE").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_arity() {
        let registry = FunctionRegistry::new();
        let round = registry.get("round").unwrap();
        assert!(round.check_arity(1).is_ok());
        assert!(round.check_arity(2).is_ok());
        assert!(matches!(
            round.check_arity(3),
            Err(FormulaError::ArgumentCount { actual: 3, .. })
        ));
    }

    #[test]
    fn test_capability_tags() {
        let registry = FunctionRegistry::new();
        assert!(registry.get("random").unwrap().capabilities.random);
        assert!(registry.get("if").unwrap().is_intelligence());
        assert!(registry.get("Subtract").unwrap().capabilities.shared);

        let def = FunctionDef::new("area", 1, Some(1), |_| Ok(Value::Empty))
            .slack()
            .reads_properties("Rect", &["width", "height"]);
        assert!(def.capabilities.slack);
        assert_eq!(
            def.implicit_properties_for("Rect"),
            Some(&["width".to_string(), "height".to_string()][..])
        );
        assert!(def.implicit_properties_for("Circle").is_none());
    }
}
