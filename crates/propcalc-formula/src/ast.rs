//! Formula Abstract Syntax Tree types

use crate::error::Span;
use crate::functions::FunctionDef;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

/// Kind and payload of a node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Numeric literal
    Number(f64),
    /// Text literal, quotes removed and doubled quotes unescaped
    Text(String),
    /// Variable or property path, verbatim (`p1`, `p1.x`, `.x`)
    Variable(String),
    /// Unary (one operand) or binary (two operands) operator.
    ///
    /// `function` names the function the operator evaluates through.
    Operator { function: String, operands: Vec<Node> },
    /// Function call; an empty name never survives parsing
    Call { name: String, args: Vec<Node> },
}

/// A parsed formula node.
///
/// Equality compares the tree shape only: spans and cached lookups are ignored.
#[derive(Clone)]
pub struct Node {
    kind: NodeKind,
    span: Span,
    function: OnceCell<Arc<FunctionDef>>,
    refresh: OnceCell<Vec<String>>,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            span,
            function: OnceCell::new(),
            refresh: OnceCell::new(),
        }
    }

    pub fn number(value: f64, span: Span) -> Self {
        Self::new(NodeKind::Number(value), span)
    }

    pub fn text<S: Into<String>>(value: S, span: Span) -> Self {
        Self::new(NodeKind::Text(value.into()), span)
    }

    pub fn variable<S: Into<String>>(path: S, span: Span) -> Self {
        Self::new(NodeKind::Variable(path.into()), span)
    }

    pub fn operator<S: Into<String>>(function: S, operands: Vec<Node>, span: Span) -> Self {
        Self::new(
            NodeKind::Operator {
                function: function.into(),
                operands,
            },
            span,
        )
    }

    pub fn call<S: Into<String>>(name: S, args: Vec<Node>, span: Span) -> Self {
        Self::new(
            NodeKind::Call {
                name: name.into(),
                args,
            },
            span,
        )
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Position of the node in the formula text
    pub fn span(&self) -> Span {
        self.span
    }

    /// Operands or arguments; empty for leaves
    pub fn children(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Operator { operands, .. } => operands,
            NodeKind::Call { args, .. } => args,
            _ => &[],
        }
    }

    /// Function name for operator and call nodes
    pub fn function_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Operator { function, .. } => Some(function),
            NodeKind::Call { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Path of a variable node
    pub fn path(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Variable(path) => Some(path),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, NodeKind::Call { .. })
    }

    /// Resolved function, cached after the first successful lookup
    pub(crate) fn function_cache(&self) -> &OnceCell<Arc<FunctionDef>> {
        &self.function
    }

    /// Formula keys to recompute before this variable node is read in live mode
    pub(crate) fn refresh_cache(&self) -> &OnceCell<Vec<String>> {
        &self.refresh
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Number(n) => write!(f, "{}", n),
            NodeKind::Text(s) => write!(f, "{:?}", s),
            NodeKind::Variable(path) => write!(f, "{}", path),
            NodeKind::Operator {
                function: name,
                operands: children,
            }
            | NodeKind::Call {
                name,
                args: children,
            } => {
                write!(f, "{}(", name)?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}
