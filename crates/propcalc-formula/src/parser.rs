//! Formula parser
//!
//! A recursive-descent parser working on trimmed substrings of the formula.
//! Each substring is tried, in order, as a text literal, an operator
//! expression, a function call (or parenthesized group), a number and finally
//! a variable path. Positions are character offsets into the original text.

use crate::ast::Node;
use crate::error::{ExpressionError, ExpressionResult, Span};
use crate::operators::{Operator, OperatorTable};
use lazy_regex::regex_is_match;

/// Default limit for nested sub-expressions
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Parse a formula with the default separator and depth limit
pub fn parse(text: &str, operators: &OperatorTable) -> ExpressionResult<Node> {
    Parser::new(operators).parse(text)
}

/// Formula parser bound to an operator table
#[derive(Debug, Clone)]
pub struct Parser<'a> {
    operators: &'a OperatorTable,
    separator: char,
    up: &'a str,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(operators: &'a OperatorTable) -> Self {
        Self {
            operators,
            separator: propcalc_core::DEFAULT_SEPARATOR,
            up: "$",
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Character splitting variable and property names
    pub fn separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Path token left to the host; its characters are never operators
    pub fn up_token(mut self, up: &'a str) -> Self {
        self.up = up;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Parse formula text into a tree
    pub fn parse(&self, text: &str) -> ExpressionResult<Node> {
        let chars: Vec<char> = text.chars().collect();
        check_balance(&chars)?;
        let node = self.parse_segment(&chars, 0, 0)?;
        log::trace!("parsed {:?} as {:?}", text, node);
        Ok(node)
    }

    fn parse_segment(&self, chars: &[char], offset: usize, depth: usize) -> ExpressionResult<Node> {
        let (chars, offset) = trim(chars, offset);
        if chars.is_empty() {
            return Err(ExpressionError::syntax("Missing operand", offset, 0));
        }
        if depth > self.max_depth {
            return Err(ExpressionError::syntax(
                "Formula is nested too deeply",
                offset,
                chars.len(),
            ));
        }

        let span = Span::new(offset, chars.len());
        let text: String = chars.iter().collect();

        if regex_is_match!(r#"^"([^"]|"")*"$"#, &text) {
            let inner = &text[1..text.len() - 1];
            return Ok(Node::text(inner.replace("\"\"", "\""), span));
        }

        if let Some(node) = self.parse_operator(chars, offset, depth)? {
            return Ok(node);
        }

        if let Some(open) = find_open(chars) {
            return self.parse_call(chars, offset, open, depth);
        }

        if chars[0].is_ascii_digit() {
            return text.parse::<f64>().map(|n| Node::number(n, span)).map_err(|_| {
                ExpressionError::syntax(format!("Invalid number '{}'", text), offset, chars.len())
            });
        }

        Ok(Node::variable(text, span))
    }

    /// Split on the loosest-binding operator at nesting depth 0
    fn parse_operator(
        &self,
        chars: &[char],
        offset: usize,
        depth: usize,
    ) -> ExpressionResult<Option<Node>> {
        let runs = self.operator_runs(chars);
        if runs.is_empty() {
            return Ok(None);
        }

        let mut unary: Option<&Operator> = None;
        let mut binary: Option<(&Operator, usize)> = None;

        for &(start, end) in runs.iter().rev() {
            let run: String = chars[start..end].iter().collect();

            if start == 0 {
                unary = self.operators.unary_prefix(&run);
                continue;
            }

            // "a - -b": the second run follows an operator and is a prefix
            let follows_operator = chars[..start]
                .iter()
                .rev()
                .find(|c| !c.is_whitespace())
                .map_or(true, |&c| self.is_operator_char(c));
            if follows_operator {
                continue;
            }

            let found = self.operators.binary(&run).or_else(|| {
                self.operators.unary_suffix(&run).and_then(|suffix| {
                    let shortened = &run[..run.len() - suffix.identifier.len()];
                    self.operators.binary(shortened)
                })
            });

            if let Some(op) = found {
                if binary.map_or(true, |(best, _)| op.precedence < best.precedence) {
                    binary = Some((op, start));
                }
            }
        }

        let span = Span::new(offset, chars.len());

        if let Some((op, start)) = binary {
            let end = start + op.identifier.chars().count();
            let left = self.parse_segment(&chars[..start], offset, depth + 1)?;
            let right = self.parse_segment(&chars[end..], offset + end, depth + 1)?;
            return Ok(Some(Node::operator(op.function.clone(), vec![left, right], span)));
        }

        if let Some(op) = unary {
            let end = op.identifier.chars().count();
            let operand = self.parse_segment(&chars[end..], offset + end, depth + 1)?;
            return Ok(Some(Node::operator(op.function.clone(), vec![operand], span)));
        }

        Ok(None)
    }

    fn parse_call(
        &self,
        chars: &[char],
        offset: usize,
        open: usize,
        depth: usize,
    ) -> ExpressionResult<Node> {
        let close = matching_paren(chars, open).ok_or_else(|| {
            ExpressionError::syntax("Missing ')'", offset + open, chars.len() - open)
        })?;
        if close + 1 != chars.len() {
            return Err(ExpressionError::syntax(
                "Unexpected text after ')'",
                offset + close + 1,
                chars.len() - close - 1,
            ));
        }

        let name: String = chars[..open].iter().collect();
        let name = name.trim();
        let mut args = self.parse_arguments(&chars[open + 1..close], offset + open + 1, depth)?;

        if name.is_empty() {
            return match args.pop() {
                Some(inner) if args.is_empty() => Ok(inner),
                _ => Err(ExpressionError::syntax(
                    "Expected one expression between parentheses",
                    offset + open,
                    close - open + 1,
                )),
            };
        }

        Ok(Node::call(name, args, Span::new(offset, chars.len())))
    }

    fn parse_arguments(
        &self,
        inner: &[char],
        offset: usize,
        depth: usize,
    ) -> ExpressionResult<Vec<Node>> {
        if inner.iter().all(|c| c.is_whitespace()) {
            return Ok(Vec::new());
        }

        let mut args = Vec::new();
        let mut start = 0;
        let mut level = 0i32;
        let mut quoted = false;

        for (i, &c) in inner.iter().enumerate() {
            match c {
                '"' => quoted = !quoted,
                '(' if !quoted => level += 1,
                ')' if !quoted => level -= 1,
                c if !quoted && level == 0 && self.is_argument_separator(c) => {
                    args.push(self.parse_segment(&inner[start..i], offset + start, depth + 1)?);
                    start = i + 1;
                }
                _ => {}
            }
        }
        args.push(self.parse_segment(&inner[start..], offset + start, depth + 1)?);

        Ok(args)
    }

    /// Maximal runs of operator characters at depth 0 outside text literals
    fn operator_runs(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let mut runs = Vec::new();
        let mut level = 0i32;
        let mut quoted = false;
        let mut run_start: Option<usize> = None;

        for (i, &c) in chars.iter().enumerate() {
            if !quoted && level == 0 && self.is_operator_char(c) {
                run_start.get_or_insert(i);
                continue;
            }
            if let Some(start) = run_start.take() {
                runs.push((start, i));
            }
            match c {
                '"' => quoted = !quoted,
                '(' if !quoted => level += 1,
                ')' if !quoted => level -= 1,
                _ => {}
            }
        }
        if let Some(start) = run_start {
            runs.push((start, chars.len()));
        }

        runs
    }

    fn is_operator_char(&self, c: char) -> bool {
        !(c.is_alphanumeric()
            || c.is_whitespace()
            || matches!(c, '(' | ')' | ';' | ',' | '"')
            || c == self.separator
            || self.up.contains(c))
    }

    fn is_argument_separator(&self, c: char) -> bool {
        c == ';' || (c == ',' && self.separator != ',')
    }
}

fn trim(chars: &[char], offset: usize) -> (&[char], usize) {
    let start = chars
        .iter()
        .position(|c| !c.is_whitespace())
        .unwrap_or(chars.len());
    let end = chars
        .iter()
        .rposition(|c| !c.is_whitespace())
        .map_or(start, |i| i + 1);
    (&chars[start..end], offset + start)
}

/// Reject unbalanced parentheses and unterminated text before parsing
fn check_balance(chars: &[char]) -> ExpressionResult<()> {
    let mut open = Vec::new();
    let mut quote: Option<usize> = None;

    for (i, &c) in chars.iter().enumerate() {
        if quote.is_some() {
            if c == '"' {
                quote = None;
            }
            continue;
        }
        match c {
            '"' => quote = Some(i),
            '(' => open.push(i),
            ')' => {
                if open.pop().is_none() {
                    return Err(ExpressionError::syntax("One ')' too much", i, 1));
                }
            }
            _ => {}
        }
    }

    if let Some(start) = quote {
        return Err(ExpressionError::syntax(
            "Missing closing '\"'",
            start,
            chars.len() - start,
        ));
    }
    if let Some(&start) = open.first() {
        return Err(ExpressionError::syntax("Missing ')'", start, chars.len() - start));
    }
    Ok(())
}

fn find_open(chars: &[char]) -> Option<usize> {
    let mut quoted = false;
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => return Some(i),
            _ => {}
        }
    }
    None
}

fn matching_paren(chars: &[char], open: usize) -> Option<usize> {
    let mut level = 0usize;
    let mut quoted = false;
    for (i, &c) in chars.iter().enumerate().skip(open) {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => level += 1,
            ')' if !quoted => {
                level -= 1;
                if level == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
