//! Parsed template units and the recursive-descent template parser.
//!
//! Template syntax:
//! - `{name}` expands a variable, rule, or Markov symbol.
//! - `{name.mod1.mod2(1, "two")}` pipes the expansion through modifiers.
//! - `{.mod(args)}` is an anonymous, modifier-only expansion.
//! - `{{name}}` is a decorator expansion.
//! - `{name= value}` declares a variable scoped to the enclosing lexeme; the
//!   value is itself a template and may contain expansions.
//! - Everything else is literal text.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::literal::parse_literal_list;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxErrorKind {
    #[error("unterminated expansion")]
    UnterminatedExpansion,
    #[error("unterminated variable declaration")]
    UnterminatedVariable,
    #[error("unterminated argument list")]
    UnterminatedArguments,
    #[error("unterminated string literal in argument list")]
    UnterminatedString,
    #[error("unmatched '}}'")]
    UnmatchedCloseBrace,
    #[error("unexpected '{{'")]
    UnexpectedOpenBrace,
    #[error("unexpected '='")]
    UnexpectedEquals,
    #[error("unexpected '('")]
    UnexpectedOpenParen,
    #[error("unmatched ')'")]
    UnmatchedCloseParen,
    #[error("unexpected character '{0}' after argument list")]
    UnexpectedCharacter(char),
    #[error("empty modifier name")]
    EmptyModifierName,
    #[error("empty variable name")]
    EmptyVariableName,
    #[error("expected a space after '=' in variable declaration")]
    MissingSpaceAfterEquals,
    #[error("decorator expansion must be closed with '}}}}'")]
    UnterminatedDecorator,
    #[error("invalid modifier arguments: {0}")]
    InvalidArguments(String),
}

/// A malformed template. Never recovered from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset} in template {text:?}")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    /// Byte offset into `text`.
    pub offset: usize,
    pub text: String,
}

/// A literal argument passed to a modifier call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Number(f64),
    String(String),
}

impl ArgValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ArgValue::Number(n) => Some(*n),
            ArgValue::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(s) => Some(s),
            ArgValue::Number(_) => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Number(n) => write!(f, "{}", n),
            ArgValue::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// One `.name(args)` link of a modifier chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierCall {
    pub name: String,
    #[serde(default)]
    pub args: Vec<ArgValue>,
}

/// A single `{...}` reference inside a lexeme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expansion {
    /// Symbol to resolve. Empty for modifier-only expansions.
    pub name: String,
    #[serde(default)]
    pub modifiers: Vec<ModifierCall>,
    /// Set for the doubled-brace `{{name}}` form.
    #[serde(default)]
    pub is_decorator: bool,
}

/// A named value expression, either global or local to a lexeme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub lexeme: Lexeme,
}

/// A parsed template.
///
/// `format_string` is the original text with every expansion replaced by a
/// positional placeholder `{i}`, and with variable declarations removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lexeme {
    original_string: String,
    format_string: String,
    expansions: Vec<Expansion>,
    /// Local declarations in source order.
    #[serde(default)]
    variables: Vec<Variable>,
}

impl Lexeme {
    /// Parse a template string.
    pub fn parse(text: &str) -> Result<Lexeme, SyntaxError> {
        parse_lexeme(text)
    }

    pub fn original_string(&self) -> &str {
        &self.original_string
    }

    pub fn format_string(&self) -> &str {
        &self.format_string
    }

    pub fn expansions(&self) -> &[Expansion] {
        &self.expansions
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Substitute resolved expansion values into the format string.
    ///
    /// Placeholders without a corresponding value are left untouched.
    pub fn format(&self, values: &[String]) -> String {
        let mut out = String::with_capacity(self.format_string.len());
        let mut rest = self.format_string.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let substituted = after.find('}').and_then(|close| {
                let index: usize = after[..close].parse().ok()?;
                Some((values.get(index)?, close))
            });
            match substituted {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Walk this lexeme and every nested local-variable lexeme.
    pub fn walk<'l>(&'l self, visit: &mut dyn FnMut(&'l Lexeme)) {
        visit(self);
        for variable in &self.variables {
            variable.lexeme.walk(visit);
        }
    }
}

/// Parse a template string into a [`Lexeme`].
pub fn parse_lexeme(text: &str) -> Result<Lexeme, SyntaxError> {
    let mut parser = LexemeParser {
        text,
        chars: text.char_indices().collect(),
        pos: 0,
    };
    parser.parse_lexeme(false)
}

struct LexemeParser<'s> {
    text: &'s str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'s> LexemeParser<'s> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn offset(&self) -> usize {
        self.offset_of(self.pos)
    }

    fn offset_of(&self, pos: usize) -> usize {
        self.chars.get(pos).map(|&(o, _)| o).unwrap_or(self.text.len())
    }

    fn error_at<T>(&self, kind: SyntaxErrorKind, offset: usize) -> Result<T, SyntaxError> {
        Err(SyntaxError {
            kind,
            offset,
            text: self.text.to_string(),
        })
    }

    fn error<T>(&self, kind: SyntaxErrorKind) -> Result<T, SyntaxError> {
        self.error_at(kind, self.offset())
    }

    /// Parse literal text and expansions. A nested lexeme (the value of a
    /// variable declaration) stops in front of its closing `}`.
    fn parse_lexeme(&mut self, nested: bool) -> Result<Lexeme, SyntaxError> {
        let start = self.offset();
        let mut format_string = String::new();
        let mut expansions: Vec<Expansion> = Vec::new();
        let mut variables: Vec<Variable> = Vec::new();

        let end = loop {
            match self.peek() {
                None if nested => return self.error(SyntaxErrorKind::UnterminatedVariable),
                None => break self.offset(),
                Some('}') if nested => break self.offset(),
                Some('}') => return self.error(SyntaxErrorKind::UnmatchedCloseBrace),
                Some('{') => {
                    let open = self.offset();
                    self.bump();
                    let expansion = if self.peek() == Some('{') {
                        self.bump();
                        self.parse_expansion(open, true)?
                    } else if self.at_variable_declaration() {
                        let variable = self.parse_variable(open)?;
                        match variables.iter_mut().find(|v| v.name == variable.name) {
                            Some(existing) => *existing = variable,
                            None => variables.push(variable),
                        }
                        continue;
                    } else {
                        self.parse_expansion(open, false)?
                    };
                    format_string.push('{');
                    format_string.push_str(&expansions.len().to_string());
                    format_string.push('}');
                    expansions.push(expansion);
                }
                Some(c) => {
                    format_string.push(c);
                    self.bump();
                }
            }
        };

        Ok(Lexeme {
            original_string: self.text[start..end].to_string(),
            format_string,
            expansions,
            variables,
        })
    }

    /// A declaration has an `=` before any whitespace or expansion delimiter.
    fn at_variable_declaration(&self) -> bool {
        for &(_, c) in &self.chars[self.pos..] {
            match c {
                '=' => return true,
                '}' | '{' | '.' | '(' => return false,
                c if c.is_whitespace() => return false,
                _ => {}
            }
        }
        false
    }

    fn parse_variable(&mut self, open: usize) -> Result<Variable, SyntaxError> {
        let mut name = String::new();
        while let Some(c) = self.bump() {
            if c == '=' {
                break;
            }
            name.push(c);
        }
        if name.is_empty() {
            return self.error_at(SyntaxErrorKind::EmptyVariableName, open);
        }
        if self.peek() != Some(' ') {
            return self.error(SyntaxErrorKind::MissingSpaceAfterEquals);
        }
        self.bump();

        let lexeme = self.parse_lexeme(true)?;
        // parse_lexeme(true) only returns in front of the closing brace
        self.bump();
        Ok(Variable { name, lexeme })
    }

    fn parse_expansion(&mut self, open: usize, is_decorator: bool) -> Result<Expansion, SyntaxError> {
        let name = self.parse_symbol_name(open)?;
        let mut modifiers = Vec::new();
        while self.peek() == Some('.') {
            self.bump();
            modifiers.push(self.parse_modifier(open)?);
        }

        match self.bump() {
            Some('}') => {}
            _ => return self.error_at(SyntaxErrorKind::UnterminatedExpansion, open),
        }
        if is_decorator {
            if self.peek() != Some('}') {
                return self.error(SyntaxErrorKind::UnterminatedDecorator);
            }
            self.bump();
        }

        Ok(Expansion {
            name,
            modifiers,
            is_decorator,
        })
    }

    fn parse_symbol_name(&mut self, open: usize) -> Result<String, SyntaxError> {
        let mut name = String::new();
        loop {
            match self.peek() {
                None => return self.error_at(SyntaxErrorKind::UnterminatedExpansion, open),
                Some('.') | Some('}') => return Ok(name),
                Some('{') => return self.error(SyntaxErrorKind::UnexpectedOpenBrace),
                Some('=') => return self.error(SyntaxErrorKind::UnexpectedEquals),
                Some('(') => return self.error(SyntaxErrorKind::UnexpectedOpenParen),
                Some(')') => return self.error(SyntaxErrorKind::UnmatchedCloseParen),
                Some('\\') => {
                    self.bump();
                    match self.bump() {
                        Some(c) => name.push(c),
                        None => return self.error_at(SyntaxErrorKind::UnterminatedExpansion, open),
                    }
                }
                Some(c) => {
                    name.push(c);
                    self.bump();
                }
            }
        }
    }

    fn parse_modifier(&mut self, open: usize) -> Result<ModifierCall, SyntaxError> {
        let mut name = String::new();
        loop {
            match self.peek() {
                None => return self.error_at(SyntaxErrorKind::UnterminatedExpansion, open),
                Some('.') | Some('}') | Some('(') => break,
                Some('{') => return self.error(SyntaxErrorKind::UnexpectedOpenBrace),
                Some('=') => return self.error(SyntaxErrorKind::UnexpectedEquals),
                Some(')') => return self.error(SyntaxErrorKind::UnmatchedCloseParen),
                Some(c) => {
                    name.push(c);
                    self.bump();
                }
            }
        }
        if name.is_empty() {
            return self.error(SyntaxErrorKind::EmptyModifierName);
        }

        let mut args = Vec::new();
        if self.peek() == Some('(') {
            args = self.parse_arguments()?;
            match self.peek() {
                None | Some('.') | Some('}') => {}
                Some(')') => return self.error(SyntaxErrorKind::UnmatchedCloseParen),
                Some('(') => return self.error(SyntaxErrorKind::UnexpectedOpenParen),
                Some('{') => return self.error(SyntaxErrorKind::UnexpectedOpenBrace),
                Some(c) => return self.error(SyntaxErrorKind::UnexpectedCharacter(c)),
            }
        }

        Ok(ModifierCall { name, args })
    }

    /// Capture everything up to the matching `)`, skipping over quoted
    /// strings, then read it as a literal list.
    fn parse_arguments(&mut self) -> Result<Vec<ArgValue>, SyntaxError> {
        let paren = self.offset();
        self.bump();
        let inner_start = self.pos;
        loop {
            match self.peek() {
                None => return self.error_at(SyntaxErrorKind::UnterminatedArguments, paren),
                Some(')') => break,
                Some('(') => return self.error(SyntaxErrorKind::UnexpectedOpenParen),
                Some(quote @ ('\'' | '"')) => {
                    let string_start = self.offset();
                    self.bump();
                    loop {
                        match self.bump() {
                            None => {
                                return self
                                    .error_at(SyntaxErrorKind::UnterminatedString, string_start)
                            }
                            Some('\\') => {
                                self.bump();
                            }
                            Some(c) if c == quote => break,
                            Some(_) => {}
                        }
                    }
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
        let inner_end = self.pos;
        self.bump();

        let start = self.offset_of(inner_start);
        let inner = &self.text[start..self.offset_of(inner_end)];
        parse_literal_list(inner).or_else(|e| {
            self.error_at(
                SyntaxErrorKind::InvalidArguments(e.message),
                start + e.offset,
            )
        })
    }
}
