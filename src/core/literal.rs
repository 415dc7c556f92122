//! Literal-list reader for modifier arguments.
//!
//! Accepts the permissive JSON5-style subset that templates use between the
//! parentheses of a modifier call: single- or double-quoted strings with
//! backslash escapes, signed decimal numbers, and an optional trailing comma.

use thiserror::Error;

use crate::core::lexeme::ArgValue;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at argument offset {offset})")]
pub struct LiteralError {
    pub message: String,
    pub offset: usize,
}

/// Parse the text between a modifier's parentheses into typed values.
pub fn parse_literal_list(text: &str) -> Result<Vec<ArgValue>, LiteralError> {
    let mut reader = LiteralReader {
        chars: text.char_indices().collect(),
        len: text.len(),
        pos: 0,
    };
    reader.read_list()
}

struct LiteralReader {
    chars: Vec<(usize, char)>,
    len: usize,
    pos: usize,
}

impl LiteralReader {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map(|&(o, _)| o).unwrap_or(self.len)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, LiteralError> {
        Err(LiteralError {
            message: message.into(),
            offset: self.offset(),
        })
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn read_list(&mut self) -> Result<Vec<ArgValue>, LiteralError> {
        let mut values = Vec::new();
        self.skip_whitespace();
        while self.peek().is_some() {
            values.push(self.read_value()?);
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some(',') => {
                    self.bump();
                    self.skip_whitespace();
                }
                Some(c) => return self.error(format!("expected ',' but found '{}'", c)),
            }
        }
        Ok(values)
    }

    fn read_value(&mut self) -> Result<ArgValue, LiteralError> {
        match self.peek() {
            Some(q @ ('\'' | '"')) => {
                self.bump();
                self.read_string(q).map(ArgValue::String)
            }
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => {
                self.read_number().map(ArgValue::Number)
            }
            Some(',') => self.error("empty argument"),
            Some(c) => self.error(format!("unexpected character '{}'", c)),
            None => self.error("expected a value"),
        }
    }

    fn read_string(&mut self, quote: char) -> Result<String, LiteralError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return self.error("unterminated string literal"),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    let escaped = match self.bump() {
                        None => return self.error("unterminated escape sequence"),
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('b') => '\u{8}',
                        Some('f') => '\u{c}',
                        Some('v') => '\u{b}',
                        Some('0') => '\0',
                        Some('u') => self.read_unicode_escape()?,
                        Some(other) => other,
                    };
                    out.push(escaped);
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn read_unicode_escape(&mut self) -> Result<char, LiteralError> {
        let mut code = 0u32;
        for _ in 0..4 {
            match self.bump().and_then(|c| c.to_digit(16)) {
                Some(digit) => code = code * 16 + digit,
                None => return self.error("invalid \\u escape"),
            }
        }
        match char::from_u32(code) {
            Some(c) => Ok(c),
            None => self.error("invalid \\u escape"),
        }
    }

    fn read_number(&mut self) -> Result<f64, LiteralError> {
        let start = self.offset();
        let start_pos = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '.' || c == '_')
            || (matches!(self.peek(), Some('-' | '+'))
                && matches!(self.chars.get(self.pos.wrapping_sub(1)), Some(&(_, 'e' | 'E'))))
        {
            self.bump();
        }
        let raw: String = self.chars[start_pos..self.pos].iter().map(|&(_, c)| c).collect();
        let digits = raw.strip_prefix('+').unwrap_or(&raw);
        match digits.parse::<f64>() {
            Ok(n) if n.is_finite() && !digits.contains("inf") && !digits.contains("nan") => Ok(n),
            _ => Err(LiteralError {
                message: format!("invalid number literal '{}'", raw),
                offset: start,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> ArgValue {
        ArgValue::String(v.to_string())
    }

    #[test]
    fn empty_list() {
        assert!(parse_literal_list("").unwrap().is_empty());
        assert!(parse_literal_list("   ").unwrap().is_empty());
    }

    #[test]
    fn strings_in_both_quote_styles() {
        assert_eq!(parse_literal_list("'string'").unwrap(), vec![s("string")]);
        assert_eq!(parse_literal_list("\"string\"").unwrap(), vec![s("string")]);
        assert_eq!(
            parse_literal_list(r#""\"string\"""#).unwrap(),
            vec![s("\"string\"")]
        );
        assert_eq!(parse_literal_list("', )'").unwrap(), vec![s(", )")]);
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_literal_list("1").unwrap(), vec![ArgValue::Number(1.0)]);
        assert_eq!(parse_literal_list("2.5").unwrap(), vec![ArgValue::Number(2.5)]);
        assert_eq!(parse_literal_list("-3").unwrap(), vec![ArgValue::Number(-3.0)]);
        assert_eq!(parse_literal_list("+.5").unwrap(), vec![ArgValue::Number(0.5)]);
        assert_eq!(parse_literal_list("1e3").unwrap(), vec![ArgValue::Number(1000.0)]);
        assert_eq!(parse_literal_list("2E-1").unwrap(), vec![ArgValue::Number(0.2)]);
    }

    #[test]
    fn mixed_list_with_trailing_comma() {
        assert_eq!(
            parse_literal_list("\"string\", 1, 30,").unwrap(),
            vec![s("string"), ArgValue::Number(1.0), ArgValue::Number(30.0)]
        );
    }

    #[test]
    fn escapes() {
        assert_eq!(parse_literal_list(r"'a\nb'").unwrap(), vec![s("a\nb")]);
        assert_eq!(parse_literal_list(r"'\u0041'").unwrap(), vec![s("A")]);
        assert_eq!(parse_literal_list(r"'it\'s'").unwrap(), vec![s("it's")]);
    }

    #[test]
    fn rejects_malformed_lists() {
        assert!(parse_literal_list("1,,2").is_err());
        assert!(parse_literal_list("bare").is_err());
        assert!(parse_literal_list("'open").is_err());
        assert!(parse_literal_list("1 2").is_err());
        assert!(parse_literal_list("1.2.3").is_err());
        assert!(parse_literal_list("inf").is_err());
        assert!(parse_literal_list("-").is_err());
    }
}
