//! Literal parsing.
//!
//! Turns the source text of a literal token into a [`Value`]. Each literal
//! kind has its own small parser; the text is never evaluated as code.

use super::value::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LiteralError {
    #[error("empty literal")]
    Empty,

    #[error("invalid numeric literal '{0}'")]
    InvalidNumber(String),

    #[error("unterminated string literal {0}")]
    UnterminatedString(String),

    #[error("unknown escape sequence '\\{0}' in string literal")]
    InvalidEscape(char),

    #[error("unrecognized literal '{0}'")]
    Unrecognized(String),
}

/// Parse literal source text into a value.
///
/// Accepted forms:
/// - integers: `42`, `-7`, `+3`
/// - floats: `3.14`, `2.`, `1e9`, `-6.02E23`
/// - strings: `"hello\n"` (double quoted, backslash escapes)
/// - booleans: `true`, `false`, `True`, `False`
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    let text = text.trim();
    let first = text.chars().next().ok_or(LiteralError::Empty)?;

    match first {
        '"' => parse_string(text).map(Value::Str),
        '0'..='9' | '+' | '-' => parse_number(text),
        _ => match text {
            "true" | "True" => Ok(Value::Bool(true)),
            "false" | "False" => Ok(Value::Bool(false)),
            _ => Err(LiteralError::Unrecognized(text.to_string())),
        },
    }
}

fn parse_number(text: &str) -> Result<Value, LiteralError> {
    let invalid = || LiteralError::InvalidNumber(text.to_string());

    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(at) => (&unsigned[..at], Some(&unsigned[at + 1..])),
        None => (unsigned, None),
    };

    let (whole, fraction) = match mantissa.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (mantissa, None),
    };

    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if let Some(fraction) = fraction {
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
    }
    if let Some(exponent) = exponent {
        let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
    }

    if fraction.is_none() && exponent.is_none() {
        text.parse::<i64>().map(Value::Int).map_err(|_| invalid())
    } else {
        text.parse::<f64>().map(Value::Float).map_err(|_| invalid())
    }
}

fn parse_string(text: &str) -> Result<String, LiteralError> {
    let unterminated = || LiteralError::UnterminatedString(text.to_string());

    let inner = text
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(unterminated)?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().ok_or_else(unterminated)?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    '\\' => '\\',
                    '"' => '"',
                    '\'' => '\'',
                    other => return Err(LiteralError::InvalidEscape(other)),
                });
            }
            // a bare quote inside means the closing quote was not the last char
            '"' => return Err(unterminated()),
            other => out.push(other),
        }
    }

    Ok(out)
}
