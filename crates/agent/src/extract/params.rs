//! Argument-list parsing for `TOOL_CALL: name(key=value, ...)`.
//!
//! The grammar is informal, so parsing is lenient: commas split pairs
//! except inside quotes or balanced `{}`/`[]`, and each value is coerced
//! with a fixed priority (JSON array, JSON object, integer, boolean,
//! string).

use serde_json::Value;
use std::fmt;
use toolmark_core::tool::ToolParameters;

/// Brackets in an argument list did not balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedNesting;

impl fmt::Display for MalformedNesting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unbalanced braces or brackets in tool arguments")
    }
}

impl std::error::Error for MalformedNesting {}

fn is_quote(c: char) -> bool {
    c == '"' || c == '\''
}

/// Split raw argument text into `key=value` segments.
///
/// An unterminated quote swallows the rest of the text into one segment.
/// Nesting that goes negative or does not return to zero is an error.
pub fn split_arguments(raw: &str) -> Result<Vec<String>, MalformedNesting> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut open_quote: Option<char> = None;
    let mut depth: i32 = 0;

    for c in raw.chars() {
        match (open_quote, c) {
            (None, q) if is_quote(q) => open_quote = Some(q),
            (Some(open), q) if q == open => open_quote = None,
            (Some(_), _) => {}
            (None, '{' | '[') => depth += 1,
            (None, '}' | ']') => {
                depth -= 1;
                if depth < 0 {
                    return Err(MalformedNesting);
                }
            }
            (None, ',') if depth == 0 => {
                let segment = current.trim();
                if !segment.is_empty() {
                    segments.push(segment.to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }

    if depth != 0 {
        return Err(MalformedNesting);
    }
    let segment = current.trim();
    if !segment.is_empty() {
        segments.push(segment.to_string());
    }
    Ok(segments)
}

/// Turn one raw value into its typed form.
///
/// Priority: JSON array, JSON object, all-digit integer, `true`/`false`
/// (any case), then the string itself. A bracketed value that is not
/// valid JSON stays a string. Digit runs too large for `i64` stay strings.
pub fn coerce_value(raw: &str) -> Value {
    let looks_like = |open: char, close: char| raw.starts_with(open) && raw.ends_with(close);

    if (looks_like('[', ']') || looks_like('{', '}'))
        && let Ok(decoded) = serde_json::from_str::<Value>(raw)
    {
        return decoded;
    }

    if !raw.is_empty()
        && raw.chars().all(|c| c.is_ascii_digit())
        && let Ok(n) = raw.parse::<i64>()
    {
        return Value::from(n);
    }

    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    Value::String(raw.to_string())
}

/// Parse a whole argument list into named parameters.
///
/// Segments without `=` and empty keys are ignored; a repeated key keeps
/// its last value. A `body` parameter becomes `data` unless `data` is
/// already present.
pub fn parse_parameters(raw: &str) -> Result<ToolParameters, MalformedNesting> {
    let mut parameters = ToolParameters::new();

    for segment in split_arguments(raw)? {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim().trim_matches(is_quote);
        parameters.insert(key.to_string(), coerce_value(value));
    }

    if !parameters.contains_key("data")
        && let Some(body) = parameters.shift_remove("body")
    {
        parameters.insert("data".to_string(), body);
    }

    Ok(parameters)
}
