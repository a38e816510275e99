use std::path::Path;

use indexmap::IndexMap;
use log::debug;
use serde_json::Value;

use crate::error::{BuildEventsError, Result};

/// Reads a logfmt-style file of `key=value` pairs to attach to every span.
///
/// Pairs may share a line or span several lines. Values may be double-quoted
/// to contain spaces, with `\"` and `\\` escapes inside the quotes. Lines starting with `#` are ignored.
///
/// # Errors
///
/// Returns an error if the file cannot be read or contains a malformed pair.
pub fn load_fields(path: &Path) -> Result<IndexMap<String, Value>> {
    let contents = std::fs::read_to_string(path)?;
    let fields = parse_logfmt(&contents)?;
    debug!("Loaded {} extra fields from {}", fields.len(), path.display());
    Ok(fields)
}

pub fn parse_logfmt(input: &str) -> Result<IndexMap<String, Value>> {
    let mut fields = IndexMap::new();

    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;
        let mut rest = line.trim_start();
        if rest.starts_with('#') {
            continue;
        }

        while !rest.is_empty() {
            let (key, after_key) = rest
                .split_once('=')
                .ok_or_else(|| malformed(line_number, format!("expected key=value in {rest:?}")))?;

            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(malformed(line_number, format!("invalid key {key:?}")));
            }

            let (value, after_value) = if let Some(quoted) = after_key.strip_prefix('"') {
                let (unescaped, after_quote) = unquote(quoted)
                    .ok_or_else(|| malformed(line_number, format!("unterminated quote for {key}")))?;
                (Value::from(unescaped), after_quote)
            } else {
                let end = after_key.find(char::is_whitespace).unwrap_or(after_key.len());
                (typed_value(&after_key[..end]), &after_key[end..])
            };

            fields.insert(key.to_string(), value);
            rest = after_value.trim_start();
        }
    }

    Ok(fields)
}

/// Reads a quoted value up to its closing quote, resolving `\"` and `\\`.
///
/// Returns the value and the input after the closing quote, or `None` if the
/// quote is never closed.
fn unquote(quoted: &str) -> Option<(String, &str)> {
    let mut value = String::new();
    let mut chars = quoted.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((value, &quoted[i + 1..])),
            '\\' => match chars.next()? {
                (_, escaped @ ('"' | '\\')) => value.push(escaped),
                (_, other) => {
                    value.push('\\');
                    value.push(other);
                }
            },
            _ => value.push(c),
        }
    }

    None
}

/// Unquoted values become numbers or booleans where they parse as such.
fn typed_value(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = raw.parse::<f64>() {
        if float.is_finite() {
            return Value::from(float);
        }
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::from(raw),
    }
}

fn malformed(line: usize, message: String) -> BuildEventsError {
    BuildEventsError::Fields { line, message }
}
