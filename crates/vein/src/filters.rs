// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Output filters.
//!
//! A filter is a named transform applied in `{{ value | name(args) }}`. Filters
//! are plain Rust closures over [`serde_json::Value`]; the runtime converts Lua
//! values on the way in and out.
//!
//! # Built-in Filters
//!
//! | Filter | Description |
//! |--------|-------------|
//! | `escape`, `e` | HTML-escape the value |
//! | `upper`, `lower`, `trim` | Case and whitespace |
//! | `capitalize`, `title` | Capitalize first letter / every word |
//! | `length` | Characters of a string, items of a list or map |
//! | `default(x)` | `x` when the value is nil or empty |
//! | `join(sep)` | Join list items |
//! | `truncate(n, suffix)` | Shorten to `n` characters |
//! | `replace(from, to)` | Substring replacement |
//! | `json` | JSON encoding |
//! | `reverse`, `first`, `last` | String and list access |
//! | `round(digits)`, `abs` | Numbers |
//! | `striptags` | Remove HTML tags |

use crate::error::{Result, VeinError};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref TAG: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
}

/// A filter function: `(value, extra args) -> value`.
pub type FilterFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value> + Send + Sync>;

/// Returns true if `name` is a valid Lua identifier.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Escapes `& < > " '` for HTML output.
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Renders a value the way output tags print it.
///
/// Nil prints as the empty string; lists and maps print as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Named filter functions available to templates.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, FilterFn>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}

impl FilterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in filter.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (name, filter) in builtins() {
            registry.filters.insert(name.to_string(), filter);
        }
        registry
    }

    /// Registers a filter, returning the one it replaced.
    ///
    /// Names must be identifiers so that `{{ x | name }}` can reference them.
    pub fn register(&mut self, name: &str, filter: FilterFn) -> Result<Option<FilterFn>> {
        if !is_identifier(name) {
            return Err(VeinError::Config(format!(
                "invalid filter name '{name}': expected an identifier"
            )));
        }
        Ok(self.filters.insert(name.to_string(), filter))
    }

    /// Looks up a filter.
    pub fn get(&self, name: &str) -> Option<&FilterFn> {
        self.filters.get(name)
    }

    /// Returns true if a filter is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Applies a named filter.
    pub fn apply(&self, name: &str, value: &Value, args: &[Value]) -> Result<Value> {
        let filter = self
            .filters
            .get(name)
            .ok_or_else(|| VeinError::function(name, "unknown filter"))?;
        filter(value, args)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Iterates over `(name, filter)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterFn)> {
        self.filters.iter().map(|(name, f)| (name.as_str(), f))
    }
}

fn filter<F>(f: F) -> FilterFn
where
    F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn string_filter(f: fn(&str) -> String) -> FilterFn {
    filter(move |value, _| Ok(Value::String(f(&display_value(value)))))
}

fn arg_str(args: &[Value], index: usize) -> Option<String> {
    args.get(index).filter(|v| !v.is_null()).map(display_value)
}

fn arg_usize(name: &str, args: &[Value], index: usize, default: usize) -> Result<usize> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_f64()
            .filter(|n| *n >= 0.0)
            .map(|n| n as usize)
            .ok_or_else(|| VeinError::function(name, format!("expected a non-negative number, got {v}"))),
    }
}

fn number(name: &str, value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| VeinError::function(name, "number out of range")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| VeinError::function(name, format!("'{s}' is not a number"))),
        other => Err(VeinError::function(name, format!("expected a number, got {other}"))),
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

fn builtins() -> Vec<(&'static str, FilterFn)> {
    let escape = string_filter(escape_html);
    vec![
        ("escape", escape.clone()),
        ("e", escape),
        ("upper", string_filter(|s| s.to_uppercase())),
        ("lower", string_filter(|s| s.to_lowercase())),
        ("trim", string_filter(|s| s.trim().to_string())),
        ("capitalize", string_filter(capitalize)),
        ("title", string_filter(title)),
        ("striptags", string_filter(|s| TAG.replace_all(s, "").into_owned())),
        (
            "length",
            filter(|value, _| {
                let len = match value {
                    Value::Null => 0,
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Object(map) => map.len(),
                    other => display_value(other).chars().count(),
                };
                Ok(Value::from(len))
            }),
        ),
        (
            "default",
            filter(|value, args| {
                let empty = match value {
                    Value::Null => true,
                    Value::String(s) => s.is_empty(),
                    _ => false,
                };
                if empty {
                    Ok(args.first().cloned().unwrap_or(Value::String(String::new())))
                } else {
                    Ok(value.clone())
                }
            }),
        ),
        (
            "join",
            filter(|value, args| {
                let separator = arg_str(args, 0).unwrap_or_default();
                Ok(Value::String(match value {
                    Value::Array(items) => items
                        .iter()
                        .map(display_value)
                        .collect::<Vec<_>>()
                        .join(&separator),
                    other => display_value(other),
                }))
            }),
        ),
        (
            "truncate",
            filter(|value, args| {
                let limit = arg_usize("truncate", args, 0, 255)?;
                let suffix = arg_str(args, 1).unwrap_or_else(|| "...".to_string());
                let text = display_value(value);
                if text.chars().count() <= limit {
                    return Ok(Value::String(text));
                }
                let mut truncated: String = text.chars().take(limit).collect();
                truncated.push_str(&suffix);
                Ok(Value::String(truncated))
            }),
        ),
        (
            "replace",
            filter(|value, args| {
                let from = arg_str(args, 0)
                    .ok_or_else(|| VeinError::function("replace", "missing search string"))?;
                let to = arg_str(args, 1).unwrap_or_default();
                let text = display_value(value);
                if from.is_empty() {
                    return Ok(Value::String(text));
                }
                Ok(Value::String(text.replace(&from, &to)))
            }),
        ),
        (
            "json",
            filter(|value, _| {
                serde_json::to_string(value)
                    .map(Value::String)
                    .map_err(|e| VeinError::function("json", e.to_string()))
            }),
        ),
        (
            "reverse",
            filter(|value, _| {
                Ok(match value {
                    Value::Array(items) => Value::Array(items.iter().rev().cloned().collect()),
                    other => Value::String(display_value(other).chars().rev().collect()),
                })
            }),
        ),
        (
            "first",
            filter(|value, _| {
                Ok(match value {
                    Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
                    Value::String(s) => s.chars().next().map(|c| Value::String(c.to_string())).unwrap_or(Value::Null),
                    _ => Value::Null,
                })
            }),
        ),
        (
            "last",
            filter(|value, _| {
                Ok(match value {
                    Value::Array(items) => items.last().cloned().unwrap_or(Value::Null),
                    Value::String(s) => s.chars().last().map(|c| Value::String(c.to_string())).unwrap_or(Value::Null),
                    _ => Value::Null,
                })
            }),
        ),
        (
            "round",
            filter(|value, args| {
                let n = number("round", value)?;
                let digits = arg_usize("round", args, 0, 0)?.min(15) as i32;
                let factor = 10f64.powi(digits);
                Ok(number_value((n * factor).round() / factor))
            }),
        ),
        (
            "abs",
            filter(|value, _| Ok(number_value(number("abs", value)?.abs()))),
        ),
    ]
}
