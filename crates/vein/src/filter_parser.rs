// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Filter-expression parsing for output tags.
//!
//! An output tag such as `{{ title | truncate(20) | upper }}` is split into a
//! base expression (`title`) and a left-to-right pipeline of filter calls.
//! A `|` only separates segments at nesting depth zero and outside string
//! literals, so `{{ a or b | default("x|y") }}` and `{{ f(a | b) }}` parse as
//! expected.

use crate::error::{Result, VeinError};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref FILTER_SEGMENT: Regex =
        Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_]*)\s*(?:\((.*)\))?$").unwrap();
}

/// A single filter invocation in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterCall {
    /// The registered filter name.
    pub name: String,
    /// Raw Lua argument text between the parentheses, if any.
    pub args: Option<String>,
}

/// A parsed output expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterExpression {
    /// The Lua expression producing the initial value.
    pub base: String,
    /// Filters applied in order to the base value.
    pub filters: Vec<FilterCall>,
}

/// Parses the content of an output or raw tag.
///
/// Errors carry no position; the caller attaches the tag's line/column.
pub fn parse_filter_expression(content: &str) -> Result<FilterExpression> {
    let mut segments = split_pipeline(content).into_iter();

    let base = segments.next().unwrap_or_default().trim().to_string();
    if base.is_empty() {
        return Err(invalid(content, "missing base expression"));
    }

    let mut filters = Vec::new();
    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(invalid(content, "empty filter segment"));
        }
        let Some(caps) = FILTER_SEGMENT.captures(segment) else {
            return Err(invalid(segment, "expected `name` or `name(args)`"));
        };
        filters.push(FilterCall {
            name: caps[1].to_string(),
            args: caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .filter(|a| !a.is_empty()),
        });
    }

    Ok(FilterExpression { base, filters })
}

fn invalid(segment: &str, message: &str) -> VeinError {
    VeinError::InvalidFilterSyntax {
        segment: segment.to_string(),
        message: message.to_string(),
        line: 0,
        column: 0,
    }
}

/// Splits on `|` at nesting depth zero and outside string literals.
fn split_pipeline(content: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    for (i, ch) in top_level_chars(content) {
        if ch == '|' {
            segments.push(&content[start..i]);
            start = i + 1;
        }
    }
    segments.push(&content[start..]);
    segments
}

/// Characters of a Lua fragment at nesting depth zero, with byte offsets.
///
/// Brackets are not reported and string literals come back masked as `#`.
pub(crate) fn top_level_chars(content: &str) -> Vec<(usize, char)> {
    let mut depth: usize = 0;
    let mut chars = Vec::new();
    for (i, ch) in mask_strings(content).char_indices() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 => chars.push((i, ch)),
            _ => {}
        }
    }
    chars
}

/// Overwrites every string literal (quoted or long-bracket) with `#` bytes.
///
/// Byte offsets are preserved, so positions found in the masked text index
/// the original. An unterminated literal is masked to the end.
pub(crate) fn mask_strings(content: &str) -> String {
    let bytes = content.as_bytes();
    let mut masked = bytes.to_vec();
    let mut i = 0;
    while i < bytes.len() {
        let end = match bytes[i] {
            b'"' | b'\'' => Some(quoted_end(bytes, i)),
            b'[' => long_bracket_end(bytes, i),
            _ => None,
        };
        match end {
            Some(end) => {
                masked[i..end].fill(b'#');
                i = end;
            }
            None => i += 1,
        }
    }
    String::from_utf8_lossy(&masked).into_owned()
}

fn quoted_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn long_bracket_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    let mut level = 0;
    while bytes.get(i) == Some(&b'=') {
        level += 1;
        i += 1;
    }
    if bytes.get(i) != Some(&b'[') {
        return None;
    }

    let mut j = i + 1;
    while j < bytes.len() {
        if bytes[j] == b']' {
            let mut k = j + 1;
            let mut closing = 0;
            while bytes.get(k) == Some(&b'=') {
                closing += 1;
                k += 1;
            }
            if closing == level && bytes.get(k) == Some(&b']') {
                return Some(k + 1);
            }
        }
        j += 1;
    }
    Some(bytes.len())
}
