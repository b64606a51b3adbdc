// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Source maps from generated Lua lines back to template positions.
//!
//! The code generator records one mapping per token. When Lua reports an
//! error such as `users/show:17: attempt to index a nil value`, the engine
//! uses the map to point at the template line and column that produced
//! line 17 of the generated chunk.

use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// A 1-based position inside a template's source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourcePosition {
    /// Template line.
    pub line: usize,
    /// Template column.
    pub column: usize,
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Maps generated Lua line numbers to template positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceMap {
    mappings: BTreeMap<usize, SourcePosition>,
}

impl SourceMap {
    /// Creates an empty source map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `lua_line` was generated from `position`.
    ///
    /// The first mapping recorded for a line wins.
    pub fn record(&mut self, lua_line: usize, position: SourcePosition) {
        self.mappings.entry(lua_line).or_insert(position);
    }

    /// Finds the template position for a Lua line.
    ///
    /// If no exact match, returns the closest preceding mapping.
    pub fn lookup(&self, lua_line: usize) -> Option<SourcePosition> {
        self.mappings
            .range(..=lua_line)
            .next_back()
            .map(|(_, &position)| position)
    }

    /// Number of recorded mappings.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Returns true if no mappings are recorded.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Iterates mappings in Lua line order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, SourcePosition)> + '_ {
        self.mappings.iter().map(|(&line, &position)| (line, position))
    }

    /// Resolves the first `chunk:LINE:` reference in a Lua error message.
    pub fn resolve_error(&self, message: &str, chunk_name: &str) -> Option<SourcePosition> {
        let re = chunk_pattern(chunk_name)?;
        let caps = re.captures(message)?;
        let lua_line = caps[1].parse::<usize>().ok()?;
        self.lookup(lua_line)
    }

    /// Rewrites `chunk:LINE:` references to `chunk:line:column:` template positions.
    ///
    /// References to other chunks are left as they are.
    pub fn translate_error(&self, message: &str, chunk_name: &str) -> String {
        let Some(re) = chunk_pattern(chunk_name) else {
            return message.to_string();
        };

        let result: Cow<str> = re.replace_all(message, |caps: &regex::Captures| {
            if let Ok(lua_line) = caps[1].parse::<usize>() {
                if let Some(position) = self.lookup(lua_line) {
                    return format!("{}:{}:{}:", chunk_name, position.line, position.column);
                }
            }
            caps[0].to_string()
        });

        result.into_owned()
    }
}

fn chunk_pattern(chunk_name: &str) -> Option<Regex> {
    Regex::new(&format!(r"{}:(\d+):", regex::escape(chunk_name))).ok()
}
