// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for the Vein template engine.
//!
//! This module defines [`VeinError`], the single error enum returned by every
//! fallible operation, and [`SourceContext`] for rich, snippet-style messages.
//!
//! # Error Categories
//!
//! - **Syntax errors**: [`VeinError::UnclosedTag`], [`VeinError::InvalidFilterSyntax`],
//!   [`VeinError::InvalidDirective`]
//! - **Compile errors**: the Lua compiler rejected the generated source
//! - **Resolution errors**: [`VeinError::TemplateNotFound`]
//! - **Runtime errors**: [`VeinError::RenderError`], [`VeinError::ExtendsCycle`]
//!
//! Errors are `Clone` so an error raised deep inside a nested render (for
//! example a missing partial included from a layout) can be recovered from the
//! Lua callback chain and returned to the caller unchanged.

use crate::sourcemap::SourcePosition;
use crate::tokenizer::TokenKind;
use std::fmt;
use thiserror::Error;

/// Source context for enhanced error messages.
///
/// Captures a snippet of source code around an error location,
/// enabling rich error messages with line numbers and visual indicators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    /// All lines from the source file.
    pub lines: Vec<String>,
    /// The line number where the error occurred (1-indexed).
    pub error_line: usize,
    /// The column number where the error occurred (1-indexed).
    pub error_column: usize,
    /// First line number of the snippet (1-indexed).
    pub snippet_start: usize,
    /// Last line number of the snippet (1-indexed).
    pub snippet_end: usize,
}

impl SourceContext {
    /// Creates a source context from source code and error location.
    ///
    /// Captures 2 lines before and after the error line.
    pub fn from_source(source: &str, line: usize, column: usize) -> Self {
        let lines: Vec<String> = source.lines().map(|l| l.to_string()).collect();
        let snippet_start = line.saturating_sub(2).max(1);
        let snippet_end = (line + 2).min(lines.len());

        Self {
            lines,
            error_line: line,
            error_column: column,
            snippet_start,
            snippet_end,
        }
    }

    /// Formats the source snippet with line numbers and error indicator.
    ///
    /// ```text
    ///    4 | <ul>
    ///    5 |   {{ item | }}
    ///      |   ^
    ///    6 | </ul>
    /// ```
    pub fn format_snippet(&self) -> String {
        let mut result = String::new();

        for line_num in self.snippet_start..=self.snippet_end {
            let Some(line) = self.lines.get(line_num.wrapping_sub(1)) else {
                break;
            };

            result.push_str(&format!("{:4} | {}\n", line_num, line));

            if line_num == self.error_line {
                result.push_str(&format!(
                    "     | {}^\n",
                    " ".repeat(self.error_column.saturating_sub(1))
                ));
            }
        }

        result
    }
}

impl fmt::Display for SourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_snippet())
    }
}

/// The main error type for Vein operations.
#[derive(Error, Debug, Clone)]
pub enum VeinError {
    /// An opening delimiter had no matching closing delimiter.
    #[error("Unclosed {kind} tag at line {line}, column {column} (offset {offset})")]
    UnclosedTag {
        /// The kind of tag that was left open.
        kind: TokenKind,
        /// Byte offset of the opening delimiter.
        offset: usize,
        /// Line of the opening delimiter.
        line: usize,
        /// Column of the opening delimiter.
        column: usize,
    },

    /// A filter segment in an output tag is malformed.
    #[error("Invalid filter syntax `{segment}` at line {line}, column {column}: {message}")]
    InvalidFilterSyntax {
        /// The offending segment of the expression.
        segment: String,
        /// Why the segment was rejected.
        message: String,
        /// Line of the tag containing the segment.
        line: usize,
        /// Column of the tag containing the segment.
        column: usize,
    },

    /// A control directive is malformed or mismatched.
    #[error("Invalid directive at line {line}, column {column}: {message}")]
    InvalidDirective {
        /// Description of the problem.
        message: String,
        /// Line of the offending tag.
        line: usize,
        /// Column of the offending tag.
        column: usize,
    },

    /// The Lua compiler rejected the generated source.
    #[error("{message}")]
    CompileError {
        /// The template being compiled.
        template: String,
        /// Error message (generic outside debug mode).
        message: String,
        /// Template position of the failure, when a source map resolved it.
        position: Option<SourcePosition>,
        /// The generated Lua source (debug mode only).
        generated: Option<String>,
    },

    /// No loader candidate path produced a readable template.
    #[error("Template not found: {name} (tried: {})", tried.join(", "))]
    TemplateNotFound {
        /// The requested template name.
        name: String,
        /// Every path or key that was tried, in order.
        tried: Vec<String>,
    },

    /// Executing a compiled template failed.
    #[error("{message}")]
    RenderError {
        /// The template whose execution failed.
        template: String,
        /// Error message (generic outside debug mode).
        message: String,
        /// Template position of the failure, when a source map resolved it.
        position: Option<SourcePosition>,
        /// Snippet of the template around the failure (debug mode only).
        source_context: Option<SourceContext>,
    },

    /// The layout chain exceeded the configured inheritance depth.
    #[error("Layout inheritance deeper than {depth} levels while rendering '{template}' (extends cycle?)")]
    ExtendsCycle {
        /// The layout that would have exceeded the limit.
        template: String,
        /// The configured maximum depth.
        depth: usize,
    },

    /// A registered filter, helper or component function failed.
    #[error("{name}: {message}")]
    Function {
        /// Name of the filter, helper or component.
        name: String,
        /// Error message.
        message: String,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lua state error outside of template compilation or execution.
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),
}

impl VeinError {
    /// Creates a [`VeinError::Function`] error for a failing registered function.
    pub fn function(name: impl Into<String>, message: impl Into<String>) -> Self {
        VeinError::Function {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns the template line/column this error points at, if any.
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            VeinError::UnclosedTag { line, column, .. }
            | VeinError::InvalidFilterSyntax { line, column, .. }
            | VeinError::InvalidDirective { line, column, .. } => Some((*line, *column)),
            VeinError::CompileError { position, .. } | VeinError::RenderError { position, .. } => {
                position.map(|p| (p.line, p.column))
            }
            _ => None,
        }
    }

    /// Moves a positional syntax error to the given line and column.
    pub(crate) fn at(mut self, at_line: usize, at_column: usize) -> Self {
        if let VeinError::InvalidFilterSyntax { line, column, .. }
        | VeinError::InvalidDirective { line, column, .. } = &mut self
        {
            *line = at_line;
            *column = at_column;
        }
        self
    }
}

/// Convenience type alias for Results with [`VeinError`].
pub type Result<T> = std::result::Result<T, VeinError>;
