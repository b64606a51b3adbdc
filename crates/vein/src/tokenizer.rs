// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template tokenizer.
//!
//! Splits raw template text into a flat, ordered list of [`Token`]s: text runs
//! and the six tag kinds. Comments are recognised and dropped here so they
//! never reach the code generator.
//!
//! # Tag Syntax (default delimiters)
//!
//! | Kind      | Syntax            |
//! |-----------|-------------------|
//! | Output    | `{{ expr }}`      |
//! | Raw       | `{! expr !}`      |
//! | Code      | `{% statement %}` |
//! | Comment   | `{# ... #}`       |
//! | Include   | `{@ "name" @}`    |
//! | Partial   | `{> "name" data >}` |
//!
//! When several opening delimiters start at the same offset the winner is
//! chosen by the fixed priority **Comment > Raw > Code > Include > Partial >
//! Output**.

use crate::error::{Result, VeinError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a template token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Literal text between tags.
    Text,
    /// Escaped expression output.
    Output,
    /// Unescaped expression output.
    Raw,
    /// Lua statement or directive.
    Code,
    /// Comment (never emitted by [`tokenize`]).
    Comment,
    /// Nested render of another view.
    Include,
    /// Nested render resolved under the partials root.
    Partial,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Text => "text",
            TokenKind::Output => "output",
            TokenKind::Raw => "raw",
            TokenKind::Code => "code",
            TokenKind::Comment => "comment",
            TokenKind::Include => "include",
            TokenKind::Partial => "partial",
        };
        f.write_str(name)
    }
}

/// A single token produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// Literal text for `Text`, trimmed interior content for tags.
    pub value: String,
    /// 1-based line of the token's first byte.
    pub line: usize,
    /// 1-based column of the token's first byte.
    pub column: usize,
}

/// Opening and closing delimiters for every tag kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delimiters {
    /// `{{ }}` by default.
    pub output: (String, String),
    /// `{! !}` by default.
    pub raw: (String, String),
    /// `{% %}` by default.
    pub code: (String, String),
    /// `{# #}` by default.
    pub comment: (String, String),
    /// `{@ @}` by default.
    pub include: (String, String),
    /// `{> >}` by default.
    pub partial: (String, String),
}

fn pair(open: &str, close: &str) -> (String, String) {
    (open.to_string(), close.to_string())
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            output: pair("{{", "}}"),
            raw: pair("{!", "!}"),
            code: pair("{%", "%}"),
            comment: pair("{#", "#}"),
            include: pair("{@", "@}"),
            partial: pair("{>", ">}"),
        }
    }
}

impl Delimiters {
    /// Returns every tag kind with its delimiters, highest tie-break priority first.
    pub fn by_priority(&self) -> [(TokenKind, &str, &str); 6] {
        [
            (TokenKind::Comment, &self.comment.0, &self.comment.1),
            (TokenKind::Raw, &self.raw.0, &self.raw.1),
            (TokenKind::Code, &self.code.0, &self.code.1),
            (TokenKind::Include, &self.include.0, &self.include.1),
            (TokenKind::Partial, &self.partial.0, &self.partial.1),
            (TokenKind::Output, &self.output.0, &self.output.1),
        ]
    }

    /// Rejects empty delimiters, which would never advance the scan.
    pub fn validate(&self) -> Result<()> {
        for (kind, open, close) in self.by_priority() {
            if open.is_empty() || close.is_empty() {
                return Err(VeinError::Config(format!(
                    "delimiters for {kind} tags must not be empty"
                )));
            }
        }
        Ok(())
    }
}

/// Tracks line and column while the scan moves forward through the source.
struct LineCursor<'a> {
    source: &'a str,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> LineCursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Advances to `offset` (never backwards) and returns its line/column.
    fn position(&mut self, offset: usize) -> (usize, usize) {
        if offset > self.offset {
            for ch in self.source[self.offset..offset].chars() {
                if ch == '\n' {
                    self.line += 1;
                    self.column = 1;
                } else {
                    self.column += 1;
                }
            }
            self.offset = offset;
        }
        (self.line, self.column)
    }
}

/// Splits `source` into tokens using the given delimiters.
pub fn tokenize(source: &str, delimiters: &Delimiters) -> Result<Vec<Token>> {
    let tags = delimiters.by_priority();
    let mut tokens = Vec::new();
    let mut cursor = LineCursor::new(source);

    // Next known occurrence of each opener; `usize::MAX` once exhausted.
    let mut next: [usize; 6] = [0; 6];
    for (slot, (_, open, _)) in next.iter_mut().zip(tags.iter()) {
        *slot = find_from(source, open, 0);
    }

    let mut pos = 0;
    while pos < source.len() {
        let mut best: Option<usize> = None;
        for i in 0..tags.len() {
            if next[i] < pos {
                next[i] = find_from(source, tags[i].1, pos);
            }
            if next[i] == usize::MAX {
                continue;
            }
            // Strict comparison keeps the higher-priority kind on ties.
            if best.map_or(true, |b| next[i] < next[b]) {
                best = Some(i);
            }
        }

        let Some(index) = best else {
            let (line, column) = cursor.position(pos);
            tokens.push(Token {
                kind: TokenKind::Text,
                value: source[pos..].to_string(),
                line,
                column,
            });
            break;
        };

        let (kind, open, close) = tags[index];
        let start = next[index];

        if start > pos {
            let (line, column) = cursor.position(pos);
            tokens.push(Token {
                kind: TokenKind::Text,
                value: source[pos..start].to_string(),
                line,
                column,
            });
        }

        let (line, column) = cursor.position(start);
        let content_start = start + open.len();
        let content_end = find_from(source, close, content_start);
        if content_end == usize::MAX {
            return Err(VeinError::UnclosedTag {
                kind,
                offset: start,
                line,
                column,
            });
        }

        if kind != TokenKind::Comment {
            tokens.push(Token {
                kind,
                value: source[content_start..content_end].trim().to_string(),
                line,
                column,
            });
        }

        pos = content_end + close.len();
    }

    Ok(tokens)
}

fn find_from(source: &str, needle: &str, from: usize) -> usize {
    if needle.is_empty() {
        return usize::MAX;
    }
    source[from..]
        .find(needle)
        .map(|offset| offset + from)
        .unwrap_or(usize::MAX)
}
