// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Structured render output.
//!
//! With `fragments` enabled the engine returns a [`Fragment`]: a flat list of
//! typed parts instead of a string. Expression output is kept as
//! [`Part::Text`] and only escaped when the fragment is serialized, so the
//! same fragment can be written out with different escape functions.

use crate::filters::escape_html;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One piece of a [`Fragment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    /// Pre-escaped markup, emitted verbatim.
    Raw {
        /// The markup.
        value: String,
    },
    /// Text escaped at serialization time.
    Text {
        /// The unescaped text.
        value: String,
    },
    /// A slot placeholder, rendered as its default unless resolved.
    Slot {
        /// Slot name.
        name: String,
        /// Markup used when nothing fills the slot.
        default: String,
    },
    /// A component placeholder for a later renderer.
    Component {
        /// Component name.
        name: String,
        /// Props passed to the component.
        props: Value,
    },
}

/// Values that can be appended to a fragment with [`Fragment::add`].
pub trait IntoParts {
    /// Converts the value to the parts it contributes.
    fn into_parts(self) -> Vec<Part>;
}

impl IntoParts for &str {
    fn into_parts(self) -> Vec<Part> {
        vec![Part::Raw {
            value: self.to_string(),
        }]
    }
}

impl IntoParts for String {
    fn into_parts(self) -> Vec<Part> {
        vec![Part::Raw { value: self }]
    }
}

impl IntoParts for Part {
    fn into_parts(self) -> Vec<Part> {
        vec![self]
    }
}

impl IntoParts for Fragment {
    fn into_parts(self) -> Vec<Part> {
        self.parts
    }
}

/// Serialization hooks for [`Fragment::serialize`].
#[derive(Default)]
pub struct FragmentOptions<'a> {
    /// Escape function for text parts; HTML escaping when `None`.
    pub escape: Option<&'a dyn Fn(&str) -> String>,
    /// Renders component placeholders; they produce nothing when `None`.
    pub component: Option<&'a dyn Fn(&str, &Value) -> String>,
}

/// A flat, ordered list of output parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fragment {
    parts: Vec<Part>,
}

impl Fragment {
    /// Creates an empty fragment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fragment from existing parts.
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    /// Appends a string as raw markup, or splices in another fragment's parts.
    pub fn add(&mut self, value: impl IntoParts) -> &mut Self {
        self.parts.extend(value.into_parts());
        self
    }

    /// Appends pre-escaped markup.
    pub fn raw(&mut self, html: impl Into<String>) -> &mut Self {
        self.parts.push(Part::Raw { value: html.into() });
        self
    }

    /// Appends text that is escaped on serialization.
    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        self.parts.push(Part::Text { value: text.into() });
        self
    }

    /// Appends a component placeholder.
    pub fn component(&mut self, name: impl Into<String>, props: Value) -> &mut Self {
        self.parts.push(Part::Component {
            name: name.into(),
            props,
        });
        self
    }

    /// Appends a slot placeholder with its default markup.
    pub fn slot(&mut self, name: impl Into<String>, default: impl Into<String>) -> &mut Self {
        self.parts.push(Part::Slot {
            name: name.into(),
            default: default.into(),
        });
        self
    }

    /// Serializes all parts in order.
    pub fn serialize(&self, options: &FragmentOptions<'_>) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Raw { value } => out.push_str(value),
                Part::Text { value } => match options.escape {
                    Some(escape) => out.push_str(&escape(value)),
                    None => out.push_str(&escape_html(value)),
                },
                Part::Slot { default, .. } => out.push_str(default),
                Part::Component { name, props } => {
                    if let Some(render) = options.component {
                        out.push_str(&render(name, props));
                    }
                }
            }
        }
        out
    }

    /// Returns a new fragment with `f` applied to every part.
    pub fn map(&self, f: impl FnMut(&Part) -> Part) -> Fragment {
        Fragment {
            parts: self.parts.iter().map(f).collect(),
        }
    }

    /// Returns a new fragment with only the parts matching `predicate`.
    pub fn filter(&self, mut predicate: impl FnMut(&Part) -> bool) -> Fragment {
        Fragment {
            parts: self.parts.iter().filter(|p| predicate(p)).cloned().collect(),
        }
    }

    /// Returns the first part matching `predicate`.
    pub fn find(&self, mut predicate: impl FnMut(&Part) -> bool) -> Option<&Part> {
        self.parts.iter().find(|p| predicate(p))
    }

    /// The parts in order.
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Consumes the fragment, returning its parts.
    pub fn into_parts(self) -> Vec<Part> {
        self.parts
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns true if the fragment has no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize(&FragmentOptions::default()))
    }
}
