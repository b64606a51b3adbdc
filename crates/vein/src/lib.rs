// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

// The VeinError enum carries source snippets and generated code for debugging.
#![allow(clippy::result_large_err)]

//! # Vein
//!
//! A template engine for Rust that compiles templates to Lua.
//!
//! Templates mix markup with tags; expressions and control flow are plain
//! Lua, so there is no separate expression language to learn.
//!
//! ## Syntax
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `{{ expr \| filter }}` | Escaped output |
//! | `{! expr !}` | Raw output |
//! | `{% code %}` | Lua statement or directive |
//! | `{# ... #}` | Comment (stripped) |
//! | `{@ include "name" data @}` | Include a view |
//! | `{> partial "name" data >}` | Include a partial |
//!
//! Directives: `extends "layout"`, `block name` ... `endblock`,
//! `slot name` ... `endslot`, `component "name" props` ... `endcomponent`.
//!
//! ## Features
//!
//! - Layout inheritance with overridable blocks
//! - Filters, helpers, globals and components registered from Rust
//! - Bounded LRU cache of compiled templates
//! - Optional metrics, source maps and structured [`Fragment`] output
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vein::{Engine, EngineConfig};
//! use serde_json::json;
//!
//! let engine = Engine::new(EngineConfig::default().with_views("./views"))?;
//! let html = engine.render("hello", &json!({ "name": "World" }))?;
//! println!("{html}");
//! ```

/// Compiled template caching.
pub mod cache;
/// Lua code generation.
pub mod codegen;
/// Engine configuration.
pub mod config;
mod context;
/// Main template engine.
pub mod engine;
/// Error types and reporting.
pub mod error;
/// Lua runtime extensions.
pub mod extensions;
/// Output filter expression parsing.
pub mod filter_parser;
/// Filter registry and built-in filters.
pub mod filters;
/// Structured render output.
pub mod fragment;
/// Template loading (filesystem, memory).
pub mod loader;
/// Render and compile metrics.
pub mod metrics;
/// Helper and component registries.
pub mod registry;
mod runtime;
/// Source maps from generated Lua back to templates.
pub mod sourcemap;
/// Template tokenization.
pub mod tokenizer;

pub use cache::{content_hash, Cache, CompileMetadata, CompiledTemplate, MemoryCache, NoOpCache};
pub use codegen::{generate, CodegenOptions, GeneratedCode};
pub use config::EngineConfig;
pub use engine::{Engine, RenderOutput, STRING_TEMPLATE_NAME};
pub use error::{Result, SourceContext, VeinError};
pub use extensions::register_json_module;
pub use filter_parser::{parse_filter_expression, FilterCall, FilterExpression};
pub use filters::{FilterFn, FilterRegistry};
pub use fragment::{Fragment, FragmentOptions, IntoParts, Part};
pub use loader::{FileSystemLoader, LoadedTemplate, MemoryLoader, TemplateKind, TemplateLoader};
pub use metrics::{MetricsCollector, MetricsExport, MetricsSummary};
pub use registry::{Component, ComponentFn, HelperFn};
pub use sourcemap::{SourceMap, SourcePosition};
pub use tokenizer::{tokenize, Delimiters, Token, TokenKind};

#[cfg(test)]
mod tests;
