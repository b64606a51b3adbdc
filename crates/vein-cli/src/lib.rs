// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! Vein CLI library.
//!
//! This crate provides the command-line interface for the vein template
//! engine. Commands write to any [`std::io::Write`] so they can be driven
//! from tests as well as from the `vein` binary:
//!
//! ```bash
//! vein render pages/home --json '{"title": "Home"}'
//! vein inspect pages/home
//! vein check --pattern 'pages/**'
//! ```
//!
//! # Configuration
//!
//! Projects are configured via `vein.toml` at the project root.

/// CLI commands (render, inspect, check).
pub mod commands;
/// Project configuration from `vein.toml`.
pub mod config;
