// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Project configuration.
//!
//! The CLI reads `vein.toml` from the current directory unless `--config`
//! names another file. Every key is optional:
//!
//! ```toml
//! views = "views"
//! extension = "vein"
//! cache_limit = 100
//! metrics = false
//!
//! [globals]
//! site = "Example"
//! ```

use std::path::{Path, PathBuf};
use tracing::debug;
use vein::EngineConfig;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "vein.toml";

/// Loads the engine configuration.
///
/// An explicit `path` must exist. Without one, a missing `vein.toml` yields
/// the default configuration.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(CONFIG_FILE), false),
    };

    if !explicit && !path.exists() {
        debug!("No {} found, using defaults", CONFIG_FILE);
        return Ok(EngineConfig::default());
    }

    let config = EngineConfig::load(&path)?;
    debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Applies command-line overrides on top of the file configuration.
pub fn apply_overrides(config: EngineConfig, debug: bool) -> EngineConfig {
    if debug {
        config.with_debug(true).with_source_map(true)
    } else {
        config
    }
}
