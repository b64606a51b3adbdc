// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Engine configuration.
//!
//! [`EngineConfig`] can be built in code or loaded from TOML. Every key is
//! optional.
//!
//! # Example Configuration
//!
//! ```toml
//! views = "templates"
//! layouts = "layouts"        # relative to views
//! extension = ".vein"
//! cache_limit = 200
//! debug = true
//! metrics = true
//!
//! [globals]
//! site_name = "Example"
//!
//! [delimiters]
//! output = ["[[", "]]"]
//! ```

use crate::error::{Result, VeinError};
use crate::tokenizer::Delimiters;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Template root (default: "views").
    #[serde(default = "default_views")]
    pub views: PathBuf,
    /// Partials root, relative to `views` unless absolute (default: "partials").
    #[serde(default = "default_partials")]
    pub partials: PathBuf,
    /// Layouts root, relative to `views` unless absolute (default: "layouts").
    #[serde(default = "default_layouts")]
    pub layouts: PathBuf,
    /// Components root, relative to `views` unless absolute (default: "components").
    #[serde(default = "default_components")]
    pub components: PathBuf,
    /// Template file extension (default: ".vein").
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Cache compiled templates (default: true).
    #[serde(default = "default_true")]
    pub cache: bool,
    /// Maximum number of cached templates (default: 100).
    #[serde(default = "default_cache_limit")]
    pub cache_limit: usize,
    /// Expose generated code and template positions in errors (default: false).
    #[serde(default)]
    pub debug: bool,
    /// Escape `{{ }}` output (default: true).
    #[serde(default = "default_true")]
    pub auto_escape: bool,
    /// Record render metrics (default: false).
    #[serde(default)]
    pub metrics: bool,
    /// Render records kept per template (default: 100).
    #[serde(default = "default_metrics_history")]
    pub metrics_history: usize,
    /// Return fragments instead of strings (default: false).
    #[serde(default)]
    pub fragments: bool,
    /// Build source maps even outside debug mode (default: false).
    #[serde(default)]
    pub source_map: bool,
    /// Maximum layout chain length (default: 16).
    #[serde(default = "default_max_inheritance_depth")]
    pub max_inheritance_depth: usize,
    /// Maximum nesting of includes, partials and components (default: 32).
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,
    /// Data visible to every template, overridden by render data.
    #[serde(default)]
    pub globals: Map<String, Value>,
    /// Tag delimiters.
    #[serde(default)]
    pub delimiters: Delimiters,
}

fn default_views() -> PathBuf {
    PathBuf::from("views")
}

fn default_partials() -> PathBuf {
    PathBuf::from("partials")
}

fn default_layouts() -> PathBuf {
    PathBuf::from("layouts")
}

fn default_components() -> PathBuf {
    PathBuf::from("components")
}

fn default_extension() -> String {
    ".vein".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_limit() -> usize {
    100
}

fn default_metrics_history() -> usize {
    100
}

fn default_max_inheritance_depth() -> usize {
    16
}

fn default_max_include_depth() -> usize {
    32
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            views: default_views(),
            partials: default_partials(),
            layouts: default_layouts(),
            components: default_components(),
            extension: default_extension(),
            cache: true,
            cache_limit: default_cache_limit(),
            debug: false,
            auto_escape: true,
            metrics: false,
            metrics_history: default_metrics_history(),
            fragments: false,
            source_map: false,
            max_inheritance_depth: default_max_inheritance_depth(),
            max_include_depth: default_max_include_depth(),
            globals: Map::new(),
            delimiters: Delimiters::default(),
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| VeinError::Config(e.to_string()))
    }

    /// Loads configuration from a TOML file.
    ///
    /// Relative roots in the file are resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|e| VeinError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&source)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if config.views.is_relative() {
                config.views = dir.join(&config.views);
            }
        }
        Ok(config)
    }

    /// Checks values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.delimiters.validate()?;
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(VeinError::Config("extension must not be empty".to_string()));
        }
        if self.max_inheritance_depth == 0 {
            return Err(VeinError::Config(
                "max_inheritance_depth must be at least 1".to_string(),
            ));
        }
        if self.max_include_depth == 0 {
            return Err(VeinError::Config("max_include_depth must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The extension with a leading dot.
    pub fn normalized_extension(&self) -> String {
        if self.extension.starts_with('.') {
            self.extension.clone()
        } else {
            format!(".{}", self.extension)
        }
    }

    /// Resolves a sub-root against `views`.
    pub fn sub_root(&self, root: &Path) -> PathBuf {
        if root.is_absolute() {
            root.to_path_buf()
        } else {
            self.views.join(root)
        }
    }

    /// Sets the template root.
    pub fn with_views(mut self, views: impl Into<PathBuf>) -> Self {
        self.views = views.into();
        self
    }

    /// Sets the partials root.
    pub fn with_partials(mut self, partials: impl Into<PathBuf>) -> Self {
        self.partials = partials.into();
        self
    }

    /// Sets the layouts root.
    pub fn with_layouts(mut self, layouts: impl Into<PathBuf>) -> Self {
        self.layouts = layouts.into();
        self
    }

    /// Sets the components root.
    pub fn with_components(mut self, components: impl Into<PathBuf>) -> Self {
        self.components = components.into();
        self
    }

    /// Sets the template file extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Enables or disables the compiled-template cache.
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the cache capacity.
    pub fn with_cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = limit;
        self
    }

    /// Enables or disables debug mode.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Enables or disables automatic escaping.
    pub fn with_auto_escape(mut self, auto_escape: bool) -> Self {
        self.auto_escape = auto_escape;
        self
    }

    /// Enables or disables metrics.
    pub fn with_metrics(mut self, metrics: bool) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the per-template metrics history length.
    pub fn with_metrics_history(mut self, history: usize) -> Self {
        self.metrics_history = history;
        self
    }

    /// Enables or disables fragment output.
    pub fn with_fragments(mut self, fragments: bool) -> Self {
        self.fragments = fragments;
        self
    }

    /// Enables or disables source maps.
    pub fn with_source_map(mut self, source_map: bool) -> Self {
        self.source_map = source_map;
        self
    }

    /// Sets the maximum layout chain length.
    pub fn with_max_inheritance_depth(mut self, depth: usize) -> Self {
        self.max_inheritance_depth = depth;
        self
    }

    /// Sets the maximum include nesting.
    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    /// Adds a global value.
    pub fn with_global(mut self, key: impl Into<String>, value: Value) -> Self {
        self.globals.insert(key.into(), value);
        self
    }

    /// Replaces the tag delimiters.
    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }
}
