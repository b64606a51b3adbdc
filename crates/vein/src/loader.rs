// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template loading.
//!
//! This module provides the [`TemplateLoader`] trait and implementations
//! for locating template source text by name.
//!
//! # Loader Implementations
//!
//! - [`FileSystemLoader`]: Reads templates below the configured roots
//! - [`MemoryLoader`]: Serves templates from an in-memory map (tests, embedding)
//!
//! # Resolution Order
//!
//! For a name such as `layouts/main` requested as a [`TemplateKind::Layout`]:
//!
//! 1. Append the extension if the name has none (`layouts/main.vein`)
//! 2. Prefix the kind's root, then the views root (absolute names skip this)
//! 3. Normalize `\` to `/`
//! 4. Retry the extension-appended bare name, then the exact given name
//!
//! If every candidate fails, [`VeinError::TemplateNotFound`] lists them all.

use crate::config::EngineConfig;
use crate::error::{Result, VeinError};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What a template is being loaded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// A top-level view or an include.
    View,
    /// The target of an `extends` directive.
    Layout,
    /// The target of a partial tag.
    Partial,
    /// A component loaded from the components root.
    Component,
}

impl TemplateKind {
    /// Cache key for a template of this kind.
    ///
    /// Views are keyed by their bare name; other kinds are prefixed so the same
    /// name can be cached once per kind.
    pub fn cache_key(&self, name: &str) -> String {
        match self {
            TemplateKind::View => name.to_string(),
            TemplateKind::Layout => format!("layout:{name}"),
            TemplateKind::Partial => format!("partial:{name}"),
            TemplateKind::Component => format!("component:{name}"),
        }
    }

    fn default_dir(&self) -> Option<&'static str> {
        match self {
            TemplateKind::View => None,
            TemplateKind::Layout => Some("layouts"),
            TemplateKind::Partial => Some("partials"),
            TemplateKind::Component => Some("components"),
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TemplateKind::View => "view",
            TemplateKind::Layout => "layout",
            TemplateKind::Partial => "partial",
            TemplateKind::Component => "component",
        };
        f.write_str(name)
    }
}

/// Template source located by a loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTemplate {
    /// The name the template was requested by.
    pub name: String,
    /// Where the source was found (file path or map key).
    pub path: String,
    /// The template source text.
    pub source: String,
}

/// Trait for locating template sources.
///
/// Loaders are shared by every render of an engine and must be thread-safe.
pub trait TemplateLoader: Send + Sync + 'static {
    /// Loads the template `name` as `kind`.
    fn load(&self, name: &str, kind: TemplateKind) -> Result<LoadedTemplate>;
}

impl TemplateLoader for Box<dyn TemplateLoader> {
    fn load(&self, name: &str, kind: TemplateKind) -> Result<LoadedTemplate> {
        (**self).load(name, kind)
    }
}

/// Converts a path to a string with forward slashes.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Builds the ordered candidate list for a template name.
///
/// `roots` are tried in order; absolute names ignore them.
fn candidates(name: &str, extension: &str, roots: &[PathBuf]) -> Vec<String> {
    let with_ext = if Path::new(name).extension().is_some() {
        name.to_string()
    } else {
        format!("{name}{extension}")
    };

    let mut tried = Vec::new();
    let mut push = |candidate: String| {
        let candidate = normalize_path(&candidate);
        if !tried.contains(&candidate) {
            tried.push(candidate);
        }
    };

    if !Path::new(name).is_absolute() {
        for root in roots {
            if root.as_os_str().is_empty() {
                continue;
            }
            push(root.join(&with_ext).to_string_lossy().into_owned());
        }
    }
    push(with_ext);
    push(name.to_string());
    tried
}

/// Loads templates from the filesystem.
///
/// # Examples
///
/// ```rust,ignore
/// use vein::{FileSystemLoader, TemplateKind, TemplateLoader};
///
/// let loader = FileSystemLoader::new("./views");
/// let template = loader.load("users/show", TemplateKind::View)?;
/// ```
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    views: PathBuf,
    layouts: PathBuf,
    partials: PathBuf,
    components: PathBuf,
    extension: String,
}

impl FileSystemLoader {
    /// Creates a loader rooted at `views` with default sub-roots.
    pub fn new(views: impl Into<PathBuf>) -> Self {
        Self::from_config(&EngineConfig::default().with_views(views))
    }

    /// Creates a loader with the roots and extension of `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            views: config.views.clone(),
            layouts: config.sub_root(&config.layouts),
            partials: config.sub_root(&config.partials),
            components: config.sub_root(&config.components),
            extension: config.normalized_extension(),
        }
    }

    /// The views root.
    pub fn views(&self) -> &Path {
        &self.views
    }

    /// The extension appended to bare names.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn roots(&self, kind: TemplateKind) -> Vec<PathBuf> {
        match kind {
            TemplateKind::View => vec![self.views.clone()],
            TemplateKind::Layout => vec![self.layouts.clone(), self.views.clone()],
            TemplateKind::Partial => vec![self.partials.clone(), self.views.clone()],
            TemplateKind::Component => vec![self.components.clone(), self.views.clone()],
        }
    }

    /// Returns every path tried for `name`, in order.
    pub fn candidates(&self, name: &str, kind: TemplateKind) -> Vec<String> {
        candidates(name, &self.extension, &self.roots(kind))
    }
}

impl TemplateLoader for FileSystemLoader {
    fn load(&self, name: &str, kind: TemplateKind) -> Result<LoadedTemplate> {
        let tried = self.candidates(name, kind);
        for candidate in &tried {
            let path = Path::new(candidate);
            if !path.is_file() {
                continue;
            }
            match fs::read_to_string(path) {
                Ok(source) => {
                    debug!("Loaded {} '{}' from {}", kind, name, candidate);
                    return Ok(LoadedTemplate {
                        name: name.to_string(),
                        path: candidate.clone(),
                        source,
                    });
                }
                Err(e) => debug!("Cannot read '{}': {}", candidate, e),
            }
        }

        Err(VeinError::TemplateNotFound {
            name: name.to_string(),
            tried,
        })
    }
}

/// Serves templates from memory.
///
/// Keys are matched with the same candidate order as [`FileSystemLoader`],
/// using `layouts/`, `partials/` and `components/` as kind prefixes.
#[derive(Debug, Clone)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
    extension: String,
}

impl MemoryLoader {
    /// Creates an empty loader using the `.vein` extension.
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            extension: EngineConfig::default().normalized_extension(),
        }
    }

    /// Adds or replaces a template.
    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) -> &mut Self {
        self.templates.insert(normalize_path(&name.into()), source.into());
        self
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.add(name, source);
        self
    }

    /// Removes a template.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.templates.remove(name)
    }

    /// Returns every key tried for `name`, in order.
    pub fn candidates(&self, name: &str, kind: TemplateKind) -> Vec<String> {
        let roots: Vec<PathBuf> = kind.default_dir().map(PathBuf::from).into_iter().collect();
        candidates(name, &self.extension, &roots)
    }
}

impl Default for MemoryLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateLoader for MemoryLoader {
    fn load(&self, name: &str, kind: TemplateKind) -> Result<LoadedTemplate> {
        let tried = self.candidates(name, kind);
        for candidate in &tried {
            if let Some(source) = self.templates.get(candidate) {
                return Ok(LoadedTemplate {
                    name: name.to_string(),
                    path: candidate.clone(),
                    source: source.clone(),
                });
            }
        }
        Err(VeinError::TemplateNotFound {
            name: name.to_string(),
            tried,
        })
    }
}
