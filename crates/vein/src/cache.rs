// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Compiled template caching.
//!
//! Compiling a template means tokenizing, generating Lua and running the Lua
//! compiler, so the engine keeps compiled render functions keyed by template
//! name.
//!
//! # Cache Implementations
//!
//! - [`MemoryCache`]: Bounded, strict LRU cache (the default)
//! - [`NoOpCache`]: Stores nothing (used when caching is disabled)
//!
//! # Custom Caches
//!
//! Implement the [`Cache`] trait to plug in a different strategy.

use crate::sourcemap::SourceMap;
use lru::LruCache;
use mlua::Function;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Information gathered while compiling a template.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompileMetadata {
    /// Lua line to template position mapping, when enabled.
    pub source_map: Option<SourceMap>,
    /// Every filter the template calls.
    pub filters_used: BTreeSet<String>,
    /// Number of lines in the template source.
    pub line_count: usize,
    /// Number of tokens after tokenization.
    pub token_count: usize,
    /// Literal layout name from `extends`.
    pub extends: Option<String>,
    /// Literal names of included views and partials.
    pub includes: Vec<String>,
    /// Literal names of components used.
    pub components: Vec<String>,
    /// Blocks defined by the template.
    pub blocks: Vec<String>,
    /// Time spent compiling, in milliseconds.
    pub compile_time_ms: f64,
}

/// A compiled template ready to render.
#[derive(Clone)]
pub struct CompiledTemplate {
    /// The template name (or `<string>` for inline templates).
    pub name: String,
    /// The template source text.
    pub source: String,
    /// The Lua render function.
    pub function: Function,
    /// The generated Lua source.
    pub lua_code: String,
    /// Compile metadata.
    pub metadata: CompileMetadata,
    /// SHA-256 of the template source.
    pub hash: String,
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .field("hash", &self.hash)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Hex-encoded SHA-256 of a template source.
pub fn content_hash(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Trait for compiled template caches.
///
/// Implementations must be thread-safe; a race between two writers for the
/// same key may store either value but never corrupts the cache.
pub trait Cache: Send + Sync + fmt::Debug {
    /// Retrieves a template, marking it most recently used.
    fn get(&self, key: &str) -> Option<Arc<CompiledTemplate>>;
    /// Stores a template, evicting the least recently used entry when full.
    fn set(&self, key: &str, template: Arc<CompiledTemplate>);
    /// Removes a template.
    fn remove(&self, key: &str) -> Option<Arc<CompiledTemplate>>;
    /// Removes every template.
    fn clear(&self);
    /// Checks for a key without touching recency.
    fn contains_key(&self, key: &str) -> bool;
    /// Number of cached templates.
    fn len(&self) -> usize;
    /// Returns true if nothing is cached.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Cached keys, most recently used first.
    fn keys(&self) -> Vec<String>;
}

/// In-memory LRU (Least Recently Used) cache.
///
/// # Examples
///
/// ```rust,ignore
/// use vein::MemoryCache;
///
/// // Room for 100 compiled templates
/// let cache = MemoryCache::new(100);
/// ```
#[derive(Clone)]
pub struct MemoryCache {
    cache: Arc<Mutex<LruCache<String, Arc<CompiledTemplate>>>>,
}

impl MemoryCache {
    /// Creates a cache holding at most `capacity` templates (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Arc<CompiledTemplate>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.lock();
        f.debug_struct("MemoryCache")
            .field("len", &cache.len())
            .field("capacity", &cache.cap())
            .finish()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Arc<CompiledTemplate>> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, template: Arc<CompiledTemplate>) {
        self.lock().put(key.to_string(), template);
    }

    fn remove(&self, key: &str) -> Option<Arc<CompiledTemplate>> {
        self.lock().pop(key)
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn contains_key(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn keys(&self) -> Vec<String> {
        self.lock().iter().map(|(key, _)| key.clone()).collect()
    }
}

/// A cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCache;

impl Cache for NoOpCache {
    fn get(&self, _key: &str) -> Option<Arc<CompiledTemplate>> {
        None
    }

    fn set(&self, _key: &str, _template: Arc<CompiledTemplate>) {}

    fn remove(&self, _key: &str) -> Option<Arc<CompiledTemplate>> {
        None
    }

    fn clear(&self) {}

    fn contains_key(&self, _key: &str) -> bool {
        false
    }

    fn len(&self) -> usize {
        0
    }

    fn keys(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Lua;

    fn template(lua: &Lua, name: &str) -> Arc<CompiledTemplate> {
        let function = lua.create_function(|_, ()| Ok(())).unwrap();
        Arc::new(CompiledTemplate {
            name: name.to_string(),
            source: String::new(),
            function,
            lua_code: "return function() end".to_string(),
            metadata: CompileMetadata::default(),
            hash: content_hash(name),
        })
    }

    #[test]
    fn test_memory_cache() {
        let lua = Lua::new();
        let cache = MemoryCache::new(10);

        cache.set("home", template(&lua, "home"));
        let retrieved = cache.get("home").unwrap();
        assert_eq!(retrieved.name, "home");

        assert!(cache.contains_key("home"));
        assert!(!cache.contains_key("nonexistent"));

        assert!(cache.remove("home").is_some());
        assert!(cache.get("home").is_none());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let lua = Lua::new();
        let cache = MemoryCache::new(3);
        for name in ["a", "b", "c"] {
            cache.set(name, template(&lua, name));
        }

        // Touch "a" so "b" becomes the oldest.
        assert!(cache.get("a").is_some());
        cache.set("d", template(&lua, "d"));

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains_key("b"));
        assert_eq!(cache.keys(), vec!["d", "a", "c"]);
    }

    #[test]
    fn test_set_existing_key_keeps_size() {
        let lua = Lua::new();
        let cache = MemoryCache::new(2);
        cache.set("a", template(&lua, "a"));
        cache.set("b", template(&lua, "b"));
        cache.set("a", template(&lua, "a2"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().name, "a2");
        assert_eq!(cache.keys(), vec!["a", "b"]);
    }

    #[test]
    fn test_contains_key_does_not_promote() {
        let lua = Lua::new();
        let cache = MemoryCache::new(2);
        cache.set("a", template(&lua, "a"));
        cache.set("b", template(&lua, "b"));
        assert!(cache.contains_key("a"));
        cache.set("c", template(&lua, "c"));
        assert!(!cache.contains_key("a"));
    }

    #[test]
    fn test_clear() {
        let lua = Lua::new();
        let cache = MemoryCache::new(4);
        cache.set("a", template(&lua, "a"));
        cache.set("b", template(&lua, "b"));
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.contains_key("a"));
    }

    #[test]
    fn test_noop_cache_stores_nothing() {
        let lua = Lua::new();
        let cache = NoOpCache;
        cache.set("a", template(&lua, "a"));
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("world"));
        assert_eq!(content_hash("").len(), 64);
    }
}
