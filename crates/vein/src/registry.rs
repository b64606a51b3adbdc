// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Helper and component registries.
//!
//! Helpers are callable from any expression (`{{ format_price(item.price) }}`).
//! Components are used through `{% component "name" props %} ... {% endcomponent %}`
//! and are either a template source string or a Rust function producing markup.

use crate::error::{Result, VeinError};
use crate::filters::is_identifier;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A helper function callable from template expressions.
pub type HelperFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// A component implemented in Rust.
///
/// Receives the props merged with `slot` (the rendered body) and `slots`
/// (every named slot, including `default`).
pub type ComponentFn = Arc<dyn Fn(&Value) -> Result<String> + Send + Sync>;

/// A registered component.
#[derive(Clone)]
pub enum Component {
    /// Template source rendered with the props as data.
    Template(String),
    /// Rust function returning markup.
    Function(ComponentFn),
}

impl Component {
    /// Wraps a closure as a function component.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<String> + Send + Sync + 'static,
    {
        Component::Function(Arc::new(f))
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Template(source) => f.debug_tuple("Template").field(source).finish(),
            Component::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Named helper functions.
#[derive(Clone, Default)]
pub struct HelperRegistry {
    helpers: HashMap<String, HelperFn>,
}

impl fmt::Debug for HelperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.helpers.keys().collect();
        names.sort();
        f.debug_struct("HelperRegistry").field("helpers", &names).finish()
    }
}

impl HelperRegistry {
    /// Registers a helper, returning the one it replaced.
    pub fn register(&mut self, name: &str, helper: HelperFn) -> Result<Option<HelperFn>> {
        if !is_identifier(name) {
            return Err(VeinError::Config(format!(
                "invalid helper name '{name}': expected an identifier"
            )));
        }
        Ok(self.helpers.insert(name.to_string(), helper))
    }

    /// Looks up a helper.
    pub fn get(&self, name: &str) -> Option<&HelperFn> {
        self.helpers.get(name)
    }

    /// Iterates over `(name, helper)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HelperFn)> {
        self.helpers.iter().map(|(name, h)| (name.as_str(), h))
    }

    /// Number of registered helpers.
    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    /// Returns true if no helpers are registered.
    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}

/// Named components.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: HashMap<String, Component>,
}

impl ComponentRegistry {
    /// Registers a component, returning the one it replaced.
    ///
    /// Names may contain path separators (`ui/button`) but no whitespace.
    pub fn register(&mut self, name: &str, component: Component) -> Result<Option<Component>> {
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(VeinError::Config(format!("invalid component name '{name}'")));
        }
        Ok(self.components.insert(name.to_string(), component))
    }

    /// Looks up a component.
    pub fn get(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    /// Returns true if a component is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }
}
