// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The template engine.
//!
//! [`Engine`] owns the configuration, the registries, the compiled-template
//! cache, the metrics collector and the Lua runtime, and exposes the public
//! render and compile API.
//!
//! # Render Flow
//!
//! 1. Look the template up in the cache, or load, tokenize, generate and
//!    compile it on a miss
//! 2. Build a fresh context and call the render function
//! 3. If the template set `extends`, render the layout with the same block
//!    map (bounded by `max_inheritance_depth`)
//! 4. Convert the result to a string or a [`Fragment`]
//!
//! Includes, partials and components re-enter the engine through callbacks
//! that only live for the duration of one render call.

use crate::cache::{content_hash, Cache, CompileMetadata, CompiledTemplate, MemoryCache, NoOpCache};
use crate::codegen::{generate, CodegenOptions, GeneratedCode};
use crate::config::EngineConfig;
use crate::context::{self, merge_data, RenderContext};
use crate::error::{Result, SourceContext, VeinError};
use crate::filters::{FilterFn, FilterRegistry};
use crate::fragment::Fragment;
use crate::loader::{FileSystemLoader, TemplateKind, TemplateLoader};
use crate::metrics::{MetricsCollector, MetricsExport};
use crate::registry::{Component, ComponentRegistry, HelperFn, HelperRegistry};
use crate::runtime::{find_vein_error, fragment_from_lua, from_lua, lua_error, Runtime};
use crate::tokenizer::tokenize;
use mlua::{Function, Table, Value as LuaValue};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Display name of templates compiled from strings.
pub const STRING_TEMPLATE_NAME: &str = "<string>";

/// Data keys kept per render record.
const DATA_KEY_SAMPLE: usize = 10;

/// The result of a render.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutput {
    /// Flat markup (the default).
    Html(String),
    /// Structured output, when `fragments` is enabled.
    Fragment(Fragment),
}

impl RenderOutput {
    /// Serializes the output to markup.
    pub fn into_string(self) -> String {
        match self {
            RenderOutput::Html(html) => html,
            RenderOutput::Fragment(fragment) => fragment.to_string(),
        }
    }

    /// Returns the fragment, if this is fragment output.
    pub fn as_fragment(&self) -> Option<&Fragment> {
        match self {
            RenderOutput::Html(_) => None,
            RenderOutput::Fragment(fragment) => Some(fragment),
        }
    }
}

impl fmt::Display for RenderOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderOutput::Html(html) => f.write_str(html),
            RenderOutput::Fragment(fragment) => write!(f, "{fragment}"),
        }
    }
}

/// Main Vein template engine.
///
/// The engine is generic over the template loader `L`, allowing different
/// loading strategies (filesystem, memory, ...).
///
/// # Examples
///
/// ```rust,ignore
/// use vein::{Engine, EngineConfig, MemoryLoader};
/// use serde_json::json;
///
/// let loader = MemoryLoader::new().with("hello", "<h1>Hello, {{ name }}!</h1>");
/// let engine = Engine::with_loader(EngineConfig::default(), loader)?;
///
/// let html = engine.render("hello", &json!({ "name": "World" }))?;
/// assert_eq!(html.to_string(), "<h1>Hello, World!</h1>");
/// ```
pub struct Engine<L: TemplateLoader = FileSystemLoader> {
    config: EngineConfig,
    loader: L,
    cache: Box<dyn Cache>,
    metrics: MetricsCollector,
    filters: FilterRegistry,
    helpers: HelperRegistry,
    components: ComponentRegistry,
    runtime: Runtime,
}

impl<L: TemplateLoader + fmt::Debug> fmt::Debug for Engine<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("loader", &self.loader)
            .field("cache", &self.cache)
            .field("filters", &self.filters)
            .field("helpers", &self.helpers)
            .field("components", &self.components)
            .finish_non_exhaustive()
    }
}

impl Engine<FileSystemLoader> {
    /// Creates an engine loading templates from the configured roots.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the Lua runtime
    /// fails to initialize.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let loader = FileSystemLoader::from_config(&config);
        Self::with_loader(config, loader)
    }
}

impl<L: TemplateLoader> Engine<L> {
    /// Creates an engine with a custom loader.
    pub fn with_loader(config: EngineConfig, loader: L) -> Result<Self> {
        config.validate()?;

        let runtime = Runtime::new(&config.globals)?;
        let filters = FilterRegistry::with_builtins();
        for (name, filter) in filters.iter() {
            runtime.set_filter(name, filter.clone())?;
        }

        let cache: Box<dyn Cache> = if config.cache {
            Box::new(MemoryCache::new(config.cache_limit))
        } else {
            Box::new(NoOpCache)
        };
        let metrics = MetricsCollector::new(config.metrics, config.metrics_history);

        debug!(
            "Engine created (views: {}, cache: {}, debug: {})",
            config.views.display(),
            config.cache,
            config.debug
        );

        Ok(Self {
            config,
            loader,
            cache,
            metrics,
            filters,
            helpers: HelperRegistry::default(),
            components: ComponentRegistry::default(),
            runtime,
        })
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The template loader.
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// The registered filters.
    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Registers a filter, replacing any filter of the same name.
    ///
    /// ```rust,ignore
    /// engine.filter("shout", |value, _args| {
    ///     Ok(json!(format!("{}!", vein::filters::display_value(value))))
    /// })?;
    /// ```
    pub fn filter<F>(&mut self, name: &str, filter: F) -> Result<()>
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let filter: FilterFn = Arc::new(filter);
        if self.filters.register(name, filter.clone())?.is_some() {
            debug!("Replaced filter '{}'", name);
        }
        self.runtime.set_filter(name, filter)
    }

    /// Registers a helper callable from any expression.
    pub fn helper<F>(&mut self, name: &str, helper: F) -> Result<()>
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let helper: HelperFn = Arc::new(helper);
        if self.helpers.register(name, helper.clone())?.is_some() {
            debug!("Replaced helper '{}'", name);
        }
        self.runtime.set_helper(name, helper)
    }

    /// Registers a component.
    pub fn component(&mut self, name: &str, component: Component) -> Result<()> {
        if self.components.register(name, component)?.is_some() {
            debug!("Replaced component '{}'", name);
        }
        self.cache.remove(&TemplateKind::Component.cache_key(name));
        Ok(())
    }

    /// Sets a global value. Render data overrides globals with the same key.
    pub fn global(&mut self, key: &str, value: Value) -> Result<()> {
        self.runtime.set_global(key, &value)?;
        self.config.globals.insert(key.to_string(), value);
        Ok(())
    }

    /// Renders the template `name`.
    ///
    /// # Errors
    ///
    /// Returns [`VeinError::TemplateNotFound`] if the template or a layout,
    /// include or component cannot be loaded, a syntax or compile error if
    /// any of them fails to compile, and [`VeinError::RenderError`] or
    /// [`VeinError::ExtendsCycle`] if execution fails.
    pub fn render<D: Serialize + ?Sized>(&self, name: &str, data: &D) -> Result<RenderOutput> {
        let data = to_data(name, data)?;
        trace!("Rendering '{}'", name);
        let template = self.load(name, TemplateKind::View)?;
        let context = RenderContext::new(self.runtime.lua())?;
        let output = self.render_template(template, &data, &context, 0, 0)?;
        self.output(output)
    }

    /// Renders template source text directly.
    ///
    /// The compiled template is cached under a hash of the source.
    pub fn render_string<D: Serialize + ?Sized>(&self, source: &str, data: &D) -> Result<RenderOutput> {
        let data = to_data(STRING_TEMPLATE_NAME, data)?;
        let template = self.compile_string(source)?;
        let context = RenderContext::new(self.runtime.lua())?;
        let output = self.render_template(template, &data, &context, 0, 0)?;
        self.output(output)
    }

    /// Compiles the template `name` (or returns the cached build).
    pub fn compile(&self, name: &str) -> Result<Arc<CompiledTemplate>> {
        self.load(name, TemplateKind::View)
    }

    /// Compiles template source text (or returns the cached build).
    pub fn compile_string(&self, source: &str) -> Result<Arc<CompiledTemplate>> {
        let key = format!("string:{}", content_hash(source));
        self.cached_or_compile(&key, || self.compile_template(STRING_TEMPLATE_NAME, source))
    }

    /// Removes every compiled template from the cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("Template cache cleared");
    }

    /// Returns true if the view `name` is cached.
    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains_key(&TemplateKind::View.cache_key(name))
    }

    /// The metrics collector.
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Exports all collected metrics.
    pub fn export_metrics(&self) -> MetricsExport {
        self.metrics.export()
    }

    /// Clears all collected metrics, keeping the enabled flag.
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn load(&self, name: &str, kind: TemplateKind) -> Result<Arc<CompiledTemplate>> {
        let key = kind.cache_key(name);
        self.cached_or_compile(&key, || {
            let loaded = self
                .loader
                .load(name, kind)
                .map_err(|err| self.recorded(name, err))?;
            self.compile_template(name, &loaded.source)
        })
    }

    fn cached_or_compile<F>(&self, key: &str, compile: F) -> Result<Arc<CompiledTemplate>>
    where
        F: FnOnce() -> Result<CompiledTemplate>,
    {
        if let Some(template) = self.cache.get(key) {
            self.metrics.record_cache_hit(key);
            trace!("Cache hit for '{}'", key);
            return Ok(template);
        }
        self.metrics.record_cache_miss(key);

        let template = Arc::new(compile()?);
        self.cache.set(key, template.clone());
        Ok(template)
    }

    fn compile_template(&self, name: &str, source: &str) -> Result<CompiledTemplate> {
        self.compile_source(name, source)
            .map_err(|err| self.recorded(name, err))
    }

    fn compile_source(&self, name: &str, source: &str) -> Result<CompiledTemplate> {
        let start = Instant::now();
        let tokens = tokenize(source, &self.config.delimiters)?;
        let options = CodegenOptions {
            auto_escape: self.config.auto_escape,
            fragments: self.config.fragments,
            source_map: self.config.source_map || self.config.debug,
        };
        let code = generate(&tokens, name, &options)?;

        let function = self
            .runtime
            .lua()
            .load(code.lua.as_str())
            .set_name(format!("@{name}"))
            .eval::<Function>()
            .map_err(|err| self.compile_error(name, &err, &code))?;

        let compile_time_ms = elapsed_ms(start);
        let line_count = source.lines().count();
        self.metrics
            .record_compile(name, compile_time_ms, tokens.len(), line_count);
        debug!(
            "Compiled '{}' in {:.2}ms ({} tokens)",
            name,
            compile_time_ms,
            tokens.len()
        );

        Ok(CompiledTemplate {
            name: name.to_string(),
            source: source.to_string(),
            function,
            hash: content_hash(source),
            metadata: CompileMetadata {
                source_map: code.source_map,
                filters_used: code.filters_used,
                line_count,
                token_count: tokens.len(),
                extends: code.extends,
                includes: code.includes,
                components: code.components,
                blocks: code.blocks,
                compile_time_ms,
            },
            lua_code: code.lua,
        })
    }

    /// Renders a compiled template, following `extends` to its layouts.
    fn render_template(
        &self,
        template: Arc<CompiledTemplate>,
        data: &Value,
        context: &RenderContext,
        inheritance_depth: usize,
        include_depth: usize,
    ) -> Result<LuaValue> {
        let start = Instant::now();
        let (output, extends) = self.execute(&template, data, context, include_depth)?;
        self.record_render(&template, data, start);

        let Some(layout) = extends else {
            return Ok(output);
        };

        let depth = inheritance_depth + 1;
        if depth > self.config.max_inheritance_depth {
            let err = VeinError::ExtendsCycle {
                template: layout,
                depth: self.config.max_inheritance_depth,
            };
            warn!("{}", err);
            return Err(self.recorded(&template.name, err));
        }

        trace!("'{}' extends '{}'", template.name, layout);
        let parent = self.load(&layout, TemplateKind::Layout)?;
        self.render_template(parent, data, context, depth, include_depth)
    }

    /// Runs one render function with the include, partial and component
    /// callbacks attached.
    fn execute(
        &self,
        template: &Arc<CompiledTemplate>,
        data: &Value,
        context: &RenderContext,
        include_depth: usize,
    ) -> Result<(LuaValue, Option<String>)> {
        let lua = self.runtime.lua();
        let ctx = context.build(&self.runtime, data)?;
        let engine = self;
        let parent = template.name.as_str();

        let result = lua.scope(|scope| {
            let include = scope.create_function(move |_, (name, extra): (String, Option<LuaValue>)| {
                engine
                    .include(parent, &name, TemplateKind::View, data, extra, include_depth)
                    .map_err(lua_error)
            })?;
            let partial = scope.create_function(move |_, (name, extra): (String, Option<LuaValue>)| {
                engine
                    .include(parent, &name, TemplateKind::Partial, data, extra, include_depth)
                    .map_err(lua_error)
            })?;
            let component = scope.create_function(
                move |_, (name, props, slots): (String, LuaValue, Table)| {
                    engine
                        .render_component(parent, &name, props, slots, include_depth)
                        .map_err(lua_error)
                },
            )?;
            ctx.set("include", include)?;
            ctx.set("partial", partial)?;
            ctx.set("component", component)?;

            let output = template.function.call::<LuaValue>(ctx.clone())?;
            let extends = context::extends(&ctx)?;
            Ok((output, extends))
        });

        result.map_err(|err| self.render_error(template, err))
    }

    fn include(
        &self,
        parent: &str,
        name: &str,
        kind: TemplateKind,
        caller_data: &Value,
        extra: Option<LuaValue>,
        include_depth: usize,
    ) -> Result<LuaValue> {
        let depth = self.nested_depth(name, include_depth)?;
        let extra = match extra {
            Some(extra) => from_lua(self.runtime.lua(), extra)?,
            None => Value::Null,
        };
        let data = merge_data(caller_data, extra);

        let start = Instant::now();
        let template = self.load(name, kind)?;
        let context = RenderContext::new(self.runtime.lua())?;
        let output = self.render_template(template, &data, &context, 0, depth)?;
        self.metrics.record_include(parent, name, elapsed_ms(start));
        Ok(output)
    }

    /// Dispatches a component: registered template, then registered
    /// function, then a template from the components root.
    fn render_component(
        &self,
        parent: &str,
        name: &str,
        props: LuaValue,
        slots: Table,
        include_depth: usize,
    ) -> Result<LuaValue> {
        let depth = self.nested_depth(name, include_depth)?;
        let lua = self.runtime.lua();

        let mut data = match from_lua(lua, props)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let slot_values = match from_lua(lua, LuaValue::Table(slots.clone()))? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let default_slot = slot_values
            .get("default")
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));
        data.insert("slot".to_string(), default_slot);
        data.insert("slots".to_string(), Value::Object(slot_values));
        let data = Value::Object(data);

        let start = Instant::now();
        let output = match self.components.get(name) {
            Some(Component::Function(render)) => {
                let html = render(&data).map_err(|err| match err {
                    err @ VeinError::Function { .. } => err,
                    other => VeinError::function(name, other.to_string()),
                })?;
                LuaValue::String(lua.create_string(&html)?)
            }
            Some(Component::Template(source)) => {
                let key = TemplateKind::Component.cache_key(name);
                let template = self.cached_or_compile(&key, || self.compile_template(name, source))?;
                let context = RenderContext::with_slots(lua, slots)?;
                self.render_template(template, &data, &context, 0, depth)?
            }
            None => {
                let template = self.load(name, TemplateKind::Component)?;
                let context = RenderContext::with_slots(lua, slots)?;
                self.render_template(template, &data, &context, 0, depth)?
            }
        };
        self.metrics.record_include(parent, name, elapsed_ms(start));
        Ok(output)
    }

    fn nested_depth(&self, name: &str, include_depth: usize) -> Result<usize> {
        let depth = include_depth + 1;
        if depth > self.config.max_include_depth {
            let err = VeinError::RenderError {
                template: name.to_string(),
                message: format!(
                    "include depth exceeded {} while rendering '{}'",
                    self.config.max_include_depth, name
                ),
                position: None,
                source_context: None,
            };
            warn!("{}", err);
            return Err(self.recorded(name, err));
        }
        Ok(depth)
    }

    fn output(&self, value: LuaValue) -> Result<RenderOutput> {
        let lua = self.runtime.lua();
        if self.config.fragments {
            return Ok(RenderOutput::Fragment(fragment_from_lua(lua, value)?));
        }
        match value {
            LuaValue::Nil => Ok(RenderOutput::Html(String::new())),
            other => Ok(RenderOutput::Html(lua.unpack::<String>(other)?)),
        }
    }

    fn record_render(&self, template: &CompiledTemplate, data: &Value, start: Instant) {
        if !self.metrics.is_enabled() {
            return;
        }
        let mut keys: Vec<String> = data
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys.truncate(DATA_KEY_SAMPLE);

        self.metrics
            .record_render(&template.name, elapsed_ms(start), &keys);
        for filter in &template.metadata.filters_used {
            self.metrics.record_filter_usage(filter);
        }
    }

    /// Records an error against `name` and hands it back.
    fn recorded(&self, name: &str, err: VeinError) -> VeinError {
        self.metrics.record_error(name, &err.to_string());
        err
    }

    fn compile_error(&self, name: &str, err: &mlua::Error, code: &GeneratedCode) -> VeinError {
        let message = err.to_string();
        let source_map = code.source_map.as_ref();
        let position = source_map.and_then(|map| map.resolve_error(&message, name));
        debug!("Lua rejected generated code for '{}': {}", name, message);

        if self.config.debug {
            let detail = source_map
                .map(|map| map.translate_error(&message, name))
                .unwrap_or(message);
            VeinError::CompileError {
                template: name.to_string(),
                message: format!("template compile error: {name}: {detail}"),
                position,
                generated: Some(code.lua.clone()),
            }
        } else {
            VeinError::CompileError {
                template: name.to_string(),
                message: format!("template compile error: {name}"),
                position,
                generated: None,
            }
        }
    }

    /// Converts a failed render call into an engine error.
    ///
    /// Errors raised by nested renders pass through unchanged; everything
    /// else becomes a [`VeinError::RenderError`] for `template`.
    fn render_error(&self, template: &CompiledTemplate, err: mlua::Error) -> VeinError {
        let detail = match find_vein_error(&err) {
            Some(function @ VeinError::Function { .. }) => function.to_string(),
            Some(nested) => return nested.clone(),
            None => first_line(&err.to_string()).to_string(),
        };

        let name = template.name.as_str();
        let full = err.to_string();
        let source_map = template.metadata.source_map.as_ref();
        let position = source_map.and_then(|map| map.resolve_error(&full, name));
        debug!("Render of '{}' failed: {}", name, detail);
        self.metrics.record_error(name, &detail);

        if self.config.debug {
            let detail = source_map
                .map(|map| map.translate_error(&detail, name))
                .unwrap_or(detail);
            VeinError::RenderError {
                template: name.to_string(),
                message: format!("template render error: {name}: {detail}"),
                position,
                source_context: position
                    .map(|p| SourceContext::from_source(&template.source, p.line, p.column)),
            }
        } else {
            VeinError::RenderError {
                template: name.to_string(),
                message: format!("template render error: {name}"),
                position,
                source_context: None,
            }
        }
    }
}

fn to_data<D: Serialize + ?Sized>(name: &str, data: &D) -> Result<Value> {
    serde_json::to_value(data).map_err(|err| VeinError::RenderError {
        template: name.to_string(),
        message: format!("invalid render data: {err}"),
        position: None,
        source_context: None,
    })
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or(message)
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
