// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Lua code generation from template tokens.
//!
//! # Generated Code Structure
//!
//! Every template compiles to one Lua chunk returning a render function:
//!
//! ```lua
//! local __tostring, __type, ... = tostring, type, ...
//! return function(__ctx)
//!     local _ENV = __ctx.scope
//!     -- output helpers (__raw, __push, __pop, __filter, ...)
//!     -- template body
//!     if __ctx.extends ~= nil then return nil end
//!     return __finish()
//! end
//! ```
//!
//! `__ctx` is built by the engine for each render: `scope` (user data, then
//! globals, then helpers, then the Lua standard library), `filters`,
//! `blocks`, `slots` and the `include`, `partial` and `component` callbacks.
//!
//! # Directives
//!
//! Code tags are passed through verbatim except for `extends`, `block` /
//! `endblock`, `slot` / `endslot`, `component` / `endcomponent` and a few
//! ergonomic rewrites (`if x` gains `then`, `for x in list` iterates the
//! list, `endif` becomes `end`, ...).
//!
//! In fragment mode the output buffer holds typed parts instead of strings,
//! so escaping of expression output is deferred until serialization.

use crate::error::{Result, VeinError};
use crate::filter_parser::{mask_strings, parse_filter_expression, top_level_chars};
use crate::sourcemap::{SourceMap, SourcePosition};
use crate::tokenizer::{Token, TokenKind};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

lazy_static! {
    static ref DIRECTIVE: Regex = Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_-]*)(.*)$").unwrap();
    static ref BLOCK_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").unwrap();
    static ref THEN: Regex = Regex::new(r"\bthen\b").unwrap();
    static ref DO: Regex = Regex::new(r"\bdo\b").unwrap();
    static ref ELSE_IF: Regex = Regex::new(r"(?s)^else\s+if\b(.*)$").unwrap();
    static ref FOR_IN: Regex =
        Regex::new(r"(?s)^for\s+([A-Za-z_]\w*(?:\s*,\s*[A-Za-z_]\w*)*)\s+in\b(.*)$").unwrap();
}

const CLOSERS: &[&str] = &[
    "endif", "endfor", "endwhile", "end-if", "end-for", "end-while", "/if", "/for", "/while",
];

const CHUNK_HEADER: &str = r#"local __tostring, __type, __next, __pairs, __ipairs, __error = tostring, type, next, pairs, ipairs, error
local __concat = table.concat
return function(__ctx)"#;

const PRELUDE: &str = r#"local _ENV = __ctx.scope
local __filters, __blocks, __slots = __ctx.filters, __ctx.blocks, __ctx.slots
local __out, __stack, __cstack = {}, {}, {}
local function __str(v)
    if v == nil then return "" end
    return __tostring(v)
end
local function __filter(name)
    local f = __filters[name]
    if f == nil then __error("unknown filter '" .. name .. "'", 2) end
    return f
end
local function __push()
    __stack[#__stack + 1] = __out
    __out = {}
end
local function __pop()
    local parts = __out
    __out = __stack[#__stack]
    __stack[#__stack] = nil
    return parts
end
local function __each(t)
    if t == nil then return __next, {} end
    if __type(t) == "function" then return t end
    if __type(t) == "table" and (#t > 0 or __next(t) == nil) then return __ipairs(t) end
    return __pairs(t)
end"#;

const STRING_PRELUDE: &str = r#"local function __raw(v) __out[#__out + 1] = __str(v) end
local __splice = __raw
local function __join(parts) return __concat(parts) end
local function __slot(name, default) __raw(default) end
local function __finish() return __concat(__out) end"#;

const FRAGMENT_PRELUDE: &str = r#"local function __raw(v) __out[#__out + 1] = { kind = "raw", value = __str(v) } end
local function __text(v) __out[#__out + 1] = { kind = "text", value = __str(v) } end
local function __splice(v)
    if __type(v) == "table" then
        for _, part in __ipairs(v) do __out[#__out + 1] = part end
    else
        __raw(v)
    end
end
local function __join(parts)
    local escape, buf = __filter("escape"), {}
    for i, part in __ipairs(parts) do
        if part.kind == "text" then buf[i] = __str(escape(part.value)) else buf[i] = __str(part.value) end
    end
    return __concat(buf)
end
local function __slot(name, default) __out[#__out + 1] = { kind = "slot", name = name, value = default } end
local function __finish() return __out end"#;

/// Options controlling code generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Wrap `{{ }}` output in the `escape` filter.
    pub auto_escape: bool,
    /// Emit typed fragment parts instead of strings.
    pub fragments: bool,
    /// Record a Lua line to template position mapping.
    pub source_map: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            auto_escape: true,
            fragments: false,
            source_map: false,
        }
    }
}

/// The result of compiling a token list to Lua.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GeneratedCode {
    /// The Lua chunk source.
    pub lua: String,
    /// Line mapping, when requested.
    pub source_map: Option<SourceMap>,
    /// Every filter the template calls.
    pub filters_used: BTreeSet<String>,
    /// Literal layout name from an `extends` directive.
    pub extends: Option<String>,
    /// Literal names of included views and partials.
    pub includes: Vec<String>,
    /// Literal names of components used.
    pub components: Vec<String>,
    /// Names of the blocks the template defines, in order.
    pub blocks: Vec<String>,
}

/// Generates the Lua render chunk for a template.
///
/// # Examples
///
/// ```rust,ignore
/// let tokens = tokenize("Hello {{ name }}", &Delimiters::default())?;
/// let code = generate(&tokens, "hello", &CodegenOptions::default())?;
/// assert!(code.lua.contains("__filter(\"escape\")"));
/// ```
pub fn generate(tokens: &[Token], template_name: &str, options: &CodegenOptions) -> Result<GeneratedCode> {
    let mut generator = LuaCodeGenerator::new(template_name, *options);
    generator.generate(tokens)?;
    Ok(generator.finish())
}

/// A directive still waiting for its closing tag.
#[derive(Debug)]
enum Directive {
    Block { name: String, line: usize, column: usize },
    Slot { name: String, in_component: bool, line: usize, column: usize },
    Component { line: usize, column: usize },
}

impl Directive {
    fn describe(&self) -> String {
        match self {
            Directive::Block { name, .. } => format!("block '{name}'"),
            Directive::Slot { name, .. } => format!("slot '{name}'"),
            Directive::Component { .. } => "component".to_string(),
        }
    }

    fn position(&self) -> (usize, usize) {
        match self {
            Directive::Block { line, column, .. }
            | Directive::Slot { line, column, .. }
            | Directive::Component { line, column } => (*line, *column),
        }
    }
}

struct LuaCodeGenerator {
    template_name: String,
    options: CodegenOptions,
    output: String,
    indent_level: usize,
    /// Current output line number (1-indexed).
    current_line: usize,
    source_map: SourceMap,
    directives: Vec<Directive>,
    filters_used: BTreeSet<String>,
    extends: Option<String>,
    includes: Vec<String>,
    components: Vec<String>,
    blocks: Vec<String>,
}

impl LuaCodeGenerator {
    fn new(template_name: &str, options: CodegenOptions) -> Self {
        Self {
            template_name: template_name.to_string(),
            options,
            output: String::new(),
            indent_level: 0,
            current_line: 1,
            source_map: SourceMap::new(),
            directives: Vec::new(),
            filters_used: BTreeSet::new(),
            extends: None,
            includes: Vec::new(),
            components: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Writes one indented line. Continuation lines of embedded
    /// template code are written as-is so long strings keep their content.
    fn write_line(&mut self, line: &str) {
        let mut parts = line.split('\n');
        let first = parts.next().unwrap_or("");
        if !first.is_empty() {
            self.output.push_str(&"    ".repeat(self.indent_level));
            self.output.push_str(first);
        }
        self.output.push('\n');
        self.current_line += 1;
        for part in parts {
            self.write_continuation(part);
        }
    }

    fn write_continuation(&mut self, line: &str) {
        self.output.push_str(line);
        self.output.push('\n');
        self.current_line += 1;
    }

    fn write_lines(&mut self, block: &str) {
        for line in block.lines() {
            self.write_line(line);
        }
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn record(&mut self, line: usize, column: usize) {
        if self.options.source_map && line > 0 {
            self.source_map
                .record(self.current_line, SourcePosition { line, column });
        }
    }

    fn generate(&mut self, tokens: &[Token]) -> Result<()> {
        self.write_line(&format!("-- template: {}", self.template_name.replace('\n', " ")));
        self.write_lines(CHUNK_HEADER);
        self.indent();
        self.write_lines(PRELUDE);
        if self.options.fragments {
            self.write_lines(FRAGMENT_PRELUDE);
        } else {
            self.write_lines(STRING_PRELUDE);
        }

        for token in tokens {
            self.record(token.line, token.column);
            match token.kind {
                TokenKind::Text => {
                    let line = format!("__raw(\"{}\")", escape_lua_string(&token.value));
                    self.write_line(&line);
                }
                TokenKind::Output => self.generate_output(token, self.options.auto_escape)?,
                TokenKind::Raw => self.generate_output(token, false)?,
                TokenKind::Code => self.generate_code(token)?,
                TokenKind::Include => self.generate_include(token, "include", false),
                TokenKind::Partial => self.generate_include(token, "partial", true),
                TokenKind::Comment => {}
            }
        }

        if let Some(open) = self.directives.last() {
            let (line, column) = open.position();
            return Err(VeinError::InvalidDirective {
                message: format!("unclosed {} at end of template", open.describe()),
                line,
                column,
            });
        }

        self.write_line("if __ctx.extends ~= nil then return nil end");
        self.write_line("return __finish()");
        self.dedent();
        self.write_line("end");
        Ok(())
    }

    fn finish(self) -> GeneratedCode {
        GeneratedCode {
            lua: self.output,
            source_map: self.options.source_map.then_some(self.source_map),
            filters_used: self.filters_used,
            extends: self.extends,
            includes: self.includes,
            components: self.components,
            blocks: self.blocks,
        }
    }

    fn generate_output(&mut self, token: &Token, escape: bool) -> Result<()> {
        let expr = parse_filter_expression(&token.value).map_err(|e| e.at(token.line, token.column))?;

        let mut value = format!("({})", expr.base);
        for filter in &expr.filters {
            self.filters_used.insert(filter.name.clone());
            value = match &filter.args {
                Some(args) => format!("__filter(\"{}\")({}, {})", filter.name, value, args),
                None => format!("__filter(\"{}\")({})", filter.name, value),
            };
        }

        let line = if escape && self.options.fragments {
            format!("__text({value})")
        } else if escape {
            self.filters_used.insert("escape".to_string());
            format!("__raw(__filter(\"escape\")({value}))")
        } else {
            format!("__raw({value})")
        };
        self.write_line(&line);
        Ok(())
    }

    fn generate_code(&mut self, token: &Token) -> Result<()> {
        let content = token.value.as_str();
        if content.is_empty() {
            return Ok(());
        }

        if let Some(caps) = DIRECTIVE.captures(content) {
            let keyword = caps.get(1).map_or("", |m| m.as_str());
            let rest = caps.get(2).map_or("", |m| m.as_str());
            if is_directive_rest(rest) && self.generate_directive(token, keyword, rest.trim())? {
                return Ok(());
            }
        }

        let rewritten = rewrite_control(content);
        let mut lines = rewritten.split('\n');
        self.write_line(lines.next().unwrap_or(""));
        for (offset, line) in lines.enumerate() {
            self.record(token.line + offset + 1, 1);
            self.write_continuation(line);
        }
        Ok(())
    }

    /// Expands a directive; returns `false` when the keyword is ordinary Lua.
    fn generate_directive(&mut self, token: &Token, keyword: &str, rest: &str) -> Result<bool> {
        let invalid = |message: String| VeinError::InvalidDirective {
            message,
            line: token.line,
            column: token.column,
        };

        match keyword {
            "extends" => {
                if rest.is_empty() {
                    return Err(invalid("extends requires a layout name".to_string()));
                }
                let target = match parse_quoted(rest) {
                    Some((name, tail)) if tail.trim().is_empty() => {
                        self.extends = Some(name.clone());
                        format!("\"{}\"", escape_lua_string(&name))
                    }
                    _ => rest.to_string(),
                };
                self.write_line(&format!("__ctx.extends = {target}"));
            }
            "block" => {
                let name = directive_name(rest).ok_or_else(|| {
                    invalid(format!("invalid block name `{rest}`"))
                })?;
                let key = escape_lua_string(&name);
                self.blocks.push(name.clone());
                self.write_line(&format!("if __blocks[\"{key}\"] ~= nil then"));
                self.indent();
                self.write_line(&format!("__raw(__blocks[\"{key}\"])"));
                self.dedent();
                self.write_line("else");
                self.indent();
                self.write_line("__push()");
                self.directives.push(Directive::Block {
                    name,
                    line: token.line,
                    column: token.column,
                });
            }
            "endblock" => match self.directives.pop() {
                Some(Directive::Block { name, .. }) => {
                    if let Some(given) = directive_name(rest) {
                        if given != name {
                            return Err(invalid(format!(
                                "endblock '{given}' does not match open block '{name}'"
                            )));
                        }
                    }
                    let key = escape_lua_string(&name);
                    self.write_line("local __block = __join(__pop())");
                    self.write_line(&format!("__blocks[\"{key}\"] = __block"));
                    self.write_line("__raw(__block)");
                    self.dedent();
                    self.write_line("end");
                }
                other => return Err(self.mismatch(token, "endblock", other)),
            },
            "slot" => {
                let name = directive_name(rest).ok_or_else(|| {
                    invalid(format!("invalid slot name `{rest}`"))
                })?;
                let in_component = matches!(self.directives.last(), Some(Directive::Component { .. }));
                let key = escape_lua_string(&name);
                if in_component {
                    self.write_line("do");
                    self.indent();
                    self.write_line("__push()");
                } else {
                    self.write_line(&format!("if __slots[\"{key}\"] ~= nil then"));
                    self.indent();
                    self.write_line(&format!("__splice(__slots[\"{key}\"])"));
                    self.dedent();
                    self.write_line("else");
                    self.indent();
                    self.write_line("__push()");
                }
                self.directives.push(Directive::Slot {
                    name,
                    in_component,
                    line: token.line,
                    column: token.column,
                });
            }
            "endslot" => match self.directives.pop() {
                Some(Directive::Slot { name, in_component, .. }) => {
                    let key = escape_lua_string(&name);
                    if in_component {
                        self.write_line(&format!(
                            "__cstack[#__cstack].slots[\"{key}\"] = __join(__pop())"
                        ));
                    } else {
                        self.write_line(&format!("__slot(\"{key}\", __join(__pop()))"));
                    }
                    self.dedent();
                    self.write_line("end");
                }
                other => return Err(self.mismatch(token, "endslot", other)),
            },
            "component" => {
                if rest.is_empty() {
                    return Err(invalid("component requires a name".to_string()));
                }
                let (name, props) = split_target(rest);
                if let Some(literal) = &name.literal {
                    self.components.push(literal.clone());
                }
                let props = if props.is_empty() { "{}".to_string() } else { props };
                self.write_line(&format!(
                    "__cstack[#__cstack + 1] = {{ name = {}, props = ({}) or {{}}, slots = {{}} }}",
                    name.lua, props
                ));
                self.write_line("__push()");
                self.directives.push(Directive::Component {
                    line: token.line,
                    column: token.column,
                });
            }
            "endcomponent" => match self.directives.pop() {
                Some(Directive::Component { .. }) => {
                    self.write_line("do");
                    self.indent();
                    self.write_line("local __c = __cstack[#__cstack]");
                    self.write_line("__cstack[#__cstack] = nil");
                    self.write_line("__c.slots[\"default\"] = __join(__pop())");
                    self.write_line("__splice(__ctx.component(__c.name, __c.props, __c.slots))");
                    self.dedent();
                    self.write_line("end");
                }
                other => return Err(self.mismatch(token, "endcomponent", other)),
            },
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn mismatch(&self, token: &Token, closer: &str, open: Option<Directive>) -> VeinError {
        let message = match open {
            Some(open) => format!("{closer} cannot close {}", open.describe()),
            None => format!("{closer} without a matching opening directive"),
        };
        VeinError::InvalidDirective {
            message,
            line: token.line,
            column: token.column,
        }
    }

    fn generate_include(&mut self, token: &Token, callback: &str, allow_call_form: bool) {
        let mut content = strip_keyword(&token.value, callback);
        if allow_call_form && content.starts_with('(') && content.ends_with(')') {
            content = content[1..content.len() - 1].trim();
        }
        let (name, data) = split_target(content);
        if let Some(literal) = name.literal {
            self.includes.push(literal);
        }
        let data = if data.is_empty() { "nil".to_string() } else { data };
        self.write_line(&format!("__splice(__ctx.{callback}({}, {data}))", name.lua));
    }
}

/// A directive rest that is an assignment or call is plain Lua, not a directive.
fn is_directive_rest(rest: &str) -> bool {
    if rest.is_empty() {
        return true;
    }
    let starts_with_space = rest.starts_with(char::is_whitespace);
    let trimmed = rest.trim_start();
    if trimmed.starts_with("==") {
        return starts_with_space;
    }
    if trimmed.starts_with(['=', '(', '.', ':', '[']) {
        return false;
    }
    starts_with_space || rest.starts_with(['"', '\''])
}

fn strip_keyword<'a>(content: &'a str, keyword: &str) -> &'a str {
    if let Some(rest) = content.strip_prefix(keyword) {
        if rest.starts_with(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '(') {
            return rest.trim();
        }
    }
    content.trim()
}

/// A template name given either as a string literal or a Lua expression.
struct Target {
    lua: String,
    literal: Option<String>,
}

/// Splits `"name" data`, `"name", data` or `expr data` into name and data.
fn split_target(content: &str) -> (Target, String) {
    if let Some((name, tail)) = parse_quoted(content) {
        let data = tail.trim().trim_start_matches(',').trim().to_string();
        let lua = format!("\"{}\"", escape_lua_string(&name));
        return (Target { lua, literal: Some(name) }, data);
    }

    let top_level = top_level_chars(content);
    let split_at = top_level
        .iter()
        .find(|(_, ch)| *ch == ',')
        .or_else(|| top_level.iter().find(|(_, ch)| ch.is_whitespace()))
        .map_or(content.len(), |(i, _)| *i);
    let (name, tail) = content.split_at(split_at);
    let data = tail.trim().trim_start_matches(',').trim().to_string();
    (
        Target {
            lua: name.trim().to_string(),
            literal: None,
        },
        data,
    )
}

/// Parses a leading quoted string, returning its unescaped value and the rest.
fn parse_quoted(content: &str) -> Option<(String, &str)> {
    let quote = content.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let mut value = String::new();
    let mut escaped = false;
    for (i, ch) in content.char_indices().skip(1) {
        if escaped {
            value.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            return Some((value, &content[i + ch.len_utf8()..]));
        } else {
            value.push(ch);
        }
    }
    None
}

fn directive_name(rest: &str) -> Option<String> {
    if let Some((name, tail)) = parse_quoted(rest) {
        return (tail.trim().is_empty() && !name.is_empty()).then_some(name);
    }
    BLOCK_NAME.is_match(rest).then(|| rest.to_string())
}

/// Applies the closing-keyword, `then`/`do` and list-iteration rewrites.
fn rewrite_control(content: &str) -> String {
    if CLOSERS.contains(&content) {
        return "end".to_string();
    }

    if let Some(caps) = ELSE_IF.captures(content) {
        let condition = caps.get(1).map_or("", |m| m.as_str()).trim();
        return with_suffix(&format!("elseif {condition}"), &THEN, "then");
    }

    let keyword = content
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or("");
    match keyword {
        "if" | "elseif" => with_suffix(content, &THEN, "then"),
        "while" => with_suffix(content, &DO, "do"),
        "for" => match FOR_IN.captures(content) {
            Some(caps) => {
                let vars = caps.get(1).map_or("", |m| m.as_str());
                let rest = caps.get(2).map_or("", |m| m.as_str());
                rewrite_for_in(vars, rest)
            }
            None => with_suffix(content, &DO, "do"),
        },
        _ => content.to_string(),
    }
}

/// Routes a plain iterable through `__each`; iterator calls and explicit
/// `f, s, init` triples are left alone.
fn rewrite_for_in(vars: &str, rest: &str) -> String {
    let masked = mask_strings(rest);
    let (iterable, tail) = match DO.find(&masked) {
        Some(m) => (&rest[..m.start()], &rest[m.start()..]),
        None => (rest, "do"),
    };
    let iterable = iterable.trim();

    if !needs_iterator(iterable) {
        format!("for {vars} in {iterable} {tail}")
    } else if vars.contains(',') {
        format!("for {vars} in __each({iterable}) {tail}")
    } else {
        format!("for _, {vars} in __each({iterable}) {tail}")
    }
}

fn needs_iterator(iterable: &str) -> bool {
    if iterable.is_empty() || top_level_chars(iterable).iter().any(|(_, ch)| *ch == ',') {
        return false;
    }
    !is_call(iterable)
}

/// Whether `expr` ends in a call, as in `pairs(t)` or `obj:items()`.
fn is_call(expr: &str) -> bool {
    let masked = mask_strings(expr);
    if !masked.ends_with(')') {
        return false;
    }

    let mut depth: usize = 0;
    for (i, ch) in masked.char_indices().rev() {
        match ch {
            ')' | ']' | '}' => depth += 1,
            '(' | '[' | '{' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return masked[..i]
                        .trim_end()
                        .ends_with(|c: char| c.is_alphanumeric() || c == '_' || c == ')' || c == ']');
                }
            }
            _ => {}
        }
    }
    false
}

fn with_suffix(content: &str, present: &Regex, suffix: &str) -> String {
    if present.is_match(&mask_strings(content)) {
        content.to_string()
    } else {
        format!("{content} {suffix}")
    }
}

/// Escapes a string for use inside a double-quoted Lua string literal.
pub fn escape_lua_string(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\0' => escaped.push_str("\\000"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
