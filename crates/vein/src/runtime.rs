// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The Lua host for compiled templates.
//!
//! One sandboxed Lua state is shared by every render of an engine. It holds
//! three long-lived tables (filters, helpers, globals) that are updated when
//! something is registered, plus a scope factory that layers render data
//! over them:
//!
//! ```text
//! data -> globals -> helpers -> Lua standard library
//! ```
//!
//! Values cross the boundary as `serde_json::Value`. JSON `null` becomes
//! `nil`, so a null key reads the same as a missing one.

use crate::error::{Result, VeinError};
use crate::extensions::register_json_module;
use crate::filters::FilterFn;
use crate::fragment::{Fragment, Part};
use crate::registry::HelperFn;
use mlua::{
    DeserializeOptions, Function, Lua, LuaSerdeExt, SerializeOptions, Table, Value as LuaValue,
    Variadic,
};
use serde_json::{Map, Value};
use tracing::trace;

const SCOPE_FACTORY: &str = r#"
local setmetatable, G = setmetatable, _G
return function(data, globals, helpers)
    return setmetatable({}, {
        __index = function(_, key)
            local v = data[key]
            if v ~= nil then return v end
            v = globals[key]
            if v ~= nil then return v end
            v = helpers[key]
            if v ~= nil then return v end
            return G[key]
        end,
    })
end
"#;

/// Converts JSON to a Lua value (`null` becomes `nil`).
pub(crate) fn to_lua(lua: &Lua, value: &Value) -> mlua::Result<LuaValue> {
    let options = SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false);
    lua.to_value_with(value, options)
}

/// Converts a Lua value to JSON.
///
/// Functions and userdata become `null` instead of failing.
pub(crate) fn from_lua(lua: &Lua, value: LuaValue) -> mlua::Result<Value> {
    let options = DeserializeOptions::new().deny_unsupported_types(false);
    lua.from_value_with(value, options)
}

/// Wraps an engine error so it survives the trip through Lua.
pub(crate) fn lua_error(err: VeinError) -> mlua::Error {
    mlua::Error::external(err)
}

/// Finds an engine error carried inside a Lua error chain.
pub(crate) fn find_vein_error(err: &mlua::Error) -> Option<&VeinError> {
    match err {
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<VeinError>(),
        mlua::Error::CallbackError { cause, .. } => find_vein_error(cause),
        mlua::Error::WithContext { cause, .. } => find_vein_error(cause),
        _ => None,
    }
}

/// Decodes the part list a fragment-mode render function returns.
pub(crate) fn fragment_from_lua(lua: &Lua, value: LuaValue) -> mlua::Result<Fragment> {
    let table = match value {
        LuaValue::Nil => return Ok(Fragment::new()),
        LuaValue::Table(table) => table,
        other => {
            let value: String = lua.unpack(other)?;
            return Ok(Fragment::from_parts(vec![Part::Raw { value }]));
        }
    };

    let mut parts = Vec::new();
    for part in table.sequence_values::<Table>() {
        let part = part?;
        let kind: String = part.get("kind")?;
        let value: Option<String> = part.get("value")?;
        let value = value.unwrap_or_default();
        let decoded = match kind.as_str() {
            "text" => Part::Text { value },
            "slot" => Part::Slot {
                name: part.get("name")?,
                default: value,
            },
            "component" => Part::Component {
                name: part.get("name")?,
                props: from_lua(lua, part.get("props")?)?,
            },
            _ => Part::Raw { value },
        };
        parts.push(decoded);
    }
    Ok(Fragment::from_parts(parts))
}

fn function_error(name: &str, err: VeinError) -> mlua::Error {
    match err {
        err @ VeinError::Function { .. } => lua_error(err),
        other => lua_error(VeinError::function(name, other.to_string())),
    }
}

/// The Lua state and the tables shared by all renders.
pub(crate) struct Runtime {
    lua: Lua,
    scope_factory: Function,
    filters: Table,
    helpers: Table,
    globals: Table,
}

impl Runtime {
    /// Creates a sandboxed Lua state seeded with `globals`.
    pub(crate) fn new(globals: &Map<String, Value>) -> Result<Self> {
        let lua = Lua::new();
        sandbox_lua(&lua)?;
        register_json_module(&lua)?;

        let scope_factory = lua
            .load(SCOPE_FACTORY)
            .set_name("=vein:scope")
            .eval::<Function>()?;

        let runtime = Self {
            filters: lua.create_table()?,
            helpers: lua.create_table()?,
            globals: lua.create_table()?,
            scope_factory,
            lua,
        };
        for (key, value) in globals {
            runtime.set_global(key, value)?;
        }
        Ok(runtime)
    }

    pub(crate) fn lua(&self) -> &Lua {
        &self.lua
    }

    /// The table compiled templates look filters up in.
    pub(crate) fn filters(&self) -> &Table {
        &self.filters
    }

    /// Installs or replaces a filter.
    pub(crate) fn set_filter(&self, name: &str, filter: FilterFn) -> Result<()> {
        let filter_name = name.to_string();
        let function = self.lua.create_function(
            move |lua, (value, args): (LuaValue, Variadic<LuaValue>)| {
                let value = from_lua(lua, value)?;
                let args = args
                    .into_iter()
                    .map(|arg| from_lua(lua, arg))
                    .collect::<mlua::Result<Vec<_>>>()?;
                let result = filter(&value, &args).map_err(|e| function_error(&filter_name, e))?;
                to_lua(lua, &result)
            },
        )?;
        self.filters.set(name, function)?;
        trace!("Installed filter '{}'", name);
        Ok(())
    }

    /// Installs or replaces a helper.
    pub(crate) fn set_helper(&self, name: &str, helper: HelperFn) -> Result<()> {
        let helper_name = name.to_string();
        let function = self.lua.create_function(move |lua, args: Variadic<LuaValue>| {
            let args = args
                .into_iter()
                .map(|arg| from_lua(lua, arg))
                .collect::<mlua::Result<Vec<_>>>()?;
            let result = helper(&args).map_err(|e| function_error(&helper_name, e))?;
            to_lua(lua, &result)
        })?;
        self.helpers.set(name, function)?;
        trace!("Installed helper '{}'", name);
        Ok(())
    }

    /// Sets a global value visible to every template.
    pub(crate) fn set_global(&self, key: &str, value: &Value) -> Result<()> {
        self.globals.set(key, to_lua(&self.lua, value)?)?;
        Ok(())
    }

    /// Builds the variable scope for one render of `data`.
    ///
    /// Non-object data contributes no variables.
    pub(crate) fn scope(&self, data: &Value) -> Result<Table> {
        let data = match data {
            Value::Object(_) => to_lua(&self.lua, data)?,
            _ => LuaValue::Table(self.lua.create_table()?),
        };
        let scope = self
            .scope_factory
            .call::<Table>((data, &self.globals, &self.helpers))?;
        Ok(scope)
    }
}

/// Removes the parts of the standard library templates must not reach.
///
/// Keeps `os.date`, `os.time`, `os.clock` and `os.difftime`; removes `io`,
/// `debug`, `package`, `require` and every dynamic code loader.
fn sandbox_lua(lua: &Lua) -> Result<()> {
    let globals = lua.globals();

    let os_table: Table = globals.get("os")?;
    let safe_os = lua.create_table()?;
    for name in ["date", "time", "clock", "difftime"] {
        let function: Function = os_table.get(name)?;
        safe_os.set(name, function)?;
    }

    for name in [
        "io", "debug", "package", "require", "load", "loadstring", "loadfile", "dofile",
    ] {
        globals.set(name, LuaValue::Nil)?;
    }
    globals.set("os", safe_os)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterRegistry;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_sandbox_removes_unsafe_globals() {
        let runtime = Runtime::new(&Map::new()).unwrap();
        let lua = runtime.lua();
        for name in ["io", "debug", "require", "load", "dofile"] {
            let value: LuaValue = lua.globals().get(name).unwrap();
            assert!(value.is_nil(), "{name} should be removed");
        }
        let has_time: bool = lua.load("return os.time ~= nil and os.execute == nil").eval().unwrap();
        assert!(has_time);
    }

    #[test]
    fn test_scope_lookup_order() {
        let mut globals = Map::new();
        globals.insert("site".to_string(), json!("Example"));
        globals.insert("name".to_string(), json!("global"));
        let runtime = Runtime::new(&globals).unwrap();
        let helper: HelperFn = Arc::new(|_: &[Value]| -> Result<Value> { Ok(json!("helped")) });
        runtime.set_helper("shout", helper).unwrap();

        let scope = runtime.scope(&json!({ "name": "data" })).unwrap();
        let name: String = scope.get("name").unwrap();
        let site: String = scope.get("site").unwrap();
        let shout: Function = scope.get("shout").unwrap();
        let tostring_fn: Function = scope.get("tostring").unwrap();

        assert_eq!(name, "data");
        assert_eq!(site, "Example");
        assert_eq!(shout.call::<String>(()).unwrap(), "helped");
        assert_eq!(tostring_fn.call::<String>(5).unwrap(), "5");
    }

    #[test]
    fn test_json_null_becomes_nil() {
        let runtime = Runtime::new(&Map::new()).unwrap();
        let scope = runtime.scope(&json!({ "missing": null })).unwrap();
        let value: LuaValue = scope.get("missing").unwrap();
        assert!(value.is_nil());
    }

    #[test]
    fn test_filter_round_trip() {
        let runtime = Runtime::new(&Map::new()).unwrap();
        let registry = FilterRegistry::with_builtins();
        runtime
            .set_filter("upper", registry.get("upper").unwrap().clone())
            .unwrap();
        let upper: Function = runtime.filters().get("upper").unwrap();
        assert_eq!(upper.call::<String>("abc").unwrap(), "ABC");
    }

    #[test]
    fn test_filter_errors_carry_engine_error() {
        let runtime = Runtime::new(&Map::new()).unwrap();
        let failing: FilterFn = Arc::new(|_: &Value, _: &[Value]| -> Result<Value> {
            Err(VeinError::Config("nope".to_string()))
        });
        runtime.set_filter("broken", failing).unwrap();

        let broken: Function = runtime.filters().get("broken").unwrap();
        let err = broken.call::<LuaValue>("x").unwrap_err();
        match find_vein_error(&err) {
            Some(VeinError::Function { name, message }) => {
                assert_eq!(name, "broken");
                assert!(message.contains("nope"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_fragment_from_lua() {
        let runtime = Runtime::new(&Map::new()).unwrap();
        let lua = runtime.lua();
        let parts: LuaValue = lua
            .load(
                r#"return {
                    { kind = "raw", value = "<p>" },
                    { kind = "text", value = "a & b" },
                    { kind = "slot", name = "footer", value = "none" },
                }"#,
            )
            .eval()
            .unwrap();

        let fragment = fragment_from_lua(lua, parts).unwrap();
        assert_eq!(fragment.len(), 3);
        assert_eq!(
            fragment.parts()[2],
            Part::Slot {
                name: "footer".to_string(),
                default: "none".to_string()
            }
        );
        assert_eq!(fragment.to_string(), "<p>a &amp; bnone");
    }
}
