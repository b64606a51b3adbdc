// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! JSON module for template code.
//!
//! Provides `json.encode`, `json.decode` and `json.encode_pretty`, so code
//! blocks can serialize data (`{! json.encode(config) !}`) without a filter.

use crate::runtime::{from_lua, to_lua};
use mlua::{Lua, Result as LuaResult, Value};

/// Registers the `json` table as a global on the given Lua instance.
///
/// # Example
///
/// ```rust,ignore
/// use mlua::Lua;
/// use vein::extensions::register_json_module;
///
/// let lua = Lua::new();
/// register_json_module(&lua)?;
/// ```
pub fn register_json_module(lua: &Lua) -> LuaResult<()> {
    let json_module = lua.create_table()?;

    let encode = lua.create_function(|lua, value: Value| {
        let value = from_lua(lua, value)?;
        serde_json::to_string(&value)
            .map_err(|err| mlua::Error::external(format!("JSON encode error: {}", err)))
    })?;
    json_module.set("encode", encode)?;

    let encode_pretty = lua.create_function(|lua, value: Value| {
        let value = from_lua(lua, value)?;
        serde_json::to_string_pretty(&value)
            .map_err(|err| mlua::Error::external(format!("JSON encode error: {}", err)))
    })?;
    json_module.set("encode_pretty", encode_pretty)?;

    let decode = lua.create_function(|lua, json_str: String| {
        match serde_json::from_str::<serde_json::Value>(&json_str) {
            Ok(json_value) => to_lua(lua, &json_value),
            Err(err) => Err(mlua::Error::external(format!("JSON decode error: {}", err))),
        }
    })?;
    json_module.set("decode", decode)?;

    lua.globals().set("json", json_module)?;
    Ok(())
}
