// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Per-render context.
//!
//! A render function receives one `__ctx` table built fresh for every
//! execution. Its engine-owned fields (`blocks`, `slots`) live in
//! [`RenderContext`] and survive a layout hop; the user-facing variable scope
//! is rebuilt from the caller's data each time so nothing a child template
//! assigns leaks into its layout.

use crate::error::Result;
use crate::runtime::Runtime;
use mlua::{Lua, Table};
use serde_json::Value;

/// Engine-owned render state shared along one layout chain.
pub(crate) struct RenderContext {
    blocks: Table,
    slots: Table,
}

impl RenderContext {
    pub(crate) fn new(lua: &Lua) -> mlua::Result<Self> {
        Ok(Self {
            blocks: lua.create_table()?,
            slots: lua.create_table()?,
        })
    }

    /// A context whose `slot` directives are filled from `slots`.
    pub(crate) fn with_slots(lua: &Lua, slots: Table) -> mlua::Result<Self> {
        Ok(Self {
            blocks: lua.create_table()?,
            slots,
        })
    }

    /// Builds the `__ctx` table for one execution against `data`.
    ///
    /// The `include`, `partial` and `component` callbacks are attached by
    /// the engine for the duration of the call.
    pub(crate) fn build(&self, runtime: &Runtime, data: &Value) -> Result<Table> {
        let ctx = runtime.lua().create_table()?;
        ctx.set("scope", runtime.scope(data)?)?;
        ctx.set("filters", runtime.filters().clone())?;
        ctx.set("blocks", self.blocks.clone())?;
        ctx.set("slots", self.slots.clone())?;
        Ok(ctx)
    }
}

/// Reads the layout a render function asked for.
pub(crate) fn extends(ctx: &Table) -> mlua::Result<Option<String>> {
    ctx.get("extends")
}

/// Merges explicit include data over the caller's data.
///
/// Non-object values on either side contribute nothing.
pub(crate) fn merge_data(base: &Value, extra: Value) -> Value {
    let mut merged = base.as_object().cloned().unwrap_or_default();
    if let Value::Object(extra) = extra {
        merged.extend(extra);
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn test_merge_data() {
        let base = json!({ "user": "ada", "title": "Home" });
        assert_eq!(
            merge_data(&base, json!({ "title": "Nav" })),
            json!({ "user": "ada", "title": "Nav" })
        );
        assert_eq!(merge_data(&base, Value::Null), base);
        assert_eq!(merge_data(&json!([1, 2]), json!(3)), json!({}));
    }

    #[test]
    fn test_build_context() {
        let runtime = Runtime::new(&Map::new()).unwrap();
        let context = RenderContext::new(runtime.lua()).unwrap();
        context.blocks.set("title", "Kept").unwrap();

        let ctx = context.build(&runtime, &json!({ "name": "vein" })).unwrap();
        let scope: Table = ctx.get("scope").unwrap();
        let blocks: Table = ctx.get("blocks").unwrap();
        assert_eq!(scope.get::<String>("name").unwrap(), "vein");
        assert_eq!(blocks.get::<String>("title").unwrap(), "Kept");
        assert_eq!(extends(&ctx).unwrap(), None);

        ctx.set("extends", "layouts/main").unwrap();
        assert_eq!(extends(&ctx).unwrap().as_deref(), Some("layouts/main"));
    }
}
