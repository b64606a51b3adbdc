// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! CLI command implementations.
//!
//! - `render`: Render a template or inline source to stdout
//! - `inspect`: Show tokens, compile metadata and generated Lua
//! - `check`: Compile every template under the views root

use anyhow::Context;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Template check command.
pub mod check;
/// Template inspection command.
pub mod inspect;
/// Render command.
pub mod render;

/// Reads render data from a JSON file and/or inline JSON text.
///
/// Inline keys override keys from the file. With neither, the data is an
/// empty object.
pub fn load_data(file: Option<&Path>, inline: Option<&str>) -> anyhow::Result<Value> {
    let mut data = serde_json::Map::new();

    if let Some(file) = file {
        let text = fs::read_to_string(file)
            .with_context(|| format!("failed to read data file {}", file.display()))?;
        merge_object(&mut data, parse_object(&text, &file.display().to_string())?);
    }
    if let Some(inline) = inline {
        merge_object(&mut data, parse_object(inline, "--json")?);
    }

    Ok(Value::Object(data))
}

fn parse_object(text: &str, origin: &str) -> anyhow::Result<serde_json::Map<String, Value>> {
    let value: Value =
        serde_json::from_str(text).with_context(|| format!("invalid JSON in {origin}"))?;
    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("render data in {origin} must be a JSON object, got {other}"),
    }
}

fn merge_object(target: &mut serde_json::Map<String, Value>, source: serde_json::Map<String, Value>) {
    target.extend(source);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_data_merges_inline_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.json");
        fs::write(&file, r#"{"title": "File", "user": "ada"}"#).unwrap();

        let data = load_data(Some(&file), Some(r#"{"title": "Inline"}"#)).unwrap();
        assert_eq!(data, json!({ "title": "Inline", "user": "ada" }));
    }

    #[test]
    fn test_load_data_defaults_to_empty_object() {
        assert_eq!(load_data(None, None).unwrap(), json!({}));
    }

    #[test]
    fn test_load_data_rejects_non_objects() {
        let err = load_data(None, Some("[1, 2]")).unwrap_err();
        assert!(err.to_string().contains("must be a JSON object"));
        assert!(load_data(None, Some("{oops")).is_err());
    }
}
