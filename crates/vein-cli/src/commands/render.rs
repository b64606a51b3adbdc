// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Render command: writes a rendered template to the output.

use super::load_data;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use vein::Engine;

/// Options for `vein render`.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Template name, or inline source when `inline` is set.
    pub name: String,
    /// JSON file providing render data.
    pub data: Option<PathBuf>,
    /// Inline JSON render data, merged over `data`.
    pub json: Option<String>,
    /// Treat `name` as template source instead of a template name.
    pub inline: bool,
    /// Print a metrics export after the output.
    pub metrics: bool,
}

/// Runs the render command against `engine`, writing to `out`.
pub fn run(engine: &Engine, options: &RenderOptions, out: &mut impl Write) -> anyhow::Result<()> {
    let data = load_data(options.data.as_deref(), options.json.as_deref())?;
    if options.metrics {
        engine.metrics().enable();
    }

    let output = if options.inline {
        engine.render_string(&options.name, &data)?
    } else {
        info!("Rendering '{}'", options.name);
        engine.render(&options.name, &data)?
    };
    writeln!(out, "{output}")?;

    if options.metrics {
        let export = engine.export_metrics();
        writeln!(out, "{}", serde_json::to_string_pretty(&export)?)?;
    }
    Ok(())
}
