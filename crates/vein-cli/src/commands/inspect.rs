// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Inspect command: shows how a template compiles.

use console::style;
use std::io::Write;
use vein::{tokenize, Engine};

/// Writes the token stream, compile metadata and generated Lua of `name`.
pub fn run(engine: &Engine, name: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let compiled = engine.compile(name)?;
    let tokens = tokenize(&compiled.source, &engine.config().delimiters)?;

    writeln!(out, "{} {}", style("Template:").cyan(), compiled.name)?;
    writeln!(out, "{} {}", style("Hash:").cyan(), compiled.hash)?;
    writeln!(out)?;

    writeln!(out, "{} ({})", style("Tokens").green().bold(), tokens.len())?;
    for token in &tokens {
        writeln!(
            out,
            "  {:>4}:{:<3} {:<8} {:?}",
            token.line,
            token.column,
            token.kind.to_string(),
            token.value
        )?;
    }
    writeln!(out)?;

    writeln!(out, "{}", style("Metadata").green().bold())?;
    writeln!(out, "{}", serde_json::to_string_pretty(&compiled.metadata)?)?;
    writeln!(out)?;

    writeln!(out, "{}", style("Generated Lua").green().bold())?;
    for (index, line) in compiled.lua_code.lines().enumerate() {
        writeln!(out, "{} {}", style(format!("{:>4}", index + 1)).dim(), line)?;
    }
    Ok(())
}
