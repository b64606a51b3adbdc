// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vein::Engine;
use vein_cli::commands::{self, render::RenderOptions};
use vein_cli::config;

#[derive(Parser)]
#[command(name = "vein")]
#[command(author = "Maravilla Labs")]
#[command(version)]
#[command(about = "Render, inspect and check templates compiled to Lua", long_about = None)]
struct Cli {
    /// Configuration file (default: vein.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Debug mode: detailed errors with source context
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template to stdout
    Render {
        /// Template name (or source text with --string)
        name: String,
        /// JSON file with render data
        #[arg(long)]
        data: Option<PathBuf>,
        /// Inline JSON render data
        #[arg(long)]
        json: Option<String>,
        /// Treat NAME as template source
        #[arg(long)]
        string: bool,
        /// Print collected metrics after the output
        #[arg(long)]
        metrics: bool,
    },
    /// Show tokens, metadata and generated Lua for a template
    Inspect {
        /// Template name
        name: String,
    },
    /// Compile every template under the views root
    Check {
        /// Glob relative to the views root
        #[arg(long, default_value = "**/*")]
        pattern: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with the specified log level
    let filter = EnvFilter::try_new(&cli.log_level)
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", console::style("error:").red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let engine_config = config::apply_overrides(config::load(cli.config.as_deref())?, cli.debug);
    let engine = Engine::new(engine_config)?;
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Render {
            name,
            data,
            json,
            string,
            metrics,
        } => {
            let options = RenderOptions {
                name,
                data,
                json,
                inline: string,
                metrics,
            };
            commands::render::run(&engine, &options, &mut stdout)?;
        }
        Commands::Inspect { name } => {
            commands::inspect::run(&engine, &name, &mut stdout)?;
        }
        Commands::Check { pattern } => {
            let report = commands::check::run(&engine, &pattern, &mut stdout)?;
            if !report.is_ok() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
