// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Check command: compiles every template under the views root.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::debug;
use vein::Engine;

/// A template that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    /// Template name relative to the views root.
    pub name: String,
    /// The compile error.
    pub message: String,
}

/// The outcome of a check run.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    /// Names of every template compiled, sorted.
    pub checked: Vec<String>,
    /// Templates that failed.
    pub failures: Vec<CheckFailure>,
}

impl CheckReport {
    /// Whether every template compiled.
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Finds the template names under `views` matching `pattern`.
///
/// The pattern is relative to `views` and matched against files carrying
/// `extension`; names come back without the extension and with `/`
/// separators.
pub fn discover(views: &Path, pattern: &str, extension: &str) -> anyhow::Result<Vec<String>> {
    let mut pattern = pattern.trim_end_matches(extension).to_string();
    if pattern.is_empty() || pattern.ends_with("**") {
        pattern = format!("{}/*", pattern.trim_end_matches('/'))
            .trim_start_matches('/')
            .to_string();
    }
    let full = format!("{}/{}{}", views.display(), pattern, extension);
    debug!("Discovering templates with {}", full);

    let mut names = Vec::new();
    for path in glob::glob(&full)?.flatten() {
        if !path.is_file() {
            continue;
        }
        let relative = path.strip_prefix(views)?.to_string_lossy().replace('\\', "/");
        let name = relative.strip_suffix(extension).unwrap_or(&relative);
        names.push(name.to_string());
    }
    names.sort();
    Ok(names)
}

/// Compiles every matching template, writing a summary to `out`.
pub fn run(engine: &Engine, pattern: &str, out: &mut impl Write) -> anyhow::Result<CheckReport> {
    let config = engine.config();
    let extension = config.normalized_extension();
    let names = discover(&config.views, pattern, &extension)?;

    if names.is_empty() {
        writeln!(out, "No templates found in {}", config.views.display())?;
        return Ok(CheckReport::default());
    }

    writeln!(
        out,
        "{} {} template(s) in {}",
        style("Checking").cyan(),
        names.len(),
        config.views.display()
    )?;

    let pb = ProgressBar::new(names.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} Compiling [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("━━╺"),
    );

    let start = Instant::now();
    let mut report = CheckReport::default();
    for name in names {
        pb.set_message(name.clone());
        if let Err(err) = engine.compile(&name) {
            report.failures.push(CheckFailure {
                name: name.clone(),
                message: err.to_string(),
            });
        }
        report.checked.push(name);
        pb.inc(1);
    }
    pb.finish_and_clear();

    for failure in &report.failures {
        writeln!(
            out,
            "  {} {}: {}",
            style("✗").red(),
            style(&failure.name).red(),
            failure.message
        )?;
    }

    let ms = start.elapsed().as_millis();
    if report.is_ok() {
        writeln!(
            out,
            "{} {} template(s) compiled {}",
            style("✓").green(),
            report.checked.len(),
            style(format!("({ms}ms)")).dim()
        )?;
    } else {
        writeln!(
            out,
            "{} {} of {} template(s) failed {}",
            style("✗").red(),
            report.failures.len(),
            report.checked.len(),
            style(format!("({ms}ms)")).dim()
        )?;
    }
    Ok(report)
}
