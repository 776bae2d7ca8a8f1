//! aexpy-inspect - runtime API inspector.
//!
//! Reads a Distribution as JSON on stdin, imports its top modules inside the
//! embedded interpreter and prints the transfer marker followed by the
//! entries as a JSON array on stdout. Logs go to stderr.

mod abcs;
mod processor;
mod signature;

use std::io::{Read, Write};

use aexpy_core::environment::major_minor;
use aexpy_core::models::{Distribution, TRANSFER_BEGIN};
use anyhow::{bail, Context};
use pyo3::prelude::*;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use processor::Processor;

fn setup_logging() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn log_platform(py: Python<'_>) {
    let platform = py.import_bound("platform").and_then(|p| {
        let describe: String = p.call_method0("platform")?.extract()?;
        let version: String = p.call_method0("python_version")?.extract()?;
        Ok(format!("{} Python {}", describe, version))
    });
    match platform {
        Ok(platform) => tracing::info!(%platform, "Platform"),
        Err(e) => tracing::warn!(error = %e, "Failed to describe platform"),
    }
}

/// Warn when the embedded interpreter is not the one the distribution targets.
fn check_version(py: Python<'_>, pyversion: &str) -> bool {
    let info = py.version_info();
    let running = (u32::from(info.major), u32::from(info.minor));
    match major_minor(pyversion) {
        Some(target) if target != running => {
            tracing::warn!(
                target = %pyversion,
                running = %format!("{}.{}", running.0, running.1),
                "Embedded interpreter differs from the distribution's Python version"
            );
            false
        }
        _ => true,
    }
}

fn main() -> anyhow::Result<()> {
    setup_logging();

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read distribution from stdin")?;
    let dist: Distribution = serde_json::from_str(&input).context("Invalid distribution JSON")?;
    if dist.top_modules.is_empty() {
        bail!("distribution {} declares no top modules", dist.release);
    }
    tracing::info!(release = %dist.release, modules = ?dist.top_modules, "Inspecting");

    let root = dist
        .root_path
        .as_ref()
        .and_then(|p| std::fs::canonicalize(p).ok());
    let entries = Python::with_gil(|py| -> anyhow::Result<_> {
        log_platform(py);
        check_version(py, &dist.pyversion);
        let mut processor = Processor::new(py, dist.top_modules.clone(), root)
            .map_err(|e| anyhow::anyhow!("failed to start inspector: {}", e))?;
        let imported = dist
            .top_modules
            .iter()
            .filter(|name| processor.process(name))
            .count();
        if imported == 0 {
            bail!("none of the top modules {:?} could be imported", dist.top_modules);
        }
        // flush anything the imported package printed before the marker
        if let Err(e) = py
            .import_bound("sys")
            .and_then(|sys| sys.getattr("stdout")?.call_method0("flush"))
        {
            tracing::warn!(error = %e, "Failed to flush interpreter stdout");
        }
        Ok(processor.into_entries())
    })?;
    tracing::info!(count = entries.len(), "Inspected");

    let payload = serde_json::to_string(&entries)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", TRANSFER_BEGIN)?;
    writeln!(out, "{}", payload)?;
    out.flush()?;
    Ok(())
}
