//! Extract command - Distribution to ApiDescription
//!
//! Runs the inspector in the caller's environment, or in a throwaway virtual
//! environment with `--venv`.

use std::path::PathBuf;

use aexpy_core::models::{ApiDescription, Distribution};
use aexpy_core::{extract, select_python, CurrentEnvironment, ExecutionEnvironment, VenvEnvironment};
use anyhow::Context;
use clap::Args;

use super::{cached, finish, load, reuse, StageSettings};
use crate::config::AexpyConfig;

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Distribution file, `-` for stdin
    pub input: PathBuf,

    /// Output file, `-` for stdout
    #[arg(default_value = "-")]
    pub output: PathBuf,

    /// Path of the aexpy-inspect binary
    #[arg(long)]
    pub inspector: Option<PathBuf>,

    /// Interpreter used for installs and virtual environments
    /// (default: python<pyversion> when installed, else python3)
    #[arg(long)]
    pub python: Option<String>,

    /// Skip the source, type and call-graph enrichers
    #[arg(long)]
    pub no_enrich: bool,

    /// Take types from annotations only, without running mypy
    #[arg(long)]
    pub no_mypy: bool,

    /// Install the wheel (or dependencies) before inspecting
    #[arg(long)]
    pub install: bool,

    /// Extract inside a fresh virtual environment (implies --install)
    #[arg(long)]
    pub venv: bool,
}

pub fn run(args: &ExtractArgs, config: &AexpyConfig, settings: &StageSettings) -> anyhow::Result<()> {
    let distribution: Distribution = load(&args.input, "distribution")?;
    let key = distribution.release.to_string();
    if let Some(description) = cached::<ApiDescription>(settings, "extract", &key) {
        return reuse(&description, "extract", &args.output, settings);
    }

    let python = select_python(config.python(args.python.as_deref()).as_deref(), &distribution.pyversion);
    let options = config.extract_options(
        args.inspector.as_deref(),
        args.no_enrich,
        args.no_mypy,
        args.install || args.venv,
    );
    tracing::debug!(inspector = %options.inspector.display(), python = %python, "Extract options");

    let env: Box<dyn ExecutionEnvironment> = if args.venv {
        Box::new(VenvEnvironment::create(&python).context("Failed to create virtual environment")?)
    } else {
        Box::new(CurrentEnvironment::new(&python))
    };
    let context = extract(&distribution, env.as_ref(), &options);
    finish(context, "extract", &key, &args.output, settings)
}
