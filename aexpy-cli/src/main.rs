//! aexpy - breaking-change analysis for Python packages
//!
//! Five subcommands mirror the pipeline stages:
//!
//! ```text
//! aexpy preprocess ./pkg-1.0 dist1.json -r pkg@1.0
//! aexpy extract dist1.json api1.json
//! aexpy diff api1.json api2.json diff.json
//! aexpy report diff.json report.json
//! aexpy view report.json
//! ```

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use aexpy_core::CaptureLayer;
use commands::diff::DiffArgs;
use commands::extract::ExtractArgs;
use commands::preprocess::PreprocessArgs;
use commands::report::ReportArgs;
use commands::view::ViewArgs;
use commands::StageSettings;
use config::AexpyConfig;
use output::OutputFormat;

/// Detect breaking changes between releases of a Python package.
#[derive(Parser)]
#[command(name = "aexpy")]
#[command(author, version)]
#[command(about = "Detect breaking changes between releases of a Python package")]
#[command(propagate_version = true)]
#[command(after_help = "Products are JSON files (optionally gzipped); `-` reads stdin or writes stdout.

Examples:
  aexpy preprocess ./demo-1.0 d1.json -r demo@1.0
  aexpy extract d1.json a1.json
  aexpy diff a1.json a2.json diff.json --verify
  aexpy report diff.json - | aexpy view -")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Gzip written products (also AEXPY_GZIP=1)
    #[arg(short = 'z', long, global = true)]
    gzip: bool,

    /// Recompute stages even when the cache holds their product
    #[arg(short, long, global = true)]
    force: bool,

    /// Output format of `view` (overrides config default)
    #[arg(long, global = true, value_enum)]
    format: Option<OutputFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a Distribution from an unpacked package directory
    Preprocess(PreprocessArgs),

    /// Extract the API description of a Distribution
    Extract(ExtractArgs),

    /// Diff two API descriptions and rank every change
    Diff(DiffArgs),

    /// Render a text report of a difference
    Report(ReportArgs),

    /// Show the overview of any product
    View(ViewArgs),
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    // Captured stage logs keep info records whatever the console shows.
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter))),
        )
        .with(CaptureLayer::new().with_filter(LevelFilter::INFO))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = AexpyConfig::load(std::path::Path::new("."));

    // Resolve output format: CLI flag > config default > Table
    let format = cli.format.unwrap_or_else(|| {
        config
            .default_format()
            .and_then(|f| f.parse().ok())
            .unwrap_or(OutputFormat::Table)
    });

    if let Some(use_color) = config.use_color() {
        colored::control::set_override(use_color);
    }

    let gzip = config.gzip(cli.gzip);
    let settings = StageSettings {
        gzip,
        cache: config.cache(gzip),
        force: cli.force,
    };

    match cli.command {
        Commands::Preprocess(args) => commands::preprocess::run(&args, &settings),
        Commands::Extract(args) => commands::extract::run(&args, &config, &settings),
        Commands::Diff(args) => commands::diff::run(&args, &config, &settings),
        Commands::Report(args) => commands::report::run(&args, &settings),
        Commands::View(args) => commands::view::run(&args, format),
    }
}
