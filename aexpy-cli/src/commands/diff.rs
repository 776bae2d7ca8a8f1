//! Diff command - two ApiDescriptions to an ApiDifference

use std::path::PathBuf;

use aexpy_core::models::{ApiDescription, ApiDifference, ReleasePair};
use aexpy_core::diff;
use clap::Args;

use super::{cached, finish, load, reuse, StageSettings};
use crate::config::AexpyConfig;

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Description of the old release, `-` for stdin
    pub old: PathBuf,

    /// Description of the new release, `-` for stdin
    pub new: PathBuf,

    /// Output file, `-` for stdout
    #[arg(default_value = "-")]
    pub output: PathBuf,

    /// Run trigger snippets against both releases to confirm breaking changes
    #[arg(long)]
    pub verify: bool,

    /// Per-snippet timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Interpreter used to run trigger snippets
    #[arg(long)]
    pub python: Option<String>,

    /// Verify inside fresh virtual environments
    #[arg(long)]
    pub venv: bool,

    /// Report return type changes even against an inferred Any
    #[arg(long)]
    pub strict_return_types: bool,
}

pub fn run(args: &DiffArgs, config: &AexpyConfig, settings: &StageSettings) -> anyhow::Result<()> {
    if args.old.as_os_str() == "-" && args.new.as_os_str() == "-" {
        anyhow::bail!("only one of the descriptions can be read from stdin");
    }
    let old: ApiDescription = load(&args.old, "old description")?;
    let new: ApiDescription = load(&args.new, "new description")?;
    let key = ReleasePair {
        old: old.distribution.release.clone(),
        new: new.distribution.release.clone(),
    }
    .to_string();
    if let Some(difference) = cached::<ApiDifference>(settings, "diff", &key) {
        return reuse(&difference, "diff", &args.output, settings);
    }

    let verify = (args.verify || config.diff.verify)
        .then(|| config.verify_options(args.python.as_deref(), args.timeout, args.venv));
    let options = config.diff_options(args.strict_return_types, verify);
    let context = diff(&old, &new, &options);
    if context.is_success() {
        let (level, _) = context.product.evaluate();
        tracing::info!(entries = context.product.entries.len(), %level, "Diffed {}", key);
    }
    finish(context, "diff", &key, &args.output, settings)
}
