//! Report command - ApiDifference to a text Report

use std::path::PathBuf;

use aexpy_core::models::{ApiDifference, Product};
use aexpy_core::report;
use clap::Args;

use super::{finish, load, StageSettings};

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Difference file, `-` for stdin
    pub input: PathBuf,

    /// Output file, `-` for stdout
    #[arg(default_value = "-")]
    pub output: PathBuf,
}

pub fn run(args: &ReportArgs, settings: &StageSettings) -> anyhow::Result<()> {
    let difference: ApiDifference = load(&args.input, "difference")?;
    let key = difference.title();
    let context = report(&difference);
    finish(context, "report", &key, &args.output, settings)
}
