//! View command - print the overview of any product

use std::path::PathBuf;

use aexpy_core::io::read_any;
use aexpy_core::models::BreakingRank;
use anyhow::Context;
use clap::{Args, ValueEnum};

use crate::output::{render, OutputFormat};

/// Lowest rank listed in the entry table of a difference.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum RankFilter {
    All,
    Compatible,
    Low,
    Medium,
    High,
}

impl RankFilter {
    pub fn min_rank(self) -> Option<BreakingRank> {
        match self {
            RankFilter::All => None,
            RankFilter::Compatible => Some(BreakingRank::Compatible),
            RankFilter::Low => Some(BreakingRank::Low),
            RankFilter::Medium => Some(BreakingRank::Medium),
            RankFilter::High => Some(BreakingRank::High),
        }
    }
}

#[derive(Args, Debug)]
pub struct ViewArgs {
    /// Product file of any stage, `-` for stdin
    pub input: PathBuf,

    /// Lowest rank of difference entries to list
    #[arg(short, long, value_enum, default_value = "low")]
    pub rank: RankFilter,
}

pub fn run(args: &ViewArgs, format: OutputFormat) -> anyhow::Result<()> {
    let product = read_any(&args.input).with_context(|| format!("Failed to read product from {}", args.input.display()))?;
    println!("{}", render(&product, format, args.rank.min_rank())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_filter() {
        assert_eq!(RankFilter::All.min_rank(), None);
        assert_eq!(RankFilter::Low.min_rank(), Some(BreakingRank::Low));
        assert_eq!(RankFilter::from_str("medium", true), Ok(RankFilter::Medium));
    }
}
