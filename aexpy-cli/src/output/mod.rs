//! Output formatting for `aexpy view`.
//!
//! Table mode prints the product overview; differences also get a table of
//! their entries, reports their text. JSON mode pretty-prints the product.

use std::str::FromStr;

use aexpy_core::models::{rank_icon, ApiDifference, BreakingRank, Product};
use aexpy_core::AnyProduct;
use clap::ValueEnum;
use colored::Colorize;
use tabled::{builder::Builder, settings::Style};

/// Output format for CLI results
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable overview and tables (default)
    #[default]
    Table,
    /// The product as pretty-printed JSON
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: '{}'", s)),
        }
    }
}

/// Render any product in the given format.
///
/// `min_rank` limits the entry table of a difference; `None` lists every
/// entry, Unknown ones included.
pub fn render(product: &AnyProduct, format: OutputFormat, min_rank: Option<BreakingRank>) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        let value = match product {
            AnyProduct::Distribution(p) => serde_json::to_value(p)?,
            AnyProduct::Description(p) => serde_json::to_value(p)?,
            AnyProduct::Difference(p) => serde_json::to_value(p)?,
            AnyProduct::Report(p) => serde_json::to_value(p)?,
        };
        return Ok(serde_json::to_string_pretty(&value)?);
    }

    let mut out = product.overview();
    match product {
        AnyProduct::Difference(difference) => {
            out.push_str("\n\n");
            out.push_str(&entries_table(difference, min_rank));
        }
        AnyProduct::Report(report) if !report.content.is_empty() => {
            out.push_str("\n\n");
            out.push_str(report.content.trim_end());
        }
        _ => {}
    }
    Ok(out)
}

/// Entries of a difference, most severe first.
pub fn entries_table(difference: &ApiDifference, min_rank: Option<BreakingRank>) -> String {
    let mut entries: Vec<_> = match min_rank {
        Some(rank) => difference.breaking(rank),
        None => difference.entries.values().collect(),
    };
    if entries.is_empty() {
        return "(no changes)".dimmed().to_string();
    }
    entries.sort_by(|a, b| b.rank.cmp(&a.rank));

    let mut builder = Builder::default();
    builder.push_record(["Rank", "Kind", "Message", "Verified"]);
    for entry in &entries {
        let verified = if entry.verify.verifier.is_empty() {
            String::new()
        } else {
            format!("{:?}", entry.verify.state)
        };
        builder.push_record([
            format!("{} {}", rank_icon(entry.rank), entry.rank),
            entry.kind.clone(),
            entry.message.clone(),
            verified,
        ]);
    }
    let mut table = builder.build();
    table.with(Style::rounded());

    let (level, _) = difference.evaluate();
    let header = format!(
        "{} {} of {} changes at {}+",
        "ENTRIES:".cyan().bold(),
        entries.len(),
        difference.entries.len(),
        min_rank.map(|r| r.to_string()).unwrap_or_else(|| "any rank".to_string())
    );
    format!("{}\n{}\n{} {}", header, table, "Overall:".bold(), level_label(level))
}

fn level_label(level: BreakingRank) -> String {
    let text = level.to_string();
    match level {
        BreakingRank::High => text.red().bold().to_string(),
        BreakingRank::Medium => text.yellow().bold().to_string(),
        BreakingRank::Low => text.yellow().to_string(),
        BreakingRank::Compatible => text.green().to_string(),
        BreakingRank::Unknown => text.dimmed().to_string(),
    }
}

/// One-line summary printed to stderr after a stage finishes.
pub fn stage_summary<T: Product>(stage: &str, product: &T) -> String {
    let info = product.info();
    format!(
        "{} {} {} ({:.2}s)",
        info.state.icon(),
        stage.bold(),
        product.title(),
        info.duration
    )
}
