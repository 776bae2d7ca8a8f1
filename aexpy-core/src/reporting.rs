//! Text report for an evaluated difference.

use std::fmt::Write;
use std::path::PathBuf;

use crate::error::Result;
use crate::models::{
    level_icon, rank_icon, ApiDifference, BreakingRank, DiffEntry, Distribution, Product, ProductInfo, Report,
};
use crate::produce::{ensure_success, produce, ProduceContext};

/// Headline with the rank icon, then one indented line per `;`-separated
/// detail after the first `": "`.
pub fn format_message(entry: &DiffEntry) -> String {
    let mut parts = entry.message.splitn(2, ": ");
    let head = parts.next().unwrap_or_default().trim();
    let mut out = format!("{} {}", rank_icon(entry.rank), head);
    if let Some(rest) = parts.next() {
        for detail in rest.split(';') {
            let detail = detail.trim();
            let detail = detail.strip_suffix('.').unwrap_or(detail);
            out.push_str("\n     ");
            out.push_str(&detail.replace("=>", " → "));
        }
    }
    out
}

fn path_or_dash(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn creation_of(info: &ProductInfo) -> String {
    info.creation
        .map(|c| c.to_rfc3339())
        .unwrap_or_else(|| "-".to_string())
}

fn release_block(out: &mut String, dist: &Distribution) {
    let _ = writeln!(out, "▶ {}", dist.release);
    let _ = writeln!(out, "  📦 {}", path_or_dash(&dist.wheel_file));
    let _ = writeln!(out, "  📁 {}", path_or_dash(&dist.root_path));
    let _ = writeln!(out, "  🔖 {}", dist.pyversion);
    let _ = writeln!(out, "  📚 {}", dist.top_modules.join(", "));
    let _ = writeln!(
        out,
        "  💠 {} files, {} bytes, {} LOC",
        dist.file_count, dist.file_size, dist.loc_count
    );
    out.push('\n');
}

fn sorted(mut entries: Vec<&DiffEntry>) -> Vec<&DiffEntry> {
    entries.sort_by(|a, b| b.rank.cmp(&a.rank).then_with(|| a.kind.cmp(&b.kind)));
    entries
}

/// Render the full report text.
pub fn render(difference: &ApiDifference) -> String {
    let (level, counts) = difference.evaluate();
    let pair = difference.pair();
    let mut out = format!("📜 {} → {} {}\n\n", pair.old, pair.new, level_icon(level));

    release_block(&mut out, &difference.old);
    release_block(&mut out, &difference.new);

    let preprocess = difference.old.info.duration + difference.new.info.duration;
    let _ = writeln!(out, "⏰  Creation {}", creation_of(&difference.info));
    let _ = writeln!(out, "⏱  Duration {}s", preprocess + difference.info.duration);
    let _ = writeln!(out, "  📦 Preprocessing ⏱ {}s", preprocess);
    let _ = writeln!(out, "  📑 Diffing ⏱ {}s", difference.info.duration);

    if !difference.entries.is_empty() {
        let summary = counts
            .iter()
            .map(|(rank, n)| format!("{} {}", rank_icon(*rank), n))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "\n📋 Changes {}", summary);
    }

    let breakings = sorted(difference.breaking(BreakingRank::Low));
    if !breakings.is_empty() {
        out.push_str("\n🚧 Breakings\n\n");
        for entry in breakings {
            let _ = writeln!(out, "{}", format_message(entry));
        }
    }

    let mut others = difference.rank(BreakingRank::Unknown);
    others.extend(difference.rank(BreakingRank::Compatible));
    let others = sorted(others);
    if !others.is_empty() {
        out.push_str("\n🧪 Non-breakings\n\n");
        for entry in others {
            let _ = writeln!(out, "{}", format_message(entry));
        }
    }

    out.push('\n');
    out
}

/// Report stage: ApiDifference → Report.
pub fn report(difference: &ApiDifference) -> ProduceContext<Report> {
    let product = Report {
        old: difference.old.clone(),
        new: difference.new.clone(),
        ..Default::default()
    };
    produce(product, |context| {
        ensure_success(difference, "difference")?;
        context.using("text", |report| -> Result<()> {
            report.content = render(difference);
            tracing::info!(bytes = report.content.len(), "Rendered {}", report.title());
            Ok(())
        })
    })
}
