//! Markdown report generation
//!
//! Renders state statistics as a human-readable report.

use crate::output::stats::StateStatistics;
use crate::state::ItemStatus;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Failed items listed before the report truncates
const MAX_LISTED_FAILURES: usize = 50;

/// Writes a markdown report to `output_path`
///
/// # Arguments
///
/// * `stats` - Statistics over the persisted state
/// * `output_path` - Path where the markdown file should be written
pub fn generate_markdown_summary(
    stats: &StateStatistics,
    output_path: &Path,
) -> std::io::Result<()> {
    let markdown = format_markdown_summary(stats);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats statistics as markdown
pub fn format_markdown_summary(stats: &StateStatistics) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Sweep Summary\n\n");

    md.push_str("## State Information\n\n");
    if let Some(created) = stats.meta.created_at {
        md.push_str(&format!("- **Created**: {}\n", created.to_rfc3339()));
    }
    if let Some(updated) = stats.meta.updated_at {
        md.push_str(&format!("- **Last Saved**: {}\n", updated.to_rfc3339()));
    }
    if let Some(hash) = &stats.meta.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    md.push_str(&format!("- **Total Items**: {}\n", stats.counts.total));
    md.push_str(&format!(
        "- **Attempts Recorded**: {}\n",
        stats.total_attempts
    ));
    md.push_str(&format!(
        "- **Completion Rate**: {:.2}%\n\n",
        stats.completion_rate()
    ));

    md.push_str("## Status Breakdown\n\n");
    md.push_str("| Status | Count |\n");
    md.push_str("|--------|-------|\n");
    for status in ItemStatus::all() {
        md.push_str(&format!("| {} | {} |\n", status, stats.counts.count(status)));
    }
    md.push('\n');

    if !stats.failed_items.is_empty() {
        md.push_str("## Failed Items\n\n");
        md.push_str("| Item | Status | Attempts | Last Error |\n");
        md.push_str("|------|--------|----------|------------|\n");

        for item in stats.failed_items.iter().take(MAX_LISTED_FAILURES) {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                item.key,
                item.status,
                item.attempts,
                escape_cell(item.last_error.as_deref().unwrap_or(""))
            ));
        }
        if stats.failed_items.len() > MAX_LISTED_FAILURES {
            md.push_str(&format!(
                "\n... and {} more\n",
                stats.failed_items.len() - MAX_LISTED_FAILURES
            ));
        }
        md.push('\n');
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
