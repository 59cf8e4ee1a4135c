// Report generation from the store and from crawl summaries

use crate::crawl::CrawlSummary;
use crate::data::{Database, EdgeKind, PanoramaStatus, RunRow};
use rusqlite::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub processed: usize,
    pub pending: usize,
    pub neighbor_edges: usize,
    pub link_edges: usize,
    pub recent_runs: Vec<RunRow>,
}

impl StoreStats {
    pub fn collect(db: &Database, run_limit: usize) -> Result<Self> {
        Ok(StoreStats {
            total: db.count_panoramas()?,
            processed: db.count_by_status(PanoramaStatus::Processed)?,
            pending: db.count_by_status(PanoramaStatus::Pending)?,
            neighbor_edges: db.count_edges(EdgeKind::Neighbor)?,
            link_edges: db.count_edges(EdgeKind::Link)?,
            recent_runs: db.get_recent_runs(run_limit)?,
        })
    }
}

fn percentage(part: usize, total: usize) -> String {
    if total == 0 {
        "0.0%".to_string()
    } else {
        format!("{:.1}%", part as f64 / total as f64 * 100.0)
    }
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{DateTime, Utc};
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Summary printed after a crawl run
pub fn generate_crawl_report(summary: &CrawlSummary) -> String {
    let mut report = String::new();
    report.push_str(RULE);
    report.push_str("\n\n# Run summary:\n");
    if let Some(ref seed) = summary.seeded {
        report.push_str(&format!("  Seeded with: {}\n", seed));
    }
    report.push_str(&format!("  Processed: {}\n", summary.processed));
    report.push_str(&format!("  Failed lookups: {}\n", summary.failed));
    report.push_str(&format!("  Newly discovered: {}\n", summary.discovered));
    report.push_str(&format!("  Outside boundary: {}\n", summary.discarded));
    if summary.skipped > 0 {
        report.push_str(&format!("  Rejected by store: {}\n", summary.skipped));
    }
    report.push_str("\n# Store:\n");
    report.push_str(&format!("  Total panoramas: {}\n", summary.total));
    report.push_str(&format!("  Pending: {}\n", summary.pending));
    report.push('\n');
    report.push_str(RULE);
    report.push('\n');
    report
}

pub fn generate_stats_report(
    stats: &StoreStats,
    format: ReportFormat,
) -> std::result::Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_stats_text(stats)),
        ReportFormat::Json => generate_stats_json(stats),
    }
}

fn generate_stats_text(stats: &StoreStats) -> String {
    let mut report = String::new();
    report.push_str(RULE);
    report.push_str("\nDATABASE STATISTICS\n");
    report.push_str(RULE);
    report.push_str("\n\n");

    report.push_str(&format!("  {:<20} {:>10} {:>8}\n", "Metric", "Count", "Share"));
    report.push_str(&format!(
        "  {:<20} {:>10} {:>8}\n",
        "Total panoramas", stats.total, "100%"
    ));
    report.push_str(&format!(
        "  {:<20} {:>10} {:>8}\n",
        "Processed",
        stats.processed,
        percentage(stats.processed, stats.total)
    ));
    report.push_str(&format!(
        "  {:<20} {:>10} {:>8}\n",
        "Pending",
        stats.pending,
        percentage(stats.pending, stats.total)
    ));
    report.push_str(&format!("  {:<20} {:>10}\n", "Neighbor edges", stats.neighbor_edges));
    report.push_str(&format!("  {:<20} {:>10}\n", "Link edges", stats.link_edges));

    if !stats.recent_runs.is_empty() {
        report.push_str("\nRecent runs:\n");
        for run in &stats.recent_runs {
            report.push_str(&format!(
                "  {}  {:<9}  budget {:>4}  processed {:>4}  failed {:>3}  discovered {:>4}\n",
                format_timestamp(run.start_time),
                run.status,
                run.max_new,
                run.processed,
                run.failed,
                run.discovered
            ));
        }
    }

    report.push('\n');
    report
}

fn generate_stats_json(stats: &StoreStats) -> std::result::Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "generator": "streetcrawl",
        "version": env!("CARGO_PKG_VERSION"),
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "panoramas": {
            "total": stats.total,
            "processed": stats.processed,
            "pending": stats.pending,
        },
        "edges": {
            "neighbors": stats.neighbor_edges,
            "links": stats.link_edges,
        },
        "recent_runs": stats.recent_runs,
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
