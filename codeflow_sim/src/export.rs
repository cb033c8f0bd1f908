//! Dataset exporters.
//!
//! Each format writes rows as they arrive from the research generator, so the
//! full dataset is never held in memory. CSV cells follow fixed formatting:
//! `true`/`false` booleans, four decimals for ratios, two for hours, RFC 3339
//! timestamps and an empty cell for absent values.

use crate::research::ResearchDataPoint;
use chrono::SecondsFormat;
use codeflow_env::{SimError, SimResult};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Output format for [`write_rows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    Ndjson,
}

impl ExportFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Ndjson => "ndjson",
        }
    }

    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        self.name()
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "ndjson" | "jsonl" => Ok(ExportFormat::Ndjson),
            other => Err(format!("Unknown export format: {other} (expected csv, json or ndjson)")),
        }
    }
}

/// CSV header, in column order.
pub const CSV_COLUMNS: [&str; 38] = [
    "commit_hash",
    "author_id",
    "repo",
    "branch",
    "timestamp",
    "lines_added",
    "lines_deleted",
    "tab_lines_added",
    "composer_lines_added",
    "non_ai_lines_added",
    "ai_ratio",
    "files_changed",
    "pr_number",
    "pr_state",
    "pr_ai_ratio",
    "coding_lead_time_hours",
    "pickup_time_hours",
    "review_lead_time_hours",
    "merge_lead_time_hours",
    "review_comments",
    "review_density",
    "review_iterations",
    "reviewer_count",
    "rework_ratio",
    "scope_creep",
    "was_reverted",
    "required_hotfix",
    "is_bug_fix",
    "survival_rate_7d",
    "survival_rate_30d",
    "seniority",
    "region",
    "team",
    "repo_maturity",
    "repo_age_days",
    "primary_language",
    "is_greenfield",
    "greenfield_index",
];

fn ratio(v: f64) -> String {
    format!("{v:.4}")
}

fn hours(v: f64) -> String {
    format!("{v:.2}")
}

fn opt<T>(v: Option<T>, f: impl FnOnce(T) -> String) -> String {
    v.map(f).unwrap_or_default()
}

fn text(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Formats one row as CSV cells in [`CSV_COLUMNS`] order.
pub fn csv_record(r: &ResearchDataPoint) -> Vec<String> {
    vec![
        text(&r.commit_hash),
        text(&r.author_id),
        text(&r.repo),
        text(&r.branch),
        r.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        r.lines_added.to_string(),
        r.lines_deleted.to_string(),
        r.tab_lines_added.to_string(),
        r.composer_lines_added.to_string(),
        r.non_ai_lines_added.to_string(),
        ratio(r.ai_ratio),
        r.files_changed.to_string(),
        opt(r.pr_number, |n| n.to_string()),
        opt(r.pr_state.as_deref(), text),
        opt(r.pr_ai_ratio, ratio),
        opt(r.coding_lead_time_hours, hours),
        opt(r.pickup_time_hours, hours),
        opt(r.review_lead_time_hours, hours),
        opt(r.merge_lead_time_hours, hours),
        opt(r.review_comments, |n| n.to_string()),
        opt(r.review_density, ratio),
        opt(r.review_iterations, |n| n.to_string()),
        opt(r.reviewer_count, |n| n.to_string()),
        opt(r.rework_ratio, ratio),
        opt(r.scope_creep, ratio),
        opt(r.was_reverted, |b| b.to_string()),
        opt(r.required_hotfix, |b| b.to_string()),
        opt(r.is_bug_fix, |b| b.to_string()),
        opt(r.survival_rate_7d, ratio),
        opt(r.survival_rate_30d, ratio),
        text(&r.seniority),
        text(&r.region),
        text(&r.team),
        text(&r.repo_maturity),
        r.repo_age_days.to_string(),
        text(&r.primary_language),
        r.is_greenfield.to_string(),
        ratio(r.greenfield_index),
    ]
}

/// Writes `rows` to `out` in `format` and returns the number written.
pub fn write_rows<I, W>(format: ExportFormat, rows: I, out: &mut W) -> SimResult<usize>
where
    I: IntoIterator<Item = ResearchDataPoint>,
    W: Write,
{
    let mut count = 0;
    match format {
        ExportFormat::Csv => {
            writeln!(out, "{}", CSV_COLUMNS.join(","))?;
            for row in rows {
                writeln!(out, "{}", csv_record(&row).join(","))?;
                count += 1;
            }
        }
        ExportFormat::Json => {
            out.write_all(b"[")?;
            for row in rows {
                if count > 0 {
                    out.write_all(b",")?;
                }
                out.write_all(b"\n")?;
                serde_json::to_writer(&mut *out, &row).map_err(SimError::serialization)?;
                count += 1;
            }
            out.write_all(b"\n]\n")?;
        }
        ExportFormat::Ndjson => {
            for row in rows {
                serde_json::to_writer(&mut *out, &row).map_err(SimError::serialization)?;
                out.write_all(b"\n")?;
                count += 1;
            }
        }
    }
    out.flush()?;
    tracing::debug!(format = %format, rows = count, "dataset written");
    Ok(count)
}
