//! Summary table generation.
//!
//! This module renders domain summaries as the fixed-width text table the
//! report has always been mailed as, or as JSON.

use crate::config::OutputFormat;
use crate::error::SummaryError;
use crate::models::DomainSummary;
use std::path::Path;
use tracing::info;

/// A column of the summary table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Domain,
    Active,
    Closed,
    Locked,
    Maintenance,
    Total,
    /// `*` when the domain has status-bucketed accounts.
    Marker,
    Admin,
    DelegatedAdmin,
    System,
    Pending,
}

/// Column order of the domain summary report.
pub const SUMMARY_COLUMNS: [Column; 11] = [
    Column::Domain,
    Column::Active,
    Column::Closed,
    Column::Locked,
    Column::Maintenance,
    Column::Total,
    Column::Marker,
    Column::Admin,
    Column::DelegatedAdmin,
    Column::System,
    Column::Pending,
];

impl Column {
    /// Header text.
    pub fn header(&self) -> &'static str {
        match self {
            Column::Domain => "domain",
            Column::Active => "active",
            Column::Closed => "closed",
            Column::Locked => "locked",
            Column::Maintenance => "maintenance",
            Column::Total => "total",
            Column::Marker => "*",
            Column::Admin => "admin",
            Column::DelegatedAdmin => "delegatedadmin",
            Column::System => "system",
            Column::Pending => "pending",
        }
    }

    /// Cell text for a summary.
    pub fn value(&self, summary: &DomainSummary) -> String {
        match self {
            Column::Domain => summary.domain.clone(),
            Column::Active => summary.active.to_string(),
            Column::Closed => summary.closed.to_string(),
            Column::Locked => summary.locked.to_string(),
            Column::Maintenance => summary.maintenance.to_string(),
            Column::Total => summary.total.to_string(),
            Column::Marker => summary.marker().to_string(),
            Column::Admin => summary.admin.to_string(),
            Column::DelegatedAdmin => summary.delegatedadmin.to_string(),
            Column::System => summary.system.to_string(),
            Column::Pending => summary.pending.to_string(),
        }
    }
}

/// Render summaries as an aligned text table.
///
/// The first line is the header and the second a dash separator as wide as
/// each column. Cells are left-aligned, padded to the widest value of their
/// column and joined with `" | "`.
pub fn render_table(summaries: &[DomainSummary], columns: &[Column]) -> String {
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(summaries.len() + 1);
    rows.push(columns.iter().map(|c| c.header().to_string()).collect());
    for summary in summaries {
        rows.push(columns.iter().map(|c| c.value(summary)).collect());
    }

    let widths: Vec<usize> = (0..columns.len())
        .map(|i| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    rows.insert(1, separator);

    let mut output = String::new();
    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        output.push_str(&cells.join(" | "));
        output.push('\n');
    }

    output
}

/// Render summaries as a pretty JSON array.
pub fn render_json(summaries: &[DomainSummary]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(summaries)
}

/// Render summaries in the configured format.
pub fn render(summaries: &[DomainSummary], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Text => Ok(render_table(summaries, &SUMMARY_COLUMNS)),
        OutputFormat::Json => render_json(summaries).map_err(Into::into),
    }
}

/// Write the rendered report to a file, replacing any previous content.
pub fn write_report(path: &Path, content: &str) -> Result<(), SummaryError> {
    info!(
        action = "write",
        component = "report",
        file_path = ?path,
        "Saving summary file"
    );

    std::fs::write(path, content).map_err(|source| SummaryError::Render {
        path: path.to_path_buf(),
        source,
    })
}
