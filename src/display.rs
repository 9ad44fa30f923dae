//! Table formatting for CLI output.

use crate::Project;
use crate::ranking::RankedMatch;
use crate::service::ServiceStatus;
use comfy_table::{
    Attribute, Cell, CellAlignment, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_FULL,
};

/// Summaries longer than this are shortened in tables.
const SUMMARY_WIDTH: usize = 60;

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        Self { table }
    }

    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    pub fn add_row(mut self, row: Vec<Cell>) -> Self {
        self.table.add_row(row);
        self
    }

    pub fn build(self) -> String {
        self.table.to_string()
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(width.saturating_sub(1)).collect();
    shortened.push('…');
    shortened
}

/// Ranked query results.
pub fn matches_table(matches: &[RankedMatch]) -> String {
    let mut builder =
        TableBuilder::new().set_headers(vec!["#", "ID", "Title", "Domain", "Summary", "Similarity"]);

    for (rank, m) in matches.iter().enumerate() {
        builder = builder.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(m.project.id),
            Cell::new(&m.project.title),
            Cell::new(&m.project.domain),
            Cell::new(truncate(&m.project.summary, SUMMARY_WIDTH)),
            Cell::new(format!("{:.2}", m.score)).set_alignment(CellAlignment::Right),
        ]);
    }

    builder.build()
}

/// Catalog listing.
pub fn projects_table(projects: &[Project]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec!["ID", "Title", "Domain", "Summary"]);
    for project in projects {
        builder = builder.add_row(vec![
            Cell::new(project.id),
            Cell::new(&project.title),
            Cell::new(&project.domain),
            Cell::new(truncate(&project.summary, SUMMARY_WIDTH)),
        ]);
    }
    builder.build()
}

/// Index and worker status.
pub fn status_table(status: &ServiceStatus, catalog_projects: usize) -> String {
    let entries = status
        .entries
        .map_or_else(|| "not built".to_string(), |n| n.to_string());
    let built_at = status
        .built_at
        .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    let rebuilds = format!(
        "{} ok, {} failed, {} coalesced, {} dropped",
        status.rebuilds.completed,
        status.rebuilds.failed,
        status.rebuilds.coalesced,
        status.rebuilds.dropped
    );

    let rows = [
        ("Embedding model", status.model_name.clone()),
        ("Dimension", status.dimension.to_string()),
        ("Catalog projects", catalog_projects.to_string()),
        ("Indexed projects", entries),
        ("Index built", built_at),
        (
            "Rebuilding",
            if status.rebuilding { "yes" } else { "no" }.to_string(),
        ),
        ("Rebuilds", rebuilds),
        (
            "Result cache",
            if status.cache_enabled { "enabled" } else { "disabled" }.to_string(),
        ),
    ];

    rows.into_iter()
        .fold(
            TableBuilder::new().set_headers(vec!["Metric", "Value"]),
            |builder, (metric, value)| builder.add_row(vec![Cell::new(metric), Cell::new(value)]),
        )
        .build()
}
