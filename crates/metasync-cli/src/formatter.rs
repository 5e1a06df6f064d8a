//! Output formatters for command results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use metasync_core::apply::Plan;
use metasync_core::bundle::ExportSummary;
use metasync_core::dialect::ColumnInfo;
use metasync_core::sync::SyncReport;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format the outcome of an import.
    fn format_report(&self, report: &SyncReport) -> String;

    /// Format a migration plan.
    fn format_plan(&self, plan: &Plan) -> String;

    /// Format a list of table names.
    fn format_tables(&self, tables: &[String]) -> String;

    /// Format the columns of a table.
    fn format_columns(&self, table: &str, columns: &[ColumnInfo]) -> String;

    /// Format the result of an export.
    fn format_export(&self, summary: &ExportSummary) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_report(&self, report: &SyncReport) -> String {
        let mut output = report.progress.join("\n");
        if !output.is_empty() {
            output.push('\n');
        }
        match &report.error {
            None => output.push_str(&format!(
                "Import finished: {} statement(s) executed, {} metadata row(s) written",
                report.statements_executed, report.rows_written
            )),
            Some(error) => {
                output.push_str(&format!("Import failed: {error}"));
                if report.requires_intervention {
                    output.push_str("\nDatabase and metadata may disagree; reconcile before retrying.");
                }
            }
        }
        output
    }

    fn format_plan(&self, plan: &Plan) -> String {
        if plan.is_empty() {
            return "Nothing to apply".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["#", "Phase", "Item", "Statement"]);
        for (i, statement) in plan.script.statements().enumerate() {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(format!("{:?}", statement.phase)),
                Cell::new(statement.item_id),
                Cell::new(&statement.sql),
            ]);
        }

        let mut output = format!(
            "{} metadata change(s), {} statement(s)\n{table}",
            plan.delta.change_count(),
            plan.script.len()
        );
        for warning in &plan.warnings {
            output.push_str(&format!("\nwarning: {warning}"));
        }
        output
    }

    fn format_tables(&self, tables: &[String]) -> String {
        if tables.is_empty() {
            return "No unregistered tables".to_string();
        }
        let mut table = Table::new();
        table.set_header(vec!["Table"]);
        for name in tables {
            table.add_row(vec![name]);
        }
        table.to_string()
    }

    fn format_columns(&self, name: &str, columns: &[ColumnInfo]) -> String {
        if columns.is_empty() {
            return format!("Table {name} not found");
        }
        let mut table = Table::new();
        table.set_header(vec!["Column", "Type", "Size", "Nullable", "Primary key"]);
        for column in columns {
            table.add_row(vec![
                Cell::new(&column.name),
                Cell::new(&column.type_name),
                Cell::new(column.size.map(|s| s.to_string()).unwrap_or_default()),
                Cell::new(column.nullable),
                Cell::new(column.primary_key),
            ]);
        }
        table.to_string()
    }

    fn format_export(&self, summary: &ExportSummary) -> String {
        format!(
            "Bundle written to {} ({} bytes, {} asset file(s))",
            summary.path.display(),
            summary.bytes,
            summary.assets.len()
        )
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_report(&self, report: &SyncReport) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_plan(&self, plan: &Plan) -> String {
        serde_json::json!({
            "changes": plan.delta.change_count(),
            "statements": plan.script,
            "warnings": plan.warnings,
        })
        .to_string()
    }

    fn format_tables(&self, tables: &[String]) -> String {
        serde_json::to_string_pretty(tables).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_columns(&self, _name: &str, columns: &[ColumnInfo]) -> String {
        serde_json::to_string_pretty(columns).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_export(&self, summary: &ExportSummary) -> String {
        serde_json::json!({
            "path": summary.path,
            "bytes": summary.bytes,
            "assets": summary.assets,
        })
        .to_string()
    }
}
