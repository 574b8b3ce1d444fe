//! Output formatters for query results
//!
//! Renders query outcomes as box-drawing tables, JSON, or CSV, and carries
//! the shared helpers for humanizing counts, byte sizes and progress lines.

use doris_link::{ProgressSnapshot, QueryOutcome, QueryStatus, ResultSet, StatementError};

use crate::{error::Result, session::OutputFormat};

/// Maximum column width before truncation
const MAX_COLUMN_WIDTH: usize = 48;

/// Minimum column width when resizing to fit the terminal
const MIN_COLUMN_WIDTH: usize = 6;

/// Formats query results for display
pub struct OutputFormatter {
    format: OutputFormat,
    color: bool,
}

impl OutputFormatter {
    /// Create a new formatter
    pub fn new(format: OutputFormat, color: bool) -> Self {
        Self { format, color }
    }

    pub fn set_format(&mut self, format: OutputFormat) {
        self.format = format;
    }

    /// Get terminal width, defaulting to 120 if unavailable
    fn get_terminal_width() -> usize {
        if let Some((w, _h)) = term_size::dimensions() {
            w
        } else {
            120
        }
    }

    /// Truncate a string to max width with ellipsis
    fn truncate_value(value: &str, max_width: usize) -> String {
        if value.chars().count() <= max_width {
            value.to_string()
        } else if max_width <= 3 {
            value.chars().take(max_width).collect()
        } else {
            let take = max_width - 3;
            format!("{}...", value.chars().take(take).collect::<String>())
        }
    }

    /// Format a finished, failed or cancelled query outcome
    pub fn format_outcome(&self, outcome: &QueryOutcome) -> Result<String> {
        if let Some(ref error) = outcome.error {
            return Ok(self.format_error_detail(error));
        }

        if outcome.status == QueryStatus::Cancelled {
            let line = if self.color {
                "\x1b[33mQuery cancelled\x1b[0m".to_string()
            } else {
                "Query cancelled".to_string()
            };
            return Ok(line);
        }

        match self.format {
            OutputFormat::Table => self.format_table(outcome),
            OutputFormat::Json => self.format_json(outcome),
            OutputFormat::Csv => self.format_csv(outcome),
        }
    }

    fn footer(&self, outcome: &QueryOutcome) -> String {
        let mut footer = format!("Took: {:.3} ms", outcome.elapsed.as_secs_f64() * 1000.0);
        if let Some(ref progress) = outcome.progress {
            footer.push_str(&format!(
                " | Scanned: {} rows / {}",
                format_count(progress.scan_rows),
                format_bytes(progress.scan_bytes)
            ));
        }
        footer
    }

    /// Format as table
    fn format_table(&self, outcome: &QueryOutcome) -> Result<String> {
        let empty = ResultSet::default();
        let result = outcome.result.as_ref().unwrap_or(&empty);

        // Statements without a result set (DDL, DML)
        if result.columns.is_empty() {
            return Ok(format!(
                "Query OK, {} rows affected\n\n{}",
                result.rows_affected,
                self.footer(outcome)
            ));
        }

        let rows: Vec<Vec<String>> = result
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| v.clone().unwrap_or_else(|| "NULL".to_string()))
                    .collect()
            })
            .collect();

        let mut output = render_table(&result.columns, &rows);

        let row_count = rows.len();
        let row_label = if row_count == 1 { "row" } else { "rows" };
        output.push_str(&format!("({} {})\n", row_count, row_label));
        output.push('\n');
        output.push_str(&self.footer(outcome));

        Ok(output)
    }

    /// Format as JSON
    fn format_json(&self, outcome: &QueryOutcome) -> Result<String> {
        let empty = ResultSet::default();
        let result = outcome.result.as_ref().unwrap_or(&empty);

        let rows: Vec<serde_json::Value> = result
            .rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = result
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, value)| {
                        let json = match value {
                            Some(v) => serde_json::Value::String(v.clone()),
                            None => serde_json::Value::Null,
                        };
                        (col.clone(), json)
                    })
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();

        serde_json::to_string_pretty(&rows)
            .map_err(|e| crate::error::CLIError::FormatError(e.to_string()))
    }

    /// Format as CSV
    fn format_csv(&self, outcome: &QueryOutcome) -> Result<String> {
        let empty = ResultSet::default();
        let result = outcome.result.as_ref().unwrap_or(&empty);

        if result.columns.is_empty() {
            return Ok(String::new());
        }

        let mut output = result
            .columns
            .iter()
            .map(|c| csv_escape(c))
            .collect::<Vec<_>>()
            .join(",")
            + "\n";

        for row in &result.rows {
            let values: Vec<String> = row
                .iter()
                .map(|v| csv_escape(v.as_deref().unwrap_or("")))
                .collect();
            output.push_str(&values.join(","));
            output.push('\n');
        }

        Ok(output)
    }

    /// Format error detail - MySQL style
    fn format_error_detail(&self, error: &StatementError) -> String {
        if self.color {
            format!("\x1b[31m{}\x1b[0m", error)
        } else {
            error.to_string()
        }
    }
}

/// Render a box-drawing table, shrinking columns to fit the terminal.
pub fn render_table(columns: &[String], rows: &[Vec<String>]) -> String {
    let terminal_width = OutputFormatter::get_terminal_width();
    render_table_width(columns, rows, terminal_width)
}

fn render_table_width(columns: &[String], rows: &[Vec<String>], terminal_width: usize) -> String {
    let mut col_widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i < col_widths.len() {
                col_widths[i] = col_widths[i].max(value.chars().count());
            }
        }
    }

    let column_count = col_widths.len();
    if column_count > 0 {
        let border_padding = column_count * 3 + 1;
        let mut available = terminal_width.saturating_sub(border_padding);
        if available < column_count {
            available = column_count;
        }

        // Only truncate if total width exceeds available space
        let mut total_width = col_widths.iter().sum::<usize>();
        if total_width > available {
            // First pass: cap at MAX_COLUMN_WIDTH if needed
            for width in col_widths.iter_mut() {
                if *width > MAX_COLUMN_WIDTH {
                    *width = MAX_COLUMN_WIDTH;
                }
            }
            total_width = col_widths.iter().sum();

            // Second pass: shrink the widest columns until the table fits
            while total_width > available {
                if let Some((idx, _)) = col_widths
                    .iter()
                    .enumerate()
                    .filter(|(_, width)| **width > MIN_COLUMN_WIDTH)
                    .max_by_key(|(_, width)| *width)
                {
                    col_widths[idx] -= 1;
                } else if let Some((idx, _)) = col_widths
                    .iter()
                    .enumerate()
                    .filter(|(_, width)| **width > 1)
                    .max_by_key(|(_, width)| *width)
                {
                    col_widths[idx] -= 1;
                } else {
                    break;
                }
                total_width = col_widths.iter().sum();
            }
        }
    }

    let mut output = String::new();

    let border = |output: &mut String, left: char, mid: char, right: char| {
        output.push(left);
        for (idx, width) in col_widths.iter().enumerate() {
            output.push_str(&"─".repeat(width + 2));
            output.push(if idx == col_widths.len() - 1 { right } else { mid });
        }
        output.push('\n');
    };

    border(&mut output, '┌', '┬', '┐');

    output.push('│');
    for (i, col) in columns.iter().enumerate() {
        output.push(' ');
        let truncated = OutputFormatter::truncate_value(col, col_widths[i]);
        output.push_str(&format!("{:width$}", truncated, width = col_widths[i]));
        output.push(' ');
        output.push('│');
    }
    output.push('\n');

    border(&mut output, '├', '┼', '┤');

    for row in rows {
        output.push('│');
        for (i, value) in row.iter().enumerate() {
            if i >= col_widths.len() {
                break;
            }
            output.push(' ');
            let truncated = OutputFormatter::truncate_value(value, col_widths[i]);
            output.push_str(&format!("{:width$}", truncated, width = col_widths[i]));
            output.push(' ');
            output.push('│');
        }
        output.push('\n');
    }

    border(&mut output, '└', '┴', '┘');

    output
}

/// One-line progress summary shown while a query runs.
pub fn format_progress_line(snapshot: &ProgressSnapshot) -> String {
    format!(
        "{} {:.1}s | scanned {} rows / {} | cpu {:.1}s | peak mem {}",
        snapshot.status,
        snapshot.elapsed_ms as f64 / 1000.0,
        format_count(snapshot.scan_rows),
        format_bytes(snapshot.scan_bytes),
        snapshot.cpu_ms as f64 / 1000.0,
        format_bytes(snapshot.peak_memory_bytes)
    )
}

/// Thousands-separated integer, e.g. 1234567 -> "1,234,567"
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Humanize a byte count, e.g. 52428800 -> "50.0 MB"
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Escape one CSV field (commas, quotes, newlines)
pub fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
