//! CSV export of query results and benchmark reports

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use doris_link::bench::BenchmarkReport;
use doris_link::ResultSet;

use crate::error::{CLIError, Result};
use crate::formatter::csv_escape;

/// Append one result set to a CSV file. The header row is written only
/// when the file starts empty, so batch runs can accumulate rows.
pub fn write_result_csv(path: &Path, result: &ResultSet) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| CLIError::FileError(format!("Failed to open {}: {}", path.display(), e)))?;

    let write_header = file
        .metadata()
        .map(|m| m.len() == 0)
        .unwrap_or(true);

    let mut output = String::new();
    if write_header && !result.columns.is_empty() {
        output.push_str(
            &result
                .columns
                .iter()
                .map(|c| csv_escape(c))
                .collect::<Vec<_>>()
                .join(","),
        );
        output.push('\n');
    }
    for row in &result.rows {
        let values: Vec<String> = row
            .iter()
            .map(|v| csv_escape(v.as_deref().unwrap_or("")))
            .collect();
        output.push_str(&values.join(","));
        output.push('\n');
    }

    file.write_all(output.as_bytes())
        .map_err(|e| CLIError::FileError(format!("Failed to write {}: {}", path.display(), e)))?;
    Ok(())
}

/// Write a benchmark report as CSV: one row per statement with per-run
/// durations and aggregates, then a summary block.
pub fn write_benchmark_csv(path: &Path, report: &BenchmarkReport) -> Result<()> {
    let mut output = String::new();

    let mut header = vec!["source".to_string(), "query".to_string()];
    for run in 1..=report.repetitions {
        header.push(format!("run{}_s", run));
    }
    header.extend(["min_s", "max_s", "avg_s"].map(String::from));
    output.push_str(&header.join(","));
    output.push('\n');

    for statement in &report.statements {
        let mut fields = vec![csv_escape(&statement.label), csv_escape(&statement.text)];
        for run in 1..=report.repetitions {
            let cell = statement
                .runs
                .iter()
                .find(|r| r.run == run)
                .map(|r| {
                    if r.succeeded() {
                        format!("{:.3}", r.elapsed.as_secs_f64())
                    } else {
                        "FAILED".to_string()
                    }
                })
                .unwrap_or_default();
            fields.push(cell);
        }
        let stats = statement.stats();
        for value in [stats.min, stats.max, stats.avg] {
            fields.push(
                value
                    .map(|d| format!("{:.3}", d.as_secs_f64()))
                    .unwrap_or_default(),
            );
        }
        output.push_str(&fields.join(","));
        output.push('\n');
    }

    output.push('\n');
    output.push_str(&format!("started_at,{}\n", csv_escape(&report.started_at)));
    output.push_str(&format!(
        "total_runtime_s,{:.3}\n",
        report.total_runtime().as_secs_f64()
    ));
    output.push_str(&format!("statements,{}\n", report.statement_count()));
    output.push_str(&format!("executions,{}\n", report.total_executions()));
    if let Some(p50) = report.p50() {
        output.push_str(&format!("p50_s,{:.3}\n", p50.as_secs_f64()));
    }
    if let Some(p95) = report.p95() {
        output.push_str(&format!("p95_s,{:.3}\n", p95.as_secs_f64()));
    }

    std::fs::write(path, output)
        .map_err(|e| CLIError::FileError(format!("Failed to write {}: {}", path.display(), e)))?;
    Ok(())
}
