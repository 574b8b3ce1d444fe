//! Benchmark mode
//!
//! Loads statements from a .sql file or a directory of .sql files, runs
//! them through the engine's benchmark runner, and renders per-statement
//! and summary tables. Ctrl+C aborts the benchmark via the kill path.

use std::path::{Path, PathBuf};

use colored::Colorize;
use doris_link::bench::{self, BenchStatement, BenchmarkReport};
use doris_link::{CancelToken, DorisConnection, DorisLinkError};

use crate::error::{CLIError, Result};
use crate::export;
use crate::formatter::{format_count, render_table};
use crate::parser::split_statements;

/// Width at which SQL text is cut in the queries table
const SQL_PREVIEW_WIDTH: usize = 100;

/// Run the benchmark and print the report.
pub async fn run_benchmark(
    conn: &mut DorisConnection,
    path: &Path,
    times: usize,
    color: bool,
    output: Option<&Path>,
) -> Result<()> {
    if times == 0 {
        return Err(CLIError::ParseError("--times must be at least 1".into()));
    }

    let statements = load_statements(path)?;
    if statements.is_empty() {
        return Err(CLIError::FileError(format!(
            "No statements found under {}",
            path.display()
        )));
    }

    println!(
        "Benchmarking {} statements, {} run(s) each",
        statements.len(),
        times
    );
    println!();

    let cancel = CancelToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = bench::run(conn, &statements, times, &cancel, |statement, record| {
        let timing = if record.succeeded() {
            format!("{:.3}s", record.elapsed.as_secs_f64())
        } else if color {
            "FAILED".red().to_string()
        } else {
            "FAILED".to_string()
        };
        println!(
            "  {} run {}/{}: {}",
            statement.label, record.run, times, timing
        );
    })
    .await;

    watcher.abort();

    match result {
        Ok(report) => {
            println!();
            print_report(&report);
            if let Some(path) = output {
                export::write_benchmark_csv(path, &report)?;
                println!("Report written to {}", path.display());
            }
            Ok(())
        }
        Err(DorisLinkError::Cancelled) => {
            let line = "Benchmark cancelled";
            if color {
                println!("{}", line.yellow());
            } else {
                println!("{}", line);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Load benchmark statements from a file, or from every .sql file in a
/// directory (sorted by name). Labels carry the source file and the
/// 1-based statement index within it.
pub fn load_statements(path: &Path) -> Result<Vec<BenchStatement>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if path.is_dir() {
        for entry in std::fs::read_dir(path)
            .map_err(|e| CLIError::FileError(format!("Failed to read {}: {}", path.display(), e)))?
        {
            let entry = entry.map_err(CLIError::from)?;
            let candidate = entry.path();
            if candidate.extension().and_then(|e| e.to_str()) == Some("sql") {
                files.push(candidate);
            }
        }
        files.sort();
    } else {
        files.push(path.to_path_buf());
    }

    let mut statements = Vec::new();
    for file in &files {
        let script = std::fs::read_to_string(file)
            .map_err(|e| CLIError::FileError(format!("Failed to read {}: {}", file.display(), e)))?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        for (index, text) in split_statements(&script).into_iter().enumerate() {
            statements.push(BenchStatement {
                label: format!("{}:{}", name, index + 1),
                text,
            });
        }
    }
    Ok(statements)
}

/// Render the three report tables: per-statement timings, summary
/// statistics, and the benchmarked SQL.
fn print_report(report: &BenchmarkReport) {
    let mut columns = vec!["No.".to_string(), "Source".to_string()];
    for run in 1..=report.repetitions {
        columns.push(format!("Run {} (s)", run));
    }
    columns.extend(["Min (s)", "Max (s)", "Avg (s)"].map(String::from));

    let mut rows = Vec::with_capacity(report.statements.len());
    for (idx, statement) in report.statements.iter().enumerate() {
        let mut row = vec![(idx + 1).to_string(), statement.label.clone()];
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
            row.push(cell);
        }
        let stats = statement.stats();
        for value in [stats.min, stats.max, stats.avg] {
            row.push(
                value
                    .map(|d| format!("{:.3}", d.as_secs_f64()))
                    .unwrap_or_else(|| "-".to_string()),
            );
        }
        rows.push(row);
    }

    println!("Benchmark Results");
    print!("{}", render_table(&columns, &rows));
    println!();

    let mut stats_rows = vec![
        vec![
            "Total Runtime (s)".to_string(),
            format!("{:.3}", report.total_runtime().as_secs_f64()),
        ],
        vec![
            "Number of Queries".to_string(),
            format_count(report.statement_count() as u64),
        ],
        vec![
            "Total Executions".to_string(),
            format_count(report.total_executions() as u64),
        ],
    ];
    if let Some(p50) = report.p50() {
        stats_rows.push(vec!["P50 (s)".to_string(), format!("{:.3}", p50.as_secs_f64())]);
    }
    if let Some(p95) = report.p95() {
        stats_rows.push(vec!["P95 (s)".to_string(), format!("{:.3}", p95.as_secs_f64())]);
    }

    println!("Statistics");
    print!(
        "{}",
        render_table(
            &["Metric".to_string(), "Value".to_string()],
            &stats_rows
        )
    );
    println!();

    let sql_rows: Vec<Vec<String>> = report
        .statements
        .iter()
        .enumerate()
        .map(|(idx, statement)| {
            vec![
                (idx + 1).to_string(),
                statement.label.clone(),
                preview(&statement.text),
            ]
        })
        .collect();

    println!("SQL Queries");
    print!(
        "{}",
        render_table(
            &["No.".to_string(), "Source".to_string(), "SQL".to_string()],
            &sql_rows
        )
    );
}

/// Collapse whitespace and cut long SQL for the queries table.
fn preview(sql: &str) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > SQL_PREVIEW_WIDTH {
        let cut: String = collapsed.chars().take(SQL_PREVIEW_WIDTH - 3).collect();
        format!("{}...", cut)
    } else {
        collapsed
    }
}
