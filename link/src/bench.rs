//! Benchmark execution and aggregation
//!
//! Runs a list of statements N times each over a single session, records
//! per-run wall-clock durations, and aggregates per-statement and
//! cross-statement statistics. Failed runs stay in the report as error
//! markers; a cancelled run aborts the whole benchmark.

use std::time::Duration;

use log::{debug, warn};

use crate::cancel::CancelToken;
use crate::connection::DorisConnection;
use crate::error::{DorisLinkError, Result};
use crate::executor::StatementChannel;
use crate::models::QueryStatus;

/// One statement queued for benchmarking.
#[derive(Debug, Clone)]
pub struct BenchStatement {
    /// Display label, e.g. a file name or `queries.sql:3`
    pub label: String,
    pub text: String,
}

/// Outcome of a single run of one statement.
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// 1-based run number
    pub run: usize,

    /// Wall-clock duration of the run, measured for failures too
    pub elapsed: Duration,

    /// Error marker for failed runs; `None` means success
    pub error: Option<String>,
}

impl RunRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// All runs of one statement.
#[derive(Debug, Clone)]
pub struct StatementRuns {
    pub label: String,
    pub text: String,
    pub runs: Vec<RunRecord>,
}

/// Per-statement aggregates over successful runs only.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementStats {
    pub min: Option<Duration>,
    pub max: Option<Duration>,
    pub avg: Option<Duration>,
    pub successes: usize,
    pub failures: usize,
}

impl StatementRuns {
    pub fn stats(&self) -> StatementStats {
        let successful: Vec<Duration> = self
            .runs
            .iter()
            .filter(|r| r.succeeded())
            .map(|r| r.elapsed)
            .collect();
        let failures = self.runs.len() - successful.len();

        if successful.is_empty() {
            return StatementStats {
                min: None,
                max: None,
                avg: None,
                successes: 0,
                failures,
            };
        }

        let min = successful.iter().min().copied();
        let max = successful.iter().max().copied();
        let total: f64 = successful.iter().map(|d| d.as_secs_f64()).sum();
        let avg = Some(Duration::from_secs_f64(total / successful.len() as f64));

        StatementStats {
            min,
            max,
            avg,
            successes: successful.len(),
            failures,
        }
    }
}

/// Complete benchmark results.
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub statements: Vec<StatementRuns>,
    pub repetitions: usize,

    /// RFC 3339 timestamp of when the benchmark started
    pub started_at: String,
}

impl BenchmarkReport {
    /// Number of distinct benchmarked statements (setup statements such as
    /// `USE` are not counted).
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Total executions, failed runs included.
    pub fn total_executions(&self) -> usize {
        self.statements.iter().map(|s| s.runs.len()).sum()
    }

    /// Sum of all run durations, failed runs included.
    pub fn total_runtime(&self) -> Duration {
        self.statements
            .iter()
            .flat_map(|s| s.runs.iter())
            .map(|r| r.elapsed)
            .sum()
    }

    /// Per-statement average durations, for statements with at least one
    /// successful run. These are the inputs to the percentiles.
    pub fn representative_durations(&self) -> Vec<Duration> {
        self.statements
            .iter()
            .filter_map(|s| s.stats().avg)
            .collect()
    }

    pub fn p50(&self) -> Option<Duration> {
        self.percentile(0.50)
    }

    pub fn p95(&self) -> Option<Duration> {
        self.percentile(0.95)
    }

    fn percentile(&self, pct: f64) -> Option<Duration> {
        let mut durations = self.representative_durations();
        durations.sort();
        nearest_rank(&durations, pct)
    }
}

/// Nearest-rank percentile over an ascending-sorted slice.
fn nearest_rank(sorted: &[Duration], pct: f64) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }
    let idx = ((sorted.len() as f64) * pct) as usize;
    Some(sorted[idx.min(sorted.len() - 1)])
}

/// Run the whole benchmark on one session.
///
/// `observe` is called after every timed run, for live reporting.
/// Statements starting with `USE` or `SWITCH` are executed once, untimed,
/// as session setup. A cancelled run aborts the benchmark with
/// [`DorisLinkError::Cancelled`]; statement failures are recorded and the
/// benchmark continues.
pub async fn run(
    conn: &mut DorisConnection,
    statements: &[BenchStatement],
    times: usize,
    cancel: &CancelToken,
    mut observe: impl FnMut(&BenchStatement, &RunRecord),
) -> Result<BenchmarkReport> {
    let started_at = chrono::Utc::now().to_rfc3339();
    let mut report_statements = Vec::new();

    for statement in statements {
        if is_setup_statement(&statement.text) {
            debug!("running setup statement untimed: {}", statement.text);
            match conn.run_statement(&statement.text).await {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("setup statement failed: {}", e),
            }
            continue;
        }

        let mut runs = Vec::with_capacity(times);
        for run_no in 1..=times {
            let outcome = conn.execute(&statement.text, cancel, None).await?;
            let record = match outcome.status {
                QueryStatus::Cancelled => return Err(DorisLinkError::Cancelled),
                QueryStatus::Failed => RunRecord {
                    run: run_no,
                    elapsed: outcome.elapsed,
                    error: Some(
                        outcome
                            .error
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "unknown error".to_string()),
                    ),
                },
                _ => RunRecord {
                    run: run_no,
                    elapsed: outcome.elapsed,
                    error: None,
                },
            };
            observe(statement, &record);
            runs.push(record);
        }

        report_statements.push(StatementRuns {
            label: statement.label.clone(),
            text: statement.text.clone(),
            runs,
        });
    }

    Ok(BenchmarkReport {
        statements: report_statements,
        repetitions: times,
        started_at,
    })
}

fn is_setup_statement(sql: &str) -> bool {
    let lowered = sql.trim_start().to_lowercase();
    lowered.starts_with("use ") || lowered.starts_with("switch ")
}
