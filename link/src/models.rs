//! Data models shared across the client engine

use std::fmt;
use std::time::Duration;

use crate::error::StatementError;

/// Lifecycle state of a query as reported by the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl QueryStatus {
    /// Parse the status string used by the query profile API.
    ///
    /// Unknown values are treated as still running so that polling keeps
    /// going rather than stopping on a state we do not recognize.
    pub fn parse(value: &str) -> QueryStatus {
        match value.trim().to_uppercase().as_str() {
            "FINISHED" | "OK" | "EOF" => QueryStatus::Finished,
            "FAILED" | "ERROR" => QueryStatus::Failed,
            "CANCELLED" | "CANCELED" | "KILLED" => QueryStatus::Cancelled,
            _ => QueryStatus::Running,
        }
    }

    /// Terminal states end progress polling.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, QueryStatus::Running)
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryStatus::Running => "RUNNING",
            QueryStatus::Finished => "FINISHED",
            QueryStatus::Failed => "FAILED",
            QueryStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// Point-in-time view of a running query's resource consumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub status: QueryStatus,

    /// Time since execution started, stamped by the poller
    pub elapsed_ms: u64,

    pub scan_rows: u64,
    pub scan_bytes: u64,
    pub cpu_ms: u64,
    pub peak_memory_bytes: u64,
}

/// Rows and metadata produced by one statement.
///
/// All values are carried as display strings; `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,

    /// Affected-row count for DML statements without a result set
    pub rows_affected: u64,
}

impl ResultSet {
    /// Find a column index by name, ignoring case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Final account of one executed statement.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub status: QueryStatus,

    /// Present when the statement finished and produced (or affected) rows
    pub result: Option<ResultSet>,

    /// Present when the server rejected the statement
    pub error: Option<StatementError>,

    /// Identifier the query ran under, when one was assigned in time
    pub query_id: Option<String>,

    /// Wall-clock duration of the protocol call
    pub elapsed: Duration,

    /// Last progress snapshot observed while the query ran
    pub progress: Option<ProgressSnapshot>,
}

/// One row of `SHOW FRONTENDS` that matters to endpoint resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendNode {
    pub host: String,
    pub http_port: u16,
}

/// Administrative HTTP endpoint of the connected frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminEndpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for AdminEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(QueryStatus::parse("FINISHED"), QueryStatus::Finished);
        assert_eq!(QueryStatus::parse("finished"), QueryStatus::Finished);
        assert_eq!(QueryStatus::parse("CANCELLED"), QueryStatus::Cancelled);
        assert_eq!(QueryStatus::parse("KILLED"), QueryStatus::Cancelled);
        assert_eq!(QueryStatus::parse("FAILED"), QueryStatus::Failed);
        assert_eq!(QueryStatus::parse("RUNNING"), QueryStatus::Running);
        // Unknown states keep the poller alive
        assert_eq!(QueryStatus::parse("QUEUED"), QueryStatus::Running);
        assert_eq!(QueryStatus::parse(""), QueryStatus::Running);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!QueryStatus::Running.is_terminal());
        assert!(QueryStatus::Finished.is_terminal());
        assert!(QueryStatus::Failed.is_terminal());
        assert!(QueryStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_column_index_ignores_case() {
        let rs = ResultSet {
            columns: vec!["Host".into(), "HttpPort".into()],
            rows: vec![],
            rows_affected: 0,
        };
        assert_eq!(rs.column_index("host"), Some(0));
        assert_eq!(rs.column_index("HTTPPORT"), Some(1));
        assert_eq!(rs.column_index("QueryPort"), None);
    }
}
