//! Error types for doris-link
//!
//! Distinguishes connection-level failures, which invalidate the session,
//! from per-statement failures, which leave the session usable.

use std::fmt;

/// Result type for doris-link operations
pub type Result<T> = std::result::Result<T, DorisLinkError>;

/// Error reported by the server for a single statement.
///
/// The session stays usable after one of these; callers can keep issuing
/// statements on the same connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementError {
    /// Server error code (e.g. "1105"), when the server provided one
    pub code: Option<String>,

    /// Human-readable message from the server
    pub message: String,
}

impl fmt::Display for StatementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "ERROR {}: {}", code, self.message),
            None => write!(f, "ERROR: {}", self.message),
        }
    }
}

/// Errors that can occur in doris-link
#[derive(Debug)]
pub enum DorisLinkError {
    /// Transport or session failure; the connection is no longer usable
    Connection(String),

    /// The server rejected one statement; the session survives
    Statement(StatementError),

    /// Invalid client-side configuration
    Configuration(String),

    /// The operation was cancelled before completion
    Cancelled,
}

impl DorisLinkError {
    pub fn statement(message: impl Into<String>) -> Self {
        DorisLinkError::Statement(StatementError {
            code: None,
            message: message.into(),
        })
    }

    /// True when the underlying session cannot be used any further.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DorisLinkError::Connection(_))
    }
}

impl fmt::Display for DorisLinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DorisLinkError::Connection(msg) => write!(f, "Connection error: {}", msg),
            DorisLinkError::Statement(err) => write!(f, "{}", err),
            DorisLinkError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            DorisLinkError::Cancelled => write!(f, "Query cancelled"),
        }
    }
}

impl std::error::Error for DorisLinkError {}

impl From<sqlx::Error> for DorisLinkError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => DorisLinkError::Statement(StatementError {
                code: db.code().map(|c| c.to_string()),
                message: db.message().to_string(),
            }),
            other => DorisLinkError::Connection(other.to_string()),
        }
    }
}

/// Failure to resolve the administrative HTTP endpoint.
///
/// Deliberately separate from [`DorisLinkError`]: resolution failures are
/// always suppressed (queries run without live progress) and must never
/// surface as query errors.
#[derive(Debug, Clone)]
pub struct ResolutionError(pub String);

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint resolution failed: {}", self.0)
    }
}

impl std::error::Error for ResolutionError {}
