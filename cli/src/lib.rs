//! doris-cmd: terminal client for Apache Doris
//!
//! Interactive SQL sessions with live query progress, Ctrl+C cancellation
//! through the frontend's kill API, script execution, CSV export, and a
//! benchmark mode.

pub mod benchmark;
pub mod config;
pub mod connect;
pub mod error;
pub mod export;
pub mod formatter;
pub mod history;
pub mod parser;
pub mod session;

pub use config::CLIConfiguration;
pub use connect::{create_session, SessionSettings};
pub use error::{CLIError, Result};
pub use session::{CLISession, OutputFormat};
