//! doris-link: client engine for Apache Doris
//!
//! Provides the pieces a terminal client needs on top of the MySQL wire
//! protocol: single-session statement execution, client-assigned query
//! identifiers, live progress polled from the frontend's admin HTTP API,
//! cooperative cancellation, and benchmark runs with aggregation.

pub mod admin;
pub mod bench;
pub mod cancel;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod models;
pub mod progress;

pub use admin::{AdminApi, AdminClient, AdminError};
pub use cancel::CancelToken;
pub use connection::{ConnectionOptions, DorisConnection};
pub use error::{DorisLinkError, ResolutionError, Result, StatementError};
pub use executor::StatementChannel;
pub use models::{
    AdminEndpoint, FrontendNode, ProgressSnapshot, QueryOutcome, QueryStatus, ResultSet,
};
pub use progress::{LiveProgress, NoProgress, OnUpdate, ProgressMonitor, ProgressPoller};
