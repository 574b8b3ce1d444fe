//! Connection establishment

use std::path::PathBuf;

use doris_link::{ConnectionOptions, DorisConnection};
use log::debug;

use crate::config::CLIConfiguration;
use crate::error::Result;
use crate::session::{CLISession, OutputFormat};

/// Display and output preferences resolved from flags and config.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub format: OutputFormat,
    pub color: bool,
    pub progress: bool,
    pub output: Option<PathBuf>,
}

/// Open the connection and build a session around it.
pub async fn create_session(
    config: CLIConfiguration,
    options: ConnectionOptions,
    settings: SessionSettings,
) -> Result<CLISession> {
    if !settings.color {
        colored::control::set_override(false);
    }

    debug!(
        "connecting to {}:{} as {}",
        options.host, options.port, options.user
    );
    let conn = DorisConnection::connect(options).await?;

    Ok(CLISession::new(
        conn,
        config,
        settings.format,
        settings.color,
        settings.progress,
        settings.output,
    ))
}
