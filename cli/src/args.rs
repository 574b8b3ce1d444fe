use clap::Parser;
use doris_cmd::OutputFormat;
use std::path::PathBuf;

/// doris-cmd - Terminal client for Apache Doris
#[derive(Parser, Debug)]
#[command(name = "doris-cmd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Interactive SQL terminal for Apache Doris", long_about = None)]
pub struct Cli {
    /// Frontend host address
    #[arg(short = 'H', long = "host")]
    pub host: Option<String>,

    /// Frontend MySQL-protocol port (default: 9030)
    #[arg(short = 'P', long = "port")]
    pub port: Option<u16>,

    /// User name
    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,

    /// Password (empty by default)
    #[arg(short = 'p', long = "password", num_args = 0..=1, default_missing_value = "")]
    pub password: Option<String>,

    /// Database to select after connecting
    #[arg(short = 'D', long = "database")]
    pub database: Option<String>,

    /// Frontend admin HTTP port; skips SHOW FRONTENDS discovery
    #[arg(long = "http-port")]
    pub http_port: Option<u16>,

    /// Execute SQL (semicolon-separated) and exit
    #[arg(short = 'e', long = "execute", value_name = "SQL")]
    pub execute: Option<String>,

    /// Execute SQL from file and exit
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// Benchmark the statements in a .sql file or directory
    #[arg(long = "benchmark", value_name = "PATH")]
    pub benchmark: Option<PathBuf>,

    /// Repetitions per statement in benchmark mode
    #[arg(long = "times", default_value_t = 1)]
    pub times: usize,

    /// Write query results (CSV) or the benchmark report to this file
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(long = "format")]
    pub format: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Disable live query progress reporting
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    /// Configuration file path (default: ~/.doris-cmd/config.toml)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}
