//! Interactive CLI session
//!
//! Owns the connection, the readline loop, statement dispatch, spinner and
//! progress rendering, and the Ctrl+C/SIGTERM wiring. Ctrl+C during a
//! running statement cancels that statement; at the prompt it clears the
//! input line. SIGTERM ends the session after the current statement.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use colored::Colorize;
use doris_link::progress::OnUpdate;
use doris_link::{CancelToken, DorisConnection, ProgressSnapshot, QueryStatus};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;

use crate::{
    config::CLIConfiguration,
    error::{CLIError, Result},
    export,
    formatter::{self, OutputFormatter},
    history::CommandHistory,
    parser::{split_statements, Command, CommandParser},
};

/// Output format for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }
}

/// CLI session state
pub struct CLISession {
    /// Live connection to the frontend
    conn: DorisConnection,

    /// Command parser
    parser: CommandParser,

    /// Output formatter
    formatter: OutputFormatter,

    /// CLI configuration
    config: CLIConfiguration,

    /// Enable colored output
    color: bool,

    /// Enable live query progress
    progress: bool,

    /// CSV file results are appended to
    output_file: Option<PathBuf>,

    /// Tripped by SIGTERM; ends the session after the current statement
    terminate: CancelToken,

    /// Session start time
    connected_at: Instant,

    /// Number of queries executed in this session
    queries_executed: u64,
}

impl CLISession {
    pub fn new(
        conn: DorisConnection,
        config: CLIConfiguration,
        format: OutputFormat,
        color: bool,
        progress: bool,
        output_file: Option<PathBuf>,
    ) -> Self {
        Self {
            conn,
            parser: CommandParser::new(),
            formatter: OutputFormatter::new(format, color),
            config,
            color,
            progress,
            output_file,
            terminate: CancelToken::new(),
            connected_at: Instant::now(),
            queries_executed: 0,
        }
    }

    /// Token tripped to end the session (wired to SIGTERM by main).
    pub fn terminate_token(&self) -> CancelToken {
        self.terminate.clone()
    }

    pub fn connection(&mut self) -> &mut DorisConnection {
        &mut self.conn
    }

    pub fn color(&self) -> bool {
        self.color
    }

    /// Run the interactive readline loop.
    pub async fn run_interactive(&mut self) -> Result<()> {
        self.print_banner();

        let history = CommandHistory::new(self.config.resolved_ui().history_size);
        let mut rl: Editor<(), DefaultHistory> =
            Editor::new().map_err(CLIError::from)?;
        for entry in history.load()? {
            let _ = rl.add_history_entry(entry);
        }

        let mut buffer = String::new();
        loop {
            if self.terminate.is_cancelled() {
                break;
            }

            let prompt = if buffer.is_empty() {
                format!("{}> ", self.conn.current_database().unwrap_or("doris"))
            } else {
                "    -> ".to_string()
            };

            match rl.readline(&prompt) {
                Ok(line) => {
                    if buffer.is_empty() && line.trim().is_empty() {
                        continue;
                    }
                    if !buffer.is_empty() {
                        buffer.push('\n');
                    }
                    buffer.push_str(&line);

                    if !input_complete(&buffer) {
                        continue;
                    }

                    let input = std::mem::take(&mut buffer);
                    let _ = rl.add_history_entry(input.trim());
                    let _ = history.append(input.trim());

                    if !self.handle_input(&input).await? {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C at the prompt abandons the current input
                    buffer.clear();
                    println!("^C");
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        debug!(
            "session ended after {:?}, {} queries executed",
            self.uptime(),
            self.queries_executed()
        );
        println!("Bye");
        Ok(())
    }

    /// Execute a semicolon-separated script non-interactively.
    pub async fn execute_batch(&mut self, script: &str) -> Result<()> {
        for statement in split_statements(script) {
            if !self.handle_input(&statement).await? {
                break;
            }
            if self.terminate.is_cancelled() {
                break;
            }
        }
        Ok(())
    }

    /// Execute a script file.
    pub async fn execute_file(&mut self, path: &Path) -> Result<()> {
        let script = std::fs::read_to_string(path)
            .map_err(|e| CLIError::FileError(format!("Failed to read {}: {}", path.display(), e)))?;
        self.execute_batch(&script).await
    }

    /// Parse and dispatch one complete input. Returns false to end the
    /// session. Statement errors are printed, not propagated; a lost
    /// connection triggers one reconnect attempt.
    async fn handle_input(&mut self, input: &str) -> Result<bool> {
        let command = match self.parser.parse(input) {
            Ok(command) => command,
            Err(e) => {
                self.print_error(&e);
                return Ok(true);
            }
        };

        match self.dispatch(command).await {
            Ok(keep_going) => Ok(keep_going),
            Err(e) if e.is_connection_loss() => {
                self.print_error(&e);
                eprintln!("Attempting to reconnect...");
                match self.conn.reconnect().await {
                    Ok(()) => {
                        // Verify the fresh session before handing the
                        // prompt back.
                        self.conn.ping().await?;
                        println!("Reconnected. Re-run the last statement if needed.");
                        Ok(true)
                    }
                    Err(re) => Err(CLIError::from(re)),
                }
            }
            Err(e) => {
                self.print_error(&e);
                Ok(true)
            }
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Quit => return Ok(false),
            Command::Help => self.print_help(),
            Command::Use(database) => {
                self.conn.use_database(&database).await?;
                println!("Database changed");
            }
            Command::Switch(catalog) => {
                self.conn.switch_catalog(&catalog).await?;
                println!("Catalog changed");
            }
            Command::Source(path) => {
                let script = std::fs::read_to_string(&path).map_err(|e| {
                    CLIError::FileError(format!("Failed to read {}: {}", path.display(), e))
                })?;
                for statement in split_statements(&script) {
                    self.run_sql(&statement).await?;
                    if self.terminate.is_cancelled() {
                        break;
                    }
                }
            }
            Command::SetFormat(value) => match OutputFormat::parse(&value) {
                Some(format) => {
                    self.formatter.set_format(format);
                    println!("Output format: {}", value.to_lowercase());
                }
                None => {
                    return Err(CLIError::FormatError(format!(
                        "Unknown format '{}' (expected table, json, or csv)",
                        value
                    )))
                }
            },
            Command::Unknown(cmd) => {
                return Err(CLIError::ParseError(format!(
                    "Unknown command: {} (try \\help)",
                    cmd
                )))
            }
            Command::Sql(sql) => {
                for statement in split_statements(&sql) {
                    self.run_sql(&statement).await?;
                }
            }
        }
        Ok(true)
    }

    /// Run one SQL statement with cancellation and live progress.
    async fn run_sql(&mut self, sql: &str) -> Result<()> {
        self.queries_executed += 1;
        let cancel = CancelToken::new();

        // Ctrl+C cancels the running statement; SIGTERM cancels it and
        // then ends the session.
        let watcher = {
            let cancel = cancel.clone();
            let terminate = self.terminate.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        res = tokio::signal::ctrl_c() => {
                            if res.is_err() {
                                break;
                            }
                            cancel.cancel();
                        }
                        _ = terminate.cancelled() => {
                            cancel.cancel();
                            break;
                        }
                    }
                }
            })
        };

        let spinner = if self.progress {
            Some(Self::create_spinner())
        } else {
            None
        };
        let on_update: Option<OnUpdate> = spinner.as_ref().map(|pb| {
            let pb = pb.clone();
            Arc::new(move |snapshot: &ProgressSnapshot| {
                pb.set_message(formatter::format_progress_line(snapshot));
            }) as OnUpdate
        });

        let result = self.conn.execute(sql, &cancel, on_update).await;

        watcher.abort();
        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }

        let outcome = result?;
        debug!(
            "statement finished: status={} id={:?} elapsed={:?}",
            outcome.status, outcome.query_id, outcome.elapsed
        );

        let output = self.formatter.format_outcome(&outcome)?;
        println!("{}", output);

        if let (Some(path), QueryStatus::Finished, Some(result)) =
            (&self.output_file, outcome.status, &outcome.result)
        {
            if !result.columns.is_empty() {
                export::write_result_csv(path, result)?;
                println!("Appended {} rows to {}", result.rows.len(), path.display());
            }
        }

        Ok(())
    }

    fn print_banner(&self) {
        let version = self
            .conn
            .server_version()
            .unwrap_or("unknown version")
            .to_string();
        let endpoint = format!("{}:{}", self.conn.host(), self.conn.port());
        if self.color {
            println!(
                "Connected to {} ({})",
                endpoint.cyan().bold(),
                version.dimmed()
            );
        } else {
            println!("Connected to {} ({})", endpoint, version);
        }
        println!("Type \\help for help, \\q to quit.");
        println!();
    }

    fn print_help(&self) {
        println!("Commands:");
        println!("  \\q, \\quit, exit      Quit the session");
        println!("  \\?, \\help            Show this help");
        println!("  \\format <fmt>        Set output format: table, json, csv");
        println!("  \\source <file>       Run statements from a file");
        println!("  use <db>             Select a database");
        println!("  switch <catalog>     Switch catalogs");
        println!();
        println!("End SQL statements with ';'. Ctrl+C cancels a running query.");
    }

    fn print_error(&self, err: &CLIError) {
        if self.color {
            eprintln!("{}", err.to_string().red());
        } else {
            eprintln!("{}", err);
        }
    }

    /// Create a spinner for long-running operations
    fn create_spinner() -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Executing query...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Seconds since the session connected.
    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn queries_executed(&self) -> u64 {
        self.queries_executed
    }
}

/// An input is complete when it is a meta-command, a bare word command, or
/// SQL terminated with a semicolon.
fn input_complete(buffer: &str) -> bool {
    let trimmed = buffer.trim();
    if trimmed.starts_with('\\') || trimmed.ends_with(';') {
        return true;
    }
    matches!(
        trimmed.to_ascii_lowercase().as_str(),
        "exit" | "quit" | "help"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!(OutputFormat::parse("table"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse(" csv "), Some(OutputFormat::Csv));
        assert_eq!(OutputFormat::parse("xml"), None);
    }

    #[test]
    fn test_input_complete() {
        assert!(input_complete("SELECT 1;"));
        assert!(input_complete("\\help"));
        assert!(input_complete("exit"));
        assert!(input_complete("QUIT"));
        assert!(!input_complete("SELECT 1"));
        assert!(!input_complete("SELECT a,"));
    }
}
