//! Command history persistence
//!
//! Statements entered interactively are kept in `~/.doris-cmd/history`,
//! one per line, and reloaded into the line editor on the next session.

use std::path::{Path, PathBuf};

use crate::error::{CLIError, Result};

pub struct CommandHistory {
    file: PathBuf,

    /// Oldest entries beyond this count are discarded
    max_entries: usize,
}

impl CommandHistory {
    pub fn new(max_entries: usize) -> Self {
        let file = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".doris-cmd")
            .join("history");
        Self { file, max_entries }
    }

    pub fn with_path<P: AsRef<Path>>(path: P, max_entries: usize) -> Self {
        Self {
            file: path.as_ref().to_path_buf(),
            max_entries,
        }
    }

    /// Entries in oldest-first order, truncated to the newest
    /// `max_entries`. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<String>> {
        if !self.file.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.file)
            .map_err(|e| CLIError::HistoryError(format!("Failed to read history: {}", e)))?;

        let mut entries: Vec<String> = contents.lines().map(str::to_string).collect();
        if entries.len() > self.max_entries {
            entries.drain(..entries.len() - self.max_entries);
        }
        Ok(entries)
    }

    pub fn save(&self, entries: &[String]) -> Result<()> {
        if let Some(parent) = self.file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let skip = entries.len().saturating_sub(self.max_entries);
        std::fs::write(&self.file, entries[skip..].join("\n"))
            .map_err(|e| CLIError::HistoryError(format!("Failed to write history: {}", e)))
    }

    /// Record one statement, skipping blanks and immediate repeats.
    pub fn append(&self, statement: &str) -> Result<()> {
        if statement.trim().is_empty() {
            return Ok(());
        }
        let mut entries = self.load()?;
        if entries.last().map(String::as_str) == Some(statement) {
            return Ok(());
        }
        entries.push(statement.to_string());
        self.save(&entries)
    }
}
