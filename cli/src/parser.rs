//! Command parser for SQL and meta-commands
//!
//! Distinguishes SQL statements from CLI meta-commands (both backslash and
//! word forms) and splits multi-statement input on semicolons outside of
//! string literals.

use std::path::PathBuf;

use crate::error::{CLIError, Result};

/// Parsed command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// SQL statement
    Sql(String),

    /// Meta-commands
    Quit,
    Help,
    Use(String),
    Switch(String),
    Source(PathBuf),
    SetFormat(String),
    Unknown(String),
}

/// Command parser
pub struct CommandParser;

impl CommandParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a complete input line
    pub fn parse(&self, line: &str) -> Result<Command> {
        let trimmed = line.trim().trim_end_matches(';').trim();

        if trimmed.is_empty() {
            return Err(CLIError::ParseError("Empty command".into()));
        }

        if trimmed.starts_with('\\') {
            return self.parse_meta_command(trimmed);
        }

        let first_word = trimmed.split_whitespace().next().unwrap_or("");
        let keyword = first_word.to_ascii_lowercase();
        let rest = trimmed[first_word.len()..].trim();

        match keyword.as_str() {
            "exit" | "quit" if rest.is_empty() => Ok(Command::Quit),
            "help" if rest.is_empty() => Ok(Command::Help),
            "use" if !rest.is_empty() => Ok(Command::Use(rest.to_string())),
            "switch" if !rest.is_empty() => Ok(Command::Switch(rest.to_string())),
            "source" if !rest.is_empty() => Ok(Command::Source(PathBuf::from(rest))),
            _ => Ok(Command::Sql(line.trim().to_string())),
        }
    }

    fn parse_meta_command(&self, line: &str) -> Result<Command> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let command = parts[0];
        let args = parts.get(1..).unwrap_or(&[]);

        match command {
            "\\quit" | "\\q" => Ok(Command::Quit),
            "\\help" | "\\?" => Ok(Command::Help),
            "\\format" => {
                if args.is_empty() {
                    Err(CLIError::ParseError(
                        "\\format requires: table, json, or csv".into(),
                    ))
                } else {
                    Ok(Command::SetFormat(args[0].to_string()))
                }
            }
            "\\source" | "\\i" => {
                if args.is_empty() {
                    Err(CLIError::ParseError("\\source requires a file path".into()))
                } else {
                    Ok(Command::Source(PathBuf::from(args.join(" "))))
                }
            }
            _ => Ok(Command::Unknown(command.to_string())),
        }
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a script into statements on semicolons, honoring single and
/// double quoted strings (with backslash escapes) and stripping `--` line
/// comments. Empty fragments are dropped.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for line in script.lines() {
        // Line comments only count outside of string literals
        let line = if quote.is_none() {
            match line.find("--") {
                Some(pos) if line[..pos].matches(|c| c == '\'' || c == '"').count() % 2 == 0 => {
                    &line[..pos]
                }
                _ => line,
            }
        } else {
            line
        };

        for ch in line.chars() {
            if escaped {
                escaped = false;
                current.push(ch);
                continue;
            }
            match ch {
                '\\' if quote.is_some() => {
                    escaped = true;
                    current.push(ch);
                }
                '\'' | '"' => {
                    match quote {
                        Some(q) if q == ch => quote = None,
                        None => quote = Some(ch),
                        _ => {}
                    }
                    current.push(ch);
                }
                ';' if quote.is_none() => {
                    let stmt = current.trim();
                    if !stmt.is_empty() {
                        statements.push(stmt.to_string());
                    }
                    current.clear();
                }
                _ => current.push(ch),
            }
        }
        current.push('\n');
    }

    let stmt = current.trim();
    if !stmt.is_empty() {
        statements.push(stmt.to_string());
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sql() {
        let parser = CommandParser::new();
        let cmd = parser.parse("SELECT * FROM users").unwrap();
        assert_eq!(cmd, Command::Sql("SELECT * FROM users".to_string()));
    }

    #[test]
    fn test_parse_quit() {
        let parser = CommandParser::new();
        assert_eq!(parser.parse("\\quit").unwrap(), Command::Quit);
        assert_eq!(parser.parse("\\q").unwrap(), Command::Quit);
        assert_eq!(parser.parse("exit").unwrap(), Command::Quit);
        assert_eq!(parser.parse("quit;").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_use() {
        let parser = CommandParser::new();
        assert_eq!(parser.parse("use tpch").unwrap(), Command::Use("tpch".into()));
        assert_eq!(parser.parse("USE tpch;").unwrap(), Command::Use("tpch".into()));
    }

    #[test]
    fn test_parse_switch() {
        let parser = CommandParser::new();
        assert_eq!(
            parser.parse("switch hive_catalog").unwrap(),
            Command::Switch("hive_catalog".into())
        );
    }

    #[test]
    fn test_parse_source() {
        let parser = CommandParser::new();
        assert_eq!(
            parser.parse("source queries.sql").unwrap(),
            Command::Source(PathBuf::from("queries.sql"))
        );
        assert_eq!(
            parser.parse("\\source queries.sql").unwrap(),
            Command::Source(PathBuf::from("queries.sql"))
        );
    }

    #[test]
    fn test_parse_format() {
        let parser = CommandParser::new();
        assert_eq!(
            parser.parse("\\format csv").unwrap(),
            Command::SetFormat("csv".into())
        );
        assert!(parser.parse("\\format").is_err());
    }

    #[test]
    fn test_sql_starting_with_keyword_prefix_is_sql() {
        let parser = CommandParser::new();
        // "user" is not "use"
        let cmd = parser.parse("SELECT user()").unwrap();
        assert_eq!(cmd, Command::Sql("SELECT user()".to_string()));
    }

    #[test]
    fn test_parse_unknown_meta() {
        let parser = CommandParser::new();
        assert_eq!(
            parser.parse("\\nope").unwrap(),
            Command::Unknown("\\nope".into())
        );
    }

    #[test]
    fn test_empty_command() {
        let parser = CommandParser::new();
        assert!(parser.parse("").is_err());
        assert!(parser.parse("   ").is_err());
        assert!(parser.parse(" ; ").is_err());
    }

    #[test]
    fn test_split_simple() {
        let stmts = split_statements("SELECT 1; SELECT 2;");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_split_ignores_semicolons_in_strings() {
        let stmts = split_statements("SELECT 'a;b'; SELECT \";\" FROM t;");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "SELECT 'a;b'");
        assert_eq!(stmts[1], "SELECT \";\" FROM t");
    }

    #[test]
    fn test_split_handles_escaped_quotes() {
        let stmts = split_statements(r"SELECT 'it\'s; fine'; SELECT 2;");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], r"SELECT 'it\'s; fine'");
    }

    #[test]
    fn test_split_strips_line_comments() {
        let script = "-- warm-up\nSELECT 1; -- trailing\nSELECT 2;";
        let stmts = split_statements(script);
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_split_keeps_multiline_statements() {
        let script = "SELECT a,\n       b\nFROM t\nWHERE x = 1;";
        let stmts = split_statements(script);
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].contains("FROM t"));
    }

    #[test]
    fn test_split_without_trailing_semicolon() {
        let stmts = split_statements("SELECT 1");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }
}
