//! Configuration file management
//!
//! # Configuration Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"    # Frontend host
//! port = 9030           # MySQL-protocol port
//! user = "root"
//! password = ""
//! database = "tpch"     # optional
//!
//! [http]
//! admin_port = 8030     # optional; skips SHOW FRONTENDS discovery
//!
//! [ui]
//! format = "table"      # table, json, csv
//! color = true
//! progress = true       # live query progress
//! history_size = 1000
//! ```

use doris_link::ConnectionOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CLIError, Result};

/// CLI configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CLIConfiguration {
    /// Server connection settings
    pub server: Option<ServerConfig>,

    /// Admin HTTP settings
    pub http: Option<HttpConfig>,

    /// UI preferences
    pub ui: Option<UIConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Database to select after connecting
    pub database: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Admin HTTP port; when set, endpoint discovery is skipped
    pub admin_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIConfig {
    /// Output format: table, json, csv
    #[serde(default = "default_format")]
    pub format: String,

    /// Enable colored output
    #[serde(default = "default_color")]
    pub color: bool,

    /// Enable live query progress
    #[serde(default = "default_progress")]
    pub progress: bool,

    /// Maximum history size
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9030
}

fn default_user() -> String {
    "root".to_string()
}

fn default_format() -> String {
    "table".to_string()
}

fn default_color() -> bool {
    true
}

fn default_progress() -> bool {
    true
}

fn default_history_size() -> usize {
    1000
}

impl Default for CLIConfiguration {
    fn default() -> Self {
        Self {
            server: Some(ServerConfig {
                host: default_host(),
                port: default_port(),
                user: default_user(),
                password: String::new(),
                database: None,
            }),
            http: None,
            ui: Some(UIConfig {
                format: default_format(),
                color: default_color(),
                progress: default_progress(),
                history_size: default_history_size(),
            }),
        }
    }
}

pub fn expand_config_path(path: &Path) -> PathBuf {
    let path_str = path.to_str().unwrap_or("~/.doris-cmd/config.toml");
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    }
    path.to_path_buf()
}

pub fn default_config_path() -> PathBuf {
    expand_config_path(Path::new("~/.doris-cmd/config.toml"))
}

impl CLIConfiguration {
    /// Load configuration from file
    ///
    /// Returns default configuration if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_config_path(path);
        let path = &expanded_path;

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            CLIError::ConfigurationError(format!("Failed to read config file: {}", e))
        })?;

        let config: CLIConfiguration = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn resolved_server(&self) -> ServerConfig {
        self.server.clone().unwrap_or(ServerConfig {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            database: None,
        })
    }

    pub fn resolved_ui(&self) -> UIConfig {
        self.ui.clone().unwrap_or(UIConfig {
            format: default_format(),
            color: default_color(),
            progress: default_progress(),
            history_size: default_history_size(),
        })
    }

    /// Build ConnectionOptions from configuration, letting command-line
    /// overrides win field by field.
    pub fn to_connection_options(
        &self,
        host: Option<&str>,
        port: Option<u16>,
        user: Option<&str>,
        password: Option<&str>,
        database: Option<&str>,
        admin_port: Option<u16>,
    ) -> ConnectionOptions {
        let server = self.resolved_server();
        ConnectionOptions {
            host: host.map(str::to_string).unwrap_or(server.host),
            port: port.unwrap_or(server.port),
            user: user.map(str::to_string).unwrap_or(server.user),
            password: password.map(str::to_string).unwrap_or(server.password),
            database: database.map(str::to_string).or(server.database),
            admin_port: admin_port.or(self.http.as_ref().and_then(|h| h.admin_port)),
        }
    }
}
