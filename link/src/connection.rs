//! Session management over the MySQL wire protocol
//!
//! A [`DorisConnection`] owns exactly one wire session. The borrow checker
//! enforces the protocol's non-reentrancy: every operation takes `&mut
//! self`, so a second statement cannot start while one is in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::debug;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Either, Executor, Row, ValueRef};

use crate::admin::AdminClient;
use crate::cancel::CancelToken;
use crate::error::{DorisLinkError, Result};
use crate::executor::{self, StatementChannel};
use crate::models::{AdminEndpoint, FrontendNode, QueryOutcome, ResultSet};
use crate::endpoint;
use crate::progress::{LiveProgress, NoProgress, OnUpdate, ProgressMonitor};

/// Settings needed to open a session.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: Option<String>,

    /// Explicit admin HTTP port; skips discovery when set
    pub admin_port: Option<u16>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9030,
            user: "root".to_string(),
            password: String::new(),
            database: None,
            admin_port: None,
        }
    }
}

/// One live session against a frontend.
pub struct DorisConnection {
    session: MySqlConnection,
    options: ConnectionOptions,
    database: Option<String>,
    admin: AdminClient,
    admin_endpoint: Option<AdminEndpoint>,
    version: Option<String>,
}

impl DorisConnection {
    /// Open a session and probe the server version.
    pub async fn connect(options: ConnectionOptions) -> Result<Self> {
        let session = Self::open(&options).await?;
        let admin = AdminClient::new(&options.user, &options.password)?;
        let mut conn = Self {
            session,
            database: options.database.clone(),
            options,
            admin,
            admin_endpoint: None,
            version: None,
        };
        conn.version = conn.probe_version().await;
        Ok(conn)
    }

    async fn open(options: &ConnectionOptions) -> Result<MySqlConnection> {
        let mut connect = MySqlConnectOptions::new()
            .host(&options.host)
            .port(options.port)
            .username(&options.user)
            .password(&options.password);
        if let Some(db) = &options.database {
            connect = connect.database(db);
        }
        connect
            .connect()
            .await
            .map_err(|e| DorisLinkError::Connection(e.to_string()))
    }

    pub fn host(&self) -> &str {
        &self.options.host
    }

    pub fn port(&self) -> u16 {
        self.options.port
    }

    pub fn user(&self) -> &str {
        &self.options.user
    }

    pub fn configured_admin_port(&self) -> Option<u16> {
        self.options.admin_port
    }

    /// Database last selected with `USE`, if any.
    pub fn current_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Server version string, when the probe succeeded.
    pub fn server_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Cheap liveness check.
    pub async fn ping(&mut self) -> Result<()> {
        self.session
            .ping()
            .await
            .map_err(|e| DorisLinkError::Connection(e.to_string()))
    }

    /// Tear down the wire session and open a fresh one, keeping the
    /// currently selected database.
    pub async fn reconnect(&mut self) -> Result<()> {
        let mut options = self.options.clone();
        options.database = self.database.clone();
        let fresh = Self::open(&options).await?;
        let old = std::mem::replace(&mut self.session, fresh);
        let _ = old.close().await;
        debug!("session re-established to {}:{}", self.options.host, self.options.port);
        Ok(())
    }

    /// Select a database and remember it for reconnects.
    pub async fn use_database(&mut self, database: &str) -> Result<()> {
        self.run_statement(&format!("USE {}", database)).await?;
        self.database = Some(database.to_string());
        Ok(())
    }

    /// Switch catalogs (multi-catalog deployments).
    pub async fn switch_catalog(&mut self, catalog: &str) -> Result<()> {
        self.run_statement(&format!("SWITCH {}", catalog)).await?;
        // Catalog switches reset the database selection server-side
        self.database = None;
        Ok(())
    }

    /// Frontends currently registered with the cluster.
    pub async fn list_frontends(&mut self) -> Result<Vec<FrontendNode>> {
        let result = self.run_statement("SHOW FRONTENDS").await?;
        let host_idx = result
            .column_index("Host")
            .ok_or_else(|| DorisLinkError::statement("SHOW FRONTENDS has no Host column"))?;
        let port_idx = result
            .column_index("HttpPort")
            .ok_or_else(|| DorisLinkError::statement("SHOW FRONTENDS has no HttpPort column"))?;

        let mut nodes = Vec::with_capacity(result.rows.len());
        for row in &result.rows {
            let host = row.get(host_idx).and_then(|v| v.clone());
            let port = row
                .get(port_idx)
                .and_then(|v| v.as_deref())
                .and_then(|v| v.parse::<u16>().ok());
            if let (Some(host), Some(http_port)) = (host, port) {
                nodes.push(FrontendNode { host, http_port });
            }
        }
        Ok(nodes)
    }

    /// Resolve the admin HTTP endpoint, caching the first successful
    /// answer for the connection's lifetime. A failed resolution is not
    /// cached: the next statement retries discovery.
    pub async fn admin_endpoint(&mut self) -> Option<AdminEndpoint> {
        if let Some(ep) = &self.admin_endpoint {
            return Some(ep.clone());
        }
        let resolved = endpoint::resolve(self).await;
        endpoint::cache_resolution(&mut self.admin_endpoint, resolved)
    }

    /// Execute one statement with cancellation support and, when an
    /// observer is supplied and the admin endpoint is known, live progress.
    pub async fn execute(
        &mut self,
        sql: &str,
        cancel: &CancelToken,
        on_update: Option<OnUpdate>,
    ) -> Result<QueryOutcome> {
        let endpoint = self.admin_endpoint().await;
        let admin = self.admin.clone();
        let mut monitor: Box<dyn ProgressMonitor> = match (&endpoint, on_update) {
            (Some(_), Some(on_update)) => Box::new(LiveProgress::new(
                std::sync::Arc::new(admin.clone()),
                on_update,
            )),
            _ => Box::new(NoProgress),
        };

        executor::execute(
            self,
            &admin,
            endpoint.as_ref(),
            sql,
            cancel,
            monitor.as_mut(),
        )
        .await
    }

    async fn probe_version(&mut self) -> Option<String> {
        match self.run_statement("SHOW VARIABLES LIKE 'version_comment'").await {
            Ok(result) => result
                .rows
                .first()
                .and_then(|row| row.get(1))
                .and_then(|v| v.clone()),
            Err(e) => {
                debug!("version probe failed: {}", e);
                None
            }
        }
    }

    async fn run(&mut self, sql: &str) -> Result<ResultSet> {
        let mut result = ResultSet::default();
        let mut stream = (&mut self.session).fetch_many(sql);

        while let Some(step) = stream.try_next().await.map_err(DorisLinkError::from)? {
            match step {
                Either::Left(done) => {
                    result.rows_affected += done.rows_affected();
                }
                Either::Right(row) => {
                    if result.columns.is_empty() {
                        result.columns = row
                            .columns()
                            .iter()
                            .map(|c| c.name().to_string())
                            .collect();
                    }
                    let width = row.columns().len();
                    let mut values = Vec::with_capacity(width);
                    for idx in 0..width {
                        values.push(decode_value(&row, idx));
                    }
                    result.rows.push(values);
                }
            }
        }

        Ok(result)
    }
}

#[async_trait]
impl StatementChannel for DorisConnection {
    /// Tag the session with a fresh trace id so the admin API can address
    /// the next statement. The id is usable only after this round-trip.
    async fn assign_query_id(&mut self) -> Result<String> {
        let id = generate_query_id();
        self.run(&format!("SET session_context = 'trace_id:{}'", id))
            .await?;
        Ok(id)
    }

    async fn run_statement(&mut self, sql: &str) -> Result<ResultSet> {
        self.run(sql).await
    }
}

fn generate_query_id() -> String {
    // Clock nanos plus a process-local sequence, so ids stay unique even
    // on coarse clocks.
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("doris_cmd_{:x}_{:x}", nanos, seq)
}

/// Decode one cell to its display string. Statements run unprepared, so
/// the server sends every value in text form; `None` is SQL NULL.
fn decode_value(row: &MySqlRow, idx: usize) -> Option<String> {
    let raw = match row.try_get_raw(idx) {
        Ok(raw) => raw,
        Err(_) => return None,
    };
    if raw.is_null() {
        return None;
    }
    if let Ok(text) = row.try_get_unchecked::<String, _>(idx) {
        return Some(text);
    }
    // Non-UTF-8 payloads (binary columns)
    row.try_get_unchecked::<Vec<u8>, _>(idx)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
