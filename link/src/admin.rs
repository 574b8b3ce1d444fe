//! Administrative HTTP API client
//!
//! Talks to the frontend's HTTP service for the two out-of-band operations
//! the engine needs: reading a running query's profile and killing a query.
//! Both authenticate with the same credentials as the SQL session.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::DorisLinkError;
use crate::models::{AdminEndpoint, ProgressSnapshot, QueryStatus};

/// Timeout for individual admin HTTP requests
const ADMIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure of an admin HTTP call.
///
/// Kept separate from [`DorisLinkError`]: admin failures degrade progress
/// reporting or kill delivery but never fail the query itself.
#[derive(Debug, Clone)]
pub struct AdminError(pub String);

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for AdminError {}

/// Admin HTTP operations, behind a trait so the executor and poller can be
/// exercised without a live frontend.
#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Fetch the current profile of a running query.
    async fn fetch_profile(
        &self,
        endpoint: &AdminEndpoint,
        query_id: &str,
    ) -> Result<ProgressSnapshot, AdminError>;

    /// Ask the frontend to kill a query. Returns Ok only when the server
    /// acknowledged the kill.
    async fn kill_query(&self, endpoint: &AdminEndpoint, query_id: &str)
        -> Result<(), AdminError>;
}

#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<ProfileData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProfileData {
    scan_rows: u64,
    scan_bytes: u64,
    cpu_ms: u64,
    current_used_memory_bytes: u64,
    query_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelEnvelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    msg: Option<String>,
}

/// HTTP client for the frontend admin API. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: reqwest::Client,
    user: String,
    password: String,
}

impl AdminClient {
    pub fn new(user: &str, password: &str) -> Result<Self, DorisLinkError> {
        let http = reqwest::Client::builder()
            .timeout(ADMIN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                DorisLinkError::Configuration(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            user: user.to_string(),
            password: password.to_string(),
        })
    }
}

#[async_trait]
impl AdminApi for AdminClient {
    async fn fetch_profile(
        &self,
        endpoint: &AdminEndpoint,
        query_id: &str,
    ) -> Result<ProgressSnapshot, AdminError> {
        // Path spelling ("progres") matches the server route.
        let url = format!(
            "http://{}/rest/v2/manager/query/progres/query/{}",
            endpoint, query_id
        );

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|e| AdminError(format!("profile request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdminError(format!("profile request returned HTTP {}", status)));
        }

        let envelope: ProfileEnvelope = response
            .json()
            .await
            .map_err(|e| AdminError(format!("malformed profile response: {}", e)))?;

        if envelope.msg != "success" {
            return Err(AdminError(format!("profile API error: {}", envelope.msg)));
        }

        let data = envelope
            .data
            .ok_or_else(|| AdminError("profile response has no data".to_string()))?;

        Ok(ProgressSnapshot {
            status: data
                .query_status
                .as_deref()
                .map(QueryStatus::parse)
                .unwrap_or(QueryStatus::Running),
            // Stamped by the poller, which owns the execution clock
            elapsed_ms: 0,
            scan_rows: data.scan_rows,
            scan_bytes: data.scan_bytes,
            cpu_ms: data.cpu_ms,
            peak_memory_bytes: data.current_used_memory_bytes,
        })
    }

    async fn kill_query(
        &self,
        endpoint: &AdminEndpoint,
        query_id: &str,
    ) -> Result<(), AdminError> {
        let url = format!("http://{}/api/cancel_query", endpoint);

        let response = self
            .http
            .get(&url)
            .query(&[("query_id", query_id)])
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|e| AdminError(format!("kill request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdminError(format!("kill request returned HTTP {}", status)));
        }

        let envelope: CancelEnvelope = response
            .json()
            .await
            .map_err(|e| AdminError(format!("malformed kill response: {}", e)))?;

        if envelope.status.eq_ignore_ascii_case("ok") {
            Ok(())
        } else {
            Err(AdminError(format!(
                "kill rejected: {}",
                envelope.msg.unwrap_or(envelope.status)
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_envelope_parsing() {
        let body = r#"{
            "msg": "success",
            "data": {
                "scanRows": 1200,
                "scanBytes": 52428800,
                "cpuMs": 950,
                "currentUsedMemoryBytes": 104857600,
                "queryStatus": "RUNNING"
            }
        }"#;
        let envelope: ProfileEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.msg, "success");
        let data = envelope.data.unwrap();
        assert_eq!(data.scan_rows, 1200);
        assert_eq!(data.scan_bytes, 52428800);
        assert_eq!(data.cpu_ms, 950);
        assert_eq!(data.current_used_memory_bytes, 104857600);
        assert_eq!(data.query_status.as_deref(), Some("RUNNING"));
    }

    #[test]
    fn test_profile_envelope_missing_fields_default() {
        let body = r#"{"msg": "success", "data": {"scanRows": 7}}"#;
        let envelope: ProfileEnvelope = serde_json::from_str(body).unwrap();
        let data = envelope.data.unwrap();
        assert_eq!(data.scan_rows, 7);
        assert_eq!(data.cpu_ms, 0);
        assert!(data.query_status.is_none());
    }

    #[test]
    fn test_cancel_envelope_parsing() {
        let ok: CancelEnvelope = serde_json::from_str(r#"{"status": "OK"}"#).unwrap();
        assert!(ok.status.eq_ignore_ascii_case("ok"));

        let rejected: CancelEnvelope =
            serde_json::from_str(r#"{"status": "FAILED", "msg": "unknown query"}"#).unwrap();
        assert_eq!(rejected.status, "FAILED");
        assert_eq!(rejected.msg.as_deref(), Some("unknown query"));
    }
}
