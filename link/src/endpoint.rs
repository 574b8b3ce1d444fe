//! Admin endpoint discovery
//!
//! The admin HTTP port is discovered from `SHOW FRONTENDS`: the row whose
//! host matches the connected host wins; when no row matches (the client
//! may be connected through a proxy address), the first row is used. An
//! explicitly configured port always takes precedence over discovery.
//!
//! Resolution failure is never fatal: the statement runs without live
//! progress, and the next statement retries discovery.

use log::debug;

use crate::connection::DorisConnection;
use crate::error::ResolutionError;
use crate::models::{AdminEndpoint, FrontendNode};

/// Outcome of one resolution attempt.
pub type ResolvedEndpoint = Result<AdminEndpoint, ResolutionError>;

/// Resolve the admin endpoint for the given connection.
pub async fn resolve(conn: &mut DorisConnection) -> ResolvedEndpoint {
    if let Some(port) = conn.configured_admin_port() {
        return Ok(AdminEndpoint {
            host: conn.host().to_string(),
            port,
        });
    }

    let nodes = conn
        .list_frontends()
        .await
        .map_err(|e| ResolutionError(format!("SHOW FRONTENDS failed: {}", e)))?;

    let connected_host = conn.host().to_string();
    let node = select_frontend(&nodes, &connected_host)
        .ok_or_else(|| ResolutionError("SHOW FRONTENDS returned no usable rows".to_string()))?;

    // Profile requests go to the frontend we are talking to, on the
    // discovered port.
    Ok(AdminEndpoint {
        host: connected_host,
        port: node.http_port,
    })
}

/// Record a resolution outcome in the connection's cache. Only successes
/// are cached; a failure leaves the cache empty so the next statement
/// retries discovery instead of losing live progress for the session.
pub(crate) fn cache_resolution(
    cache: &mut Option<AdminEndpoint>,
    resolved: ResolvedEndpoint,
) -> Option<AdminEndpoint> {
    match resolved {
        Ok(ep) => {
            *cache = Some(ep.clone());
            Some(ep)
        }
        Err(reason) => {
            debug!("live progress unavailable for this statement: {}", reason);
            None
        }
    }
}

/// Pick the frontend row to take the HTTP port from.
pub fn select_frontend<'a>(
    nodes: &'a [FrontendNode],
    connected_host: &str,
) -> Option<&'a FrontendNode> {
    nodes
        .iter()
        .find(|node| node.host == connected_host)
        .or_else(|| nodes.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(host: &str, port: u16) -> FrontendNode {
        FrontendNode {
            host: host.to_string(),
            http_port: port,
        }
    }

    #[test]
    fn test_exact_host_match_wins() {
        let nodes = vec![
            node("10.0.0.1", 8030),
            node("10.0.0.2", 8031),
            node("10.0.0.3", 8032),
        ];
        let selected = select_frontend(&nodes, "10.0.0.2").unwrap();
        assert_eq!(selected.http_port, 8031);
    }

    #[test]
    fn test_falls_back_to_first_row() {
        let nodes = vec![node("10.0.0.1", 8030), node("10.0.0.2", 8031)];
        // Connected through an address that matches no frontend row
        let selected = select_frontend(&nodes, "proxy.internal").unwrap();
        assert_eq!(selected.host, "10.0.0.1");
        assert_eq!(selected.http_port, 8030);
    }

    #[test]
    fn test_no_rows_resolves_nothing() {
        assert!(select_frontend(&[], "10.0.0.1").is_none());
    }

    #[test]
    fn test_failed_resolution_is_retried_not_cached() {
        let mut cache = None;

        // A transient discovery failure must not pin the cache
        let out = cache_resolution(
            &mut cache,
            Err(ResolutionError("SHOW FRONTENDS failed: timeout".into())),
        );
        assert!(out.is_none());
        assert!(cache.is_none());

        // The retry succeeds and its answer sticks
        let ep = AdminEndpoint {
            host: "10.0.0.2".into(),
            port: 8031,
        };
        let out = cache_resolution(&mut cache, Ok(ep));
        assert_eq!(out.as_ref().map(|e| e.port), Some(8031));
        assert_eq!(cache.as_ref().map(|e| e.host.as_str()), Some("10.0.0.2"));
    }
}
