//! Cancellable statement execution
//!
//! The wire protocol blocks for the whole lifetime of a statement, so the
//! executor drives the protocol call as one future and concurrently watches
//! for two things: the query identifier becoming known (which starts the
//! progress monitor and unblocks any queued kill) and the cancellation
//! token tripping.
//!
//! Cancellation semantics:
//! - id already known: issue the kill immediately
//! - id not yet known: queue the kill; it fires when the id arrives, or is
//!   abandoned if the statement completes first
//! - after a kill is sent, the protocol call gets a bounded window to
//!   unblock before the executor stops waiting for it
//! - no admin endpoint: nothing to address a kill to, so the statement
//!   runs to completion and is reported as it actually ended

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::watch;

use crate::admin::AdminApi;
use crate::cancel::CancelToken;
use crate::error::{DorisLinkError, Result};
use crate::models::{AdminEndpoint, QueryOutcome, QueryStatus, ResultSet};
use crate::progress::ProgressMonitor;

/// How long to keep waiting on the protocol call after a kill was sent
const KILL_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Protocol-side half of statement execution.
///
/// Implemented by the live connection; tests substitute scripted channels.
#[async_trait]
pub trait StatementChannel: Send {
    /// Register an identifier for the next statement and return it.
    ///
    /// The identifier only counts as known once this round-trip completes.
    async fn assign_query_id(&mut self) -> Result<String>;

    /// Run one statement to completion over the wire protocol.
    async fn run_statement(&mut self, sql: &str) -> Result<ResultSet>;
}

/// Execute one statement with progress reporting and cancellation.
///
/// Statement-level failures are reported inside the returned
/// [`QueryOutcome`]; only failures that invalidate the session come back
/// as `Err`.
pub async fn execute<C>(
    channel: &mut C,
    admin: &dyn AdminApi,
    endpoint: Option<&AdminEndpoint>,
    sql: &str,
    cancel: &CancelToken,
    monitor: &mut dyn ProgressMonitor,
) -> Result<QueryOutcome>
where
    C: StatementChannel + ?Sized,
{
    let started = Instant::now();
    let (id_tx, mut id_rx) = watch::channel(None::<String>);

    let protocol = async {
        let id = channel.assign_query_id().await?;
        let _ = id_tx.send(Some(id));
        channel.run_statement(sql).await
    };
    tokio::pin!(protocol);

    let mut query_id: Option<String> = None;
    let mut id_pending = true;
    let mut cancel_requested = cancel.is_cancelled();
    let mut kill_sent = false;

    let protocol_result = loop {
        if kill_sent {
            // The kill was delivered; give the blocked call a bounded
            // window to observe it.
            break match tokio::time::timeout(KILL_ACK_TIMEOUT, &mut protocol).await {
                Ok(res) => res,
                Err(_) => {
                    warn!("statement did not unblock after kill, abandoning the wait");
                    Err(DorisLinkError::Cancelled)
                }
            };
        }

        tokio::select! {
            res = &mut protocol => break res,

            changed = id_rx.changed(), if id_pending => {
                if changed.is_err() {
                    id_pending = false;
                    continue;
                }
                query_id = id_rx.borrow_and_update().clone();
                id_pending = query_id.is_none();
                if let Some(id) = query_id.clone() {
                    debug!("statement running under id {}", id);
                    if cancel_requested {
                        // A queued cancellation applies as soon as the id
                        // becomes known.
                        kill_sent = issue_kill(admin, endpoint, &id).await;
                    } else if let Some(ep) = endpoint {
                        monitor.start(ep.clone(), id);
                    }
                }
            }

            _ = cancel.cancelled(), if !cancel_requested => {
                cancel_requested = true;
                match query_id.clone() {
                    Some(id) => {
                        kill_sent = issue_kill(admin, endpoint, &id).await;
                    }
                    None => debug!("cancellation queued until the query id is known"),
                }
            }
        }
    };

    // A fast statement can complete within a single poll of the protocol
    // future, before the id publication was ever observed; the watch
    // still holds the id.
    if query_id.is_none() {
        query_id = id_rx.borrow().clone();
    }

    // Every path out of the loop lands here, so the monitor is stopped
    // exactly once per execution.
    let progress = monitor.stop().await;
    let elapsed = started.elapsed();

    match protocol_result {
        Ok(result) => Ok(QueryOutcome {
            status: QueryStatus::Finished,
            result: Some(result),
            error: None,
            query_id,
            elapsed,
            progress,
        }),
        Err(_) if kill_sent => Ok(QueryOutcome {
            status: QueryStatus::Cancelled,
            result: None,
            error: None,
            query_id,
            elapsed,
            progress,
        }),
        Err(DorisLinkError::Statement(error)) => Ok(QueryOutcome {
            status: QueryStatus::Failed,
            result: None,
            error: Some(error),
            query_id,
            elapsed,
            progress,
        }),
        Err(e) => Err(e),
    }
}

/// Deliver a kill for the query, returning whether one was issued at all.
/// With no admin endpoint there is nothing to address the kill to; the
/// caller keeps waiting on the statement instead of misreporting it as
/// cancelled.
async fn issue_kill(
    admin: &dyn AdminApi,
    endpoint: Option<&AdminEndpoint>,
    query_id: &str,
) -> bool {
    let Some(endpoint) = endpoint else {
        warn!(
            "cancellation requested for {} but no admin endpoint is available",
            query_id
        );
        return false;
    };
    match admin.kill_query(endpoint, query_id).await {
        Ok(()) => debug!("kill acknowledged for {}", query_id),
        Err(e) => warn!("kill request for {} failed: {}", query_id, e),
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::AdminError;
    use crate::error::StatementError;
    use crate::models::ProgressSnapshot;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    fn endpoint() -> AdminEndpoint {
        AdminEndpoint {
            host: "127.0.0.1".into(),
            port: 8030,
        }
    }

    fn sample_rows() -> ResultSet {
        ResultSet {
            columns: vec!["id".into()],
            rows: vec![vec![Some("1".into())]],
            rows_affected: 0,
        }
    }

    /// Channel that can hold the id assignment or the statement itself
    /// behind gates until the test releases them.
    struct ScriptedChannel {
        assign_gate: Option<oneshot::Receiver<()>>,
        run_gate: Option<oneshot::Receiver<()>>,
        result: Option<Result<ResultSet>>,
    }

    impl ScriptedChannel {
        fn immediate(result: Result<ResultSet>) -> Self {
            Self {
                assign_gate: None,
                run_gate: None,
                result: Some(result),
            }
        }
    }

    #[async_trait]
    impl StatementChannel for ScriptedChannel {
        async fn assign_query_id(&mut self) -> Result<String> {
            if let Some(gate) = self.assign_gate.take() {
                let _ = gate.await;
            }
            Ok("q-test".into())
        }

        async fn run_statement(&mut self, _sql: &str) -> Result<ResultSet> {
            if let Some(gate) = self.run_gate.take() {
                let _ = gate.await;
            }
            match self.result.take() {
                Some(res) => res,
                None => Err(DorisLinkError::Connection("no scripted result".into())),
            }
        }
    }

    /// Records kills; optionally releases a gate when the kill lands, so
    /// tests can model the server tearing down the blocked statement.
    struct RecordingAdmin {
        kills: Mutex<Vec<String>>,
        release_on_kill: Mutex<Option<oneshot::Sender<()>>>,
    }

    impl RecordingAdmin {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                kills: Mutex::new(Vec::new()),
                release_on_kill: Mutex::new(None),
            })
        }

        fn releasing(gate: oneshot::Sender<()>) -> Arc<Self> {
            Arc::new(Self {
                kills: Mutex::new(Vec::new()),
                release_on_kill: Mutex::new(Some(gate)),
            })
        }

        fn kills(&self) -> Vec<String> {
            self.kills.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AdminApi for RecordingAdmin {
        async fn fetch_profile(
            &self,
            _endpoint: &AdminEndpoint,
            _query_id: &str,
        ) -> std::result::Result<ProgressSnapshot, AdminError> {
            Err(AdminError("not scripted".into()))
        }

        async fn kill_query(
            &self,
            _endpoint: &AdminEndpoint,
            query_id: &str,
        ) -> std::result::Result<(), AdminError> {
            self.kills.lock().unwrap().push(query_id.to_string());
            if let Some(gate) = self.release_on_kill.lock().unwrap().take() {
                let _ = gate.send(());
            }
            Ok(())
        }
    }

    /// Counts lifecycle calls so tests can assert stop happens exactly once.
    struct CountingMonitor {
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    impl CountingMonitor {
        fn new() -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let starts = Arc::new(AtomicUsize::new(0));
            let stops = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    starts: Arc::clone(&starts),
                    stops: Arc::clone(&stops),
                },
                starts,
                stops,
            )
        }
    }

    #[async_trait]
    impl ProgressMonitor for CountingMonitor {
        fn start(&mut self, _endpoint: AdminEndpoint, _query_id: String) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        async fn stop(&mut self) -> Option<ProgressSnapshot> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    #[tokio::test]
    async fn test_successful_statement() {
        // Hold the statement open briefly so the id publication is
        // observed while it runs and the monitor starts.
        let (release_tx, release_rx) = oneshot::channel();
        let mut channel = ScriptedChannel {
            assign_gate: None,
            run_gate: Some(release_rx),
            result: Some(Ok(sample_rows())),
        };
        let admin = RecordingAdmin::new();
        let (mut monitor, starts, stops) = CountingMonitor::new();
        let cancel = CancelToken::new();
        let ep = endpoint();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = release_tx.send(());
        });

        let outcome = execute(
            &mut channel,
            admin.as_ref(),
            Some(&ep),
            "SELECT 1",
            &cancel,
            &mut monitor,
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, QueryStatus::Finished);
        assert_eq!(outcome.query_id.as_deref(), Some("q-test"));
        assert_eq!(outcome.result.unwrap().rows.len(), 1);
        assert!(admin.kills().is_empty());
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fast_statement_keeps_query_id() {
        // The protocol future completes within a single poll here, so the
        // select loop never observes the id publication; the outcome must
        // still carry the id.
        let mut channel = ScriptedChannel::immediate(Ok(sample_rows()));
        let admin = RecordingAdmin::new();
        let (mut monitor, starts, stops) = CountingMonitor::new();
        let cancel = CancelToken::new();
        let ep = endpoint();

        let outcome = execute(
            &mut channel,
            admin.as_ref(),
            Some(&ep),
            "SELECT 1",
            &cancel,
            &mut monitor,
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, QueryStatus::Finished);
        assert_eq!(outcome.query_id.as_deref(), Some("q-test"));
        // The statement was already done, so progress never started, but
        // teardown still runs once.
        assert_eq!(starts.load(Ordering::SeqCst), 0);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_statement_error_keeps_session() {
        let mut channel = ScriptedChannel::immediate(Err(DorisLinkError::Statement(
            StatementError {
                code: Some("1105".into()),
                message: "Unknown table".into(),
            },
        )));
        let admin = RecordingAdmin::new();
        let (mut monitor, _starts, stops) = CountingMonitor::new();
        let cancel = CancelToken::new();
        let ep = endpoint();

        let outcome = execute(
            &mut channel,
            admin.as_ref(),
            Some(&ep),
            "SELECT * FROM nope",
            &cancel,
            &mut monitor,
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, QueryStatus::Failed);
        assert_eq!(outcome.error.unwrap().code.as_deref(), Some("1105"));
        assert!(outcome.result.is_none());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_error_propagates() {
        let mut channel =
            ScriptedChannel::immediate(Err(DorisLinkError::Connection("broken pipe".into())));
        let admin = RecordingAdmin::new();
        let (mut monitor, _starts, stops) = CountingMonitor::new();
        let cancel = CancelToken::new();
        let ep = endpoint();

        let err = execute(
            &mut channel,
            admin.as_ref(),
            Some(&ep),
            "SELECT 1",
            &cancel,
            &mut monitor,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DorisLinkError::Connection(_)));
        // Monitor teardown happens even on the fatal path
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_with_known_id_kills_and_reports_cancelled() {
        let (release_tx, release_rx) = oneshot::channel();
        let mut channel = ScriptedChannel {
            assign_gate: None,
            run_gate: Some(release_rx),
            result: Some(Err(DorisLinkError::statement("Cancelled by admin"))),
        };
        let admin = RecordingAdmin::releasing(release_tx);
        let (mut monitor, starts, stops) = CountingMonitor::new();
        let cancel = CancelToken::new();
        let ep = endpoint();

        let trip = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trip.cancel();
        });

        let outcome = execute(
            &mut channel,
            admin.as_ref(),
            Some(&ep),
            "SELECT sleep(100)",
            &cancel,
            &mut monitor,
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, QueryStatus::Cancelled);
        assert!(outcome.error.is_none());
        assert_eq!(admin.kills(), vec!["q-test".to_string()]);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_id_is_queued_then_applied() {
        let (assign_tx, assign_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let mut channel = ScriptedChannel {
            assign_gate: Some(assign_rx),
            run_gate: Some(release_rx),
            result: Some(Err(DorisLinkError::statement("Cancelled by admin"))),
        };
        let admin = RecordingAdmin::releasing(release_tx);
        let (mut monitor, starts, stops) = CountingMonitor::new();
        // Tripped before execution even starts: no id exists yet
        let cancel = CancelToken::new();
        cancel.cancel();
        let ep = endpoint();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = assign_tx.send(());
        });

        let outcome = execute(
            &mut channel,
            admin.as_ref(),
            Some(&ep),
            "SELECT sleep(100)",
            &cancel,
            &mut monitor,
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, QueryStatus::Cancelled);
        assert_eq!(admin.kills(), vec!["q-test".to_string()]);
        // Progress never starts for a query that was doomed from the start
        assert_eq!(starts.load(Ordering::SeqCst), 0);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_queued_cancel_races_fast_statement() {
        // The kill queued before the id round-trip races a statement that
        // completes as soon as the id lands.
        let (assign_tx, assign_rx) = oneshot::channel();
        let mut channel = ScriptedChannel {
            assign_gate: Some(assign_rx),
            run_gate: None,
            result: Some(Ok(sample_rows())),
        };
        let admin = RecordingAdmin::new();
        let (mut monitor, _starts, stops) = CountingMonitor::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let ep = endpoint();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = assign_tx.send(());
        });

        let outcome = execute(
            &mut channel,
            admin.as_ref(),
            Some(&ep),
            "SELECT 1",
            &cancel,
            &mut monitor,
        )
        .await
        .unwrap();

        // The id became known and the queued kill applied; the scripted
        // result was already Ok, so the executor saw it racing the kill.
        // Either way exactly one kill at most, and stop exactly once.
        assert!(admin.kills().len() <= 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(matches!(
            outcome.status,
            QueryStatus::Finished | QueryStatus::Cancelled
        ));
    }

    #[tokio::test]
    async fn test_repeat_cancellation_sends_one_kill() {
        let (release_tx, release_rx) = oneshot::channel();
        let mut channel = ScriptedChannel {
            assign_gate: None,
            run_gate: Some(release_rx),
            result: Some(Err(DorisLinkError::statement("Cancelled by admin"))),
        };
        let admin = RecordingAdmin::releasing(release_tx);
        let (mut monitor, _starts, _stops) = CountingMonitor::new();
        let cancel = CancelToken::new();
        let ep = endpoint();

        let trip = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trip.cancel();
            trip.cancel();
            trip.cancel();
        });

        let outcome = execute(
            &mut channel,
            admin.as_ref(),
            Some(&ep),
            "SELECT sleep(100)",
            &cancel,
            &mut monitor,
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, QueryStatus::Cancelled);
        assert_eq!(admin.kills().len(), 1);
    }

    #[tokio::test]
    async fn test_without_endpoint_runs_without_progress() {
        let mut channel = ScriptedChannel::immediate(Ok(sample_rows()));
        let admin = RecordingAdmin::new();
        let (mut monitor, starts, stops) = CountingMonitor::new();
        let cancel = CancelToken::new();

        let outcome = execute(
            &mut channel,
            admin.as_ref(),
            None,
            "SELECT 1",
            &cancel,
            &mut monitor,
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, QueryStatus::Finished);
        assert_eq!(starts.load(Ordering::SeqCst), 0);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_without_endpoint_waits_for_statement() {
        // With nothing to address a kill to, cancellation cannot take
        // effect: the statement runs to completion and its real outcome is
        // reported, never a fabricated Cancelled.
        let (release_tx, release_rx) = oneshot::channel();
        let mut channel = ScriptedChannel {
            assign_gate: None,
            run_gate: Some(release_rx),
            result: Some(Ok(sample_rows())),
        };
        let admin = RecordingAdmin::new();
        let (mut monitor, starts, stops) = CountingMonitor::new();
        let cancel = CancelToken::new();

        let trip = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trip.cancel();
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = release_tx.send(());
        });

        let outcome = execute(
            &mut channel,
            admin.as_ref(),
            None,
            "SELECT sleep(100)",
            &cancel,
            &mut monitor,
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, QueryStatus::Finished);
        assert!(admin.kills().is_empty());
        assert_eq!(starts.load(Ordering::SeqCst), 0);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_ack_window_bounds_the_wait() {
        // The kill is acknowledged but the blocked call never unblocks;
        // after the ack window the executor stops waiting and reports the
        // cancellation.
        let (_held_tx, release_rx) = oneshot::channel::<()>();
        let mut channel = ScriptedChannel {
            assign_gate: None,
            run_gate: Some(release_rx),
            result: Some(Ok(sample_rows())),
        };
        let admin = RecordingAdmin::new();
        let (mut monitor, _starts, stops) = CountingMonitor::new();
        let cancel = CancelToken::new();
        let ep = endpoint();

        let trip = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trip.cancel();
        });

        let outcome = execute(
            &mut channel,
            admin.as_ref(),
            Some(&ep),
            "SELECT sleep(100)",
            &cancel,
            &mut monitor,
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, QueryStatus::Cancelled);
        assert!(outcome.error.is_none());
        assert_eq!(admin.kills(), vec!["q-test".to_string()]);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
