//! Background progress polling
//!
//! While a statement blocks on the wire protocol, a poller task reads the
//! query profile from the admin HTTP API once per second and pushes
//! snapshots to an observer callback. Polling is strictly best-effort:
//! fetch failures are logged and swallowed, and after enough consecutive
//! failures the poller gives up without disturbing the query.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::admin::AdminApi;
use crate::models::{AdminEndpoint, ProgressSnapshot};

/// How often the poller reads the query profile
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Consecutive fetch failures tolerated before the poller gives up
const MAX_FETCH_FAILURES: u32 = 5;

/// Observer invoked with each fresh snapshot, from the poller task.
pub type OnUpdate = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Hooks the executor uses to run progress reporting alongside a statement.
///
/// `stop` is called exactly once per execution, on every path out of the
/// executor, and returns the last snapshot seen (if any).
#[async_trait]
pub trait ProgressMonitor: Send {
    /// Called once the query identifier becomes known.
    fn start(&mut self, endpoint: AdminEndpoint, query_id: String);

    /// Stop observing and return the final snapshot.
    async fn stop(&mut self) -> Option<ProgressSnapshot>;
}

/// Monitor that spawns a [`ProgressPoller`] when the query id arrives.
pub struct LiveProgress {
    admin: Arc<dyn AdminApi>,
    interval: Duration,
    on_update: OnUpdate,
    active: Option<ProgressPoller>,
}

impl LiveProgress {
    pub fn new(admin: Arc<dyn AdminApi>, on_update: OnUpdate) -> Self {
        Self::with_interval(admin, POLL_INTERVAL, on_update)
    }

    pub fn with_interval(admin: Arc<dyn AdminApi>, interval: Duration, on_update: OnUpdate) -> Self {
        Self {
            admin,
            interval,
            on_update,
            active: None,
        }
    }
}

#[async_trait]
impl ProgressMonitor for LiveProgress {
    fn start(&mut self, endpoint: AdminEndpoint, query_id: String) {
        if self.active.is_none() {
            self.active = Some(ProgressPoller::spawn(
                Arc::clone(&self.admin),
                endpoint,
                query_id,
                self.interval,
                Arc::clone(&self.on_update),
            ));
        }
    }

    async fn stop(&mut self) -> Option<ProgressSnapshot> {
        match self.active.take() {
            Some(poller) => poller.stop().await,
            None => None,
        }
    }
}

/// Monitor used when progress reporting is disabled or unavailable.
pub struct NoProgress;

#[async_trait]
impl ProgressMonitor for NoProgress {
    fn start(&mut self, _endpoint: AdminEndpoint, _query_id: String) {}

    async fn stop(&mut self) -> Option<ProgressSnapshot> {
        None
    }
}

/// Handle to a spawned polling task.
pub struct ProgressPoller {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<Option<ProgressSnapshot>>,
}

impl ProgressPoller {
    /// Spawn the polling loop for one query.
    pub fn spawn(
        admin: Arc<dyn AdminApi>,
        endpoint: AdminEndpoint,
        query_id: String,
        interval: Duration,
        on_update: OnUpdate,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut last: Option<ProgressSnapshot> = None;
            let mut failures = 0u32;

            loop {
                tokio::select! {
                    res = stop_rx.wait_for(|stopped| *stopped) => {
                        // Also stops when the handle is dropped and the
                        // sender goes away.
                        let _ = res;
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }

                match admin.fetch_profile(&endpoint, &query_id).await {
                    Ok(mut snapshot) => {
                        failures = 0;
                        snapshot.elapsed_ms = started.elapsed().as_millis() as u64;
                        on_update(&snapshot);
                        let terminal = snapshot.status.is_terminal();
                        last = Some(snapshot);
                        if terminal {
                            break;
                        }
                    }
                    Err(e) => {
                        failures += 1;
                        debug!(
                            "progress fetch for {} failed ({}/{}): {}",
                            query_id, failures, MAX_FETCH_FAILURES, e
                        );
                        if failures >= MAX_FETCH_FAILURES {
                            debug!("progress unavailable for {}, polling stopped", query_id);
                            break;
                        }
                    }
                }
            }

            last
        });

        Self { stop_tx, handle }
    }

    /// Signal the task to stop and wait for it, returning the last snapshot.
    pub async fn stop(self) -> Option<ProgressSnapshot> {
        let _ = self.stop_tx.send(true);
        self.handle.await.ok().flatten()
    }
}
