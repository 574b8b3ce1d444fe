//! One-shot cancellation token
//!
//! A [`CancelToken`] is handed to an executing statement and tripped from
//! another task (typically a Ctrl+C handler). Cancellation is sticky: once
//! tripped the token stays cancelled, and only the first trip wins.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug)]
struct Shared {
    tx: watch::Sender<bool>,
}

/// Cloneable, idempotent cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    shared: Arc<Shared>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shared: Arc::new(Shared { tx }),
        }
    }

    /// Trip the token. Returns `true` only for the first caller; later
    /// calls are no-ops so repeated Ctrl+C never issues duplicate kills.
    pub fn cancel(&self) -> bool {
        self.shared.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shared.tx.borrow()
    }

    /// Resolve once the token has been tripped. Completes immediately if
    /// cancellation already happened.
    pub async fn cancelled(&self) {
        let mut rx = self.shared.tx.subscribe();
        // The sender lives in self, so wait_for cannot observe a closed
        // channel while we hold it.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
