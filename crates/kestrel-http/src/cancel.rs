//! Caller-initiated cancellation for in-flight calls.

use std::sync::Arc;
use tokio::sync::watch;

/// Cancels every call holding one of its watchers.
#[derive(Clone)]
pub struct CancellationToken {
    notify: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    /// Create a new token and the watcher to attach to a call.
    pub fn new() -> (Self, CancellationWatcher) {
        let (tx, rx) = watch::channel(false);
        let token = Self {
            notify: Arc::new(tx),
        };
        (token, CancellationWatcher { notify: Some(rx) })
    }

    /// Cancel the call.
    pub fn cancel(&self) {
        self.notify.send_replace(true);
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.notify.borrow()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Watches for cancellation of one call.
#[derive(Clone, Debug, Default)]
pub struct CancellationWatcher {
    notify: Option<watch::Receiver<bool>>,
}

impl CancellationWatcher {
    /// A watcher that is never cancelled.
    pub fn never() -> Self {
        Self { notify: None }
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.notify.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Wait for cancellation.
    ///
    /// Never resolves if every token was dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.notify else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}
