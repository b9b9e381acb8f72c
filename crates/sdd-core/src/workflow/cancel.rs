//! Cooperative cancellation for workflow attempts

use std::sync::Arc;
use tokio::sync::watch;

/// Cancellation signal shared between the engine and an executor attempt
///
/// Cloning shares the same signal. Each retry gets a fresh token, so an
/// executor that still holds the old one keeps seeing it tripped.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Trip the signal; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is tripped
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // `self` keeps the sender alive
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
