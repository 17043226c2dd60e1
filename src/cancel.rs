//! Cooperative cancellation.

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable cancellation signal.
///
/// Every clone observes the same flag. Once cancelled a token stays cancelled.
/// Waiting is done on a `watch` channel, so [`cancelled`](Self::cancelled)
/// parks the task instead of polling.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self { state: Arc::new(state) }
    }

    /// Requests cancellation. Wakes every task waiting in [`cancelled`](Self::cancelled).
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
