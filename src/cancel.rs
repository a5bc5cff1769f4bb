//! Cooperative cancellation for in-flight transfers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Signals a running transfer to stop.
///
/// The transport checks the token between chunks and while waiting on the network.
/// When it stops because of the token it marks the token as *acknowledged*, which
/// lets a canceller tell "stopped early" apart from "finished anyway".
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    token: CancellationToken,
    acknowledged: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once [`cancel`](CancelToken::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True when a transfer stopped because of this token.
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::Acquire)
    }

    pub(crate) fn acknowledge(&self) {
        self.acknowledged.store(true, Ordering::Release);
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}
