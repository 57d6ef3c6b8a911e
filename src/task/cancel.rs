//! Cooperative cancellation token
//!
//! Loops running on OS threads poll [`CancelToken::is_cancelled`] at every
//! iteration boundary; async consumers can await [`CancelToken::cancelled`].
//! Cancellation is sticky: once set it cannot be undone, so restarting work
//! means creating a new token.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Granularity of [`CancelToken::sleep`]
const SLEEP_SLICE: Duration = Duration::from_millis(5);

/// Shared stop signal usable from both threads and async code
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    /// Create a token in the not-cancelled state
    pub fn new() -> Self {
        Self {
            inner: CancellationToken::new(),
        }
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Wait until cancellation is requested
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }

    /// Sleep for `duration`, waking early on cancellation
    ///
    /// Returns `true` if the token was cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
