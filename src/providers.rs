//! Shared provider traits for dependency injection.
//!
//! The poller is the only component that waits. It reads time and suspends
//! through [`Clock`] so tests can drive it with a manual clock instead of
//! sleeping for real.

use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Trait for reading elapsed time and suspending the calling task.
///
/// # Example
///
/// ```
/// use apicall::providers::{Clock, SystemClock};
///
/// let clock = SystemClock::new();
/// let start = clock.now_millis();
/// assert!(clock.now_millis() >= start);
/// ```
#[async_trait]
pub trait Clock: Send + Sync {
    /// Milliseconds elapsed since an arbitrary, fixed origin.
    fn now_millis(&self) -> u64;

    /// Suspends the caller for at least `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Monotonic clock backed by `Instant` and `tokio::time::sleep`.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
