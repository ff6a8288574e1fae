//! Endpoint-level failure throttling shared across concurrent fetches.
//!
//! The breaker is a property of the vendor endpoint, not of a single request:
//! one instance lives inside each [`crate::fetch::ResilientClient`] and every
//! concurrent fetch through that client reads and writes the same counter.
//!
//! Opening the breaker does not reject requests. Callers are throttled (they
//! sleep the configured pause before dispatch) so the vendor sees a trickle
//! instead of silence, and recovery halves the counter instead of zeroing it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

/// Default consecutive-failure count that opens the breaker.
pub const DEFAULT_BREAKER_THRESHOLD: u32 = 10;

/// Default multiplier; when the counter reaches `threshold * multiplier` it is halved.
pub const DEFAULT_BREAKER_MULTIPLIER: u32 = 3;

/// Default pause applied to calls while the breaker is open.
pub const DEFAULT_BREAKER_PAUSE: Duration = Duration::from_secs(5);

/// Shared failure counter with throttle-on-open semantics.
#[derive(Debug)]
pub struct CircuitBreaker {
    failures: AtomicU32,
    threshold: u32,
    multiplier: u32,
    pause: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(
            DEFAULT_BREAKER_THRESHOLD,
            DEFAULT_BREAKER_MULTIPLIER,
            DEFAULT_BREAKER_PAUSE,
        )
    }
}

impl CircuitBreaker {
    /// Creates a breaker.
    ///
    /// # Arguments
    ///
    /// * `threshold` - failure count at which callers start being throttled (min 1)
    /// * `multiplier` - the counter is halved once it reaches `threshold * multiplier` (min 1)
    /// * `pause` - sleep applied before dispatch while open
    #[must_use]
    pub fn new(threshold: u32, multiplier: u32, pause: Duration) -> Self {
        Self {
            failures: AtomicU32::new(0),
            threshold: threshold.max(1),
            multiplier: multiplier.max(1),
            pause,
        }
    }

    /// Sleeps the configured pause when the breaker is open; returns
    /// immediately otherwise.
    ///
    /// Call before every dispatch. The request is throttled, never skipped.
    pub async fn throttle(&self) {
        let failures = self.failures.load(Ordering::SeqCst);
        if failures >= self.threshold {
            debug!(
                failures,
                pause_ms = self.pause.as_millis() as u64,
                "breaker open, delaying request"
            );
            tokio::time::sleep(self.pause).await;
        }
    }

    /// Records a failed fetch outcome.
    ///
    /// When the counter reaches `threshold * multiplier` it is halved (integer
    /// division), so a recovering endpoint re-earns trust gradually instead of
    /// starting from a clean slate.
    pub fn record_failure(&self) {
        let count = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        let ceiling = self.threshold.saturating_mul(self.multiplier);
        if count >= ceiling {
            self.failures.store(count / 2, Ordering::SeqCst);
            warn!(failures = count, halved_to = count / 2, "breaker counter halved");
        }
    }

    /// Records a successful fetch outcome; resets the counter to zero.
    pub fn record_success(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    /// True while callers are being throttled.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.failures.load(Ordering::SeqCst) >= self.threshold
    }

    /// Current failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}
