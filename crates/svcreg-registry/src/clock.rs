//! Time source for heartbeat timestamps.
//!
//! The store never calls `Utc::now()` directly; it asks a [`Clock`]. The
//! server uses [`SystemClock`], tests use [`ManualClock`] so timestamps only
//! move when the test says so.

use chrono::{DateTime, Duration, Utc};
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of "current time" for the registry.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only advances when told to.
///
/// Clones share the same underlying time, so a test can keep one handle and
/// give another to the registry.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current_ms: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current_ms: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    /// Advances time by `duration`.
    pub fn advance(&self, duration: Duration) {
        debug_assert!(duration >= Duration::zero(), "cannot go back in time");
        self.current_ms
            .fetch_add(duration.num_milliseconds(), Ordering::SeqCst);
    }

    /// Advances time by `ms` milliseconds.
    pub fn advance_ms(&self, ms: i64) {
        self.advance(Duration::milliseconds(ms));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let ms = self.current_ms.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::default())
    }
}
