//! Nullable clock: deterministic wall-clock time for testing.

use roundkeeper_ledger::Clock;
use roundkeeper_types::Timestamp;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// A wall clock that follows tokio's (pausable) clock from a fixed start,
/// plus any manual jumps.
///
/// Under `start_paused = true` it advances exactly as far as the runtime
/// auto-advances timers. [`NullClock::jump`] moves wall-clock time without
/// moving timers, which is how a process suspension looks to the scheduler.
pub struct NullClock {
    start: Timestamp,
    origin: Instant,
    offset_ms: AtomicI64,
}

impl NullClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            start,
            origin: Instant::now(),
            offset_ms: AtomicI64::new(0),
        }
    }

    /// Shift wall-clock time forward without touching timers.
    pub fn jump(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for NullClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.origin.elapsed().as_millis() as i64;
        let offset = self.offset_ms.load(Ordering::SeqCst);
        let millis = (self.start.as_millis() as i64)
            .saturating_add(elapsed)
            .saturating_add(offset)
            .max(0);
        Timestamp::from_millis(millis as u64)
    }
}
