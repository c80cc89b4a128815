//! Wall-clock abstraction.

use roundkeeper_types::Timestamp;

/// Source of wall-clock time. Deadlines are always re-derived from it rather
/// than from elapsed timer durations.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
