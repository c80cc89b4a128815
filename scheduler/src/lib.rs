//! Round scheduling.
//!
//! The [`Scheduler`] runs one cycle at a time: it reads every tracked
//! round's deadline, advances rounds that have gone stale, claims and
//! restakes rewards for each account, then sleeps on a [`WakeTimer`] until
//! the farthest deadline passes and starts over.

pub mod error;
pub mod position;
pub mod round;
pub mod scheduler;
pub mod timer;

pub use error::SchedulerError;
pub use position::{PositionSelector, PositionStrategy, MAX_LOCK_DAYS};
pub use round::{
    is_stale, next_deadline, RoundState, RoundTracker, DEFAULT_MIN_ROUND_DURATION,
};
pub use scheduler::{
    CycleDrivers, CycleOutcome, ExitReason, Scheduler, SchedulerConfig, DEFAULT_PING_INTERVAL,
};
pub use timer::{next_wake, Wake, WakeOutcome, WakeTimer};
