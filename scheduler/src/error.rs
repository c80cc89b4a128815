use thiserror::Error;

/// Errors that end a scheduler run.
///
/// Per-account delivery and read failures are logged and skipped inside a
/// cycle, so they never surface here.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no round state could be read: {0}")]
    RoundStateUnavailable(String),
}
