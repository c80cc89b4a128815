use roundkeeper_ledger::LedgerError;
use roundkeeper_types::AttemptId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery exhausted after {attempts} attempt(s), last {}", .last_attempt.as_ref().map(AttemptId::as_str).unwrap_or("none"))]
    Exhausted {
        attempts: u32,
        last_attempt: Option<AttemptId>,
    },

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("delivery cancelled by shutdown")]
    Cancelled,
}
