//! Values exchanged with the remote ledger during delivery.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Commitment level requested from the ledger for reads and confirmations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }

    /// Whether a reported status of `reached` satisfies this level.
    pub fn is_satisfied_by(&self, reached: Commitment) -> bool {
        reached.rank() >= self.rank()
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Processed => 0,
            Self::Confirmed => 1,
            Self::Finalized => 2,
        }
    }
}

/// A short-lived value that must be embedded in a signed operation for the
/// network to accept it, valid up to `last_valid_height`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessToken {
    pub hash: String,
    pub last_valid_height: u64,
}

impl LivenessToken {
    pub fn new(hash: impl Into<String>, last_valid_height: u64) -> Self {
        Self {
            hash: hash.into(),
            last_valid_height,
        }
    }

    /// Shrink the validity window by `margin` blocks so that the local view
    /// of expiry is reached before the network's.
    pub fn with_height_margin(mut self, margin: u64) -> Self {
        self.last_valid_height = self.last_valid_height.saturating_sub(margin);
        self
    }

    /// Whether a chain at `height` is still inside the window.
    pub fn is_live_at(&self, height: u64) -> bool {
        height <= self.last_valid_height
    }
}

/// Identifier of a delivery attempt as known to the network (the signature).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(String);

impl AttemptId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a dry run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Simulation {
    /// The operation would succeed. `units_consumed` is reported when the
    /// ledger meters execution.
    Success { units_consumed: Option<u64> },
    /// The liveness token the draft was signed against is already unknown.
    TokenExpired,
    /// Any other rejection.
    Rejected(String),
}

/// How a confirmation watch settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    /// The network executed the attempt and reported an error.
    Failed(String),
    /// The liveness window closed without the attempt landing.
    Expired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_ordering() {
        assert!(Commitment::Confirmed.is_satisfied_by(Commitment::Finalized));
        assert!(Commitment::Confirmed.is_satisfied_by(Commitment::Confirmed));
        assert!(!Commitment::Confirmed.is_satisfied_by(Commitment::Processed));
        assert!(Commitment::Processed.is_satisfied_by(Commitment::Processed));
    }

    #[test]
    fn height_margin_shrinks_window() {
        let token = LivenessToken::new("hash", 1_000).with_height_margin(150);
        assert_eq!(token.last_valid_height, 850);
        assert!(token.is_live_at(850));
        assert!(!token.is_live_at(851));

        let tiny = LivenessToken::new("hash", 10).with_height_margin(150);
        assert_eq!(tiny.last_valid_height, 0);
    }
}
