//! Round deadlines.

use std::sync::Arc;
use std::time::Duration;

use roundkeeper_ledger::{LedgerError, StakingProtocol};
use roundkeeper_types::{RoundId, Timestamp};
use roundkeeper_utils::retry;
use tokio::time::sleep;

/// Minimum length of a staking round (6 hours).
pub const DEFAULT_MIN_ROUND_DURATION: Duration = Duration::from_secs(21_600);

/// Earliest moment the round that started at `start` can be advanced.
pub fn next_deadline(start: Timestamp, min_duration: Duration) -> Timestamp {
    start.saturating_add(min_duration)
}

/// A round is stale once `now` is strictly past its deadline.
pub fn is_stale(deadline: Timestamp, now: Timestamp) -> bool {
    now > deadline
}

/// Snapshot of one round, read once per cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundState {
    pub round: RoundId,
    pub start: Timestamp,
    pub deadline: Timestamp,
}

impl RoundState {
    pub fn new(round: RoundId, start: Timestamp, min_duration: Duration) -> Self {
        Self {
            round,
            start,
            deadline: next_deadline(start, min_duration),
        }
    }

    pub fn is_stale(&self, now: Timestamp) -> bool {
        is_stale(self.deadline, now)
    }
}

/// Reads round start times and turns them into deadlines.
pub struct RoundTracker {
    protocol: Arc<dyn StakingProtocol>,
    min_duration: Duration,
    fetch_attempts: usize,
    read_delay: Duration,
}

impl RoundTracker {
    pub fn new(
        protocol: Arc<dyn StakingProtocol>,
        min_duration: Duration,
        fetch_attempts: usize,
        read_delay: Duration,
    ) -> Self {
        Self {
            protocol,
            min_duration,
            fetch_attempts,
            read_delay,
        }
    }

    /// Read one round, retrying transient failures.
    pub async fn fetch(&self, round: &RoundId) -> Result<RoundState, LedgerError> {
        let protocol: &dyn StakingProtocol = self.protocol.as_ref();
        let start = retry(
            self.fetch_attempts,
            self.read_delay,
            LedgerError::is_transient,
            move || protocol.round_start_time(round),
        )
        .await?;
        Ok(RoundState::new(round.clone(), start, self.min_duration))
    }

    /// Read every round in `rounds`. Rounds that cannot be read are logged
    /// and left out.
    pub async fn fetch_all(&self, rounds: &[RoundId]) -> Vec<RoundState> {
        let mut states = Vec::with_capacity(rounds.len());
        for (i, round) in rounds.iter().enumerate() {
            if i > 0 {
                sleep(self.read_delay).await;
            }
            match self.fetch(round).await {
                Ok(state) => {
                    tracing::info!(
                        round = %state.round,
                        start = %state.start,
                        deadline = %state.deadline,
                        "next round deadline"
                    );
                    states.push(state);
                }
                Err(e) => {
                    tracing::error!(round = %round, error = %e, "failed to read round state");
                }
            }
        }
        states
    }
}
