//! Ledger endpoint trait.

use async_trait::async_trait;
use roundkeeper_types::{AttemptId, Commitment, ConfirmationOutcome, LivenessToken, Simulation};

use crate::LedgerError;

/// The network operations the delivery engine needs from a ledger endpoint.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch a fresh liveness token together with its validity window.
    async fn latest_liveness_token(
        &self,
        commitment: Commitment,
    ) -> Result<LivenessToken, LedgerError>;

    /// Dry-run signed bytes without broadcasting them.
    async fn simulate(&self, signed: &[u8]) -> Result<Simulation, LedgerError>;

    /// Send signed bytes once. Returns the identifier the network assigned.
    async fn broadcast(&self, signed: &[u8]) -> Result<AttemptId, LedgerError>;

    /// Wait until `id` reaches `commitment`, fails, or the window of `token`
    /// closes. Implementations must not outlive `token.last_valid_height`.
    async fn confirm(
        &self,
        id: &AttemptId,
        token: &LivenessToken,
        commitment: Commitment,
    ) -> Result<ConfirmationOutcome, LedgerError>;

    /// Current block height.
    async fn block_height(&self, commitment: Commitment) -> Result<u64, LedgerError>;
}
