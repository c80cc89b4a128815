//! Staking protocol trait.

use async_trait::async_trait;
use roundkeeper_types::{
    AccountId, LockedPosition, Operation, RoundId, Timestamp, TokenAmount,
};

use crate::LedgerError;

/// Protocol-specific reads and operation builders.
///
/// Everything that knows about account layouts, instruction encoding or
/// addressing lives behind this trait. Operations come back unsigned; the
/// delivery engine signs each attempt.
#[async_trait]
pub trait StakingProtocol: Send + Sync {
    /// Start time of the round currently open for `round`.
    async fn round_start_time(&self, round: &RoundId) -> Result<Timestamp, LedgerError>;

    /// Reward-token balance of `account`. `None` means the token account does
    /// not exist yet, which callers treat as zero.
    async fn reward_balance(&self, account: &AccountId)
        -> Result<Option<TokenAmount>, LedgerError>;

    /// Existing locked positions of `account`, in protocol order.
    async fn locked_positions(
        &self,
        account: &AccountId,
    ) -> Result<Vec<LockedPosition>, LedgerError>;

    async fn build_claim(
        &self,
        account: &AccountId,
        round: &RoundId,
    ) -> Result<Operation, LedgerError>;

    /// Create a fresh liquid stake of `amount`.
    async fn build_stake(
        &self,
        account: &AccountId,
        amount: TokenAmount,
    ) -> Result<Operation, LedgerError>;

    /// Add `amount` to the existing `position`.
    async fn build_upgrade(
        &self,
        account: &AccountId,
        amount: TokenAmount,
        position: &LockedPosition,
    ) -> Result<Operation, LedgerError>;

    /// Advance the stale `round`, paid for by `payer`.
    async fn build_round_advance(
        &self,
        payer: &AccountId,
        round: &RoundId,
    ) -> Result<Operation, LedgerError>;
}
