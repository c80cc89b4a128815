//! Locked stake positions.

use serde::{Deserialize, Serialize};

use crate::TokenAmount;

/// An existing locked stake position owned by an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPosition {
    /// Position identifier as understood by the staking protocol.
    pub id: u64,
    /// Lock tier in days.
    pub lock_days: u32,
    pub amount: TokenAmount,
    /// Identifier of the automation thread attached to the position, if any.
    #[serde(default)]
    pub thread_id: Option<u64>,
}

impl LockedPosition {
    /// Positions whose stake has been fully withdrawn stay listed with a zero
    /// amount; they are not candidates for anything.
    pub fn is_active(&self) -> bool {
        !self.amount.is_zero()
    }
}
