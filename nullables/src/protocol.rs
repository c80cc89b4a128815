//! Nullable staking protocol: in-memory round and account state.

use async_trait::async_trait;
use roundkeeper_ledger::{LedgerError, StakingProtocol};
use roundkeeper_types::{
    AccountId, LockedPosition, Operation, OperationKind, RoundId, Timestamp, TokenAmount,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::lock;

/// A record of one operation the protocol was asked to build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltOperation {
    pub kind: OperationKind,
    pub account: AccountId,
    pub round: Option<RoundId>,
    pub amount: Option<TokenAmount>,
    pub position_id: Option<u64>,
}

/// In-memory protocol state. Unknown rounds are unreachable, unknown
/// accounts have no reward token account and no positions.
#[derive(Default)]
pub struct NullProtocol {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    round_starts: HashMap<RoundId, Timestamp>,
    unreachable_rounds: HashSet<RoundId>,
    round_queries: usize,
    balances: HashMap<AccountId, TokenAmount>,
    positions: HashMap<AccountId, Vec<LockedPosition>>,
    failing_builds: HashSet<AccountId>,
    built: Vec<BuiltOperation>,
}

impl NullProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_round_start(&self, round: &RoundId, start: Timestamp) {
        let mut state = lock(&self.state);
        state.unreachable_rounds.remove(round);
        state.round_starts.insert(round.clone(), start);
    }

    /// Make `round_start_time` fail for `round` until the next
    /// `set_round_start`.
    pub fn set_round_unreachable(&self, round: &RoundId) {
        lock(&self.state).unreachable_rounds.insert(round.clone());
    }

    pub fn set_balance(&self, account: &AccountId, balance: TokenAmount) {
        lock(&self.state).balances.insert(account.clone(), balance);
    }

    pub fn set_positions(&self, account: &AccountId, positions: Vec<LockedPosition>) {
        lock(&self.state).positions.insert(account.clone(), positions);
    }

    /// Make every builder fail for `account`.
    pub fn fail_builds_for(&self, account: &AccountId) {
        lock(&self.state).failing_builds.insert(account.clone());
    }

    pub fn built(&self) -> Vec<BuiltOperation> {
        lock(&self.state).built.clone()
    }

    pub fn built_of(&self, kind: OperationKind) -> Vec<BuiltOperation> {
        lock(&self.state)
            .built
            .iter()
            .filter(|b| b.kind == kind)
            .cloned()
            .collect()
    }

    pub fn round_queries(&self) -> usize {
        lock(&self.state).round_queries
    }

    fn build(&self, record: BuiltOperation) -> Result<Operation, LedgerError> {
        let mut state = lock(&self.state);
        if state.failing_builds.contains(&record.account) {
            return Err(LedgerError::Protocol(format!(
                "cannot build {} for {}",
                record.kind, record.account
            )));
        }
        let payload = format!(
            "{}:{}:{}:{}:{}",
            record.kind,
            record.account,
            record.round.as_ref().map(RoundId::as_str).unwrap_or("-"),
            record.amount.map(|a| a.raw()).unwrap_or(0),
            record.position_id.unwrap_or(0),
        );
        let op = Operation::new(record.kind, record.account.clone(), payload.into_bytes())?;
        state.built.push(record);
        Ok(op)
    }
}

#[async_trait]
impl StakingProtocol for NullProtocol {
    async fn round_start_time(&self, round: &RoundId) -> Result<Timestamp, LedgerError> {
        let mut state = lock(&self.state);
        state.round_queries += 1;
        if state.unreachable_rounds.contains(round) {
            return Err(LedgerError::Transport(format!("round {round} unreachable")));
        }
        state
            .round_starts
            .get(round)
            .copied()
            .ok_or_else(|| LedgerError::Protocol(format!("round {round} unknown")))
    }

    async fn reward_balance(
        &self,
        account: &AccountId,
    ) -> Result<Option<TokenAmount>, LedgerError> {
        Ok(lock(&self.state).balances.get(account).copied())
    }

    async fn locked_positions(
        &self,
        account: &AccountId,
    ) -> Result<Vec<LockedPosition>, LedgerError> {
        Ok(lock(&self.state)
            .positions
            .get(account)
            .cloned()
            .unwrap_or_default())
    }

    async fn build_claim(
        &self,
        account: &AccountId,
        round: &RoundId,
    ) -> Result<Operation, LedgerError> {
        self.build(BuiltOperation {
            kind: OperationKind::Claim,
            account: account.clone(),
            round: Some(round.clone()),
            amount: None,
            position_id: None,
        })
    }

    async fn build_stake(
        &self,
        account: &AccountId,
        amount: TokenAmount,
    ) -> Result<Operation, LedgerError> {
        self.build(BuiltOperation {
            kind: OperationKind::Stake,
            account: account.clone(),
            round: None,
            amount: Some(amount),
            position_id: None,
        })
    }

    async fn build_upgrade(
        &self,
        account: &AccountId,
        amount: TokenAmount,
        position: &LockedPosition,
    ) -> Result<Operation, LedgerError> {
        self.build(BuiltOperation {
            kind: OperationKind::Upgrade,
            account: account.clone(),
            round: None,
            amount: Some(amount),
            position_id: Some(position.id),
        })
    }

    async fn build_round_advance(
        &self,
        payer: &AccountId,
        round: &RoundId,
    ) -> Result<Operation, LedgerError> {
        self.build(BuiltOperation {
            kind: OperationKind::RoundAdvance,
            account: payer.clone(),
            round: Some(round.clone()),
            amount: None,
            position_id: None,
        })
    }
}
