//! Nullable ledger: a scriptable endpoint that records what it was sent.

use async_trait::async_trait;
use roundkeeper_ledger::{LedgerClient, LedgerError};
use roundkeeper_types::{AttemptId, Commitment, ConfirmationOutcome, LivenessToken, Simulation};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

use crate::lock;

/// How the confirmation watch for one attempt behaves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmScript {
    /// Confirm after the delay, unless the window closes first.
    ConfirmAfter(Duration),
    /// Report an execution failure after the delay.
    FailAfter(Duration, String),
    /// Never land; report expiry when the window closes.
    Never,
    /// The confirmation request itself errors immediately.
    Error(String),
}

/// A deterministic ledger endpoint.
///
/// Block height is derived from tokio time: one block per `slot` since the
/// ledger was created. Liveness tokens are numbered `token-1`, `token-2`, ...
/// and stay valid for `window` blocks. Each distinct byte sequence broadcast
/// gets its own id, `net-sig-1`, `net-sig-2`, ...
///
/// Confirmation behaviour is scripted per `confirm` call, in order; once the
/// script queue is empty the default script applies. Ids this ledger never
/// handed out are unknown to it: they stay pending until the window closes
/// and consume no script.
pub struct NullLedger {
    origin: Instant,
    slot: Duration,
    window: u64,
    state: Mutex<State>,
}

struct State {
    tokens_issued: u64,
    token_failures: usize,
    simulations: VecDeque<Simulation>,
    simulate_calls: usize,
    broadcast_failures: usize,
    height_failures: usize,
    broadcasts: Vec<Broadcast>,
    ids: HashMap<Vec<u8>, AttemptId>,
    confirm_scripts: VecDeque<ConfirmScript>,
    default_confirm: ConfirmScript,
    confirmed_ids: Vec<AttemptId>,
}

/// One recorded successful broadcast.
#[derive(Clone, Debug)]
pub struct Broadcast {
    pub bytes: Vec<u8>,
    /// Time since the ledger was created.
    pub at: Duration,
}

impl NullLedger {
    /// 400 ms blocks, 300-block token window, attempts never confirm.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            slot: Duration::from_millis(400),
            window: 300,
            state: Mutex::new(State {
                tokens_issued: 0,
                token_failures: 0,
                simulations: VecDeque::new(),
                simulate_calls: 0,
                broadcast_failures: 0,
                height_failures: 0,
                broadcasts: Vec::new(),
                ids: HashMap::new(),
                confirm_scripts: VecDeque::new(),
                default_confirm: ConfirmScript::Never,
                confirmed_ids: Vec::new(),
            }),
        }
    }

    pub fn with_slot(mut self, slot: Duration) -> Self {
        self.slot = slot;
        self
    }

    pub fn with_window(mut self, window: u64) -> Self {
        self.window = window;
        self
    }

    /// Script the next unscripted `confirm` call.
    pub fn push_confirm(&self, script: ConfirmScript) {
        lock(&self.state).confirm_scripts.push_back(script);
    }

    pub fn set_default_confirm(&self, script: ConfirmScript) {
        lock(&self.state).default_confirm = script;
    }

    /// Script the next `simulate` result. Unscripted calls succeed without
    /// reporting compute units.
    pub fn push_simulation(&self, simulation: Simulation) {
        lock(&self.state).simulations.push_back(simulation);
    }

    pub fn fail_next_token_fetches(&self, n: usize) {
        lock(&self.state).token_failures = n;
    }

    pub fn fail_next_broadcasts(&self, n: usize) {
        lock(&self.state).broadcast_failures = n;
    }

    /// Make the next `n` `block_height` calls fail. `usize::MAX` keeps the
    /// height unavailable for good.
    pub fn fail_next_block_heights(&self, n: usize) {
        lock(&self.state).height_failures = n;
    }

    /// Current height according to tokio time.
    pub fn height(&self) -> u64 {
        (self.origin.elapsed().as_millis() / self.slot.as_millis().max(1)) as u64
    }

    pub fn broadcasts(&self) -> Vec<Broadcast> {
        lock(&self.state).broadcasts.clone()
    }

    pub fn broadcast_count(&self) -> usize {
        lock(&self.state).broadcasts.len()
    }

    /// Number of distinct signed byte sequences that were broadcast.
    pub fn distinct_attempts(&self) -> usize {
        lock(&self.state).ids.len()
    }

    pub fn tokens_issued(&self) -> u64 {
        lock(&self.state).tokens_issued
    }

    pub fn simulate_calls(&self) -> usize {
        lock(&self.state).simulate_calls
    }

    pub fn confirm_calls(&self) -> usize {
        lock(&self.state).confirmed_ids.len()
    }

    /// Ids passed to `confirm`, in call order.
    pub fn confirmed_ids(&self) -> Vec<AttemptId> {
        lock(&self.state).confirmed_ids.clone()
    }

    /// The instant at which a chain following this ledger passes `height`.
    fn instant_after_height(&self, height: u64) -> Instant {
        self.origin + self.slot * (height.saturating_add(1) as u32)
    }
}

impl Default for NullLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for NullLedger {
    async fn latest_liveness_token(
        &self,
        _commitment: Commitment,
    ) -> Result<LivenessToken, LedgerError> {
        let height = self.height();
        let mut state = lock(&self.state);
        if state.token_failures > 0 {
            state.token_failures -= 1;
            return Err(LedgerError::Transport("token fetch refused".into()));
        }
        state.tokens_issued += 1;
        Ok(LivenessToken::new(
            format!("token-{}", state.tokens_issued),
            height + self.window,
        ))
    }

    async fn simulate(&self, _signed: &[u8]) -> Result<Simulation, LedgerError> {
        let mut state = lock(&self.state);
        state.simulate_calls += 1;
        Ok(state
            .simulations
            .pop_front()
            .unwrap_or(Simulation::Success {
                units_consumed: None,
            }))
    }

    async fn broadcast(&self, signed: &[u8]) -> Result<AttemptId, LedgerError> {
        let at = self.origin.elapsed();
        let mut state = lock(&self.state);
        if state.broadcast_failures > 0 {
            state.broadcast_failures -= 1;
            return Err(LedgerError::Transport("broadcast dropped".into()));
        }
        state.broadcasts.push(Broadcast {
            bytes: signed.to_vec(),
            at,
        });
        let next = state.ids.len() + 1;
        let id = state
            .ids
            .entry(signed.to_vec())
            .or_insert_with(|| AttemptId::new(format!("net-sig-{next}")))
            .clone();
        Ok(id)
    }

    async fn confirm(
        &self,
        id: &AttemptId,
        token: &LivenessToken,
        _commitment: Commitment,
    ) -> Result<ConfirmationOutcome, LedgerError> {
        let expiry = self.instant_after_height(token.last_valid_height);
        let script = {
            let mut state = lock(&self.state);
            state.confirmed_ids.push(id.clone());
            if !state.ids.values().any(|issued| issued == id) {
                None
            } else {
                Some(
                    state
                        .confirm_scripts
                        .pop_front()
                        .unwrap_or_else(|| state.default_confirm.clone()),
                )
            }
        };
        let Some(script) = script else {
            sleep_until(expiry).await;
            return Ok(ConfirmationOutcome::Expired);
        };

        let (delay, outcome) = match script {
            ConfirmScript::Error(msg) => return Err(LedgerError::Transport(msg)),
            ConfirmScript::Never => {
                sleep_until(expiry).await;
                return Ok(ConfirmationOutcome::Expired);
            }
            ConfirmScript::ConfirmAfter(delay) => (delay, ConfirmationOutcome::Confirmed),
            ConfirmScript::FailAfter(delay, reason) => (delay, ConfirmationOutcome::Failed(reason)),
        };

        let settle_at = Instant::now() + delay;
        if settle_at < expiry {
            sleep_until(settle_at).await;
            Ok(outcome)
        } else {
            sleep_until(expiry).await;
            Ok(ConfirmationOutcome::Expired)
        }
    }

    async fn block_height(&self, _commitment: Commitment) -> Result<u64, LedgerError> {
        let mut state = lock(&self.state);
        if state.height_failures > 0 {
            state.height_failures -= 1;
            return Err(LedgerError::Transport("block height unavailable".into()));
        }
        Ok(self.height())
    }
}
