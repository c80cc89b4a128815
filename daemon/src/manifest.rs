//! Operation manifest.
//!
//! The daemon does not know how the staking program lays out accounts or
//! encodes instructions. The manifest supplies those pieces as opaque
//! payloads, together with the accounts to act for and their signing seeds:
//!
//! ```toml
//! [[rounds]]
//! id = "adx"
//! state_account = "<address of the round's state account>"
//! start_time_offset = 8
//! advance_payload = "0a0b..."
//!
//! [[accounts]]
//! id = "<account address>"
//! seed = "<32-byte hex ed25519 seed>"
//! reward_token_account = "<token account address>"
//! stake_payload = "..."
//! upgrade_payload = "..."
//! claim_payloads = { adx = "..." }
//!
//! [[accounts.positions]]
//! id = 3
//! lock_days = 540
//! state_account = "<address of the position account>"
//! amount_offset = 40
//! ```
//!
//! A position's amount is read from `state_account` at `amount_offset`
//! (u64 little-endian) on every cycle, so it follows upgrades. Positions
//! without a state account carry a fixed `amount` instead.
//!
//! Stake payloads get the amount appended as u64 little-endian. Upgrade
//! payloads get the position id and then the amount, both u64 little-endian.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use zeroize::Zeroize;

use roundkeeper_crypto::{keypair_from_hex_seed, KeypairSigner};
use roundkeeper_ledger::{LedgerError, StakingProtocol};
use roundkeeper_rpc::RpcLedgerClient;
use roundkeeper_types::{
    AccountId, Commitment, LockedPosition, Operation, OperationKind, RoundId, Timestamp,
    TokenAmount,
};

use crate::config::ConfigError;

#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub rounds: Vec<RoundSpec>,
    #[serde(default)]
    pub accounts: Vec<AccountSpec>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RoundSpec {
    pub id: RoundId,
    /// Account whose data carries the round start time.
    pub state_account: String,
    /// Byte offset of the start time (i64 little-endian, Unix seconds).
    pub start_time_offset: usize,
    pub advance_payload: String,
}

#[derive(Deserialize)]
pub struct AccountSpec {
    pub id: AccountId,
    seed: String,
    pub reward_token_account: String,
    pub stake_payload: String,
    pub upgrade_payload: String,
    #[serde(default)]
    pub claim_payloads: BTreeMap<String, String>,
    #[serde(default)]
    pub positions: Vec<PositionSpec>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PositionSpec {
    pub id: u64,
    pub lock_days: u32,
    #[serde(default)]
    pub thread_id: Option<u64>,
    /// Fixed amount, for positions without a state account.
    #[serde(default)]
    pub amount: Option<TokenAmount>,
    #[serde(default)]
    pub state_account: Option<String>,
    /// Byte offset of the amount in `state_account`.
    #[serde(default)]
    pub amount_offset: usize,
}

impl fmt::Debug for AccountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSpec")
            .field("id", &self.id)
            .field("seed", &"<redacted>")
            .field("reward_token_account", &self.reward_token_account)
            .field("claim_payloads", &self.claim_payloads.keys())
            .field("positions", &self.positions)
            .finish_non_exhaustive()
    }
}

impl Drop for AccountSpec {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

impl Manifest {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let manifest: Self = toml::from_str(s).map_err(|e| ConfigError::Parse {
            what: "manifest".into(),
            message: e.to_string(),
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.accounts.is_empty() && self.rounds.is_empty() {
            return Err(ConfigError::Invalid("manifest tracks no rounds".into()));
        }
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if !seen.insert(&account.id) {
                return Err(ConfigError::Invalid(format!("duplicate account {}", account.id)));
            }
            for position in &account.positions {
                if position.amount.is_some() == position.state_account.is_some() {
                    return Err(ConfigError::Invalid(format!(
                        "position {} of {} needs exactly one of amount or state_account",
                        position.id, account.id
                    )));
                }
            }
            for round in &self.rounds {
                if !account.claim_payloads.contains_key(round.id.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "account {} has no claim payload for round {}",
                        account.id, round.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn round_ids(&self) -> Vec<RoundId> {
        self.rounds.iter().map(|r| r.id.clone()).collect()
    }

    pub fn account_ids(&self) -> Vec<AccountId> {
        self.accounts.iter().map(|a| a.id.clone()).collect()
    }

    /// A signer holding every account's key.
    pub fn signer(&self) -> Result<KeypairSigner, ConfigError> {
        let mut signer = KeypairSigner::new();
        for account in &self.accounts {
            let keypair = keypair_from_hex_seed(&account.seed).map_err(|e| {
                ConfigError::Invalid(format!("signing seed for {}: {e}", account.id))
            })?;
            signer.insert(account.id.clone(), keypair);
        }
        Ok(signer)
    }
}

struct RoundEntry {
    state_account: String,
    start_time_offset: usize,
    advance_payload: Vec<u8>,
}

struct AccountEntry {
    reward_token_account: String,
    stake_payload: Vec<u8>,
    upgrade_payload: Vec<u8>,
    claim_payloads: HashMap<RoundId, Vec<u8>>,
    positions: Vec<PositionSpec>,
}

/// [`StakingProtocol`] backed by manifest payloads and JSON-RPC reads.
pub struct ManifestProtocol {
    client: Arc<RpcLedgerClient>,
    commitment: Commitment,
    rounds: HashMap<RoundId, RoundEntry>,
    accounts: HashMap<AccountId, AccountEntry>,
}

impl ManifestProtocol {
    pub fn new(
        manifest: &Manifest,
        client: Arc<RpcLedgerClient>,
        commitment: Commitment,
    ) -> Result<Self, ConfigError> {
        let mut rounds = HashMap::new();
        for round in &manifest.rounds {
            rounds.insert(
                round.id.clone(),
                RoundEntry {
                    state_account: round.state_account.clone(),
                    start_time_offset: round.start_time_offset,
                    advance_payload: decode_payload(&round.advance_payload, "advance_payload")?,
                },
            );
        }

        let mut accounts = HashMap::new();
        for account in &manifest.accounts {
            let mut claim_payloads = HashMap::new();
            for (round, payload) in &account.claim_payloads {
                let round = RoundId::new(round.as_str())
                    .map_err(|e| ConfigError::Invalid(format!("claim payload key: {e}")))?;
                claim_payloads.insert(round, decode_payload(payload, "claim_payloads")?);
            }
            accounts.insert(
                account.id.clone(),
                AccountEntry {
                    reward_token_account: account.reward_token_account.clone(),
                    stake_payload: decode_payload(&account.stake_payload, "stake_payload")?,
                    upgrade_payload: decode_payload(&account.upgrade_payload, "upgrade_payload")?,
                    claim_payloads,
                    positions: account.positions.clone(),
                },
            );
        }

        Ok(Self {
            client,
            commitment,
            rounds,
            accounts,
        })
    }

    fn round(&self, round: &RoundId) -> Result<&RoundEntry, LedgerError> {
        self.rounds
            .get(round)
            .ok_or_else(|| LedgerError::Protocol(format!("round {round} not in manifest")))
    }

    fn account(&self, account: &AccountId) -> Result<&AccountEntry, LedgerError> {
        self.accounts
            .get(account)
            .ok_or_else(|| LedgerError::Protocol(format!("account {account} not in manifest")))
    }
}

fn decode_payload(hex_payload: &str, field: &str) -> Result<Vec<u8>, ConfigError> {
    let bytes = hex::decode(hex_payload.trim())
        .map_err(|e| ConfigError::Invalid(format!("{field} is not hex: {e}")))?;
    if bytes.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} is empty")));
    }
    Ok(bytes)
}

fn read_word(data: &[u8], offset: usize, what: &str) -> Result<[u8; 8], LedgerError> {
    data.get(offset..offset.saturating_add(8))
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            LedgerError::InvalidResponse(format!(
                "account holds {} bytes, {what} expected at {offset}",
                data.len()
            ))
        })
}

/// Read the i64 little-endian Unix-seconds start time at `offset`.
pub fn read_start_time(data: &[u8], offset: usize) -> Result<Timestamp, LedgerError> {
    let secs = i64::from_le_bytes(read_word(data, offset, "start time")?);
    u64::try_from(secs)
        .map(Timestamp::from_secs)
        .map_err(|_| LedgerError::InvalidResponse(format!("negative round start time {secs}")))
}

/// Read the u64 little-endian position amount at `offset`.
pub fn read_amount(data: &[u8], offset: usize) -> Result<TokenAmount, LedgerError> {
    Ok(TokenAmount::new(u64::from_le_bytes(read_word(
        data,
        offset,
        "position amount",
    )?)))
}

fn with_suffix(base: &[u8], parts: &[u64]) -> Vec<u8> {
    let mut payload = base.to_vec();
    for part in parts {
        payload.extend_from_slice(&part.to_le_bytes());
    }
    payload
}

#[async_trait]
impl StakingProtocol for ManifestProtocol {
    async fn round_start_time(&self, round: &RoundId) -> Result<Timestamp, LedgerError> {
        let entry = self.round(round)?;
        let data = self
            .client
            .account_data(&entry.state_account, self.commitment)
            .await?
            .ok_or_else(|| {
                LedgerError::Protocol(format!("round state account {} missing", entry.state_account))
            })?;
        read_start_time(&data, entry.start_time_offset)
    }

    async fn reward_balance(
        &self,
        account: &AccountId,
    ) -> Result<Option<TokenAmount>, LedgerError> {
        let entry = self.account(account)?;
        self.client
            .token_account_balance(&entry.reward_token_account, self.commitment)
            .await
    }

    async fn locked_positions(
        &self,
        account: &AccountId,
    ) -> Result<Vec<LockedPosition>, LedgerError> {
        let specs = &self.account(account)?.positions;
        let mut positions = Vec::with_capacity(specs.len());
        for spec in specs {
            let amount = match (&spec.state_account, spec.amount) {
                (Some(state_account), _) => {
                    match self.client.account_data(state_account, self.commitment).await? {
                        Some(data) => read_amount(&data, spec.amount_offset)?,
                        // Closed position accounts hold nothing.
                        None => TokenAmount::ZERO,
                    }
                }
                (None, amount) => amount.unwrap_or(TokenAmount::ZERO),
            };
            positions.push(LockedPosition {
                id: spec.id,
                lock_days: spec.lock_days,
                amount,
                thread_id: spec.thread_id,
            });
        }
        Ok(positions)
    }

    async fn build_claim(
        &self,
        account: &AccountId,
        round: &RoundId,
    ) -> Result<Operation, LedgerError> {
        let payload = self
            .account(account)?
            .claim_payloads
            .get(round)
            .ok_or_else(|| {
                LedgerError::Protocol(format!("no claim payload for {account} in round {round}"))
            })?;
        Ok(Operation::new(OperationKind::Claim, account.clone(), payload.clone())?)
    }

    async fn build_stake(
        &self,
        account: &AccountId,
        amount: TokenAmount,
    ) -> Result<Operation, LedgerError> {
        let entry = self.account(account)?;
        let payload = with_suffix(&entry.stake_payload, &[amount.raw()]);
        Ok(Operation::new(OperationKind::Stake, account.clone(), payload)?)
    }

    async fn build_upgrade(
        &self,
        account: &AccountId,
        amount: TokenAmount,
        position: &LockedPosition,
    ) -> Result<Operation, LedgerError> {
        let entry = self.account(account)?;
        let payload = with_suffix(&entry.upgrade_payload, &[position.id, amount.raw()]);
        Ok(Operation::new(OperationKind::Upgrade, account.clone(), payload)?)
    }

    async fn build_round_advance(
        &self,
        payer: &AccountId,
        round: &RoundId,
    ) -> Result<Operation, LedgerError> {
        let entry = self.round(round)?;
        Ok(Operation::new(
            OperationKind::RoundAdvance,
            payer.clone(),
            entry.advance_payload.clone(),
        )?)
    }
}
