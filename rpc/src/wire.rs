//! JSON-RPC envelopes and response shapes.
//!
//! Everything here is pure so response handling can be tested without a
//! server.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use roundkeeper_ledger::LedgerError;
use roundkeeper_types::{Commitment, LivenessToken, Simulation, TokenAmount};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error code the endpoint returns for parameters naming a missing account.
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl Response {
    /// The `result` field decoded as `T`, or the endpoint's error.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, LedgerError> {
        if let Some(err) = self.error {
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let result = self.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| LedgerError::InvalidResponse(e.to_string()))
    }
}

/// Results wrapped in `{ "context": ..., "value": ... }`.
#[derive(Debug, Deserialize)]
pub struct WithContext<T> {
    pub value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockhashValue {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

impl From<BlockhashValue> for LivenessToken {
    fn from(v: BlockhashValue) -> Self {
        LivenessToken::new(v.blockhash, v.last_valid_block_height)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationValue {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub units_consumed: Option<u64>,
    #[serde(default)]
    pub logs: Option<Vec<String>>,
}

impl From<SimulationValue> for Simulation {
    fn from(v: SimulationValue) -> Self {
        match v.err {
            None | Some(Value::Null) => Simulation::Success {
                units_consumed: v.units_consumed,
            },
            Some(Value::String(ref s)) if s == "BlockhashNotFound" => Simulation::TokenExpired,
            Some(other) => Simulation::Rejected(describe_err(&other)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub confirmation_status: Option<Commitment>,
}

/// What one status poll says about an attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum StatusReading {
    /// Not seen yet, or seen below the wanted commitment.
    Pending,
    Reached,
    Failed(String),
}

impl SignatureStatus {
    pub fn reading(&self, wanted: Commitment) -> StatusReading {
        if let Some(err) = self.err.as_ref().filter(|e| !e.is_null()) {
            return StatusReading::Failed(describe_err(err));
        }
        match self.confirmation_status {
            Some(reached) if wanted.is_satisfied_by(reached) => StatusReading::Reached,
            _ => StatusReading::Pending,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenBalanceValue {
    pub amount: String,
}

impl TokenBalanceValue {
    pub fn to_amount(&self) -> Result<TokenAmount, LedgerError> {
        self.amount
            .parse::<u64>()
            .map(TokenAmount::new)
            .map_err(|e| LedgerError::InvalidResponse(format!("token amount {:?}: {e}", self.amount)))
    }
}

#[derive(Debug, Deserialize)]
pub struct AccountValue {
    /// `[base64, "base64"]`.
    pub data: (String, String),
}

impl AccountValue {
    pub fn decode(&self) -> Result<Vec<u8>, LedgerError> {
        STANDARD
            .decode(&self.data.0)
            .map_err(|e| LedgerError::InvalidResponse(format!("account data: {e}")))
    }
}

pub fn encode_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Whether an error says the requested account does not exist.
pub fn is_missing_account(err: &LedgerError) -> bool {
    match err {
        LedgerError::Rpc { code, message } => {
            *code == INVALID_PARAMS && message.to_ascii_lowercase().contains("could not find account")
        }
        _ => false,
    }
}

fn describe_err(err: &Value) -> String {
    match err {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
