//! HTTP transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use roundkeeper_ledger::LedgerError;
use roundkeeper_types::{Commitment, TokenAmount};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::wire::{
    is_missing_account, AccountValue, Request, Response, TokenBalanceValue, WithContext,
};

/// How often `confirm` polls signature statuses.
pub const DEFAULT_CONFIRM_POLL_INTERVAL: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON-RPC client bound to one endpoint URL.
pub struct RpcLedgerClient {
    pub(crate) http: reqwest::Client,
    pub(crate) url: String,
    next_id: AtomicU64,
    pub(crate) poll_interval: Duration,
}

impl RpcLedgerClient {
    pub fn new(url: impl Into<String>) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
            poll_interval: DEFAULT_CONFIRM_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one JSON-RPC request and decode its `result`.
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .http
            .post(&self.url)
            .json(&Request::new(id, method, params))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LedgerError::Transport(format!("{method} timed out: {e}"))
                } else {
                    LedgerError::Transport(format!("{method} failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "{method}: endpoint returned HTTP {}",
                response.status()
            )));
        }

        let body: Response = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("{method}: {e}")))?;
        body.into_result()
    }

    /// Raw token balance of a token account. `None` if the account does not
    /// exist.
    pub async fn token_account_balance(
        &self,
        account: &str,
        commitment: Commitment,
    ) -> Result<Option<TokenAmount>, LedgerError> {
        let result: Result<WithContext<TokenBalanceValue>, _> = self
            .call(
                "getTokenAccountBalance",
                json!([account, { "commitment": commitment.as_str() }]),
            )
            .await;
        match result {
            Ok(ctx) => ctx.value.to_amount().map(Some),
            Err(e) if is_missing_account(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Raw data of an account. `None` if the account does not exist.
    pub async fn account_data(
        &self,
        account: &str,
        commitment: Commitment,
    ) -> Result<Option<Vec<u8>>, LedgerError> {
        let ctx: WithContext<Option<AccountValue>> = self
            .call(
                "getAccountInfo",
                json!([account, { "encoding": "base64", "commitment": commitment.as_str() }]),
            )
            .await?;
        ctx.value.map(|v| v.decode()).transpose()
    }
}
