//! [`LedgerClient`] over JSON-RPC.

use async_trait::async_trait;
use roundkeeper_ledger::{LedgerClient, LedgerError};
use roundkeeper_types::{AttemptId, Commitment, ConfirmationOutcome, LivenessToken, Simulation};
use serde_json::json;
use tokio::time::sleep;

use crate::wire::{
    encode_bytes, BlockhashValue, SignatureStatus, SimulationValue, StatusReading, WithContext,
};
use crate::RpcLedgerClient;

/// Consecutive failed height polls after which `confirm` gives up, since
/// expiry can no longer be decided.
const HEIGHT_POLL_FAILURE_LIMIT: u32 = 3;

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn latest_liveness_token(
        &self,
        commitment: Commitment,
    ) -> Result<LivenessToken, LedgerError> {
        let ctx: WithContext<BlockhashValue> = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": commitment.as_str() }]),
            )
            .await?;
        Ok(ctx.value.into())
    }

    async fn simulate(&self, signed: &[u8]) -> Result<Simulation, LedgerError> {
        let ctx: WithContext<SimulationValue> = self
            .call(
                "simulateTransaction",
                json!([
                    encode_bytes(signed),
                    { "encoding": "base64", "sigVerify": false, "replaceRecentBlockhash": false }
                ]),
            )
            .await?;
        if let Some(logs) = &ctx.value.logs {
            tracing::trace!(lines = logs.len(), logs = ?logs, "simulation logs");
        }
        Ok(ctx.value.into())
    }

    async fn broadcast(&self, signed: &[u8]) -> Result<AttemptId, LedgerError> {
        let signature: String = self
            .call(
                "sendTransaction",
                json!([
                    encode_bytes(signed),
                    { "encoding": "base64", "skipPreflight": true, "maxRetries": 0 }
                ]),
            )
            .await?;
        Ok(AttemptId::new(signature))
    }

    async fn confirm(
        &self,
        id: &AttemptId,
        token: &LivenessToken,
        commitment: Commitment,
    ) -> Result<ConfirmationOutcome, LedgerError> {
        let mut height_failures = 0u32;
        loop {
            match self.signature_status(id).await {
                Ok(Some(status)) => match status.reading(commitment) {
                    StatusReading::Reached => return Ok(ConfirmationOutcome::Confirmed),
                    StatusReading::Failed(reason) => return Ok(ConfirmationOutcome::Failed(reason)),
                    StatusReading::Pending => {}
                },
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(signature = %id, error = %e, "status poll failed");
                }
            }

            match self.block_height(commitment).await {
                Ok(height) if !token.is_live_at(height) => {
                    return Ok(ConfirmationOutcome::Expired);
                }
                Ok(_) => height_failures = 0,
                Err(e) => {
                    height_failures += 1;
                    if height_failures >= HEIGHT_POLL_FAILURE_LIMIT {
                        return Err(e);
                    }
                    tracing::debug!(signature = %id, error = %e, "height poll failed");
                }
            }

            sleep(self.poll_interval).await;
        }
    }

    async fn block_height(&self, commitment: Commitment) -> Result<u64, LedgerError> {
        self.call("getBlockHeight", json!([{ "commitment": commitment.as_str() }]))
            .await
    }
}

impl RpcLedgerClient {
    async fn signature_status(&self, id: &AttemptId) -> Result<Option<SignatureStatus>, LedgerError> {
        let ctx: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[id.as_str()], { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(ctx.value.into_iter().next().flatten())
    }
}
