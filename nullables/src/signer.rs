//! Nullable signer: readable, deterministic "signatures".

use roundkeeper_ledger::{LedgerError, OperationSigner};
use roundkeeper_types::{AttemptId, LivenessToken, Operation, SignedOperation};
use std::sync::Mutex;

use crate::lock;

/// Produces `payer|token|limit|payload` bytes with id `payer:token`.
///
/// Different tokens always give different bytes, like a real signer.
#[derive(Default)]
pub struct NullSigner {
    limits: Mutex<Vec<Option<u32>>>,
}

impl NullSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute-unit limits passed to each `sign` call, in order.
    pub fn limits(&self) -> Vec<Option<u32>> {
        lock(&self.limits).clone()
    }

    pub fn sign_count(&self) -> usize {
        lock(&self.limits).len()
    }
}

impl OperationSigner for NullSigner {
    fn sign(
        &self,
        operation: &Operation,
        token: &LivenessToken,
        compute_unit_limit: Option<u32>,
    ) -> Result<SignedOperation, LedgerError> {
        lock(&self.limits).push(compute_unit_limit);

        let limit = compute_unit_limit.map(|l| l.to_string()).unwrap_or_default();
        let mut bytes =
            format!("{}|{}|{}|", operation.payer(), token.hash, limit).into_bytes();
        bytes.extend_from_slice(operation.payload());
        let id = AttemptId::new(format!("{}:{}", operation.payer(), token.hash));
        Ok(SignedOperation::new(id, bytes))
    }
}
