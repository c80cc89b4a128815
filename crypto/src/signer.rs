//! Keypair-backed [`OperationSigner`].

use std::collections::HashMap;

use roundkeeper_ledger::{LedgerError, OperationSigner};
use roundkeeper_types::{AccountId, AttemptId, LivenessToken, Operation, SignedOperation};

use crate::envelope::encode_message;
use crate::Keypair;

/// Signs operations for a fixed set of accounts, producing the envelope
/// format described in [`crate::envelope`]. The attempt id is the hex
/// encoded signature.
#[derive(Default)]
pub struct KeypairSigner {
    keys: HashMap<AccountId, Keypair>,
}

impl KeypairSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the key pair that signs for `account`. Replaces any
    /// previously registered key.
    pub fn insert(&mut self, account: AccountId, keypair: Keypair) {
        self.keys.insert(account, keypair);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn public_key(&self, account: &AccountId) -> Option<[u8; 32]> {
        self.keys.get(account).map(Keypair::public_bytes)
    }
}

impl OperationSigner for KeypairSigner {
    fn sign(
        &self,
        operation: &Operation,
        token: &LivenessToken,
        compute_unit_limit: Option<u32>,
    ) -> Result<SignedOperation, LedgerError> {
        let keypair = self.keys.get(operation.payer()).ok_or_else(|| {
            LedgerError::Signing(format!("no key registered for {}", operation.payer()))
        })?;

        let message = encode_message(
            operation.payer().as_str(),
            &token.hash,
            compute_unit_limit,
            operation.payload(),
        )
        .map_err(|e| LedgerError::Signing(e.to_string()))?;
        let signature = keypair.sign(&message);

        let mut bytes = Vec::with_capacity(signature.len() + message.len());
        bytes.extend_from_slice(&signature);
        bytes.extend_from_slice(&message);

        Ok(SignedOperation::new(AttemptId::new(hex::encode(signature)), bytes))
    }
}
