//! Operation signer trait.

use roundkeeper_types::{LivenessToken, Operation, SignedOperation};

use crate::LedgerError;

/// Turns an unsigned operation into the wire bytes of one delivery attempt.
///
/// Called once per attempt (and once more per simulation draft), always with
/// the attempt's own liveness token, so signed bytes are never shared between
/// attempts.
pub trait OperationSigner: Send + Sync {
    fn sign(
        &self,
        operation: &Operation,
        token: &LivenessToken,
        compute_unit_limit: Option<u32>,
    ) -> Result<SignedOperation, LedgerError>;
}
