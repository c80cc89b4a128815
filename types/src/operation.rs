//! Operations handed to the delivery engine.

use std::fmt;
use std::sync::Arc;

use crate::{AccountId, AttemptId, TypesError};

/// What an operation does. Only used for logging and bookkeeping; the
/// payload itself is opaque.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Claim,
    Stake,
    Upgrade,
    RoundAdvance,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claim => "claim",
            Self::Stake => "stake",
            Self::Upgrade => "upgrade",
            Self::RoundAdvance => "round-advance",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unsigned request against the remote ledger.
///
/// Immutable once built. Every delivery attempt signs it afresh, so the
/// operation itself never carries a liveness token or a signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    kind: OperationKind,
    payer: AccountId,
    payload: Arc<[u8]>,
}

impl Operation {
    pub fn new(
        kind: OperationKind,
        payer: AccountId,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Self, TypesError> {
        let payload: Vec<u8> = payload.into();
        if payload.is_empty() {
            return Err(TypesError::EmptyPayload);
        }
        Ok(Self {
            kind,
            payer,
            payload: payload.into(),
        })
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// The fee payer and signer of the operation.
    pub fn payer(&self) -> &AccountId {
        &self.payer
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// The signed wire bytes of one delivery attempt.
///
/// `bytes` is shared, never mutated: every rebroadcast of the attempt sends
/// exactly this buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedOperation {
    /// Identifier the network will know the attempt by (its signature).
    pub id: AttemptId,
    pub bytes: Arc<[u8]>,
}

impl SignedOperation {
    pub fn new(id: AttemptId, bytes: Vec<u8>) -> Self {
        Self {
            id,
            bytes: bytes.into(),
        }
    }
}
