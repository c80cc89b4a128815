//! Fundamental types for the round-keeper.
//!
//! This crate defines the value types shared across every other crate in the
//! workspace: account and round identifiers, timestamps, token amounts,
//! operations, liveness tokens, attempt identifiers and locked positions.

pub mod account;
pub mod amount;
pub mod error;
pub mod ledger;
pub mod network;
pub mod operation;
pub mod position;
pub mod time;

pub use account::{AccountId, RoundId};
pub use amount::TokenAmount;
pub use error::TypesError;
pub use ledger::{AttemptId, Commitment, ConfirmationOutcome, LivenessToken, Simulation};
pub use network::{EndpointTier, PUBLIC_DEFAULT_RPC_URL};
pub use operation::{Operation, OperationKind, SignedOperation};
pub use position::LockedPosition;
pub use time::Timestamp;
