//! Abstract collaborator traits for the round-keeper.
//!
//! The delivery engine and the scheduler only ever talk to these traits.
//! The JSON-RPC client, the bundled signer and the daemon's manifest-driven
//! protocol implement them for production; the nullables crate implements
//! them for tests.

pub mod client;
pub mod clock;
pub mod error;
pub mod protocol;
pub mod signer;

pub use client::LedgerClient;
pub use clock::{Clock, SystemClock};
pub use error::LedgerError;
pub use protocol::StakingProtocol;
pub use signer::OperationSigner;
