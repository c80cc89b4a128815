//! JSON-RPC client for a Solana-style ledger endpoint.
//!
//! [`RpcLedgerClient`] implements [`roundkeeper_ledger::LedgerClient`] over
//! HTTP:
//! - `getLatestBlockhash` for liveness tokens
//! - `simulateTransaction` and `sendTransaction` for signed bytes
//! - `getSignatureStatuses` and `getBlockHeight` for confirmation
//! - `getTokenAccountBalance` and `getAccountInfo` for protocol reads

pub mod client;
pub mod ledger;
pub mod wire;

pub use client::{RpcLedgerClient, DEFAULT_CONFIRM_POLL_INTERVAL};
