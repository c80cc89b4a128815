//! Nullable infrastructure for deterministic testing.
//!
//! Every collaborator the delivery engine and scheduler depend on (clock,
//! ledger endpoint, staking protocol, signer) has a test-friendly
//! implementation here that:
//! - Returns deterministic, scriptable values
//! - Records what it was asked to do, for assertions
//! - Never touches the filesystem or network
//!
//! Time-dependent doubles read tokio's clock, so tests run with
//! `#[tokio::test(start_paused = true)]` and finish instantly.

pub mod clock;
pub mod ledger;
pub mod protocol;
pub mod signer;

pub use clock::NullClock;
pub use ledger::{Broadcast, ConfirmScript, NullLedger};
pub use protocol::{BuiltOperation, NullProtocol};
pub use signer::NullSigner;

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a panicking test poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
