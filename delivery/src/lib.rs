//! Reliable operation delivery.
//!
//! One call to [`DeliveryEngine::deliver`] takes an unsigned operation all the
//! way to a confirmed signature or a definitive failure:
//!
//! 1. fetch a liveness token,
//! 2. optionally simulate and size the compute budget,
//! 3. sign and broadcast,
//! 4. watch for confirmation while rebroadcasting the same bytes until the
//!    token's window closes,
//! 5. re-sign with a fresh token when an attempt fails, up to a budget.

pub mod engine;
pub mod error;
pub mod options;
pub mod stats;
pub mod status;

pub use engine::DeliveryEngine;
pub use error::DeliveryError;
pub use options::{DeliveryOptions, DEFAULT_MAX_RESIGNS};
pub use stats::{DeliveryStats, StatsSnapshot};
pub use status::{AttemptStatus, StatusCell};
