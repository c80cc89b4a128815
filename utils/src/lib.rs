//! Shared utilities for the round-keeper.

pub mod logging;
pub mod retry;
pub mod shutdown;
pub mod time;

pub use logging::{init_logging, LogFormat};
pub use retry::retry;
pub use shutdown::{ShutdownController, ShutdownSignal};
pub use time::format_duration;
