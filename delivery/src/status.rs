//! Single-write status cell shared by the confirmation watch and the
//! rebroadcast loop.

use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Notify;

/// Lifecycle of one delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptStatus {
    Broadcasting,
    Confirmed,
    Failed,
}

impl AttemptStatus {
    fn to_u8(self) -> u8 {
        match self {
            Self::Broadcasting => 0,
            Self::Confirmed => 1,
            Self::Failed => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Confirmed,
            2 => Self::Failed,
            _ => Self::Broadcasting,
        }
    }
}

/// Starts as [`AttemptStatus::Broadcasting`] and moves to a terminal status
/// at most once. Reads never block, so the rebroadcast loop can check it
/// between sends without stalling.
pub struct StatusCell {
    state: AtomicU8,
    notify: Notify,
}

impl StatusCell {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(AttemptStatus::Broadcasting.to_u8()),
            notify: Notify::new(),
        }
    }

    pub fn get(&self) -> AttemptStatus {
        AttemptStatus::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from `Broadcasting` to `terminal`. Returns the status the cell
    /// holds afterwards: `terminal` if this call won, otherwise whatever the
    /// earlier writer stored.
    pub fn settle(&self, terminal: AttemptStatus) -> AttemptStatus {
        if terminal == AttemptStatus::Broadcasting {
            return self.get();
        }
        match self.state.compare_exchange(
            AttemptStatus::Broadcasting.to_u8(),
            terminal.to_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.notify.notify_waiters();
                terminal
            }
            Err(current) => AttemptStatus::from_u8(current),
        }
    }

    /// Wait until the cell holds a terminal status.
    pub async fn settled(&self) -> AttemptStatus {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let status = self.get();
            if status != AttemptStatus::Broadcasting {
                return status;
            }
            notified.await;
        }
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}
