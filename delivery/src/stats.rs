//! Delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for everything the engine sends.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    attempts: AtomicU64,
    rebroadcasts: AtomicU64,
    resigns: AtomicU64,
    confirmed: AtomicU64,
    exhausted: AtomicU64,
}

/// Point-in-time copy of [`DeliveryStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Signed attempts (first broadcasts).
    pub attempts: u64,
    pub rebroadcasts: u64,
    pub resigns: u64,
    pub confirmed: u64,
    pub exhausted: u64,
}

impl DeliveryStats {
    pub(crate) fn attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rebroadcast(&self) {
        self.rebroadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn resign(&self) {
        self.resigns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn confirmed(&self) {
        self.confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            rebroadcasts: self.rebroadcasts.load(Ordering::Relaxed),
            resigns: self.resigns.load(Ordering::Relaxed),
            confirmed: self.confirmed.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}
