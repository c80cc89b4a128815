//! Choosing which existing position receives new stake.

use std::fmt;
use std::str::FromStr;

use roundkeeper_types::LockedPosition;
use serde::{Deserialize, Serialize};

/// Longest lock period the protocol offers, in days.
pub const MAX_LOCK_DAYS: u32 = 540;

/// Picks the position to upgrade from an account's locked positions, or
/// `None` to open a fresh liquid stake instead.
pub trait PositionSelector: Send + Sync {
    fn select<'a>(&self, positions: &'a [LockedPosition]) -> Option<&'a LockedPosition>;
}

/// Built-in selection strategies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PositionStrategy {
    /// The smallest active position locked for [`MAX_LOCK_DAYS`]; ties go to
    /// the lowest id.
    #[default]
    SmallestMaxLocked,
    /// The first active position that has an automation thread attached.
    FirstWithThread,
}

impl PositionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SmallestMaxLocked => "smallest-max-locked",
            Self::FirstWithThread => "first-with-thread",
        }
    }
}

impl fmt::Display for PositionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "smallest-max-locked" => Ok(Self::SmallestMaxLocked),
            "first-with-thread" => Ok(Self::FirstWithThread),
            other => Err(format!("unknown position strategy: {other}")),
        }
    }
}

impl PositionSelector for PositionStrategy {
    fn select<'a>(&self, positions: &'a [LockedPosition]) -> Option<&'a LockedPosition> {
        let mut active = positions.iter().filter(|p| p.is_active());
        match self {
            Self::SmallestMaxLocked => active
                .filter(|p| p.lock_days == MAX_LOCK_DAYS)
                .min_by_key(|p| (p.amount, p.id)),
            Self::FirstWithThread => active.find(|p| p.thread_id.is_some()),
        }
    }
}
