//! Per-delivery options.

use roundkeeper_types::{Commitment, EndpointTier};
use std::time::Duration;

/// Re-sign budget when none is configured.
pub const DEFAULT_MAX_RESIGNS: u32 = 5;
/// Blocks shaved off the reported validity window.
pub const DEFAULT_HEIGHT_SAFETY_MARGIN: u64 = 150;
/// Head-room applied to simulated compute units.
pub const DEFAULT_COMPUTE_UNIT_MARGIN: f64 = 1.05;
/// Liveness token fetch attempts before giving up.
pub const DEFAULT_TOKEN_FETCH_ATTEMPTS: usize = 3;
/// Consecutive failed block height reads after which the window counts as
/// closed.
pub const DEFAULT_HEIGHT_FAILURE_LIMIT: u32 = 3;

/// Knobs for one delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliveryOptions {
    pub commitment: Commitment,
    /// Resend the signed bytes while the attempt is pending.
    pub rebroadcast: bool,
    pub rebroadcast_interval: Duration,
    /// Additional attempts, each with a fresh token, after the first fails.
    pub max_resigns: u32,
    /// Dry-run before the first broadcast of each attempt.
    pub simulate_first: bool,
    pub height_safety_margin: u64,
    pub compute_unit_margin: f64,
    /// How long to wait for a still-pending confirmation watch once the
    /// rebroadcast window has closed.
    pub settle_grace: Duration,
    pub token_fetch_attempts: usize,
    /// Consecutive failed height reads that end the rebroadcast loop. The
    /// window cannot be checked without a height, so it is treated as
    /// closed.
    pub height_failure_limit: u32,
}

impl DeliveryOptions {
    /// Defaults for an endpoint tier.
    pub fn for_tier(tier: EndpointTier) -> Self {
        Self {
            commitment: Commitment::Confirmed,
            rebroadcast: true,
            rebroadcast_interval: tier.rebroadcast_interval(),
            max_resigns: DEFAULT_MAX_RESIGNS,
            simulate_first: true,
            height_safety_margin: DEFAULT_HEIGHT_SAFETY_MARGIN,
            compute_unit_margin: DEFAULT_COMPUTE_UNIT_MARGIN,
            settle_grace: tier.write_delay(),
            token_fetch_attempts: DEFAULT_TOKEN_FETCH_ATTEMPTS,
            height_failure_limit: DEFAULT_HEIGHT_FAILURE_LIMIT,
        }
    }

    pub fn with_max_resigns(mut self, max_resigns: u32) -> Self {
        self.max_resigns = max_resigns;
        self
    }

    pub fn with_rebroadcast(mut self, rebroadcast: bool) -> Self {
        self.rebroadcast = rebroadcast;
        self
    }

    pub fn with_rebroadcast_interval(mut self, interval: Duration) -> Self {
        self.rebroadcast_interval = interval;
        self
    }

    pub fn with_simulation(mut self, simulate_first: bool) -> Self {
        self.simulate_first = simulate_first;
        self
    }

    /// Compute-unit limit to request for a simulation that consumed `units`.
    pub fn compute_unit_limit(&self, units: u64) -> u32 {
        let limit = (units as f64 * self.compute_unit_margin).ceil();
        if limit >= u32::MAX as f64 {
            u32::MAX
        } else {
            limit as u32
        }
    }
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self::for_tier(EndpointTier::Public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_pick_rebroadcast_interval() {
        assert_eq!(
            DeliveryOptions::for_tier(EndpointTier::Public).rebroadcast_interval,
            Duration::from_secs(15)
        );
        assert_eq!(
            DeliveryOptions::for_tier(EndpointTier::Dedicated).rebroadcast_interval,
            Duration::from_secs(5)
        );
        assert_eq!(DeliveryOptions::default().max_resigns, DEFAULT_MAX_RESIGNS);
    }

    #[test]
    fn compute_unit_limit_adds_margin_and_rounds_up() {
        let options = DeliveryOptions::default();
        assert_eq!(options.compute_unit_limit(200_000), 210_000);
        assert_eq!(options.compute_unit_limit(1), 2);
        assert_eq!(options.compute_unit_limit(0), 0);
        assert_eq!(options.compute_unit_limit(u64::MAX), u32::MAX);
    }
}
