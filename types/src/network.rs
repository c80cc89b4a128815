//! Endpoint tier.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The shared public mainnet endpoint. Talking to it earns the slower,
/// rate-limit friendly defaults.
pub const PUBLIC_DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Identifies what kind of ledger endpoint the process talks to.
///
/// Pacing and rebroadcast defaults depend on it: the shared public endpoint
/// is rate limited aggressively, a dedicated one is not.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointTier {
    /// The shared public default endpoint.
    Public,
    /// A private or paid endpoint.
    Dedicated,
}

impl EndpointTier {
    /// Classify an endpoint URL.
    pub fn for_url(url: &str) -> Self {
        if url.trim_end_matches('/') == PUBLIC_DEFAULT_RPC_URL {
            Self::Public
        } else {
            Self::Dedicated
        }
    }

    /// Default interval between rebroadcasts of a pending attempt.
    pub fn rebroadcast_interval(&self) -> Duration {
        match self {
            Self::Public => Duration::from_millis(15_000),
            Self::Dedicated => Duration::from_millis(5_000),
        }
    }

    /// Delay between consecutive remote reads.
    pub fn read_delay(&self) -> Duration {
        match self {
            Self::Public => Duration::from_millis(5_000),
            Self::Dedicated => Duration::from_millis(500),
        }
    }

    /// Delay after each write (broadcast of a full delivery).
    pub fn write_delay(&self) -> Duration {
        match self {
            Self::Public => Duration::from_millis(10_000),
            Self::Dedicated => Duration::from_millis(1_000),
        }
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Dedicated => "dedicated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_default_is_detected() {
        assert_eq!(EndpointTier::for_url(PUBLIC_DEFAULT_RPC_URL), EndpointTier::Public);
        assert_eq!(
            EndpointTier::for_url("https://api.mainnet-beta.solana.com/"),
            EndpointTier::Public
        );
        assert_eq!(
            EndpointTier::for_url("https://rpc.example.org"),
            EndpointTier::Dedicated
        );
    }

    #[test]
    fn public_tier_is_slower() {
        let public = EndpointTier::Public;
        let dedicated = EndpointTier::Dedicated;
        assert!(public.rebroadcast_interval() > dedicated.rebroadcast_interval());
        assert!(public.read_delay() > dedicated.read_delay());
        assert!(public.write_delay() > dedicated.write_delay());
    }
}
