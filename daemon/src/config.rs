//! Daemon configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use roundkeeper_delivery::{DeliveryOptions, DEFAULT_MAX_RESIGNS};
use roundkeeper_scheduler::{
    CycleDrivers, PositionStrategy, SchedulerConfig, DEFAULT_MIN_ROUND_DURATION,
    DEFAULT_PING_INTERVAL,
};
use roundkeeper_types::{Commitment, EndpointTier, PUBLIC_DEFAULT_RPC_URL};
use roundkeeper_utils::LogFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Daemon settings.
///
/// Loaded from a TOML file via [`DaemonConfig::from_toml_file`]; CLI flags
/// and environment variables are applied on top in `main`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// JSON-RPC endpoint. The shared public default gets slower pacing.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Path to the operation manifest.
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// Advance rounds whose deadline has passed.
    #[serde(default = "default_true")]
    pub resolve_staking_rounds: bool,

    /// Claim and restake on startup.
    #[serde(default = "default_true")]
    pub run_current_round: bool,

    /// Keep running and wake up for every following round.
    #[serde(default = "default_true")]
    pub schedule_next_rounds: bool,

    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    #[serde(default = "default_min_round_duration_secs")]
    pub min_round_duration_secs: u64,

    #[serde(default = "default_max_resigns")]
    pub max_resigns: u32,

    /// Overrides the tier default when set.
    #[serde(default)]
    pub rebroadcast_interval_ms: Option<u64>,

    #[serde(default = "default_true")]
    pub simulate_first: bool,

    #[serde(default)]
    pub commitment: Commitment,

    #[serde(default)]
    pub position_strategy: PositionStrategy,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_rpc_url() -> String {
    PUBLIC_DEFAULT_RPC_URL.to_string()
}

fn default_manifest() -> PathBuf {
    PathBuf::from("./manifest.toml")
}

fn default_true() -> bool {
    true
}

fn default_ping_interval_secs() -> u64 {
    DEFAULT_PING_INTERVAL.as_secs()
}

fn default_min_round_duration_secs() -> u64 {
    DEFAULT_MIN_ROUND_DURATION.as_secs()
}

fn default_max_resigns() -> u32 {
    DEFAULT_MAX_RESIGNS
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl DaemonConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse {
            what: "config".into(),
            message: e.to_string(),
        })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_interval_secs == 0 {
            return Err(ConfigError::Invalid("ping_interval_secs must be positive".into()));
        }
        if self.min_round_duration_secs == 0 {
            return Err(ConfigError::Invalid(
                "min_round_duration_secs must be positive".into(),
            ));
        }
        if self.rebroadcast_interval_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "rebroadcast_interval_ms must be positive".into(),
            ));
        }
        if self.rpc_url.trim().is_empty() {
            return Err(ConfigError::Invalid("rpc_url is empty".into()));
        }
        Ok(())
    }

    pub fn tier(&self) -> EndpointTier {
        EndpointTier::for_url(&self.rpc_url)
    }

    pub fn drivers(&self) -> CycleDrivers {
        CycleDrivers {
            resolve_stale: self.resolve_staking_rounds,
            run_current: self.run_current_round,
            schedule_next: self.schedule_next_rounds,
        }
    }

    pub fn delivery_options(&self) -> DeliveryOptions {
        let mut options = DeliveryOptions::for_tier(self.tier())
            .with_max_resigns(self.max_resigns)
            .with_simulation(self.simulate_first);
        options.commitment = self.commitment;
        if let Some(ms) = self.rebroadcast_interval_ms {
            options = options.with_rebroadcast_interval(Duration::from_millis(ms));
        }
        options
    }

    /// Scheduler settings, without rounds or accounts.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let mut config = SchedulerConfig::for_tier(self.tier());
        config.drivers = self.drivers();
        config.ping_interval = Duration::from_secs(self.ping_interval_secs);
        config.min_round_duration = Duration::from_secs(self.min_round_duration_secs);
        config.strategy = self.position_strategy;
        config
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            manifest: default_manifest(),
            resolve_staking_rounds: true,
            run_current_round: true,
            schedule_next_rounds: true,
            ping_interval_secs: default_ping_interval_secs(),
            min_round_duration_secs: default_min_round_duration_secs(),
            max_resigns: default_max_resigns(),
            rebroadcast_interval_ms: None,
            simulate_first: true,
            commitment: Commitment::default(),
            position_strategy: PositionStrategy::default(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = DaemonConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = DaemonConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = DaemonConfig::from_toml_str("").unwrap();
        assert_eq!(config.rpc_url, PUBLIC_DEFAULT_RPC_URL);
        assert_eq!(config.ping_interval_secs, 600);
        assert_eq!(config.min_round_duration_secs, 21_600);
        assert_eq!(config.max_resigns, 5);
        assert_eq!(config.drivers(), CycleDrivers::ALL);
        assert_eq!(config.tier(), EndpointTier::Public);
    }

    #[test]
    fn partial_toml_overrides() {
        let config = DaemonConfig::from_toml_str(
            r#"
            rpc_url = "https://rpc.example.org"
            schedule_next_rounds = false
            max_resigns = 2
            position_strategy = "first-with-thread"
            commitment = "finalized"
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.tier(), EndpointTier::Dedicated);
        assert!(!config.drivers().schedule_next);
        assert_eq!(config.position_strategy, PositionStrategy::FirstWithThread);
        assert_eq!(config.log_format, LogFormat::Json);

        let options = config.delivery_options();
        assert_eq!(options.max_resigns, 2);
        assert_eq!(options.commitment, Commitment::Finalized);
        assert_eq!(options.rebroadcast_interval, Duration::from_secs(5));
    }

    #[test]
    fn scheduler_config_follows_tier() {
        let mut config = DaemonConfig::default();
        let public = config.scheduler_config();
        assert_eq!(public.read_delay, Duration::from_secs(5));
        assert_eq!(public.write_delay, Duration::from_secs(10));

        config.rpc_url = "http://localhost:8899".into();
        config.ping_interval_secs = 30;
        let dedicated = config.scheduler_config();
        assert_eq!(dedicated.read_delay, Duration::from_millis(500));
        assert_eq!(dedicated.write_delay, Duration::from_secs(1));
        assert_eq!(dedicated.ping_interval, Duration::from_secs(30));
    }

    #[test]
    fn rebroadcast_override_wins_over_tier() {
        let mut config = DaemonConfig::default();
        config.rebroadcast_interval_ms = Some(2_500);
        assert_eq!(
            config.delivery_options().rebroadcast_interval,
            Duration::from_millis(2_500)
        );
    }

    #[test]
    fn validation_rejects_zero_intervals() {
        let mut config = DaemonConfig::default();
        assert!(config.validate().is_ok());
        config.ping_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ping_interval_secs = 120").unwrap();
        writeln!(file, "manifest = \"/etc/roundkeeper/manifest.toml\"").unwrap();

        let config = DaemonConfig::from_toml_file(file.path()).unwrap();

        assert_eq!(config.ping_interval_secs, 120);
        assert_eq!(config.manifest, PathBuf::from("/etc/roundkeeper/manifest.toml"));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DaemonConfig::from_toml_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_resigns = \"many\"").unwrap();
        let err = DaemonConfig::from_toml_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
