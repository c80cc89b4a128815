//! Round-keeper daemon: advances stale staking rounds, claims and restakes
//! rewards, then sleeps until the next round boundary.

mod config;
mod manifest;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use roundkeeper_delivery::DeliveryEngine;
use roundkeeper_ledger::SystemClock;
use roundkeeper_rpc::RpcLedgerClient;
use roundkeeper_scheduler::{ExitReason, Scheduler};
use roundkeeper_utils::{init_logging, LogFormat, ShutdownController};

use crate::config::DaemonConfig;
use crate::manifest::{Manifest, ManifestProtocol};

#[derive(Parser)]
#[command(name = "roundkeeper", about = "Staking round keeper daemon")]
struct Cli {
    /// JSON-RPC endpoint URL.
    #[arg(long, env = "ROUNDKEEPER_RPC_URL")]
    rpc_url: Option<String>,

    /// Operation manifest (accounts, seeds, payloads, rounds).
    #[arg(long, env = "ROUNDKEEPER_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Advance stale rounds before claiming.
    #[arg(long, env = "ROUNDKEEPER_RESOLVE_STAKING_ROUNDS")]
    resolve_staking_rounds: Option<bool>,

    /// Claim and restake immediately on startup.
    #[arg(long, env = "ROUNDKEEPER_RUN_CURRENT_ROUND")]
    run_current_round: Option<bool>,

    /// Keep running and wake up for each following round.
    #[arg(long, env = "ROUNDKEEPER_SCHEDULE_NEXT_ROUNDS")]
    schedule_next_rounds: Option<bool>,

    /// Seconds between wall-clock re-checks while waiting for a round.
    #[arg(long, env = "ROUNDKEEPER_PING_INTERVAL_SECS")]
    ping_interval_secs: Option<u64>,

    /// Fresh re-signs allowed after an attempt fails to confirm.
    #[arg(long, env = "ROUNDKEEPER_MAX_RESIGNS")]
    max_resigns: Option<u32>,

    /// Milliseconds between rebroadcasts of a pending attempt.
    #[arg(long, env = "ROUNDKEEPER_REBROADCAST_INTERVAL_MS")]
    rebroadcast_interval_ms: Option<u64>,

    /// Log format: "human" or "json".
    #[arg(long, env = "ROUNDKEEPER_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "ROUNDKEEPER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "ROUNDKEEPER_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Layer flags and environment variables over `base`.
    fn apply(self, mut base: DaemonConfig) -> DaemonConfig {
        if let Some(v) = self.rpc_url {
            base.rpc_url = v;
        }
        if let Some(v) = self.manifest {
            base.manifest = v;
        }
        if let Some(v) = self.resolve_staking_rounds {
            base.resolve_staking_rounds = v;
        }
        if let Some(v) = self.run_current_round {
            base.run_current_round = v;
        }
        if let Some(v) = self.schedule_next_rounds {
            base.schedule_next_rounds = v;
        }
        if let Some(v) = self.ping_interval_secs {
            base.ping_interval_secs = v;
        }
        if let Some(v) = self.max_resigns {
            base.max_resigns = v;
        }
        if let Some(v) = self.rebroadcast_interval_ms {
            base.rebroadcast_interval_ms = Some(v);
        }
        if let Some(v) = self.log_format {
            base.log_format = v;
        }
        if let Some(v) = self.log_level {
            base.log_level = v;
        }
        base
    }
}

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run(Cli::parse())) {
        Ok(reason) => {
            tracing::info!(?reason, "round keeper exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "round keeper failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(mut cli: Cli) -> anyhow::Result<ExitReason> {
    let base = match cli.config.take() {
        Some(path) => DaemonConfig::from_toml_file(&path)?,
        None => DaemonConfig::default(),
    };
    let config = cli.apply(base);
    config.validate()?;

    init_logging(config.log_format, &config.log_level);
    tracing::info!(
        rpc_url = %config.rpc_url,
        tier = config.tier().as_str(),
        resolve_staking_rounds = config.resolve_staking_rounds,
        run_current_round = config.run_current_round,
        schedule_next_rounds = config.schedule_next_rounds,
        ping_interval_secs = config.ping_interval_secs,
        max_resigns = config.max_resigns,
        "initialized settings"
    );

    let manifest = Manifest::from_toml_file(&config.manifest)
        .with_context(|| format!("loading manifest {}", config.manifest.display()))?;
    let signer = manifest.signer()?;
    tracing::info!(
        accounts = manifest.accounts.len(),
        rounds = manifest.rounds.len(),
        "loaded operation manifest"
    );

    let client = Arc::new(RpcLedgerClient::new(config.rpc_url.clone())?);
    let protocol = ManifestProtocol::new(&manifest, client.clone(), config.commitment)?;

    let controller = Arc::new(ShutdownController::new());
    let signal_watcher = controller.clone();
    tokio::spawn(async move { signal_watcher.wait_for_signal().await });

    let engine = Arc::new(
        DeliveryEngine::new(client, Arc::new(signer), config.delivery_options())
            .with_shutdown(controller.subscribe()),
    );

    let mut scheduler_config = config.scheduler_config();
    scheduler_config.rounds = manifest.round_ids();
    scheduler_config.accounts = manifest.account_ids();
    drop(manifest);

    let scheduler = Scheduler::new(
        scheduler_config,
        Arc::new(protocol),
        engine.clone(),
        Arc::new(SystemClock),
    )
    .with_shutdown(controller.subscribe());

    let reason = scheduler.run().await?;
    let stats = engine.stats().snapshot();
    tracing::info!(
        attempts = stats.attempts,
        rebroadcasts = stats.rebroadcasts,
        resigns = stats.resigns,
        confirmed = stats.confirmed,
        exhausted = stats.exhausted,
        "delivery totals"
    );
    Ok(reason)
}
