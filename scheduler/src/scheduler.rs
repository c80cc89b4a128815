//! The cycle loop.

use std::sync::Arc;
use std::time::Duration;

use roundkeeper_delivery::DeliveryEngine;
use roundkeeper_ledger::{Clock, LedgerError, StakingProtocol};
use roundkeeper_types::{
    AccountId, EndpointTier, Operation, RoundId, Timestamp, TokenAmount,
};
use roundkeeper_utils::{retry, ShutdownSignal};
use tokio::time::sleep;

use crate::round::{RoundState, RoundTracker, DEFAULT_MIN_ROUND_DURATION};
use crate::timer::{WakeOutcome, WakeTimer};
use crate::{PositionSelector, PositionStrategy, SchedulerError};

/// How often the wake timer re-reads the wall clock (10 minutes).
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(600);
/// Attempts for each remote read the scheduler makes.
const DEFAULT_READ_ATTEMPTS: usize = 3;

/// The three switches that decide what a cycle does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleDrivers {
    /// Advance rounds whose deadline has passed.
    pub resolve_stale: bool,
    /// Claim and restake for every account.
    pub run_current: bool,
    /// Sleep until the next deadline and run again.
    pub schedule_next: bool,
}

impl CycleDrivers {
    pub const ALL: Self = Self {
        resolve_stale: true,
        run_current: true,
        schedule_next: true,
    };

    /// Drivers for the cycle that follows a timer wake-up.
    pub fn after_wake(configured: Self) -> Self {
        Self {
            resolve_stale: configured.resolve_stale,
            run_current: true,
            schedule_next: true,
        }
    }

    /// Drivers for the re-check that follows a stale-round resolution.
    pub fn after_resolution(self) -> Self {
        Self {
            resolve_stale: false,
            run_current: true,
            schedule_next: self.schedule_next,
        }
    }
}

impl Default for CycleDrivers {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Tracked rounds, read in this order every cycle.
    pub rounds: Vec<RoundId>,
    /// Accounts to act for. The first pays for round advances.
    pub accounts: Vec<AccountId>,
    /// Drivers for the first cycle.
    pub drivers: CycleDrivers,
    pub ping_interval: Duration,
    pub min_round_duration: Duration,
    /// Pause between consecutive remote reads.
    pub read_delay: Duration,
    /// Pause after each delivered operation.
    pub write_delay: Duration,
    pub read_attempts: usize,
    pub strategy: PositionStrategy,
}

impl SchedulerConfig {
    pub fn for_tier(tier: EndpointTier) -> Self {
        Self {
            rounds: Vec::new(),
            accounts: Vec::new(),
            drivers: CycleDrivers::ALL,
            ping_interval: DEFAULT_PING_INTERVAL,
            min_round_duration: DEFAULT_MIN_ROUND_DURATION,
            read_delay: tier.read_delay(),
            write_delay: tier.write_delay(),
            read_attempts: DEFAULT_READ_ATTEMPTS,
            strategy: PositionStrategy::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::for_tier(EndpointTier::Public)
    }
}

/// What one cycle ended with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing to act for.
    NoAccounts,
    /// Stale rounds were advanced; round state must be read again.
    StaleResolved,
    /// Account work is done. `deadline` is the farthest round deadline.
    Completed { deadline: Timestamp },
}

/// Why [`Scheduler::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    NoAccounts,
    /// Scheduling is disabled and the single cycle finished.
    Completed,
    Shutdown,
}

pub struct Scheduler {
    config: SchedulerConfig,
    protocol: Arc<dyn StakingProtocol>,
    engine: Arc<DeliveryEngine>,
    clock: Arc<dyn Clock>,
    tracker: RoundTracker,
    selector: Box<dyn PositionSelector>,
    shutdown: ShutdownSignal,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        protocol: Arc<dyn StakingProtocol>,
        engine: Arc<DeliveryEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tracker = RoundTracker::new(
            protocol.clone(),
            config.min_round_duration,
            config.read_attempts,
            config.read_delay,
        );
        let selector = Box::new(config.strategy);
        Self {
            config,
            protocol,
            engine,
            clock,
            tracker,
            selector,
            shutdown: ShutdownSignal::never(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Replace the configured position strategy.
    pub fn with_selector(mut self, selector: Box<dyn PositionSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run cycles until there is nothing left to do or shutdown is requested.
    ///
    /// Failing to read any round on the very first cycle is fatal. Later
    /// failures are retried after one ping interval.
    pub async fn run(&self) -> Result<ExitReason, SchedulerError> {
        let mut timer = WakeTimer::new(
            self.clock.clone(),
            self.config.ping_interval,
            self.shutdown.clone(),
        );
        let mut drivers = self.config.drivers;
        let mut first = true;

        loop {
            if self.shutdown.is_shutdown() {
                return Ok(ExitReason::Shutdown);
            }

            let deadline = match self.run_cycle(drivers).await {
                Ok(CycleOutcome::NoAccounts) => return Ok(ExitReason::NoAccounts),
                Ok(CycleOutcome::StaleResolved) => {
                    first = false;
                    drivers = drivers.after_resolution();
                    continue;
                }
                Ok(CycleOutcome::Completed { deadline }) => Some(deadline),
                Err(SchedulerError::RoundStateUnavailable(reason)) if !first => {
                    tracing::warn!(reason = %reason, "round state unavailable, retrying after ping");
                    None
                }
                Err(e) => return Err(e),
            };
            first = false;

            if !drivers.schedule_next {
                tracing::info!("scheduling disabled, cycle complete");
                return Ok(ExitReason::Completed);
            }

            let woke = match deadline {
                Some(deadline) => {
                    tracing::info!(
                        deadline = %deadline,
                        now = %self.clock.now(),
                        "scheduling next cycle on the farthest round"
                    );
                    timer.until(deadline).await
                }
                None => timer.ping().await,
            };
            if woke == WakeOutcome::Shutdown {
                tracing::info!("shutdown requested, leaving scheduler");
                return Ok(ExitReason::Shutdown);
            }
            if deadline.is_some() {
                drivers = CycleDrivers::after_wake(self.config.drivers);
            }
        }
    }

    /// Run one cycle with `drivers`, without scheduling the next one.
    pub async fn run_cycle(&self, drivers: CycleDrivers) -> Result<CycleOutcome, SchedulerError> {
        tracing::debug!(?drivers, "running cycle");
        let Some(payer) = self.config.accounts.first() else {
            tracing::info!("no accounts configured, nothing to do");
            return Ok(CycleOutcome::NoAccounts);
        };

        let rounds = self.tracker.fetch_all(&self.config.rounds).await;
        let Some(deadline) = rounds.iter().map(|r| r.deadline).max() else {
            return Err(SchedulerError::RoundStateUnavailable(format!(
                "none of {} tracked round(s) could be read",
                self.config.rounds.len()
            )));
        };

        let now = self.clock.now();
        let stale: Vec<&RoundState> = rounds.iter().filter(|r| r.is_stale(now)).collect();
        if !stale.is_empty() {
            if drivers.resolve_stale {
                for round in stale {
                    if self.shutdown.is_shutdown() {
                        break;
                    }
                    self.resolve_round(payer, round).await;
                    sleep(self.config.write_delay).await;
                }
                return Ok(CycleOutcome::StaleResolved);
            }
            for round in &stale {
                tracing::warn!(
                    round = %round.round,
                    deadline = %round.deadline,
                    "stale round left unresolved"
                );
            }
        }

        if drivers.run_current {
            for account in &self.config.accounts {
                if self.shutdown.is_shutdown() {
                    break;
                }
                self.run_account(account).await;
            }
        }

        Ok(CycleOutcome::Completed { deadline })
    }

    async fn resolve_round(&self, payer: &AccountId, round: &RoundState) {
        tracing::info!(
            round = %round.round,
            payer = %payer,
            deadline = %round.deadline,
            "resolving stale round"
        );
        match self.protocol.build_round_advance(payer, &round.round).await {
            Ok(op) => self.deliver(&op).await,
            Err(e) => {
                tracing::error!(round = %round.round, error = %e, "failed to build round advance");
            }
        }
    }

    /// Claim every tracked round, then restake whatever reward arrived.
    async fn run_account(&self, account: &AccountId) {
        for round in &self.config.rounds {
            tracing::info!(account = %account, round = %round, "claiming");
            match self.protocol.build_claim(account, round).await {
                Ok(op) => self.deliver(&op).await,
                Err(e) => {
                    tracing::error!(account = %account, round = %round, error = %e, "failed to build claim");
                }
            }
            sleep(self.config.write_delay).await;
        }

        let balance = match self.read(|| self.protocol.reward_balance(account)).await {
            Ok(balance) => balance.unwrap_or(TokenAmount::ZERO),
            Err(e) => {
                tracing::error!(account = %account, error = %e, "failed to read reward balance");
                return;
            }
        };
        if balance.is_zero() {
            tracing::info!(account = %account, "empty reward balance, skipping stake");
            return;
        }

        let positions = match self.read(|| self.protocol.locked_positions(account)).await {
            Ok(positions) => positions,
            Err(e) => {
                tracing::error!(account = %account, error = %e, "failed to read locked positions");
                return;
            }
        };

        let built = match self.selector.select(&positions) {
            Some(position) => {
                tracing::info!(
                    account = %account,
                    amount = %balance,
                    position = position.id,
                    "upgrading locked position"
                );
                self.protocol.build_upgrade(account, balance, position).await
            }
            None => {
                tracing::info!(account = %account, amount = %balance, "creating liquid stake");
                self.protocol.build_stake(account, balance).await
            }
        };
        match built {
            Ok(op) => self.deliver(&op).await,
            Err(e) => {
                tracing::error!(account = %account, error = %e, "failed to build stake");
            }
        }
        sleep(self.config.write_delay).await;
    }

    async fn read<T, F, Fut>(&self, op: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, LedgerError>>,
    {
        let result = retry(
            self.config.read_attempts,
            self.config.read_delay,
            LedgerError::is_transient,
            op,
        )
        .await;
        sleep(self.config.read_delay).await;
        result
    }

    /// Deliver `op`; failures are logged and the batch moves on.
    async fn deliver(&self, op: &Operation) {
        match self.engine.deliver(op).await {
            Ok(signature) => {
                tracing::info!(
                    kind = %op.kind(),
                    payer = %op.payer(),
                    signature = %signature,
                    "delivered"
                );
            }
            Err(e) => {
                tracing::error!(kind = %op.kind(), payer = %op.payer(), error = %e, "delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundkeeper_delivery::DeliveryOptions;
    use roundkeeper_nullables::{ConfirmScript, NullClock, NullLedger, NullProtocol, NullSigner};
    use roundkeeper_types::{LockedPosition, OperationKind};
    use roundkeeper_utils::ShutdownController;

    const T: u64 = 1_700_000_000;

    fn account(id: &str) -> AccountId {
        AccountId::new(id).unwrap()
    }

    fn round(id: &str) -> RoundId {
        RoundId::new(id).unwrap()
    }

    struct Harness {
        protocol: Arc<NullProtocol>,
        ledger: Arc<NullLedger>,
        clock: Arc<NullClock>,
        config: SchedulerConfig,
    }

    impl Harness {
        /// Wall clock starts at `now_secs`. Deliveries confirm immediately and
        /// pacing delays are zero so tests only see the wake timer move time.
        fn new(now_secs: u64, accounts: &[&str], rounds: &[&str]) -> Self {
            let ledger = Arc::new(NullLedger::new());
            ledger.set_default_confirm(ConfirmScript::ConfirmAfter(Duration::ZERO));
            let mut config = SchedulerConfig::for_tier(EndpointTier::Dedicated);
            config.accounts = accounts.iter().map(|a| account(a)).collect();
            config.rounds = rounds.iter().map(|r| round(r)).collect();
            config.read_delay = Duration::ZERO;
            config.write_delay = Duration::ZERO;
            Self {
                protocol: Arc::new(NullProtocol::new()),
                ledger,
                clock: Arc::new(NullClock::new(Timestamp::from_secs(now_secs))),
                config,
            }
        }

        fn scheduler(&self) -> Scheduler {
            let engine = DeliveryEngine::new(
                self.ledger.clone(),
                Arc::new(NullSigner::new()),
                DeliveryOptions::for_tier(EndpointTier::Dedicated).with_max_resigns(0),
            );
            Scheduler::new(
                self.config.clone(),
                self.protocol.clone(),
                Arc::new(engine),
                self.clock.clone(),
            )
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stale_round_is_resolved_once_then_rechecked() {
        let mut h = Harness::new(T + 21_601, &["alice", "bob"], &["adx"]);
        h.config.drivers.schedule_next = false;
        h.protocol.set_round_start(&round("adx"), Timestamp::from_secs(T));
        let scheduler = h.scheduler();

        let outcome = scheduler.run_cycle(h.config.drivers).await.unwrap();
        assert_eq!(outcome, CycleOutcome::StaleResolved);
        let advances = h.protocol.built_of(OperationKind::RoundAdvance);
        assert_eq!(advances.len(), 1);
        assert_eq!(advances[0].account, account("alice"));
        assert!(h.protocol.built_of(OperationKind::Claim).is_empty());

        // The full loop re-enters without resolving again.
        assert_eq!(scheduler.run().await.unwrap(), ExitReason::Completed);
        assert_eq!(h.protocol.built_of(OperationKind::RoundAdvance).len(), 2);
        assert_eq!(h.protocol.built_of(OperationKind::Claim).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_round_untouched_when_resolution_disabled() {
        let mut h = Harness::new(T + 21_601, &["alice"], &["adx"]);
        h.config.drivers = CycleDrivers {
            resolve_stale: false,
            run_current: true,
            schedule_next: false,
        };
        h.protocol.set_round_start(&round("adx"), Timestamp::from_secs(T));

        assert_eq!(h.scheduler().run().await.unwrap(), ExitReason::Completed);
        assert!(h.protocol.built_of(OperationKind::RoundAdvance).is_empty());
        assert_eq!(h.protocol.built_of(OperationKind::Claim).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_balance_skips_stake() {
        let h = Harness::new(T, &["alice", "bob"], &["adx"]);
        h.protocol.set_round_start(&round("adx"), Timestamp::from_secs(T));
        h.protocol.set_balance(&account("alice"), TokenAmount::ZERO);

        let outcome = h.scheduler().run_cycle(CycleDrivers::ALL).await.unwrap();

        assert!(matches!(outcome, CycleOutcome::Completed { .. }));
        assert_eq!(h.protocol.built_of(OperationKind::Claim).len(), 2);
        assert!(h.protocol.built_of(OperationKind::Stake).is_empty());
        assert!(h.protocol.built_of(OperationKind::Upgrade).is_empty());
        // Two claims, nothing else.
        assert_eq!(h.ledger.distinct_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn max_locked_position_is_upgraded() {
        let h = Harness::new(T, &["alice"], &["adx"]);
        h.protocol.set_round_start(&round("adx"), Timestamp::from_secs(T));
        h.protocol.set_balance(&account("alice"), TokenAmount::new(250));
        h.protocol.set_positions(
            &account("alice"),
            vec![LockedPosition {
                id: 7,
                lock_days: 540,
                amount: TokenAmount::new(1_000),
                thread_id: None,
            }],
        );

        h.scheduler().run_cycle(CycleDrivers::ALL).await.unwrap();

        let upgrades = h.protocol.built_of(OperationKind::Upgrade);
        assert_eq!(upgrades.len(), 1);
        assert_eq!(upgrades[0].position_id, Some(7));
        assert_eq!(upgrades[0].amount, Some(TokenAmount::new(250)));
        assert!(h.protocol.built_of(OperationKind::Stake).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn no_candidate_position_creates_stake() {
        let h = Harness::new(T, &["alice"], &["adx"]);
        h.protocol.set_round_start(&round("adx"), Timestamp::from_secs(T));
        h.protocol.set_balance(&account("alice"), TokenAmount::new(40));

        h.scheduler().run_cycle(CycleDrivers::ALL).await.unwrap();

        let stakes = h.protocol.built_of(OperationKind::Stake);
        assert_eq!(stakes.len(), 1);
        assert_eq!(stakes[0].amount, Some(TokenAmount::new(40)));
    }

    #[tokio::test(start_paused = true)]
    async fn claims_every_round_and_schedules_farthest() {
        let h = Harness::new(T, &["alice", "bob"], &["adx", "alp"]);
        h.protocol.set_round_start(&round("adx"), Timestamp::from_secs(T - 100));
        h.protocol.set_round_start(&round("alp"), Timestamp::from_secs(T - 50));

        let outcome = h.scheduler().run_cycle(CycleDrivers::ALL).await.unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Completed {
                deadline: Timestamp::from_secs(T - 50 + 21_600)
            }
        );
        assert_eq!(h.protocol.built_of(OperationKind::Claim).len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_account_does_not_stop_batch() {
        let h = Harness::new(T, &["alice", "bob"], &["adx"]);
        h.protocol.set_round_start(&round("adx"), Timestamp::from_secs(T));
        h.protocol.fail_builds_for(&account("alice"));
        h.protocol.set_balance(&account("alice"), TokenAmount::new(5));
        h.protocol.set_balance(&account("bob"), TokenAmount::new(5));

        h.scheduler().run_cycle(CycleDrivers::ALL).await.unwrap();

        let built = h.protocol.built();
        assert!(built.iter().all(|b| b.account == account("bob")));
        assert_eq!(built.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn undelivered_claim_does_not_stop_batch() {
        let h = Harness::new(T, &["alice", "bob"], &["adx"]);
        h.protocol.set_round_start(&round("adx"), Timestamp::from_secs(T));
        h.ledger.push_confirm(ConfirmScript::Error("node down".into()));

        h.scheduler().run_cycle(CycleDrivers::ALL).await.unwrap();

        assert_eq!(h.protocol.built_of(OperationKind::Claim).len(), 2);
        assert_eq!(h.ledger.distinct_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_accounts_exits_cleanly() {
        let h = Harness::new(T, &[], &["adx"]);

        assert_eq!(h.scheduler().run().await.unwrap(), ExitReason::NoAccounts);
        assert_eq!(h.protocol.round_queries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_rounds_on_first_cycle_are_fatal() {
        let h = Harness::new(T, &["alice"], &["adx"]);
        h.protocol.set_round_unreachable(&round("adx"));

        let err = h.scheduler().run().await.unwrap_err();

        assert!(matches!(err, SchedulerError::RoundStateUnavailable(_)));
        assert_eq!(h.protocol.round_queries(), 3);
        assert!(h.protocol.built().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn final_wake_fires_at_remaining_and_reenables_work() {
        let mut h = Harness::new(T, &["alice"], &["adx"]);
        // Deadline is 5s away; ping interval is 10 minutes.
        h.protocol
            .set_round_start(&round("adx"), Timestamp::from_secs(T + 5 - 21_600));
        h.config.drivers = CycleDrivers {
            resolve_stale: true,
            run_current: false,
            schedule_next: true,
        };
        let controller = ShutdownController::new();
        let scheduler = h.scheduler().with_shutdown(controller.subscribe());
        let task = tokio::spawn(async move { scheduler.run().await });

        sleep(Duration::from_millis(4_900)).await;
        assert_eq!(h.protocol.round_queries(), 1);
        assert!(h.protocol.built().is_empty());

        sleep(Duration::from_millis(200)).await;
        assert!(h.protocol.round_queries() >= 2);
        assert_eq!(h.protocol.built_of(OperationKind::Claim).len(), 1);

        controller.shutdown();
        assert_eq!(task.await.unwrap().unwrap(), ExitReason::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn wake_after_suspension_resolves_stale_round() {
        let mut h = Harness::new(T, &["alice"], &["adx"]);
        h.protocol
            .set_round_start(&round("adx"), Timestamp::from_secs(T + 5 - 21_600));
        h.config.drivers.run_current = false;
        let controller = ShutdownController::new();
        let scheduler = h.scheduler().with_shutdown(controller.subscribe());
        let task = tokio::spawn(async move { scheduler.run().await });

        sleep(Duration::from_secs(1)).await;
        h.clock.jump(Duration::from_secs(10));
        sleep(Duration::from_secs(10)).await;

        // Woke with resolution re-enabled, advanced once, then claimed on
        // the re-check.
        assert_eq!(h.protocol.built_of(OperationKind::RoundAdvance).len(), 1);
        assert_eq!(h.protocol.built_of(OperationKind::Claim).len(), 1);

        controller.shutdown();
        assert_eq!(task.await.unwrap().unwrap(), ExitReason::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn later_round_failures_retry_after_ping() {
        let h = Harness::new(T, &["alice"], &["adx"]);
        h.protocol
            .set_round_start(&round("adx"), Timestamp::from_secs(T + 5 - 21_600));
        let controller = ShutdownController::new();
        let scheduler = h.scheduler().with_shutdown(controller.subscribe());
        let task = tokio::spawn(async move { scheduler.run().await });

        sleep(Duration::from_secs(1)).await;
        h.protocol.set_round_unreachable(&round("adx"));
        sleep(Duration::from_secs(10)).await;
        assert!(!task.is_finished());
        let queries = h.protocol.round_queries();
        assert_eq!(queries, 1 + 3);

        h.protocol
            .set_round_start(&round("adx"), Timestamp::from_secs(T + 3_600 - 21_600));
        sleep(DEFAULT_PING_INTERVAL).await;
        assert_eq!(h.protocol.round_queries(), queries + 1);
        assert_eq!(h.protocol.built_of(OperationKind::Claim).len(), 2);

        controller.shutdown();
        assert_eq!(task.await.unwrap().unwrap(), ExitReason::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_ping_wait() {
        let h = Harness::new(T, &["alice"], &["adx"]);
        h.protocol.set_round_start(&round("adx"), Timestamp::from_secs(T));
        let controller = ShutdownController::new();
        let scheduler = h.scheduler().with_shutdown(controller.subscribe());
        let task = tokio::spawn(async move { scheduler.run().await });

        sleep(Duration::from_secs(3_600)).await;
        controller.shutdown();

        assert_eq!(task.await.unwrap().unwrap(), ExitReason::Shutdown);
        assert_eq!(h.protocol.round_queries(), 1);
    }
}
