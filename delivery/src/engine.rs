//! The delivery state machine.

use std::sync::Arc;
use std::time::Duration;

use roundkeeper_ledger::{LedgerClient, LedgerError, OperationSigner};
use roundkeeper_types::{
    AttemptId, Commitment, ConfirmationOutcome, LivenessToken, Operation, SignedOperation,
    Simulation,
};
use roundkeeper_utils::{retry, ShutdownSignal};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::{AttemptStatus, DeliveryError, DeliveryOptions, DeliveryStats, StatusCell};

/// Simulation retries when the draft's token is already unknown.
const SIMULATION_RETRIES: usize = 3;
/// Delay before each such retry.
const SIMULATION_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Delay between liveness token fetch attempts.
const TOKEN_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Delivers operations with at-least-once broadcast and a single
/// confirmed-or-failed outcome per attempt.
pub struct DeliveryEngine {
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn OperationSigner>,
    defaults: DeliveryOptions,
    shutdown: ShutdownSignal,
    stats: DeliveryStats,
}

/// How one signed attempt ended.
enum AttemptOutcome {
    Confirmed(AttemptId),
    Failed(AttemptId),
}

/// One signed attempt in flight.
struct InFlight {
    signed: SignedOperation,
    token: LivenessToken,
    status: Arc<StatusCell>,
    /// Id the endpoint returned for the first send it accepted.
    network_id: Option<AttemptId>,
    /// Follows `network_id`, or the signer's id when nothing was accepted
    /// and nothing will be resent.
    watch: Option<WatchGuard>,
}

impl InFlight {
    /// The network's id once known, the signer's before that.
    fn id(&self) -> &AttemptId {
        self.network_id.as_ref().unwrap_or(&self.signed.id)
    }
}

/// Aborts the confirmation watch when the attempt that owns it is done with
/// it, whether it finished, failed or was cancelled.
struct WatchGuard(JoinHandle<()>);

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl DeliveryEngine {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<dyn OperationSigner>,
        defaults: DeliveryOptions,
    ) -> Self {
        Self {
            ledger,
            signer,
            defaults,
            shutdown: ShutdownSignal::never(),
            stats: DeliveryStats::default(),
        }
    }

    /// Stop rebroadcasting and re-signing once `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn defaults(&self) -> &DeliveryOptions {
        &self.defaults
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// Deliver `operation` with the engine's default options.
    pub async fn deliver(&self, operation: &Operation) -> Result<AttemptId, DeliveryError> {
        self.deliver_with(operation, &self.defaults).await
    }

    /// Deliver `operation`, returning the signature of the attempt that
    /// confirmed.
    ///
    /// Each failed attempt is followed by a fresh one (new token, new
    /// signature) until `max_resigns` is used up, after which
    /// [`DeliveryError::Exhausted`] is returned.
    pub async fn deliver_with(
        &self,
        operation: &Operation,
        options: &DeliveryOptions,
    ) -> Result<AttemptId, DeliveryError> {
        let total = options.max_resigns.saturating_add(1);
        let mut last_attempt = None;

        for attempt_no in 1..=total {
            if self.shutdown.is_shutdown() {
                return Err(DeliveryError::Cancelled);
            }
            if attempt_no > 1 {
                self.stats.resign();
                tracing::info!(
                    kind = %operation.kind(),
                    payer = %operation.payer(),
                    attempt = attempt_no,
                    of = total,
                    "re-signing with a fresh liveness token"
                );
            }

            match self.attempt(operation, options).await? {
                AttemptOutcome::Confirmed(id) => {
                    self.stats.confirmed();
                    tracing::info!(
                        kind = %operation.kind(),
                        payer = %operation.payer(),
                        signature = %id,
                        "operation confirmed"
                    );
                    return Ok(id);
                }
                AttemptOutcome::Failed(id) => {
                    tracing::warn!(
                        kind = %operation.kind(),
                        payer = %operation.payer(),
                        signature = %id,
                        "attempt did not confirm"
                    );
                    last_attempt = Some(id);
                }
            }
        }

        self.stats.exhausted();
        Err(DeliveryError::Exhausted {
            attempts: total,
            last_attempt,
        })
    }

    /// One signed attempt: token, optional simulation, broadcast, then wait
    /// for the watch while rebroadcasting.
    async fn attempt(
        &self,
        operation: &Operation,
        options: &DeliveryOptions,
    ) -> Result<AttemptOutcome, DeliveryError> {
        let token = self.fetch_token(options).await?;
        let (token, compute_unit_limit) = if options.simulate_first {
            self.simulate(operation, token, options).await?
        } else {
            (token, None)
        };

        let signed = self.signer.sign(operation, &token, compute_unit_limit)?;
        self.stats.attempt();
        let mut flight = InFlight {
            signed,
            token,
            status: Arc::new(StatusCell::new()),
            network_id: None,
            watch: None,
        };

        match self.ledger.broadcast(&flight.signed.bytes).await {
            Ok(network_id) => self.accept(&mut flight, network_id, options.commitment),
            Err(e) => {
                tracing::warn!(
                    local_id = %flight.signed.id,
                    error = %e,
                    "initial broadcast failed, leaving it to the rebroadcast loop"
                );
            }
        }

        if options.rebroadcast {
            self.rebroadcast_until_settled(&mut flight, options).await?;
        } else {
            if flight.watch.is_none() {
                // Nothing will be resent, so the local id is all there is.
                let local_id = flight.signed.id.clone();
                flight.watch = Some(self.spawn_watch(
                    &local_id,
                    &flight.token,
                    options.commitment,
                    &flight.status,
                ));
            }
            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = shutdown.cancelled() => return Err(DeliveryError::Cancelled),
                _ = flight.status.settled() => {}
            }
        }

        if flight.watch.is_some() && flight.status.get() == AttemptStatus::Broadcasting {
            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = shutdown.cancelled() => return Err(DeliveryError::Cancelled),
                _ = flight.status.settled() => {}
                _ = sleep(options.settle_grace) => {}
            }
        }

        let id = flight.id().clone();
        Ok(match flight.status.settle(AttemptStatus::Failed) {
            AttemptStatus::Confirmed => AttemptOutcome::Confirmed(id),
            _ => AttemptOutcome::Failed(id),
        })
    }

    /// Record an id the endpoint returned for `flight`. The first one starts
    /// the confirmation watch; later sends of the same bytes only log a
    /// mismatch.
    fn accept(&self, flight: &mut InFlight, network_id: AttemptId, commitment: Commitment) {
        if let Some(known) = &flight.network_id {
            if *known != network_id {
                tracing::debug!(
                    signature = %known,
                    reported = %network_id,
                    "endpoint reported another id for the same bytes"
                );
            }
            return;
        }
        tracing::debug!(
            signature = %network_id,
            local_id = %flight.signed.id,
            last_valid_height = flight.token.last_valid_height,
            "endpoint accepted attempt"
        );
        let watch = self.spawn_watch(&network_id, &flight.token, commitment, &flight.status);
        flight.watch = Some(watch);
        flight.network_id = Some(network_id);
    }

    async fn fetch_token(&self, options: &DeliveryOptions) -> Result<LivenessToken, DeliveryError> {
        let ledger: &dyn LedgerClient = self.ledger.as_ref();
        let commitment = options.commitment;
        let token = retry(
            options.token_fetch_attempts,
            TOKEN_RETRY_DELAY,
            LedgerError::is_transient,
            move || ledger.latest_liveness_token(commitment),
        )
        .await?;
        tracing::debug!(
            token = %token.hash,
            last_valid_height = token.last_valid_height,
            "fetched liveness token"
        );
        Ok(token.with_height_margin(options.height_safety_margin))
    }

    /// Dry-run the operation. Simulation is advisory: only a failure to
    /// obtain a token propagates. Returns the token to sign against (a fresh
    /// one if the first expired) and the compute-unit limit to request.
    async fn simulate(
        &self,
        operation: &Operation,
        mut token: LivenessToken,
        options: &DeliveryOptions,
    ) -> Result<(LivenessToken, Option<u32>), DeliveryError> {
        for retry_no in 0..=SIMULATION_RETRIES {
            let draft = self.signer.sign(operation, &token, None)?;
            match self.ledger.simulate(&draft.bytes).await {
                Ok(Simulation::Success { units_consumed }) => {
                    let limit = units_consumed.map(|units| options.compute_unit_limit(units));
                    tracing::debug!(
                        kind = %operation.kind(),
                        units_consumed = ?units_consumed,
                        compute_unit_limit = ?limit,
                        "simulation succeeded"
                    );
                    return Ok((token, limit));
                }
                Ok(Simulation::TokenExpired) if retry_no < SIMULATION_RETRIES => {
                    tracing::debug!(
                        kind = %operation.kind(),
                        retry = retry_no + 1,
                        "simulation saw an expired token, retrying"
                    );
                    sleep(SIMULATION_RETRY_DELAY).await;
                    token = self.fetch_token(options).await?;
                }
                Ok(Simulation::TokenExpired) => {
                    tracing::warn!(kind = %operation.kind(), "simulation kept seeing expired tokens");
                    break;
                }
                Ok(Simulation::Rejected(reason)) => {
                    tracing::warn!(kind = %operation.kind(), reason = %reason, "simulation rejected, sending anyway");
                    break;
                }
                Err(e) => {
                    tracing::warn!(kind = %operation.kind(), error = %e, "simulation unavailable");
                    break;
                }
            }
        }
        Ok((token, None))
    }

    fn spawn_watch(
        &self,
        id: &AttemptId,
        token: &LivenessToken,
        commitment: Commitment,
        status: &Arc<StatusCell>,
    ) -> WatchGuard {
        let ledger = self.ledger.clone();
        let id = id.clone();
        let token = token.clone();
        let status = status.clone();
        WatchGuard(tokio::spawn(async move {
            let terminal = match ledger.confirm(&id, &token, commitment).await {
                Ok(ConfirmationOutcome::Confirmed) => AttemptStatus::Confirmed,
                Ok(ConfirmationOutcome::Failed(reason)) => {
                    tracing::warn!(signature = %id, reason = %reason, "attempt failed on chain");
                    AttemptStatus::Failed
                }
                Ok(ConfirmationOutcome::Expired) => {
                    tracing::debug!(signature = %id, "liveness window closed before confirmation");
                    AttemptStatus::Failed
                }
                Err(e) => {
                    tracing::warn!(signature = %id, error = %e, "confirmation watch errored");
                    AttemptStatus::Failed
                }
            };
            status.settle(terminal);
        }))
    }

    /// Resend the attempt's bytes every interval while it is pending and the
    /// chain has not passed the token's window.
    ///
    /// The loop also ends after `height_failure_limit` consecutive failed
    /// height reads, since the window can no longer be checked.
    async fn rebroadcast_until_settled(
        &self,
        flight: &mut InFlight,
        options: &DeliveryOptions,
    ) -> Result<(), DeliveryError> {
        let mut shutdown = self.shutdown.clone();
        let status = flight.status.clone();
        let mut height_failures = 0u32;
        let mut height = self.current_height(options.commitment).await;

        loop {
            if status.get() != AttemptStatus::Broadcasting {
                return Ok(());
            }
            match height {
                Some(h) => {
                    height_failures = 0;
                    if !flight.token.is_live_at(h) {
                        tracing::debug!(
                            signature = %flight.id(),
                            height = h,
                            last_valid_height = flight.token.last_valid_height,
                            "rebroadcast window closed"
                        );
                        return Ok(());
                    }
                }
                None => {
                    height_failures += 1;
                    if height_failures >= options.height_failure_limit {
                        tracing::warn!(
                            signature = %flight.id(),
                            failures = height_failures,
                            "block height unavailable, treating the window as closed"
                        );
                        return Ok(());
                    }
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(DeliveryError::Cancelled),
                _ = status.settled() => return Ok(()),
                _ = sleep(options.rebroadcast_interval) => {}
            }

            if status.get() != AttemptStatus::Broadcasting {
                return Ok(());
            }
            match self.ledger.broadcast(&flight.signed.bytes).await {
                Ok(network_id) => {
                    self.stats.rebroadcast();
                    tracing::debug!(signature = %network_id, height = ?height, "rebroadcast");
                    self.accept(flight, network_id, options.commitment);
                }
                Err(e) => {
                    tracing::warn!(signature = %flight.id(), error = %e, "rebroadcast failed");
                }
            }
            height = self.current_height(options.commitment).await;
        }
    }

    async fn current_height(&self, commitment: Commitment) -> Option<u64> {
        match self.ledger.block_height(commitment).await {
            Ok(h) => Some(h),
            Err(e) => {
                tracing::warn!(error = %e, "block height unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundkeeper_nullables::{ConfirmScript, NullLedger, NullSigner};
    use roundkeeper_types::{AccountId, EndpointTier, OperationKind};
    use roundkeeper_utils::ShutdownController;

    struct Harness {
        ledger: Arc<NullLedger>,
        signer: Arc<NullSigner>,
        engine: DeliveryEngine,
    }

    fn harness(options: DeliveryOptions) -> Harness {
        let ledger = Arc::new(NullLedger::new());
        let signer = Arc::new(NullSigner::new());
        let engine = DeliveryEngine::new(ledger.clone(), signer.clone(), options);
        Harness {
            ledger,
            signer,
            engine,
        }
    }

    fn dedicated() -> DeliveryOptions {
        DeliveryOptions::for_tier(EndpointTier::Dedicated)
    }

    fn claim() -> Operation {
        Operation::new(
            OperationKind::Claim,
            AccountId::new("alice").unwrap(),
            b"claim".to_vec(),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_attempt_returns_signature_without_resign() {
        let h = harness(dedicated());
        h.ledger
            .push_confirm(ConfirmScript::ConfirmAfter(Duration::from_secs(2)));

        let id = h.engine.deliver(&claim()).await.unwrap();

        assert_eq!(id.as_str(), "net-sig-1");
        assert_eq!(h.ledger.distinct_attempts(), 1);
        let stats = h.engine.stats().snapshot();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.resigns, 0);
        assert_eq!(stats.confirmed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_delivery_makes_n_plus_one_attempts() {
        let h = harness(dedicated().with_max_resigns(2));

        let err = h.engine.deliver(&claim()).await.unwrap_err();

        match err {
            DeliveryError::Exhausted {
                attempts,
                last_attempt,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_attempt.unwrap().as_str(), "net-sig-3");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.ledger.distinct_attempts(), 3);
        assert_eq!(h.ledger.tokens_issued(), 3);
        let stats = h.engine.stats().snapshot();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.resigns, 2);
        assert_eq!(stats.exhausted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_resigns_means_single_attempt() {
        let h = harness(dedicated().with_max_resigns(0));

        let err = h.engine.deliver(&claim()).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Exhausted { attempts: 1, .. }));
        assert_eq!(h.ledger.distinct_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rebroadcasts_resend_identical_bytes() {
        let h = harness(dedicated().with_max_resigns(0));

        let _ = h.engine.deliver(&claim()).await;

        let broadcasts = h.ledger.broadcasts();
        assert!(broadcasts.len() > 1);
        assert!(broadcasts.iter().all(|b| b.bytes == broadcasts[0].bytes));
        assert_eq!(
            h.engine.stats().snapshot().rebroadcasts as usize,
            broadcasts.len() - 1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_between_rebroadcasts_stops_resending() {
        let h = harness(dedicated().with_rebroadcast_interval(Duration::from_secs(5)));
        h.ledger
            .push_confirm(ConfirmScript::ConfirmAfter(Duration::from_secs(7)));

        h.engine.deliver(&claim()).await.unwrap();
        let at_resolution = h.ledger.broadcast_count();
        tokio::time::sleep(Duration::from_secs(60)).await;

        // Initial send at 0s, one rebroadcast at 5s, confirmed at 7s.
        assert_eq!(at_resolution, 2);
        assert_eq!(h.ledger.broadcast_count(), 2);
        let last = h.ledger.broadcasts().last().unwrap().at;
        assert!(last < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_simulation_retries_with_fresh_token() {
        let h = harness(dedicated());
        h.ledger.push_simulation(Simulation::TokenExpired);
        h.ledger.push_simulation(Simulation::TokenExpired);
        h.ledger.push_simulation(Simulation::Success {
            units_consumed: Some(200_000),
        });
        h.ledger
            .push_confirm(ConfirmScript::ConfirmAfter(Duration::from_secs(1)));

        let id = h.engine.deliver(&claim()).await.unwrap();

        assert_eq!(h.ledger.simulate_calls(), 3);
        assert_eq!(id.as_str(), "net-sig-1");
        assert!(h.ledger.broadcasts()[0].bytes.starts_with(b"alice|token-3|"));
        assert_eq!(h.signer.limits().last().copied().flatten(), Some(210_000));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_simulation_is_advisory() {
        let h = harness(dedicated());
        h.ledger
            .push_simulation(Simulation::Rejected("custom program error".into()));
        h.ledger
            .push_confirm(ConfirmScript::ConfirmAfter(Duration::from_secs(1)));

        h.engine.deliver(&claim()).await.unwrap();

        assert_eq!(h.ledger.simulate_calls(), 1);
        assert_eq!(h.signer.limits().last().copied().flatten(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn simulation_can_be_skipped() {
        let h = harness(dedicated().with_simulation(false));
        h.ledger
            .push_confirm(ConfirmScript::ConfirmAfter(Duration::from_secs(1)));

        h.engine.deliver(&claim()).await.unwrap();

        assert_eq!(h.ledger.simulate_calls(), 0);
        assert_eq!(h.signer.sign_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_initial_broadcast_is_recovered_by_rebroadcast() {
        let h = harness(dedicated().with_rebroadcast_interval(Duration::from_secs(5)));
        h.ledger.fail_next_broadcasts(1);
        h.ledger
            .push_confirm(ConfirmScript::ConfirmAfter(Duration::from_secs(2)));

        let id = h.engine.deliver(&claim()).await.unwrap();

        // The watch starts with the first accepted send at 5s and confirms
        // at 7s, before the next resend is due.
        assert_eq!(id.as_str(), "net-sig-1");
        assert_eq!(h.ledger.broadcast_count(), 1);
        assert!(h.ledger.broadcasts()[0].at >= Duration::from_secs(5));
        assert_eq!(h.ledger.confirmed_ids(), vec![AttemptId::new("net-sig-1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_follows_network_assigned_id() {
        let h = harness(dedicated());
        h.ledger.push_confirm(ConfirmScript::FailAfter(
            Duration::from_secs(1),
            "blockhash not found".into(),
        ));
        h.ledger
            .push_confirm(ConfirmScript::ConfirmAfter(Duration::from_secs(1)));

        let id = h.engine.deliver(&claim()).await.unwrap();

        assert_eq!(id.as_str(), "net-sig-2");
        assert_eq!(
            h.ledger.confirmed_ids(),
            vec![AttemptId::new("net-sig-1"), AttemptId::new("net-sig-2")]
        );
        assert!(h
            .ledger
            .confirmed_ids()
            .iter()
            .all(|id| !id.as_str().starts_with("alice:")));
    }

    #[tokio::test(start_paused = true)]
    async fn unaccepted_attempt_without_rebroadcast_watches_local_id() {
        let h = harness(dedicated().with_rebroadcast(false).with_max_resigns(0));
        h.ledger.fail_next_broadcasts(1);
        h.ledger
            .push_confirm(ConfirmScript::ConfirmAfter(Duration::from_secs(1)));

        let err = h.engine.deliver(&claim()).await.unwrap_err();

        match err {
            DeliveryError::Exhausted { last_attempt, .. } => {
                assert_eq!(last_attempt.unwrap().as_str(), "alice:token-1");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.ledger.confirmed_ids(), vec![AttemptId::new("alice:token-1")]);
        assert_eq!(h.ledger.broadcast_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_block_height_ends_the_attempt() {
        let ledger = Arc::new(NullLedger::new().with_window(1_000_000));
        ledger.fail_next_block_heights(usize::MAX);
        let engine = DeliveryEngine::new(
            ledger.clone(),
            Arc::new(NullSigner::new()),
            dedicated().with_max_resigns(0),
        );
        let started = tokio::time::Instant::now();

        let err = engine.deliver(&claim()).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Exhausted { attempts: 1, .. }));
        // Initial send, then one resend per failed read until the limit.
        assert_eq!(ledger.broadcast_count(), 3);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn height_failures_must_be_consecutive() {
        let h = harness(dedicated().with_rebroadcast_interval(Duration::from_secs(5)));
        h.ledger.fail_next_block_heights(2);
        h.ledger
            .push_confirm(ConfirmScript::ConfirmAfter(Duration::from_secs(22)));

        let id = h.engine.deliver(&claim()).await.unwrap();

        assert_eq!(id.as_str(), "net-sig-1");
        assert_eq!(h.ledger.broadcast_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn without_rebroadcast_waits_for_the_watch() {
        let h = harness(dedicated().with_rebroadcast(false));
        h.ledger
            .push_confirm(ConfirmScript::ConfirmAfter(Duration::from_secs(30)));

        h.engine.deliver(&claim()).await.unwrap();

        assert_eq!(h.ledger.broadcast_count(), 1);
        assert_eq!(h.engine.stats().snapshot().rebroadcasts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn on_chain_failure_triggers_resign() {
        let h = harness(dedicated());
        h.ledger.push_confirm(ConfirmScript::FailAfter(
            Duration::from_secs(1),
            "slippage".into(),
        ));
        h.ledger
            .push_confirm(ConfirmScript::ConfirmAfter(Duration::from_secs(1)));

        let id = h.engine.deliver(&claim()).await.unwrap();

        assert_eq!(id.as_str(), "net-sig-2");
        assert_eq!(h.engine.stats().snapshot().resigns, 1);
        assert_eq!(h.ledger.distinct_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_token_failures_are_retried() {
        let h = harness(dedicated());
        h.ledger.fail_next_token_fetches(2);
        h.ledger
            .push_confirm(ConfirmScript::ConfirmAfter(Duration::from_secs(1)));

        assert!(h.engine.deliver(&claim()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_token_failure_surfaces() {
        let h = harness(dedicated());
        h.ledger.fail_next_token_fetches(10);

        let err = h.engine.deliver(&claim()).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Ledger(LedgerError::Transport(_))));
        assert_eq!(h.ledger.broadcast_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_delivery() {
        let controller = ShutdownController::new();
        let ledger = Arc::new(NullLedger::new());
        let engine = DeliveryEngine::new(ledger.clone(), Arc::new(NullSigner::new()), dedicated())
            .with_shutdown(controller.subscribe());

        let op = claim();
        let delivery = engine.deliver(&op);
        tokio::pin!(delivery);
        tokio::select! {
            _ = &mut delivery => panic!("delivery should still be pending"),
            _ = sleep(Duration::from_secs(12)) => {}
        }
        controller.shutdown();

        assert!(matches!(delivery.await, Err(DeliveryError::Cancelled)));
        assert_eq!(ledger.distinct_attempts(), 1);
    }
}
