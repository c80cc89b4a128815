//! Two-tier wake timer.
//!
//! Waiting hours for a deadline on one long sleep drifts across process
//! suspensions. Instead the timer pings every `ping` interval, re-reads the
//! wall clock, and only arms the final precise sleep once the deadline is
//! within one ping.

use std::sync::Arc;
use std::time::Duration;

use roundkeeper_ledger::Clock;
use roundkeeper_types::Timestamp;
use roundkeeper_utils::{format_duration, ShutdownSignal};
use tokio::time::sleep;

/// The next sleep the timer should take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    /// Sleep one ping interval, then re-check.
    Ping(Duration),
    /// Sleep exactly this long, then the deadline has passed.
    Final(Duration),
}

impl Wake {
    pub fn delay(&self) -> Duration {
        match self {
            Self::Ping(d) | Self::Final(d) => *d,
        }
    }
}

/// Decide the next sleep given the time `remaining` until the deadline.
pub fn next_wake(remaining: Duration, ping: Duration) -> Wake {
    if remaining > ping {
        Wake::Ping(ping)
    } else {
        Wake::Final(remaining)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeOutcome {
    Deadline,
    Shutdown,
}

pub struct WakeTimer {
    clock: Arc<dyn Clock>,
    ping: Duration,
    shutdown: ShutdownSignal,
}

impl WakeTimer {
    pub fn new(clock: Arc<dyn Clock>, ping: Duration, shutdown: ShutdownSignal) -> Self {
        Self {
            clock,
            ping,
            shutdown,
        }
    }

    /// Sleep until `deadline` has passed on the wall clock.
    ///
    /// A deadline that has already passed is waited on for one ping interval
    /// so an unresolved round does not spin the scheduler.
    pub async fn until(&mut self, deadline: Timestamp) -> WakeOutcome {
        let Some(mut remaining) = self.clock.now().duration_until(deadline) else {
            tracing::info!(
                deadline = %deadline,
                ping = %format_duration(self.ping),
                "deadline already passed, re-checking after one ping"
            );
            return self.ping().await;
        };

        loop {
            let wake = next_wake(remaining, self.ping);
            match wake {
                Wake::Ping(_) => {
                    tracing::debug!(
                        remaining = %format_duration(remaining),
                        "schedule ping check"
                    );
                }
                Wake::Final(d) => {
                    tracing::info!(
                        deadline = %deadline,
                        wake_in = %format_duration(d),
                        "arming final wake-up"
                    );
                }
            }
            if !self.sleep(wake.delay()).await {
                return WakeOutcome::Shutdown;
            }
            if let Wake::Final(_) = wake {
                return WakeOutcome::Deadline;
            }
            remaining = self
                .clock
                .now()
                .duration_until(deadline)
                .unwrap_or(Duration::ZERO);
        }
    }

    /// Sleep one ping interval.
    pub async fn ping(&mut self) -> WakeOutcome {
        if self.sleep(self.ping).await {
            WakeOutcome::Deadline
        } else {
            WakeOutcome::Shutdown
        }
    }

    /// Returns `false` if shutdown interrupted the sleep.
    async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundkeeper_nullables::NullClock;
    use roundkeeper_utils::ShutdownController;
    use tokio::time::Instant;

    const PING: Duration = Duration::from_secs(600);

    #[test]
    fn within_one_ping_arms_final() {
        assert_eq!(
            next_wake(Duration::from_millis(5_000), Duration::from_millis(600_000)),
            Wake::Final(Duration::from_millis(5_000))
        );
        assert_eq!(next_wake(PING, PING), Wake::Final(PING));
        assert_eq!(next_wake(Duration::ZERO, PING), Wake::Final(Duration::ZERO));
    }

    #[test]
    fn beyond_one_ping_pings() {
        assert_eq!(next_wake(PING + Duration::from_millis(1), PING), Wake::Ping(PING));
        assert_eq!(next_wake(Duration::from_secs(21_600), PING).delay(), PING);
    }

    fn timer(clock: Arc<NullClock>) -> WakeTimer {
        WakeTimer::new(clock, PING, ShutdownSignal::never())
    }

    #[tokio::test(start_paused = true)]
    async fn wakes_at_deadline_through_pings() {
        let clock = Arc::new(NullClock::new(Timestamp::from_secs(1_000)));
        let deadline = Timestamp::from_secs(1_000 + 1_500);
        let started = Instant::now();

        assert_eq!(timer(clock.clone()).until(deadline).await, WakeOutcome::Deadline);
        assert_eq!(started.elapsed(), Duration::from_secs(1_500));
        assert_eq!(clock.now(), deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn close_deadline_skips_pings() {
        let clock = Arc::new(NullClock::new(Timestamp::from_secs(0)));
        let started = Instant::now();

        timer(clock).until(Timestamp::from_millis(5_000)).await;

        assert_eq!(started.elapsed(), Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn ping_rederives_remaining_after_clock_jump() {
        let clock = Arc::new(NullClock::new(Timestamp::from_secs(0)));
        let deadline = Timestamp::from_secs(3_600);
        let waker = clock.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(60)).await;
            // The process was suspended for 50 minutes.
            waker.jump(Duration::from_secs(3_000));
        });
        let started = Instant::now();

        timer(clock.clone()).until(deadline).await;

        // First ping at 600s finds 0s left after the jump.
        assert_eq!(started.elapsed(), PING);
        assert!(clock.now() >= deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn past_deadline_waits_one_ping() {
        let clock = Arc::new(NullClock::new(Timestamp::from_secs(10_000)));
        let started = Instant::now();

        let outcome = timer(clock).until(Timestamp::from_secs(5)).await;

        assert_eq!(outcome, WakeOutcome::Deadline);
        assert_eq!(started.elapsed(), PING);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_wait() {
        let controller = ShutdownController::new();
        let clock = Arc::new(NullClock::new(Timestamp::from_secs(0)));
        let mut timer = WakeTimer::new(clock, PING, controller.subscribe());
        let wait = timer.until(Timestamp::from_secs(86_400));
        tokio::pin!(wait);

        tokio::select! {
            _ = &mut wait => panic!("timer fired early"),
            _ = sleep(Duration::from_secs(700)) => {}
        }
        controller.shutdown();

        assert_eq!(wait.await, WakeOutcome::Shutdown);
    }
}
