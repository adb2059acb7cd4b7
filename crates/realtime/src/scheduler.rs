//! Monitoring scheduler: one repeating timer per domain.
//!
//! Each timer runs as its own task and calls the refresh callback on every
//! tick. Stopping cancels the timers; a refresh already running is allowed to
//! finish.

use crate::preferences::UpdateFrequency;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tripwatch_sources::{CacheStrategy, Domain};

/// Shortest interval a timer will run at.
const MIN_INTERVAL: Duration = Duration::from_secs(1);
/// Longest interval a timer will run at.
const MAX_INTERVAL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Refresh callback invoked on each tick.
pub type RefreshFn = Arc<dyn Fn(Domain) -> BoxFuture<'static, ()> + Send + Sync>;

/// Polling interval: the domain's cache TTL scaled by the frequency multiplier.
pub fn monitoring_interval(
    strategy: &CacheStrategy,
    domain: Domain,
    frequency: UpdateFrequency,
) -> Duration {
    let secs = strategy.ttl(domain).as_secs_f64() * frequency.multiplier();
    Duration::try_from_secs_f64(secs)
        .unwrap_or(MAX_INTERVAL)
        .clamp(MIN_INTERVAL, MAX_INTERVAL)
}

/// Text of a panic payload, when it carries one.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

struct Timer {
    domain: Domain,
    period: Duration,
    handle: JoinHandle<()>,
}

struct Running {
    token: CancellationToken,
    timers: Vec<Timer>,
}

#[derive(Default)]
pub struct MonitoringScheduler {
    running: Mutex<Option<Running>>,
}

impl MonitoringScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Arm one timer per `(domain, period)`. Must be called from within a
    /// tokio runtime. Returns false (and does nothing) if already running.
    pub fn start(&self, intervals: &[(Domain, Duration)], refresh: RefreshFn) -> bool {
        let mut state = self.state();
        if state.is_some() {
            debug!("monitoring already running");
            return false;
        }

        let token = CancellationToken::new();
        let timers = intervals
            .iter()
            .map(|&(domain, period)| Timer {
                domain,
                period,
                handle: tokio::spawn(run_timer(
                    domain,
                    period,
                    Arc::clone(&refresh),
                    token.child_token(),
                )),
            })
            .collect();

        *state = Some(Running { token, timers });
        info!(timers = intervals.len(), "monitoring started");
        true
    }

    /// Cancel every timer. Safe to call when not running.
    pub fn stop(&self) -> bool {
        let Some(running) = self.state().take() else {
            return false;
        };
        running.token.cancel();
        info!(timers = running.timers.len(), "monitoring stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.state().is_some()
    }

    /// Timers of the current run that have not exited.
    pub fn active_timers(&self) -> usize {
        self.state().as_ref().map_or(0, |r| {
            r.timers.iter().filter(|t| !t.handle.is_finished()).count()
        })
    }

    /// `(domain, period)` for each armed timer.
    pub fn intervals(&self) -> Vec<(Domain, Duration)> {
        self.state().as_ref().map_or_else(Vec::new, |r| {
            r.timers.iter().map(|t| (t.domain, t.period)).collect()
        })
    }
}

impl Drop for MonitoringScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.state().take() {
            running.token.cancel();
        }
    }
}

async fn run_timer(
    domain: Domain,
    period: Duration,
    refresh: RefreshFn,
    shutdown: CancellationToken,
) {
    debug!(%domain, period_secs = period.as_secs_f64(), "timer armed");

    // First tick one full period from now; the initial fetch happens elsewhere.
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            _ = interval.tick() => {
                debug!(%domain, "timer tick");
                if let Err(panic) = AssertUnwindSafe(refresh(domain)).catch_unwind().await {
                    error!(%domain, panic = %panic_message(panic.as_ref()), "refresh panicked");
                }
            }
        }
    }

    debug!(%domain, "timer exited");
}
