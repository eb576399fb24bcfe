// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Staleness watchdog for registered daemons

use super::registry::DaemonDelay;
use super::registry::DaemonRegistry;
use crate::config::MonitorConfig;
use crate::error::HealthError;
use crate::error::StalenessBreach;
use daemon_gateway_types::health::MonitorState;
use slog::debug;
use slog::error;
use slog::info;
use slog::o;
use slog::warn;
use slog::Logger;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;

/// Why a sweep did not evaluate any daemon
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    GracePeriod,
}

/// Result of evaluating the registry at one instant
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
    Skipped(SkipReason),
    Healthy,
    Breach(StalenessBreach),
}

/// Point-in-time view of the monitor
#[derive(Clone, Debug)]
pub struct MonitorStatus {
    pub state: MonitorState,
    pub enabled: bool,
    pub daemons: Vec<DaemonDelay>,
}

/// Tracks when each registered daemon last produced a valid response and
/// escalates when one goes silent for longer than it is allowed to.
///
/// Construction spawns the sweep task onto the current tokio runtime.  The
/// sweep never evaluates anything during the startup grace period.  Once a
/// breach is found the monitor moves to [`MonitorState::Failed`], stops
/// sweeping, and wakes anybody blocked in [`HealthMonitor::wait_for_failure`].
/// The monitor itself never terminates the process; that is left to whoever
/// is supervising it.
pub struct HealthMonitor {
    log: Logger,
    inner: Arc<Inner>,
    stop_tx: watch::Sender<bool>,
    sweep_task: JoinHandle<()>,
}

/// State shared between the monitor handle and its sweep task
struct Inner {
    registry: Mutex<DaemonRegistry>,
    start_time: Instant,
    startup_grace_period: Duration,
    poll_interval: Duration,
    enabled: AtomicBool,
    stopped: AtomicBool,
    failure_tx: watch::Sender<Option<StalenessBreach>>,
}

impl HealthMonitor {
    /// Create a monitor and start its sweep task.
    ///
    /// # Panics
    ///
    /// Panics if `config.poll_interval` is zero or if called outside a tokio
    /// runtime.
    pub fn new(config: &MonitorConfig, log: &Logger) -> HealthMonitor {
        let log = log.new(o!("component" => "HealthMonitor"));
        let (failure_tx, _) = watch::channel(None);
        let inner = Arc::new(Inner {
            registry: Mutex::new(DaemonRegistry::new()),
            start_time: Instant::now(),
            startup_grace_period: config.startup_grace_period,
            poll_interval: config.poll_interval,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            failure_tx,
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let sweep_task = tokio::spawn(run_sweep(
            Arc::clone(&inner),
            stop_rx,
            log.new(o!("task" => "sweep")),
        ));

        info!(
            log,
            "health monitor started";
            "startup_grace_period" => ?config.startup_grace_period,
            "poll_interval" => ?config.poll_interval,
        );
        HealthMonitor { log, inner, stop_tx, sweep_task }
    }

    /// Start tracking a daemon.
    ///
    /// Daemon identities are fixed when the gateway is constructed, so a
    /// duplicate registration is a configuration bug and callers should
    /// treat it as fatal.
    pub fn register_daemon_service(
        &self,
        key: &str,
        max_acceptable_delay: Duration,
    ) -> Result<(), HealthError> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(HealthError::MonitorStopped { key: key.to_string() });
        }
        self.inner.registry().register(
            key,
            max_acceptable_delay,
            Instant::now(),
        )?;

        if max_acceptable_delay <= self.inner.poll_interval {
            warn!(
                self.log,
                "daemon update budget does not exceed the sweep interval; \
                 breaches may be detected late";
                "daemon" => key,
                "max_acceptable_delay" => ?max_acceptable_delay,
                "poll_interval" => ?self.inner.poll_interval,
            );
        }
        info!(
            self.log,
            "registered daemon service";
            "daemon" => key,
            "max_acceptable_delay" => ?max_acceptable_delay,
        );
        Ok(())
    }

    /// Record that `key` just produced a valid response.
    ///
    /// Still accepted after [`HealthMonitor::stop()`] so that calls in flight
    /// during shutdown are tracked normally.
    pub fn register_valid_response(&self, key: &str) -> Result<(), HealthError> {
        self.inner.registry().touch(key, Instant::now())
    }

    /// Permanently turn off breach detection for this monitor.
    pub fn disable_for_testing(&self) {
        if self.inner.enabled.swap(false, Ordering::SeqCst) {
            warn!(self.log, "daemon health monitoring disabled for testing");
        }
    }

    /// Stop the sweep task.  Returns immediately; the task exits at its next
    /// wait point.  Safe to call any number of times.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_tx.send_replace(true);
        info!(self.log, "health monitor stopped");
    }

    /// Evaluate every registered daemon as of `now` without changing any
    /// state.
    pub fn evaluate(&self, now: Instant) -> SweepOutcome {
        self.inner.evaluate(now)
    }

    pub fn state(&self) -> MonitorState {
        self.inner.state(Instant::now())
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> MonitorStatus {
        let now = Instant::now();
        MonitorStatus {
            state: self.inner.state(now),
            enabled: self.is_enabled(),
            daemons: self.inner.registry().snapshot_delays(now),
        }
    }

    /// The breach that failed this monitor, if any
    pub fn failure(&self) -> Option<StalenessBreach> {
        self.inner.failure_tx.borrow().clone()
    }

    /// Wait until the sweep escalates a breach.
    ///
    /// Never resolves for a monitor that stops cleanly.
    pub async fn wait_for_failure(&self) -> StalenessBreach {
        let mut failure_rx = self.inner.failure_tx.subscribe();
        loop {
            if let Some(breach) = failure_rx.borrow_and_update().clone() {
                return breach;
            }
            // `self.inner` owns the sender, so the channel cannot close
            // while we're waiting on it.
            if failure_rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.sweep_task.abort();
    }
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, DaemonRegistry> {
        // A panic while holding this lock leaves nothing half-updated: every
        // registry operation is a single insert or assignment.
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn in_grace_period(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.start_time)
            < self.startup_grace_period
    }

    fn state(&self, now: Instant) -> MonitorState {
        if self.failure_tx.borrow().is_some() {
            MonitorState::Failed
        } else if self.stopped.load(Ordering::SeqCst) {
            MonitorState::Stopped
        } else if self.in_grace_period(now) {
            MonitorState::GracePeriod
        } else {
            MonitorState::Active
        }
    }

    /// Every daemon over its budget at `now`, all read from one snapshot of
    /// the registry
    fn breaches(&self, now: Instant) -> Result<Vec<DaemonDelay>, SkipReason> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(SkipReason::Disabled);
        }
        if self.in_grace_period(now) {
            return Err(SkipReason::GracePeriod);
        }

        let mut delays = self.registry().snapshot_delays(now);
        delays.retain(DaemonDelay::is_breached);
        Ok(delays)
    }

    fn evaluate(&self, now: Instant) -> SweepOutcome {
        match self.breaches(now) {
            Err(reason) => SweepOutcome::Skipped(reason),
            Ok(breached) => worst_breach(&breached)
                .map(SweepOutcome::Breach)
                .unwrap_or(SweepOutcome::Healthy),
        }
    }
}

fn worst_breach(breached: &[DaemonDelay]) -> Option<StalenessBreach> {
    breached.iter().max_by_key(|delay| delay.overage()).map(|worst| {
        StalenessBreach {
            key: worst.key.to_string(),
            elapsed: worst.elapsed,
            max_acceptable_delay: worst.max_acceptable_delay,
        }
    })
}

/// Body of the tokio task that periodically sweeps the registry
async fn run_sweep(
    inner: Arc<Inner>,
    mut stop_rx: watch::Receiver<bool>,
    log: Logger,
) {
    let period = inner.poll_interval;
    let mut interval =
        tokio::time::interval_at(inner.start_time + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut iteration: u64 = 0;
    loop {
        if *stop_rx.borrow_and_update() {
            break;
        }

        tokio::select! {
            biased;

            changed = stop_rx.changed() => {
                // Either a stop request or the monitor handle went away.
                if changed.is_err() {
                    break;
                }
                continue;
            }

            _ = interval.tick() => {}
        }

        iteration += 1;
        let now = Instant::now();
        let breached = match inner.breaches(now) {
            Ok(breached) => breached,
            Err(reason) => {
                debug!(
                    log,
                    "sweep skipped";
                    "iteration" => iteration,
                    "reason" => ?reason,
                );
                continue;
            }
        };
        let Some(breach) = worst_breach(&breached) else {
            debug!(log, "sweep complete"; "iteration" => iteration);
            continue;
        };

        for delay in &breached {
            error!(
                log,
                "daemon has not reported a valid response in time";
                "daemon" => &*delay.key,
                "elapsed" => ?delay.elapsed,
                "max_acceptable_delay" => ?delay.max_acceptable_delay,
            );
        }
        slog::crit!(
            log,
            "daemon staleness breach; escalating";
            "daemon" => &breach.key,
            "elapsed" => ?breach.elapsed,
            "max_acceptable_delay" => ?breach.max_acceptable_delay,
            "iteration" => iteration,
        );
        inner.failure_tx.send_replace(Some(breach));
        break;
    }

    debug!(log, "sweep task exiting"; "iterations" => iteration);
}
