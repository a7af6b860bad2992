//! Watchdog that fires when no agent activity is recorded for too long.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use super::{INACTIVITY_CHECK_INTERVAL_MS, INACTIVITY_TIMEOUT_MS, lock};

pub type TimeoutCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct MonitorState {
    generation: u64,
    active: bool,
    paused: bool,
    waiting: bool,
    last_activity: Option<Instant>,
    on_timeout: Option<TimeoutCallback>,
    checker: Option<JoinHandle<()>>,
}

impl MonitorState {
    fn touch(&mut self) {
        if self.active {
            self.last_activity = Some(Instant::now());
        }
    }
}

/// Inactivity watchdog over a single "last activity" timestamp.
///
/// Staleness is evaluated every `check_interval`. `on_timeout` keeps firing
/// on each check while the monitor stays stale, so callers should stop or
/// reset it when they react.
#[derive(Clone)]
pub struct InactivityMonitor {
    state: Arc<Mutex<MonitorState>>,
    timeout: Duration,
    check_interval: Duration,
}

impl Default for InactivityMonitor {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(INACTIVITY_TIMEOUT_MS),
            Duration::from_millis(INACTIVITY_CHECK_INTERVAL_MS),
        )
    }
}

impl InactivityMonitor {
    pub fn new(timeout: Duration, check_interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MonitorState::default())),
            timeout,
            check_interval,
        }
    }

    /// Activate the watchdog with a fresh timestamp. Restarts if already active.
    pub fn start<F>(&self, on_timeout: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stop();
        let mut state = lock(&self.state);
        state.generation += 1;
        state.active = true;
        state.paused = false;
        state.waiting = false;
        state.last_activity = Some(Instant::now());
        state.on_timeout = Some(Arc::new(on_timeout));
        state.checker = Some(tokio::spawn(run_checks(
            Arc::clone(&self.state),
            state.generation,
            Instant::now() + self.check_interval,
            self.check_interval,
            self.timeout,
        )));
        debug!(
            timeout_ms = self.timeout.as_millis() as u64,
            check_interval_ms = self.check_interval.as_millis() as u64,
            "inactivity monitor started"
        );
    }

    /// Deactivate and halt periodic checks. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        if !state.active {
            return;
        }
        state.active = false;
        state.paused = false;
        state.generation += 1;
        state.on_timeout = None;
        if let Some(checker) = state.checker.take() {
            checker.abort();
        }
        debug!("inactivity monitor stopped");
    }

    /// Refresh the activity timestamp. No effect while inactive.
    pub fn record_activity(&self) {
        lock(&self.state).touch();
    }

    /// Mark whether the agent is waiting. `true` counts as activity;
    /// `false` only changes the flag.
    pub fn set_waiting(&self, waiting: bool) {
        let mut state = lock(&self.state);
        state.waiting = waiting;
        if waiting {
            state.touch();
        }
    }

    /// Suspend timeout evaluation while staying active.
    pub fn pause(&self) {
        let mut state = lock(&self.state);
        if state.active {
            state.paused = true;
        }
    }

    /// Re-enable evaluation. Counts as activity so resuming never times out
    /// immediately.
    pub fn resume(&self) {
        let mut state = lock(&self.state);
        if state.active {
            state.paused = false;
            state.touch();
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.state).active
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.state).paused
    }

    pub fn is_waiting(&self) -> bool {
        lock(&self.state).waiting
    }

    /// Last recorded activity; `None` until the first start.
    pub fn last_activity_time(&self) -> Option<Instant> {
        lock(&self.state).last_activity
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self) -> Option<Duration> {
        self.last_activity_time()
            .map(|last| Instant::now().saturating_duration_since(last))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

async fn run_checks(
    state: Arc<Mutex<MonitorState>>,
    generation: u64,
    first_check: Instant,
    check_interval: Duration,
    timeout: Duration,
) {
    let mut ticker = time::interval_at(first_check, check_interval);
    loop {
        ticker.tick().await;
        let fire = {
            let guard = lock(&state);
            if guard.generation != generation || !guard.active {
                return;
            }
            if guard.paused {
                continue;
            }
            let idle = guard
                .last_activity
                .map(|last| Instant::now().saturating_duration_since(last))
                .unwrap_or_default();
            if idle >= timeout {
                warn!(idle_ms = idle.as_millis() as u64, "inactivity timeout");
                guard.on_timeout.clone()
            } else {
                None
            }
        };
        if let Some(on_timeout) = fire {
            on_timeout();
        }
    }
}
