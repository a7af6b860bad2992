//! One-shot ticking countdown used for the post-task review pause.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

use super::{COUNTDOWN_TICK_MS, lock};

/// Receives the remaining seconds on every tick, ending with `0`.
pub type TickCallback = Arc<dyn Fn(u32) + Send + Sync>;

#[derive(Default)]
struct CountdownState {
    /// Bumped on every start and stop so stale ticker tasks exit silently.
    generation: u64,
    active: bool,
    remaining: u32,
    on_tick: Option<TickCallback>,
    ticker: Option<JoinHandle<()>>,
}

/// Second-resolution countdown with idempotent stop.
///
/// Clones share the same countdown.
#[derive(Clone)]
pub struct CountdownTimer {
    state: Arc<Mutex<CountdownState>>,
    tick: Duration,
}

impl Default for CountdownTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownTimer {
    pub fn new() -> Self {
        Self::with_tick(Duration::from_millis(COUNTDOWN_TICK_MS))
    }

    /// Countdown whose "second" lasts `tick`.
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(CountdownState::default())),
            tick,
        }
    }

    /// Start counting down from `initial_seconds`.
    ///
    /// Any running countdown is stopped first (its callback receives `0`).
    /// `on_tick(initial_seconds)` is invoked before this returns. A zero
    /// start reports completion through that call and leaves the timer
    /// inactive.
    pub fn start<F>(&self, initial_seconds: u32, on_tick: F)
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.stop();
        let on_tick: TickCallback = Arc::new(on_tick);
        {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.remaining = initial_seconds;
            if initial_seconds > 0 {
                state.active = true;
                state.on_tick = Some(Arc::clone(&on_tick));
                let first_tick = Instant::now() + self.tick;
                state.ticker = Some(tokio::spawn(run_ticker(
                    Arc::clone(&self.state),
                    state.generation,
                    first_tick,
                    self.tick,
                )));
            }
        }
        debug!(initial_seconds, "countdown started");
        on_tick(initial_seconds);
    }

    /// Stop the countdown. Delivers a final `0` only when it was active.
    pub fn stop(&self) {
        let on_tick = {
            let mut state = lock(&self.state);
            if !state.active {
                return;
            }
            state.active = false;
            state.generation += 1;
            state.remaining = 0;
            if let Some(ticker) = state.ticker.take() {
                ticker.abort();
            }
            state.on_tick.take()
        };
        debug!("countdown stopped");
        if let Some(on_tick) = on_tick {
            on_tick(0);
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.state).active
    }

    pub fn remaining(&self) -> u32 {
        lock(&self.state).remaining
    }
}

async fn run_ticker(
    state: Arc<Mutex<CountdownState>>,
    generation: u64,
    first_tick: Instant,
    tick: Duration,
) {
    let mut ticker = time::interval_at(first_tick, tick);
    loop {
        ticker.tick().await;
        let (remaining, on_tick) = {
            let mut guard = lock(&state);
            if guard.generation != generation || !guard.active {
                return;
            }
            guard.remaining = guard.remaining.saturating_sub(1);
            let remaining = guard.remaining;
            let on_tick = if remaining == 0 {
                guard.active = false;
                guard.ticker = None;
                guard.on_tick.take()
            } else {
                guard.on_tick.clone()
            };
            (remaining, on_tick)
        };
        if let Some(on_tick) = on_tick {
            on_tick(remaining);
        }
        if remaining == 0 {
            debug!("countdown finished");
            return;
        }
    }
}
