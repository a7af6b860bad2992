//! Review countdown and inactivity watchdog.
//!
//! Both timers are handles over shared state driven by a tokio task. They
//! must be started from within a tokio runtime. Durations come from an
//! explicit [`TimingConfig`] so tests can run on compressed or paused time.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

pub mod countdown;
pub mod inactivity;

pub use countdown::CountdownTimer;
pub use inactivity::InactivityMonitor;

/// Pause after each task before the loop advances.
pub const REVIEW_COUNTDOWN_SECONDS: u32 = 12;
/// Maximum gap between recorded agent activity before the watchdog fires.
pub const INACTIVITY_TIMEOUT_MS: u64 = 60_000;
/// How often the watchdog evaluates staleness. Divides the timeout evenly.
pub const INACTIVITY_CHECK_INTERVAL_MS: u64 = 10_000;

const COUNTDOWN_TICK_MS: u64 = 1_000;

/// Timing parameters for one loop run (`[timing]` in `ralph.toml`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub review_countdown_secs: u32,
    /// Length of one countdown "second".
    pub countdown_tick_ms: u64,
    pub inactivity_timeout_ms: u64,
    pub inactivity_check_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            review_countdown_secs: REVIEW_COUNTDOWN_SECONDS,
            countdown_tick_ms: COUNTDOWN_TICK_MS,
            inactivity_timeout_ms: INACTIVITY_TIMEOUT_MS,
            inactivity_check_interval_ms: INACTIVITY_CHECK_INTERVAL_MS,
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.countdown_tick_ms == 0 {
            return Err(anyhow!("timing.countdown_tick_ms must be > 0"));
        }
        if self.inactivity_timeout_ms == 0 {
            return Err(anyhow!("timing.inactivity_timeout_ms must be > 0"));
        }
        if self.inactivity_check_interval_ms == 0 {
            return Err(anyhow!("timing.inactivity_check_interval_ms must be > 0"));
        }
        if self.inactivity_timeout_ms % self.inactivity_check_interval_ms != 0 {
            return Err(anyhow!(
                "timing.inactivity_check_interval_ms ({}) must evenly divide timing.inactivity_timeout_ms ({})",
                self.inactivity_check_interval_ms,
                self.inactivity_timeout_ms
            ));
        }
        Ok(())
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }

    pub fn inactivity_check_interval(&self) -> Duration {
        Duration::from_millis(self.inactivity_check_interval_ms)
    }

    pub fn countdown(&self) -> CountdownTimer {
        CountdownTimer::with_tick(self.countdown_tick())
    }

    pub fn inactivity_monitor(&self) -> InactivityMonitor {
        InactivityMonitor::new(self.inactivity_timeout(), self.inactivity_check_interval())
    }
}

/// Timer state updates are single field writes, so a poisoned lock still
/// holds consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants_and_validate() {
        let cfg = TimingConfig::default();
        assert_eq!(cfg.review_countdown_secs, 12);
        assert_eq!(cfg.inactivity_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.inactivity_check_interval(), Duration::from_secs(10));
        assert_eq!(INACTIVITY_TIMEOUT_MS % INACTIVITY_CHECK_INTERVAL_MS, 0);
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn check_interval_must_divide_timeout() {
        let cfg = TimingConfig {
            inactivity_check_interval_ms: 7_000,
            ..TimingConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("evenly divide"));
    }

    #[test]
    fn zero_durations_are_rejected() {
        let cfg = TimingConfig {
            countdown_tick_ms: 0,
            ..TimingConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = TimingConfig {
            inactivity_check_interval_ms: 0,
            ..TimingConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
