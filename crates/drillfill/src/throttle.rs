//! Row-count based throttling
//!
//! Gives the sink time to settle (e.g. flush async inserts, relieve part
//! pressure) by pausing whenever the inserted row count crosses an exact
//! multiple of `every_rows`. The pause is fixed; it does not react to latency
//! or errors.

use crate::config::ThrottleConfig;
use metrics::counter;
use std::time::Duration;
use tracing::info;

/// Pauses the load at fixed row-count thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleController {
    every_rows: u64,
    pause: Duration,
}

impl From<&ThrottleConfig> for ThrottleController {
    fn from(config: &ThrottleConfig) -> Self {
        Self::new(config.every_rows, Duration::from_millis(config.pause_ms))
    }
}

impl ThrottleController {
    /// `every_rows == 0` disables throttling
    pub fn new(every_rows: u64, pause: Duration) -> Self {
        Self { every_rows, pause }
    }

    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.every_rows > 0 && !self.pause.is_zero()
    }

    /// Pause owed after `rows_inserted` rows, if any.
    ///
    /// Only exact multiples of `every_rows` trigger, and never once the load
    /// is complete.
    pub fn pause_after(&self, rows_inserted: u64, total_rows: u64) -> Option<Duration> {
        if !self.is_enabled() || rows_inserted == 0 || rows_inserted >= total_rows {
            return None;
        }
        (rows_inserted % self.every_rows == 0).then_some(self.pause)
    }

    /// Sleep if a pause is owed; returns whether it paused
    pub async fn on_progress(&self, rows_inserted: u64, total_rows: u64) -> bool {
        let Some(pause) = self.pause_after(rows_inserted, total_rows) else {
            return false;
        };
        counter!("drillfill.throttle.pauses").increment(1);
        info!(
            rows_inserted,
            pause_ms = pause.as_millis() as u64,
            "Throttling for {:?}",
            pause
        );
        tokio::time::sleep(pause).await;
        true
    }
}
