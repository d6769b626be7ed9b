//! Session clock: one fixed zero-point per capture session.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// Format of the session identity embedded in log file names.
const SESSION_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Fixed zero-point for a capture session.
///
/// The wall-clock start only names the session. Elapsed time is measured
/// against a monotonic [`Instant`], so values never go backwards when the
/// system clock is adjusted mid-capture.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    started_at: DateTime<Local>,
    zero: Instant,
}

impl SessionClock {
    /// Capture the current instant as the zero-point.
    pub fn start() -> Self {
        Self {
            started_at: Local::now(),
            zero: Instant::now(),
        }
    }

    /// Clock with an explicit zero-point.
    pub fn from_zero_point(started_at: DateTime<Local>, zero: Instant) -> Self {
        Self { started_at, zero }
    }

    /// Seconds since the zero-point.
    pub fn elapsed(&self) -> f64 {
        self.elapsed_duration().as_secs_f64()
    }

    /// `Instant::saturating_duration_since` keeps a zero-point in the future at 0.
    pub fn elapsed_duration(&self) -> Duration {
        Instant::now().saturating_duration_since(self.zero)
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// `YYYYMMDD_HHMMSS` in local time.
    pub fn session_id(&self) -> String {
        self.started_at.format(SESSION_ID_FORMAT).to_string()
    }
}
