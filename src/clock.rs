//! Wall-clock nanosecond timestamps for every timing field.
//!
//! The clock is anchored to the system wall clock once at construction and
//! advanced by a monotonic [`Instant`] afterwards, so readings never go
//! backwards within a process yet stay comparable with producers that share a
//! synchronised UTC clock.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, TimeZone, Utc};

/// Monotonic-to-wall-clock nanosecond source.
#[derive(Debug, Clone)]
pub struct Clock {
    anchor: Instant,
    anchor_wall_ns: i64,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    /// Anchor a new clock at the current system time.
    pub fn new() -> Self {
        let anchor_wall_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Self {
            anchor: Instant::now(),
            anchor_wall_ns,
        }
    }

    /// Nanoseconds since the Unix epoch.
    pub fn now_ns(&self) -> i64 {
        self.anchor_wall_ns + self.anchor.elapsed().as_nanos() as i64
    }

    /// ISO-8601 UTC rendering of `now_ns()`.
    pub fn now_iso(&self) -> String {
        utc_iso(self.now_ns())
    }
}

/// Render epoch nanoseconds as ISO-8601 UTC with millisecond precision,
/// e.g. `2026-10-18T09:30:00.125Z`.
pub fn utc_iso(ts_ns: i64) -> String {
    Utc.timestamp_nanos(ts_ns)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
