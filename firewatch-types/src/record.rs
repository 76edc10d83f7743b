//! Fusion output records.

use crate::NANOS_PER_MILLI;

/// The write-once result of one fusion evaluation.
///
/// One record is appended to the structured log per evaluation, and a
/// denormalised subset to the tabular log. `fusion_id` is strictly increasing
/// and gapless for the life of a controller process.
///
/// The synchronization gap is deliberately not a field: it is derived from the
/// others by [`FusionRecord::sync_gap_ms`] so every consumer computes it the
/// same way.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FusionRecord {
    pub fusion_id: u64,
    /// Completion time rendered as ISO-8601 UTC with millisecond precision.
    pub utc_iso: String,
    pub decision: bool,

    pub thermal_seq: Option<i64>,
    pub imagery_seq: Option<i64>,
    /// Thermal payload shape descriptor, e.g. `"4x4"`.
    pub thermal_shape: String,
    pub num_detections: usize,

    /// Resolved logical send times (producer clock, or local arrival fallback).
    pub thermal_tx_ns: i64,
    pub imagery_tx_ns: i64,
    /// Local arrival times.
    pub thermal_rx_ns: i64,
    pub imagery_rx_ns: i64,

    pub thermal_proc_ns: i64,
    pub imagery_proc_ns: i64,
    /// One-way network delay, clamped at zero.
    pub thermal_net_ns: i64,
    pub imagery_net_ns: i64,
    /// Wall-clock cost of the decision itself.
    pub fusion_proc_ns: i64,
    /// Local clock reading when the decision completed.
    pub fusion_done_ns: i64,
    /// Completion time minus the earlier of the two send times.
    pub e2e_ns: i64,
    pub e2e_ms: f64,

    /// Absolute cross-feed skew between the two send times, in seconds.
    pub dt_s: f64,
    /// Hottest thermal reading; negative infinity (JSON `null`) when absent.
    #[cfg_attr(feature = "serde", serde(deserialize_with = "temp_or_neg_infinity"))]
    pub max_temp: f64,
    pub imagery_fire: bool,
}

#[cfg(feature = "serde")]
fn temp_or_neg_infinity<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
}

fn ns_to_ms(ns: i64) -> f64 {
    ns as f64 / NANOS_PER_MILLI
}

impl FusionRecord {
    /// Sum of the measured latency components, in milliseconds.
    pub fn measured_ms(&self) -> f64 {
        ns_to_ms(self.thermal_proc_ns)
            + ns_to_ms(self.imagery_proc_ns)
            + ns_to_ms(self.thermal_net_ns)
            + ns_to_ms(self.imagery_net_ns)
            + ns_to_ms(self.fusion_proc_ns)
    }

    /// Time spent waiting for the slower feed, in milliseconds.
    ///
    /// `max(0, e2e_ms - (proc + net for both feeds + fusion_proc))`.
    pub fn sync_gap_ms(&self) -> f64 {
        (self.e2e_ms - self.measured_ms()).max(0.0)
    }
}
