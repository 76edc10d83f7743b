//! Fusion of the latest thermal and imagery snapshots into one decision.
//!
//! An evaluation runs synchronously under the store lock every time either
//! feed updates. It resolves each feed's logical send time, measures the
//! cross-feed skew, applies the three-way fire test, decomposes the latency,
//! and appends the resulting record to every sink before returning.

use std::sync::Arc;

use firewatch_types::{
    FeedMessage, FusionRecord, ImageryMessage, ThermalMessage, NANOS_PER_MILLI, NANOS_PER_SEC,
};
use tracing::{info, warn};

use crate::clock::{utc_iso, Clock};
use crate::config::ControllerConfig;
use crate::error::FusionError;
use crate::sink::RecordSink;
use crate::store::StreamState;

/// Decision thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    /// Hottest reading must be strictly above this.
    pub temp_threshold: f64,
    /// Skew between the two send times may be at most this many seconds.
    pub time_window_s: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            temp_threshold: 100.0,
            time_window_s: 2.0,
        }
    }
}

impl From<&ControllerConfig> for FusionParams {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            temp_threshold: config.temp_threshold,
            time_window_s: config.time_window_s,
        }
    }
}

/// The decision-relevant part of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub thermal_tx_ns: i64,
    pub imagery_tx_ns: i64,
    pub dt_s: f64,
    pub max_temp: f64,
    pub imagery_fire: bool,
    pub decision: bool,
}

/// Logical send time: the producer's clock when usable, else local arrival.
pub fn resolve_send_ns<M: FeedMessage>(message: &M, rx_ns: i64) -> i64 {
    message.send_ns().unwrap_or(rx_ns)
}

/// All three conjuncts are mandatory.
pub fn decide(max_temp: f64, imagery_fire: bool, dt_s: f64, params: &FusionParams) -> bool {
    max_temp > params.temp_threshold && imagery_fire && dt_s <= params.time_window_s
}

/// Evaluate one thermal/imagery pair.
pub fn assess(
    thermal: &ThermalMessage,
    thermal_rx_ns: i64,
    imagery: &ImageryMessage,
    imagery_rx_ns: i64,
    params: &FusionParams,
) -> Assessment {
    let thermal_tx_ns = resolve_send_ns(thermal, thermal_rx_ns);
    let imagery_tx_ns = resolve_send_ns(imagery, imagery_rx_ns);
    let dt_s = thermal_tx_ns.abs_diff(imagery_tx_ns) as f64 / NANOS_PER_SEC;
    let max_temp = thermal.max_temp();
    let imagery_fire = imagery.fire_detected();

    Assessment {
        thermal_tx_ns,
        imagery_tx_ns,
        dt_s,
        max_temp,
        imagery_fire,
        decision: decide(max_temp, imagery_fire, dt_s, params),
    }
}

/// Owns the fusion id counter and the output sinks.
#[derive(Debug)]
pub struct FusionEngine {
    params: FusionParams,
    sinks: Vec<Box<dyn RecordSink>>,
    clock: Arc<Clock>,
    next_id: u64,
}

impl FusionEngine {
    pub fn new(params: FusionParams, sinks: Vec<Box<dyn RecordSink>>, clock: Arc<Clock>) -> Self {
        Self {
            params,
            sinks,
            clock,
            next_id: 1,
        }
    }

    pub fn params(&self) -> &FusionParams {
        &self.params
    }

    /// Number of records emitted so far.
    pub fn emitted(&self) -> u64 {
        self.next_id - 1
    }

    /// Fuse the current snapshots of both feeds.
    ///
    /// A no-op returning `Ok(None)` until both feeds have a message. The id
    /// advances once the record reached at least one sink, so every log sees
    /// strictly increasing ids.
    pub fn evaluate(
        &mut self,
        thermal: &StreamState<ThermalMessage>,
        imagery: &StreamState<ImageryMessage>,
    ) -> Result<Option<FusionRecord>, FusionError> {
        let (Some((thermal_msg, thermal_rx_ns)), Some((imagery_msg, imagery_rx_ns))) =
            (thermal.latest(), imagery.latest())
        else {
            return Ok(None);
        };

        let started_ns = self.clock.now_ns();
        let assessment = assess(
            thermal_msg,
            thermal_rx_ns,
            imagery_msg,
            imagery_rx_ns,
            &self.params,
        );
        let done_ns = self.clock.now_ns();

        let record = self.build_record(
            &assessment,
            thermal_msg,
            thermal_rx_ns,
            imagery_msg,
            imagery_rx_ns,
            done_ns - started_ns,
            done_ns,
        );

        let mut written = 0;
        let mut failure = None;
        for sink in self.sinks.iter_mut() {
            match sink.append(&record) {
                Ok(()) => written += 1,
                Err(e) => {
                    warn!(sink = %sink.description(), error = %e, "failed to append fusion record");
                    failure.get_or_insert(e);
                }
            }
        }
        if written > 0 || self.sinks.is_empty() {
            self.next_id += 1;
        }
        if let Some(e) = failure {
            return Err(FusionError::Sink(e));
        }

        info!(
            fusion_id = record.fusion_id,
            dt_s = format_args!("{:.3}", record.dt_s),
            max_temp = format_args!("{:.1}", record.max_temp),
            fire = record.imagery_fire,
            shape = %record.thermal_shape,
            decision = record.decision,
            e2e_ms = format_args!("{:.2}", record.e2e_ms),
            "fusion"
        );
        Ok(Some(record))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_record(
        &self,
        assessment: &Assessment,
        thermal: &ThermalMessage,
        thermal_rx_ns: i64,
        imagery: &ImageryMessage,
        imagery_rx_ns: i64,
        fusion_proc_ns: i64,
        done_ns: i64,
    ) -> FusionRecord {
        let e2e_ns = done_ns - assessment.thermal_tx_ns.min(assessment.imagery_tx_ns);

        FusionRecord {
            fusion_id: self.next_id,
            utc_iso: utc_iso(done_ns),
            decision: assessment.decision,
            thermal_seq: thermal.seq(),
            imagery_seq: imagery.seq(),
            thermal_shape: thermal.shape_label(),
            num_detections: imagery.num_detections(),
            thermal_tx_ns: assessment.thermal_tx_ns,
            imagery_tx_ns: assessment.imagery_tx_ns,
            thermal_rx_ns,
            imagery_rx_ns,
            thermal_proc_ns: thermal.processing_ns(),
            imagery_proc_ns: imagery.processing_ns(),
            thermal_net_ns: (thermal_rx_ns - assessment.thermal_tx_ns).max(0),
            imagery_net_ns: (imagery_rx_ns - assessment.imagery_tx_ns).max(0),
            fusion_proc_ns: fusion_proc_ns.max(0),
            fusion_done_ns: done_ns,
            e2e_ns,
            e2e_ms: e2e_ns as f64 / NANOS_PER_MILLI,
            dt_s: assessment.dt_s,
            max_temp: assessment.max_temp,
            imagery_fire: assessment.imagery_fire,
        }
    }

    /// Flush every sink, logging failures.
    pub fn flush(&mut self) {
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.flush() {
                warn!(sink = %sink.description(), error = %e, "failed to flush log");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use firewatch_types::{Detection, ThermalData};
    use std::io;

    const T: i64 = 1_700_000_000_000_000_000;
    const MS: i64 = 1_000_000;

    fn thermal(max: f64, tx_ns: i64) -> ThermalMessage {
        ThermalMessage {
            data: ThermalData::Grid(vec![vec![70.0, 71.0], vec![max, 69.0]]),
            tx_ns: Some(tx_ns),
            proc_ns: Some(2 * MS),
            seq: Some(1),
            ..Default::default()
        }
    }

    fn imagery(labels: &[&str], tx_ns: i64) -> ImageryMessage {
        ImageryMessage {
            detections: Some(labels.iter().map(|l| Detection::labelled(*l)).collect()),
            tx_ns: Some(tx_ns),
            proc_ns: Some(3 * MS),
            seq: Some(1),
            ..Default::default()
        }
    }

    fn state<M>(message: M, rx_ns: i64) -> StreamState<M> {
        let mut state = StreamState::default();
        state.record_arrival(rx_ns, i64::MAX);
        state.set_latest(message, rx_ns);
        state
    }

    fn engine() -> (FusionEngine, MemorySink) {
        let sink = MemorySink::new();
        let engine = FusionEngine::new(
            FusionParams::default(),
            vec![Box::new(sink.clone())],
            Arc::new(Clock::new()),
        );
        (engine, sink)
    }

    fn pair_decision(t: &ThermalMessage, i: &ImageryMessage) -> Assessment {
        assess(t, T + 50 * MS, i, T + 60 * MS, &FusionParams::default())
    }

    #[test]
    fn all_three_conditions_give_fire() {
        let a = pair_decision(&thermal(150.0, T), &imagery(&["fire"], T + 10 * MS));
        assert!(a.decision);
        assert!((a.dt_s - 0.01).abs() < 1e-9);
        assert_eq!(a.max_temp, 150.0);
    }

    #[test]
    fn temperature_at_threshold_is_not_fire() {
        let a = pair_decision(&thermal(100.0, T), &imagery(&["fire"], T));
        assert!(!a.decision);
    }

    #[test]
    fn skew_exactly_at_window_is_fire() {
        let a = pair_decision(&thermal(150.0, T), &imagery(&["fire"], T + 2_000 * MS));
        assert_eq!(a.dt_s, 2.0);
        assert!(a.decision);

        let a = pair_decision(&thermal(150.0, T), &imagery(&["fire"], T + 2_001 * MS));
        assert!(!a.decision);
    }

    #[test]
    fn empty_detections_are_not_fire() {
        let a = pair_decision(&thermal(150.0, T), &imagery(&[], T));
        assert!(!a.imagery_fire);
        assert!(!a.decision);

        let a = pair_decision(&thermal(150.0, T), &imagery(&["smoke", "heat"], T));
        assert!(!a.decision);
    }

    #[test]
    fn cool_frame_with_fire_label_is_not_fire() {
        let a = pair_decision(&thermal(50.0, T), &imagery(&["fire"], T));
        assert!(!a.decision);
    }

    #[test]
    fn skewed_feeds_never_fire() {
        let a = pair_decision(&thermal(500.0, T), &imagery(&["fire", "fire"], T - 5_000 * MS));
        assert_eq!(a.dt_s, 5.0);
        assert!(!a.decision);
    }

    #[test]
    fn missing_send_times_fall_back_to_arrival() {
        let mut t = thermal(150.0, 0);
        t.tx_ns = None;
        let mut i = imagery(&["fire"], 0);
        i.tx_ns = Some(0);

        let a = assess(&t, T, &i, T + 300 * MS, &FusionParams::default());
        assert_eq!(a.thermal_tx_ns, T);
        assert_eq!(a.imagery_tx_ns, T + 300 * MS);
        assert!((a.dt_s - 0.3).abs() < 1e-9);
    }

    #[test]
    fn needs_both_feeds() {
        let (mut engine, sink) = engine();
        let t = state(thermal(150.0, T), T + MS);
        let i = StreamState::<ImageryMessage>::default();
        assert!(engine.evaluate(&t, &i).unwrap().is_none());
        assert!(sink.is_empty());
        assert_eq!(engine.emitted(), 0);
    }

    #[test]
    fn latency_breakdown() {
        let (mut engine, _sink) = engine();
        let t = state(thermal(150.0, T), T + 4 * MS);
        let i = state(imagery(&["fire"], T + 10 * MS), T + 11 * MS);

        let record = engine.evaluate(&t, &i).unwrap().unwrap();
        assert_eq!(record.thermal_net_ns, 4 * MS);
        assert_eq!(record.imagery_net_ns, MS);
        assert_eq!(record.thermal_proc_ns, 2 * MS);
        assert_eq!(record.imagery_proc_ns, 3 * MS);
        assert!(record.fusion_proc_ns >= 0);
        assert_eq!(record.e2e_ns, record.fusion_done_ns - T);
        assert_eq!(record.thermal_shape, "2x2");
        assert_eq!(record.num_detections, 1);

        let total = record.measured_ms() + record.sync_gap_ms();
        assert!(record.sync_gap_ms() >= 0.0);
        assert!((total - record.e2e_ms).abs() < 1e-3);
    }

    #[test]
    fn network_delay_clamped_when_producer_clock_runs_ahead() {
        let (mut engine, _sink) = engine();
        let t = state(thermal(150.0, T + 50 * MS), T);
        let i = state(imagery(&["fire"], T), T);
        let record = engine.evaluate(&t, &i).unwrap().unwrap();
        assert_eq!(record.thermal_net_ns, 0);
    }

    #[test]
    fn fusion_ids_are_gapless() {
        let (mut engine, sink) = engine();
        let t = state(thermal(150.0, T), T);
        let i = state(imagery(&["fire"], T), T);
        for _ in 0..5 {
            engine.evaluate(&t, &i).unwrap();
        }
        let ids: Vec<u64> = sink.records().iter().map(|r| r.fusion_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(engine.emitted(), 5);
    }

    #[derive(Debug)]
    struct FailingSink;

    impl RecordSink for FailingSink {
        fn append(&mut self, _record: &FusionRecord) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn description(&self) -> String {
            "failing".to_string()
        }
    }

    #[test]
    fn sink_failure_is_reported_and_does_not_reuse_ids() {
        let good = MemorySink::new();
        let mut engine = FusionEngine::new(
            FusionParams::default(),
            vec![Box::new(good.clone()), Box::new(FailingSink)],
            Arc::new(Clock::new()),
        );
        let t = state(thermal(150.0, T), T);
        let i = state(imagery(&["fire"], T), T);

        assert!(matches!(engine.evaluate(&t, &i), Err(FusionError::Sink(_))));
        assert!(engine.evaluate(&t, &i).is_err());

        let ids: Vec<u64> = good.records().iter().map(|r| r.fusion_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn all_sinks_failing_keeps_the_id() {
        let mut engine = FusionEngine::new(
            FusionParams::default(),
            vec![Box::new(FailingSink)],
            Arc::new(Clock::new()),
        );
        let t = state(thermal(150.0, T), T);
        let i = state(imagery(&["fire"], T), T);
        assert!(engine.evaluate(&t, &i).is_err());
        assert_eq!(engine.emitted(), 0);
    }
}
