//! Periodic feed-health monitor.
//!
//! Runs on its own schedule, independent of traffic. Each tick copies both
//! feeds' arrival counts out of the store (releasing the lock straight away),
//! turns them into drop-rate estimates, and reports the first feed whose loss
//! justifies stopping the controller.

use std::sync::Arc;
use std::time::Duration;

use firewatch_types::{drop_rate, Feed, FeedHealth, MonitorSample, StreamPhase, NANOS_PER_SEC};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::clock::Clock;
use crate::config::ControllerConfig;
use crate::store::{FeedWindow, SharedStore};

/// Monitor tunables, lifted out of [`ControllerConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub expected_rate_hz: f64,
    pub window: Duration,
    pub interval: Duration,
    pub grace: Duration,
    pub stop_drop_rate: f64,
}

impl From<&ControllerConfig> for MonitorSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            expected_rate_hz: config.expected_rate_hz,
            window: config.monitor_window(),
            interval: config.monitor_interval(),
            grace: config.grace_period(),
            stop_drop_rate: config.stop_drop_rate,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

/// Turn one feed's arrival window into a health estimate at `now_ns`.
///
/// The expectation only covers the time the feed has actually been up, so a
/// feed that started three seconds ago owes three seconds of messages, not a
/// full window.
pub fn assess_feed(
    feed: Feed,
    window: FeedWindow,
    now_ns: i64,
    settings: &MonitorSettings,
) -> FeedHealth {
    let Some(first_seen_ns) = window.first_seen_ns else {
        return FeedHealth::not_started(feed, window.server_up);
    };

    let up_s = (now_ns - first_seen_ns).max(0) as f64 / NANOS_PER_SEC;
    let expected = settings.expected_rate_hz * up_s.min(settings.window.as_secs_f64());

    FeedHealth {
        feed,
        phase: StreamPhase::Started,
        server_up: window.server_up,
        received: window.received,
        expected,
        drop_rate: Some(drop_rate(window.received, expected)),
        warming_up: up_s < settings.grace.as_secs_f64(),
    }
}

/// Watches both feeds and decides when the controller must stop.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    store: Arc<SharedStore>,
    clock: Arc<Clock>,
    settings: MonitorSettings,
}

impl HealthMonitor {
    pub fn new(store: Arc<SharedStore>, clock: Arc<Clock>, settings: MonitorSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Sample both feeds at `now_ns`.
    ///
    /// The store lock is held only while the arrival windows are pruned and
    /// copied; the degraded feed, if any, is marked afterwards.
    pub fn sample_at(&self, now_ns: i64) -> MonitorSample {
        let [(_, thermal), (_, imagery)] = self.store.arrival_windows(now_ns);
        let mut sample = MonitorSample {
            at_ns: now_ns,
            thermal: assess_feed(Feed::Thermal, thermal, now_ns, &self.settings),
            imagery: assess_feed(Feed::Imagery, imagery, now_ns, &self.settings),
        };

        if let Some(feed) = sample.degraded_feed(self.settings.stop_drop_rate) {
            match feed {
                Feed::Thermal => sample.thermal.phase = StreamPhase::DegradedStop,
                Feed::Imagery => sample.imagery.phase = StreamPhase::DegradedStop,
            }
        }
        sample
    }

    /// Take and log one sample now.
    pub fn tick(&self) -> MonitorSample {
        let sample = self.sample_at(self.clock.now_ns());
        for health in sample.feeds() {
            log_health(health);
        }
        sample
    }

    /// Tick until a feed degrades, then return it.
    ///
    /// The first tick happens only after the grace period, giving producers
    /// time to connect.
    pub async fn run(self) -> Feed {
        tokio::time::sleep(self.settings.grace).await;

        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let sample = self.tick();
            if let Some(feed) = sample.degraded_feed(self.settings.stop_drop_rate) {
                let health = sample.get(feed);
                error!(
                    feed = %feed,
                    drop_rate = health.drop_rate.unwrap_or_default(),
                    threshold = self.settings.stop_drop_rate,
                    "feed degraded, stopping controller"
                );
                return feed;
            }
        }
    }
}

fn log_health(health: &FeedHealth) {
    match health.drop_rate {
        None => info!(
            feed = %health.feed,
            server_up = health.server_up,
            "not started"
        ),
        Some(rate) => info!(
            feed = %health.feed,
            state = health.phase.symbol(),
            received = health.received,
            expected = format_args!("{:.1}", health.expected),
            drop_rate = format_args!("{:.2}", rate),
            warming_up = health.warming_up,
            "feed rate"
        ),
    }
}
