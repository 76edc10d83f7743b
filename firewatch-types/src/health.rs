//! Feed health as observed by the periodic monitor.

use crate::Feed;

/// Lifecycle of a feed within one controller process.
///
/// `NotStarted -> Started` on the first message. `DegradedStop` is terminal
/// and global: it halts the whole controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StreamPhase {
    NotStarted,
    Started,
    DegradedStop,
}

impl StreamPhase {
    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            StreamPhase::NotStarted => "IDLE",
            StreamPhase::Started => "OK",
            StreamPhase::DegradedStop => "STOP",
        }
    }
}

/// Fraction of expected messages that did not arrive, clamped to `[0, 1]`.
///
/// A non-positive expectation means nothing was owed, so nothing was dropped.
pub fn drop_rate(received: usize, expected: f64) -> f64 {
    if expected <= 0.0 || !expected.is_finite() {
        return 0.0;
    }
    (1.0 - received as f64 / expected).clamp(0.0, 1.0)
}

/// One feed's view in a monitor tick.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeedHealth {
    pub feed: Feed,
    pub phase: StreamPhase,
    /// Whether the feed's listener bound successfully.
    pub server_up: bool,
    /// Arrivals inside the trailing window.
    pub received: usize,
    /// Arrivals owed inside the trailing window at the expected rate.
    pub expected: f64,
    /// `None` until the feed has sent its first message.
    pub drop_rate: Option<f64>,
    /// Still inside the grace period after the first message.
    pub warming_up: bool,
}

impl FeedHealth {
    /// Health of a feed that has never delivered a message.
    pub fn not_started(feed: Feed, server_up: bool) -> Self {
        Self {
            feed,
            phase: StreamPhase::NotStarted,
            server_up,
            received: 0,
            expected: 0.0,
            drop_rate: None,
            warming_up: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.phase != StreamPhase::NotStarted
    }

    /// Whether this feed justifies stopping the controller at `threshold`.
    ///
    /// Requires a bound listener, a started feed past its grace period, and a
    /// drop rate strictly above the threshold.
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.server_up
            && self.is_started()
            && !self.warming_up
            && self.drop_rate.is_some_and(|rate| rate > threshold)
    }
}

/// One health-monitor tick across both feeds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonitorSample {
    /// Local clock reading when the tick was taken.
    pub at_ns: i64,
    pub thermal: FeedHealth,
    pub imagery: FeedHealth,
}

impl MonitorSample {
    /// Health of a single feed.
    pub fn get(&self, feed: Feed) -> &FeedHealth {
        match feed {
            Feed::Thermal => &self.thermal,
            Feed::Imagery => &self.imagery,
        }
    }

    /// Both feeds, thermal first.
    pub fn feeds(&self) -> [&FeedHealth; 2] {
        [&self.thermal, &self.imagery]
    }

    /// The first feed whose drop rate justifies a stop, if any.
    pub fn degraded_feed(&self, threshold: f64) -> Option<Feed> {
        self.feeds()
            .into_iter()
            .find(|health| health.exceeds(threshold))
            .map(|health| health.feed)
    }
}
