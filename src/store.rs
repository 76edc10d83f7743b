//! Shared state for both feeds.
//!
//! One exclusive lock covers the whole store: the per-feed stream states and
//! the fusion engine that reads them. Ingesting a message, updating its feed,
//! evaluating the fusion and writing the logs all happen under that single
//! lock, so an evaluation always sees a consistent snapshot of both feeds and
//! never a half-applied update.

use std::collections::VecDeque;

use firewatch_types::{Feed, FusionRecord, ImageryMessage, ThermalMessage};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::FusionError;
use crate::fusion::FusionEngine;

/// Per-feed state. Mutated only while the store lock is held.
#[derive(Debug, Clone)]
pub struct StreamState<M> {
    /// Latest decoded message; replaced wholesale on each arrival.
    pub last_message: Option<M>,
    /// Local arrival time of `last_message`.
    pub last_rx_ns: Option<i64>,
    /// Arrival times inside the trailing monitor window, oldest first.
    pub arrivals: VecDeque<i64>,
    pub first_seen_ns: Option<i64>,
    /// Whether this feed's listener bound successfully.
    pub server_up: bool,
}

impl<M> Default for StreamState<M> {
    fn default() -> Self {
        Self {
            last_message: None,
            last_rx_ns: None,
            arrivals: VecDeque::new(),
            first_seen_ns: None,
            server_up: false,
        }
    }
}

impl<M> StreamState<M> {
    /// Record an arrival at `rx_ns`, then prune anything older than the window.
    pub fn record_arrival(&mut self, rx_ns: i64, window_ns: i64) {
        self.first_seen_ns.get_or_insert(rx_ns);
        self.arrivals.push_back(rx_ns);
        self.prune(rx_ns, window_ns);
    }

    /// Drop arrival times older than `now_ns - window_ns`.
    pub fn prune(&mut self, now_ns: i64, window_ns: i64) {
        let cutoff = now_ns.saturating_sub(window_ns);
        while self.arrivals.front().is_some_and(|&ts| ts < cutoff) {
            self.arrivals.pop_front();
        }
    }

    /// Replace the latest message.
    pub fn set_latest(&mut self, message: M, rx_ns: i64) {
        self.last_message = Some(message);
        self.last_rx_ns = Some(rx_ns);
    }

    /// Forget the latest message so nothing stale is fused.
    pub fn clear_latest(&mut self) {
        self.last_message = None;
        self.last_rx_ns = None;
    }

    /// The latest message with its arrival time, if any message was ever kept.
    pub fn latest(&self) -> Option<(&M, i64)> {
        match (&self.last_message, self.last_rx_ns) {
            (Some(message), Some(rx_ns)) => Some((message, rx_ns)),
            _ => None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.first_seen_ns.is_some()
    }

    fn window(&self) -> FeedWindow {
        FeedWindow {
            server_up: self.server_up,
            first_seen_ns: self.first_seen_ns,
            received: self.arrivals.len(),
        }
    }
}

/// Arrival counts for one feed, copied out of the store for the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedWindow {
    pub server_up: bool,
    pub first_seen_ns: Option<i64>,
    /// Arrivals inside the trailing window after pruning.
    pub received: usize,
}

fn supersede<M: DeserializeOwned>(
    state: &mut StreamState<M>,
    feed: Feed,
    body: Value,
    rx_ns: i64,
    window_ns: i64,
) -> Result<(), FusionError> {
    state.record_arrival(rx_ns, window_ns);
    match serde_json::from_value::<M>(body) {
        Ok(message) => {
            state.set_latest(message, rx_ns);
            Ok(())
        }
        Err(source) => {
            state.clear_latest();
            Err(FusionError::Decode { feed, source })
        }
    }
}

#[derive(Debug)]
struct StoreInner {
    thermal: StreamState<ThermalMessage>,
    imagery: StreamState<ImageryMessage>,
    engine: FusionEngine,
}

/// The controller's only shared mutable resource.
#[derive(Debug)]
pub struct SharedStore {
    inner: Mutex<StoreInner>,
    window_ns: i64,
}

impl SharedStore {
    /// Create an empty store whose arrival histories span `window_ns`.
    pub fn new(engine: FusionEngine, window_ns: i64) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                thermal: StreamState::default(),
                imagery: StreamState::default(),
                engine,
            }),
            window_ns,
        }
    }

    /// Record one parsed message and run the fusion evaluation it triggers.
    ///
    /// The arrival always counts towards the feed's rate. Wrongly typed fields
    /// decode as absent, so every well-formed object supersedes the feed's
    /// snapshot. An object that still cannot be decoded clears the snapshot
    /// instead, and the feed sits out of fusion until its next message.
    /// Returns the emitted record, or `None` when either feed has no current
    /// snapshot.
    pub fn ingest(
        &self,
        feed: Feed,
        body: Map<String, Value>,
        rx_ns: i64,
    ) -> Result<Option<FusionRecord>, FusionError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let body = Value::Object(body);

        let window_ns = self.window_ns;
        match feed {
            Feed::Thermal => supersede(&mut inner.thermal, feed, body, rx_ns, window_ns)?,
            Feed::Imagery => supersede(&mut inner.imagery, feed, body, rx_ns, window_ns)?,
        }

        inner.engine.evaluate(&inner.thermal, &inner.imagery)
    }

    /// Mark a feed's listener as bound.
    pub fn mark_server_up(&self, feed: Feed) {
        let mut inner = self.inner.lock();
        match feed {
            Feed::Thermal => inner.thermal.server_up = true,
            Feed::Imagery => inner.imagery.server_up = true,
        }
    }

    /// Prune both arrival histories at `now_ns` and copy out their counts.
    ///
    /// The lock is released before this returns.
    pub fn arrival_windows(&self, now_ns: i64) -> [(Feed, FeedWindow); 2] {
        let mut inner = self.inner.lock();
        inner.thermal.prune(now_ns, self.window_ns);
        inner.imagery.prune(now_ns, self.window_ns);
        [
            (Feed::Thermal, inner.thermal.window()),
            (Feed::Imagery, inner.imagery.window()),
        ]
    }

    /// Whether a feed has delivered at least one message.
    pub fn is_started(&self, feed: Feed) -> bool {
        let inner = self.inner.lock();
        match feed {
            Feed::Thermal => inner.thermal.is_started(),
            Feed::Imagery => inner.imagery.is_started(),
        }
    }

    /// Number of records emitted so far.
    pub fn fusion_count(&self) -> u64 {
        self.inner.lock().engine.emitted()
    }

    /// Flush every log sink; used on the way out of the process.
    pub fn flush(&self) {
        self.inner.lock().engine.flush();
    }
}
