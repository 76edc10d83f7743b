//! Top-level assembly: store, listeners, monitor, and shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use firewatch_types::Feed;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::fusion::{FusionEngine, FusionParams};
use crate::listener::StreamListener;
use crate::monitor::{HealthMonitor, MonitorSettings};
use crate::sink::{open_log_sinks, RecordSink};
use crate::store::SharedStore;

/// Process exit status after the monitor stops a degraded controller.
pub const DEGRADED_EXIT_CODE: i32 = 3;

/// Why the controller stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Interrupted by the operator.
    Interrupted,
    /// The monitor found this feed dropping too many messages.
    Degraded(Feed),
}

impl Shutdown {
    pub fn exit_code(&self) -> i32 {
        match self {
            Shutdown::Interrupted => 0,
            Shutdown::Degraded(_) => DEGRADED_EXIT_CODE,
        }
    }
}

/// One controller instance and everything it owns.
#[derive(Debug)]
pub struct Controller {
    config: ControllerConfig,
    clock: Arc<Clock>,
    store: Arc<SharedStore>,
}

impl Controller {
    /// Validate the configuration and open (truncating) both log files.
    pub fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        config.validate()?;
        let sinks = open_log_sinks(&config)?;
        Self::with_sinks(config, sinks)
    }

    /// Build a controller that writes to the given sinks instead of the
    /// configured log files.
    pub fn with_sinks(
        config: ControllerConfig,
        sinks: Vec<Box<dyn RecordSink>>,
    ) -> Result<Self, ControllerError> {
        config.validate()?;
        for sink in &sinks {
            info!(sink = %sink.description(), "fusion log opened");
        }

        let clock = Arc::new(Clock::new());
        let engine = FusionEngine::new(FusionParams::from(&config), sinks, clock.clone());
        let window_ns = config.monitor_window().as_nanos() as i64;
        let store = Arc::new(SharedStore::new(engine, window_ns));

        Ok(Self {
            config,
            clock,
            store,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SharedStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    /// Bind one feed's listener at `addr` and start accepting on it.
    pub async fn start_listener(
        &self,
        feed: Feed,
        addr: &str,
    ) -> Result<SocketAddr, ControllerError> {
        let listener = StreamListener::bind(
            feed,
            addr,
            self.store.clone(),
            self.clock.clone(),
            self.config.max_line_bytes,
        )
        .await?;
        let local = listener.local_addr().map_err(|source| ControllerError::Bind {
            feed,
            addr: addr.to_string(),
            source,
        })?;
        listener.spawn();
        Ok(local)
    }

    /// Start both configured listeners.
    ///
    /// A listener that fails to bind is logged and left down; its feed simply
    /// never starts. Returns the addresses that did bind.
    pub async fn start_listeners(&self) -> Vec<(Feed, SocketAddr)> {
        let mut bound = Vec::new();
        for feed in Feed::ALL {
            match self.start_listener(feed, &self.config.bind_addr(feed)).await {
                Ok(addr) => bound.push((feed, addr)),
                Err(e) => error!(feed = %feed, error = %e, "listener unavailable"),
            }
        }
        bound
    }

    pub fn monitor(&self) -> HealthMonitor {
        HealthMonitor::new(
            self.store.clone(),
            self.clock.clone(),
            MonitorSettings::from(&self.config),
        )
    }

    /// Run until interrupted or until a feed degrades.
    ///
    /// Logs are flushed before this returns on either path.
    pub async fn run(&self) -> Shutdown {
        self.start_listeners().await;

        let shutdown = tokio::select! {
            feed = self.monitor().run() => Shutdown::Degraded(feed),
            _ = interrupted() => Shutdown::Interrupted,
        };
        self.shutdown(shutdown);
        shutdown
    }

    /// Flush the logs on the way out.
    pub fn shutdown(&self, reason: Shutdown) {
        self.store.flush();
        info!(
            reason = ?reason,
            fusions = self.store.fusion_count(),
            "controller stopped"
        );
    }
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for interrupt, running until a feed degrades");
        std::future::pending::<()>().await;
    }
}
