//! Controller configuration.
//!
//! Every field defaults to the controller's fixed operating constants. A
//! deployment may override them from a config file and `FIREWATCH_*`
//! environment variables (layered with the `config` crate), and the binary
//! applies a few CLI overrides on top. The result is validated before any
//! listener opens.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use firewatch_types::Feed;
use serde::Deserialize;

use crate::error::ConfigError;

/// Default thermal feed port.
pub const THERMAL_PORT: u16 = 5001;
/// Default imagery feed port.
pub const IMAGERY_PORT: u16 = 5002;

/// Tunables for the whole controller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Interface both listeners bind to.
    pub host: String,
    pub thermal_port: u16,
    pub imagery_port: u16,

    /// A thermal frame must be strictly hotter than this to count as fire.
    pub temp_threshold: f64,
    /// Maximum allowed skew between the two feeds' send times, in seconds.
    pub time_window_s: f64,

    /// Rate each producer is expected to send at, in Hz.
    pub expected_rate_hz: f64,
    /// Trailing window used for drop-rate estimation, in seconds.
    pub monitor_window_s: f64,
    /// Period between health-monitor ticks, in seconds.
    pub monitor_interval_s: f64,
    /// Delay before the first tick, and warm-up after a feed's first message.
    pub grace_period_s: f64,
    /// Drop rate strictly above which the controller stops.
    pub stop_drop_rate: f64,

    /// Structured (JSON lines) fusion log.
    pub latency_log: PathBuf,
    /// Tabular (CSV) fusion log.
    pub fusion_log: PathBuf,

    /// Lines longer than this are discarded by the framer.
    pub max_line_bytes: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            thermal_port: THERMAL_PORT,
            imagery_port: IMAGERY_PORT,
            temp_threshold: 100.0,
            time_window_s: 2.0,
            expected_rate_hz: 2.0,
            monitor_window_s: 10.0,
            monitor_interval_s: 1.0,
            grace_period_s: 5.0,
            stop_drop_rate: 0.5,
            latency_log: PathBuf::from("latency_log.jsonl"),
            fusion_log: PathBuf::from("fusion_log.csv"),
            max_line_bytes: 1 << 20,
        }
    }
}

impl ControllerConfig {
    /// Load defaults, then an optional file, then `FIREWATCH_*` variables.
    ///
    /// The result is not validated; call [`ControllerConfig::validate`] once
    /// all overrides are applied.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(Environment::with_prefix("FIREWATCH").try_parsing(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Reject configurations the controller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thermal_port == self.imagery_port {
            return Err(ConfigError::DuplicatePorts(self.thermal_port));
        }

        let positive = [
            ("time_window_s", self.time_window_s),
            ("expected_rate_hz", self.expected_rate_hz),
            ("monitor_window_s", self.monitor_window_s),
            ("monitor_interval_s", self.monitor_interval_s),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid(field, "must be a positive number"));
            }
        }

        if !(self.grace_period_s.is_finite() && self.grace_period_s >= 0.0) {
            return Err(ConfigError::invalid("grace_period_s", "must be zero or positive"));
        }
        if !self.temp_threshold.is_finite() {
            return Err(ConfigError::invalid("temp_threshold", "must be finite"));
        }
        if !(0.0..=1.0).contains(&self.stop_drop_rate) {
            return Err(ConfigError::invalid("stop_drop_rate", "must be within [0, 1]"));
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::invalid("max_line_bytes", "must be non-zero"));
        }
        if self.latency_log == self.fusion_log {
            return Err(ConfigError::invalid("fusion_log", "must differ from latency_log"));
        }
        Ok(())
    }

    /// Listening port for a feed.
    pub fn port(&self, feed: Feed) -> u16 {
        match feed {
            Feed::Thermal => self.thermal_port,
            Feed::Imagery => self.imagery_port,
        }
    }

    /// `host:port` bind address for a feed.
    pub fn bind_addr(&self, feed: Feed) -> String {
        format!("{}:{}", self.host, self.port(feed))
    }

    pub fn monitor_window(&self) -> Duration {
        Duration::from_secs_f64(self.monitor_window_s)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs_f64(self.monitor_interval_s)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs_f64(self.grace_period_s)
    }
}
