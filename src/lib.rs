//! # firewatch
//!
//! A ground-station controller that fuses a thermal feed and an imagery
//! (object detection) feed into a per-event fire/no-fire decision, records the
//! latency cost of every decision, and stops itself when either feed loses too
//! many messages.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Controller                             │
//! │  ┌──────────┐                                                    │
//! │  │ listener │ thermal :5001 ─┐                                   │
//! │  └──────────┘                │    ┌────────────────────────────┐ │
//! │  ┌──────────┐                ├───▶│ store (one lock)           │ │
//! │  │ listener │ imagery :5002 ─┘    │  StreamState x2 ─▶ fusion  │ │
//! │  └──────────┘                     │                   │        │ │
//! │                                   │                   ▼        │ │
//! │  ┌──────────┐  prune + count      │            sink (jsonl,csv)│ │
//! │  │ monitor  │────────────────────▶└────────────────────────────┘ │
//! │  └──────────┘  degraded ─▶ flush ─▶ exit 3                       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`listener`]**: accept loops and per-connection newline framing
//!   ([`framing`]), stamping every parsed message with its arrival time
//! - **[`store`]**: the single shared state object; ingesting a message and
//!   running the fusion it triggers happen under one lock
//! - **[`fusion`]**: the decision rule and latency breakdown
//! - **[`monitor`]**: periodic drop-rate estimation and the stop decision
//! - **[`sink`]**: line-durable structured and tabular fusion logs
//!
//! ## Usage
//!
//! ```bash
//! # Defaults: thermal on 5001, imagery on 5002, logs in the working directory
//! firewatch-controller
//!
//! # Custom ports and config file
//! firewatch-controller --config firewatch.toml --thermal-port 6001 --imagery-port 6002
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use firewatch::{Controller, ControllerConfig};
//!
//! # tokio_test::block_on(async {
//! let controller = Controller::new(ControllerConfig::default()).unwrap();
//! let shutdown = controller.run().await;
//! std::process::exit(shutdown.exit_code());
//! # });
//! ```
//!
//! ### Evaluating a pair directly
//!
//! ```
//! use firewatch::fusion::{assess, FusionParams};
//! use firewatch_types::{Detection, ImageryMessage, ThermalData, ThermalMessage};
//!
//! let t0 = 1_700_000_000_000_000_000;
//! let thermal = ThermalMessage {
//!     data: ThermalData::Flat(vec![80.0, 150.0]),
//!     tx_ns: Some(t0),
//!     ..Default::default()
//! };
//! let imagery = ImageryMessage {
//!     detections: Some(vec![Detection::labelled("fire")]),
//!     tx_ns: Some(t0 + 10_000_000),
//!     ..Default::default()
//! };
//!
//! let a = assess(&thermal, t0, &imagery, t0, &FusionParams::default());
//! assert!(a.decision);
//! assert!((a.dt_s - 0.01).abs() < 1e-9);
//! ```

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod framing;
pub mod fusion;
pub mod listener;
pub mod monitor;
pub mod sink;
pub mod store;

pub use clock::Clock;
pub use config::ControllerConfig;
pub use controller::{Controller, Shutdown, DEGRADED_EXIT_CODE};
pub use error::{ConfigError, ControllerError, FusionError};
pub use fusion::{Assessment, FusionEngine, FusionParams};
pub use monitor::{HealthMonitor, MonitorSettings};
pub use sink::{CsvSink, JsonlSink, MemorySink, RecordSink};
pub use store::SharedStore;
