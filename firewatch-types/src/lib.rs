//! # firewatch-types
//!
//! Wire and record schema for the firewatch fusion controller. This crate
//! defines what the two sensor feeds send, what a fusion evaluation emits, and
//! how a health-monitor tick describes each feed.
//!
//! ## Features
//!
//! - `serde`: JSON (or any serde format) encoding of messages and records.
//!   The controller enables it; producers and analysis tools can too.
//!
//! ## Example
//!
//! ```rust
//! use firewatch_types::{Detection, ImageryMessage, ThermalData, ThermalMessage};
//!
//! let thermal = ThermalMessage {
//!     data: ThermalData::Grid(vec![vec![70.0, 71.5], vec![150.0, 69.0]]),
//!     ..Default::default()
//! };
//! assert_eq!(thermal.max_temp(), 150.0);
//! assert_eq!(thermal.shape_label(), "2x2");
//!
//! let imagery = ImageryMessage {
//!     detections: Some(vec![Detection::labelled("smoke"), Detection::labelled("fire")]),
//!     ..Default::default()
//! };
//! assert!(imagery.fire_detected());
//! ```

mod feed;
mod health;
mod message;
mod record;

pub use feed::*;
pub use health::*;
pub use message::*;
pub use record::*;

/// Detection label that marks a positive fire sighting in the imagery feed.
pub const FIRE_LABEL: &str = "fire";

/// Nanoseconds per second, for converting between the integer clock domain
/// and the floating-point seconds used by thresholds.
pub const NANOS_PER_SEC: f64 = 1e9;

/// Nanoseconds per millisecond.
pub const NANOS_PER_MILLI: f64 = 1e6;
