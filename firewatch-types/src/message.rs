//! Inbound feed messages.
//!
//! Both feeds send newline-delimited JSON objects. Every recognised field is
//! optional on the wire; unknown fields are ignored. A message is an immutable
//! snapshot: the controller keeps only the latest one per feed and replaces it
//! wholesale on the next arrival.

use crate::{FIRE_LABEL, NANOS_PER_SEC};

/// Common view over both feeds' messages.
pub trait FeedMessage {
    /// Producer-side logical send time, if the producer supplied a usable one.
    ///
    /// A positive `tx_ns` wins; otherwise a positive float-seconds `timestamp`
    /// is converted. Zero, negative or absent values yield `None` so the caller
    /// can fall back to the local arrival time.
    fn send_ns(&self) -> Option<i64>;

    /// Producer-side processing cost in nanoseconds (absent or negative is 0).
    fn processing_ns(&self) -> i64;

    /// Producer sequence number, if present.
    fn seq(&self) -> Option<i64>;
}

fn resolve_send_ns(tx_ns: Option<i64>, timestamp: Option<f64>) -> Option<i64> {
    if let Some(tx) = tx_ns.filter(|tx| *tx > 0) {
        return Some(tx);
    }
    timestamp
        .filter(|ts| ts.is_finite() && *ts > 0.0)
        .map(|ts| (ts * NANOS_PER_SEC) as i64)
}

/// Thermal payload, either a flat reading list or a grid of rows.
///
/// The shape is self-describing on the wire. Anything that is neither a
/// numeric array nor an array of numeric arrays decodes as `Invalid`, which
/// never passes a temperature threshold.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ThermalData {
    /// 1-D sequence of readings.
    Flat(Vec<f64>),
    /// 2-D sequence of rows; rows may differ in length or be empty.
    Grid(Vec<Vec<f64>>),
    /// Absent or unrecognised payload.
    #[default]
    Invalid,
}

impl ThermalData {
    /// Maximum over all numeric cells, or negative infinity when there are none.
    pub fn max_temp(&self) -> f64 {
        match self {
            ThermalData::Flat(values) => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ThermalData::Grid(rows) => rows
                .iter()
                .filter(|row| !row.is_empty())
                .flatten()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max),
            ThermalData::Invalid => f64::NEG_INFINITY,
        }
    }

    /// `(rows, cols)` as inferred from the payload. Flat payloads are `n x 1`.
    pub fn shape(&self) -> Option<(usize, usize)> {
        match self {
            ThermalData::Flat(values) if !values.is_empty() => Some((values.len(), 1)),
            ThermalData::Grid(rows) if !rows.is_empty() => {
                Some((rows.len(), rows.first().map_or(0, Vec::len)))
            }
            _ => None,
        }
    }

    /// Total number of numeric cells.
    pub fn cell_count(&self) -> usize {
        match self {
            ThermalData::Flat(values) => values.len(),
            ThermalData::Grid(rows) => rows.iter().map(Vec::len).sum(),
            ThermalData::Invalid => 0,
        }
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ThermalData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Payload {
            Flat(Vec<f64>),
            Grid(Vec<Vec<f64>>),
            Other(serde::de::IgnoredAny),
        }

        Ok(match Payload::deserialize(deserializer)? {
            Payload::Flat(values) => ThermalData::Flat(values),
            Payload::Grid(rows) => ThermalData::Grid(rows),
            Payload::Other(_) => ThermalData::Invalid,
        })
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ThermalData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            ThermalData::Flat(values) => values.serialize(serializer),
            ThermalData::Grid(rows) => rows.serialize(serializer),
            ThermalData::Invalid => serializer.serialize_none(),
        }
    }
}

/// Field decoders that turn a wrongly typed value into "absent".
///
/// A producer that sends `"tx_ns": 1.7e18` or `"confidence": "high"` still
/// gets its message through: the odd field reads as `None` and the rest of
/// the snapshot stands.
#[cfg(feature = "serde")]
mod lenient {
    use std::collections::BTreeMap;

    use serde::de::IgnoredAny;
    use serde::{Deserialize, Deserializer};

    use super::Detection;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Integer(i64),
        Number(f64),
        Text(String),
        Other(IgnoredAny),
    }

    impl Scalar {
        fn into_number(self) -> Option<f64> {
            match self {
                Scalar::Integer(v) => Some(v as f64),
                Scalar::Number(v) => Some(v),
                _ => None,
            }
        }
    }

    /// Integers only; floats, strings and out-of-range values are `None`.
    pub fn integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Scalar::deserialize(deserializer)? {
            Scalar::Integer(v) => Ok(Some(v)),
            _ => Ok(None),
        }
    }

    pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Scalar::deserialize(deserializer)?.into_number())
    }

    pub fn string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Scalar::deserialize(deserializer)? {
            Scalar::Text(s) => Ok(Some(s)),
            _ => Ok(None),
        }
    }

    pub fn shape<'de, D>(deserializer: D) -> Result<Option<Vec<u64>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Dims(Vec<u64>),
            Other(IgnoredAny),
        }

        match Shape::deserialize(deserializer)? {
            Shape::Dims(dims) => Ok(Some(dims)),
            Shape::Other(_) => Ok(None),
        }
    }

    /// A list of detections. Entries that are not objects are kept as
    /// unlabelled detections, so they count but never report fire.
    pub fn detections<'de, D>(deserializer: D) -> Result<Option<Vec<Detection>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Entry {
            Object(BTreeMap<String, Scalar>),
            Other(IgnoredAny),
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Entries {
            List(Vec<Entry>),
            Other(IgnoredAny),
        }

        let entries = match Entries::deserialize(deserializer)? {
            Entries::List(entries) => entries,
            Entries::Other(_) => return Ok(None),
        };

        let detections = entries
            .into_iter()
            .map(|entry| match entry {
                Entry::Object(mut fields) => Detection {
                    label: match fields.remove("label") {
                        Some(Scalar::Text(label)) => Some(label),
                        _ => None,
                    },
                    confidence: fields.remove("confidence").and_then(Scalar::into_number),
                },
                Entry::Other(_) => Detection::default(),
            })
            .collect();
        Ok(Some(detections))
    }
}

/// A snapshot from the thermal feed.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThermalMessage {
    /// Temperature readings. Older producers call this field `grid`.
    #[cfg_attr(feature = "serde", serde(default, alias = "grid"))]
    pub data: ThermalData,

    /// Producer send time in nanoseconds since the Unix epoch.
    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "lenient::integer"))]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub tx_ns: Option<i64>,

    /// Producer-side processing cost in nanoseconds.
    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "lenient::integer"))]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub proc_ns: Option<i64>,

    /// Per-producer counter; restarts when the producer reconnects.
    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "lenient::integer"))]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub seq: Option<i64>,

    /// Producer-declared `[rows, cols]`, preferred over the inferred shape.
    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "lenient::shape"))]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub shape: Option<Vec<u64>>,

    /// Legacy send time in float seconds since the Unix epoch.
    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "lenient::number"))]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub timestamp: Option<f64>,
}

impl ThermalMessage {
    /// Hottest reading in the payload.
    pub fn max_temp(&self) -> f64 {
        self.data.max_temp()
    }

    /// Shape descriptor such as `"4x4"` or `"8x1"`, or `"?"` when unknown.
    pub fn shape_label(&self) -> String {
        if let Some([rows, cols, ..]) = self.shape.as_deref() {
            return format!("{}x{}", rows, cols);
        }
        match self.data.shape() {
            Some((rows, cols)) => format!("{}x{}", rows, cols),
            None => "?".to_string(),
        }
    }
}

impl FeedMessage for ThermalMessage {
    fn send_ns(&self) -> Option<i64> {
        resolve_send_ns(self.tx_ns, self.timestamp)
    }

    fn processing_ns(&self) -> i64 {
        self.proc_ns.unwrap_or(0).max(0)
    }

    fn seq(&self) -> Option<i64> {
        self.seq
    }
}

/// One object-detection result from the imagery feed.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Detection {
    /// Class label, e.g. `"fire"`, `"smoke"`.
    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "lenient::string"))]
    pub label: Option<String>,

    /// Detector confidence in `[0, 1]`.
    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "lenient::number"))]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub confidence: Option<f64>,
}

impl Detection {
    /// A detection carrying only a label.
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            confidence: None,
        }
    }

    /// Whether this detection reports fire.
    pub fn is_fire(&self) -> bool {
        self.label.as_deref() == Some(FIRE_LABEL)
    }
}

/// A snapshot from the imagery/detection feed.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageryMessage {
    /// Detections in this frame. Empty and absent both mean "nothing seen".
    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "lenient::detections"))]
    pub detections: Option<Vec<Detection>>,

    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "lenient::integer"))]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub tx_ns: Option<i64>,

    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "lenient::integer"))]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub proc_ns: Option<i64>,

    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "lenient::integer"))]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub seq: Option<i64>,

    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "lenient::number"))]
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub timestamp: Option<f64>,
}

impl ImageryMessage {
    /// True iff at least one detection is labelled as fire.
    pub fn fire_detected(&self) -> bool {
        self.detections.iter().flatten().any(Detection::is_fire)
    }

    /// Number of detections in the frame.
    pub fn num_detections(&self) -> usize {
        self.detections.as_ref().map_or(0, Vec::len)
    }
}

impl FeedMessage for ImageryMessage {
    fn send_ns(&self) -> Option<i64> {
        resolve_send_ns(self.tx_ns, self.timestamp)
    }

    fn processing_ns(&self) -> i64 {
        self.proc_ns.unwrap_or(0).max(0)
    }

    fn seq(&self) -> Option<i64> {
        self.seq
    }
}
