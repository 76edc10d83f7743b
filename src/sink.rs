//! Append-only sinks for fusion records.
//!
//! Every sink is crash-consistent at line granularity: each record is written
//! as one complete line and flushed before `append` returns, so a completed
//! decision is on disk before the next event is processed.

use std::fmt::Debug;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use firewatch_types::FusionRecord;
use parking_lot::Mutex;

use crate::config::ControllerConfig;
use crate::error::ControllerError;

/// Column order of the tabular log.
pub const CSV_HEADER: &str =
    "fusion_id,utc_iso,dt_s,max_temp,imagery_fire,decision,thermal_shape,num_detections";

/// Destination for fusion records.
///
/// Implementations must have the line durable (flushed) when `append`
/// returns `Ok`.
pub trait RecordSink: Send + Debug {
    /// Append one record as a single line.
    fn append(&mut self, record: &FusionRecord) -> io::Result<()>;

    /// Flush anything still buffered.
    fn flush(&mut self) -> io::Result<()>;

    /// Human-readable description for logs.
    fn description(&self) -> String;
}

fn create(path: &Path) -> Result<BufWriter<File>, ControllerError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| ControllerError::Sink {
            path: path.to_path_buf(),
            source,
        })
}

/// One JSON object per line; the contract read by the latency analysis tools.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlSink {
    /// Create (truncating) the log at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, ControllerError> {
        let path = path.into();
        let writer = create(&path)?;
        Ok(Self { path, writer })
    }
}

impl RecordSink for JsonlSink {
    fn append(&mut self, record: &FusionRecord) -> io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn description(&self) -> String {
        format!("jsonl: {}", self.path.display())
    }
}

/// Header row plus one denormalised row per evaluation.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CsvSink {
    /// Create (truncating) the log at `path` and write the header row.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, ControllerError> {
        let path = path.into();
        let mut writer = create(&path)?;
        writeln!(writer, "{}", CSV_HEADER)
            .and_then(|_| writer.flush())
            .map_err(|source| ControllerError::Sink {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path, writer })
    }
}

/// Render one tabular row (no trailing newline).
pub fn csv_row(record: &FusionRecord) -> String {
    format!(
        "{},{},{},{},{},{},{},{}",
        record.fusion_id,
        record.utc_iso,
        record.dt_s,
        record.max_temp,
        record.imagery_fire,
        record.decision,
        record.thermal_shape,
        record.num_detections
    )
}

impl RecordSink for CsvSink {
    fn append(&mut self, record: &FusionRecord) -> io::Result<()> {
        writeln!(self.writer, "{}", csv_row(record))?;
        self.writer.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn description(&self) -> String {
        format!("csv: {}", self.path.display())
    }
}

/// Keeps records in memory; handy for embedding and tests.
///
/// Clones share the same buffer, so one clone can be handed to the engine
/// while another inspects what was written.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<FusionRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything appended so far.
    pub fn records(&self) -> Vec<FusionRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl RecordSink for MemorySink {
    fn append(&mut self, record: &FusionRecord) -> io::Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn description(&self) -> String {
        "memory".to_string()
    }
}

/// Open the structured and tabular logs named in the configuration.
pub fn open_log_sinks(
    config: &ControllerConfig,
) -> Result<Vec<Box<dyn RecordSink>>, ControllerError> {
    Ok(vec![
        Box::new(JsonlSink::create(&config.latency_log)?),
        Box::new(CsvSink::create(&config.fusion_log)?),
    ])
}
