//! Append-only CSV persistence, one file per metric kind.

use csv::WriterBuilder;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::error::TelemetryError;

/// Durable destination for one row per tick.
pub trait RowSink: Send + Sync {
    fn append(&self, record: &[String]) -> Result<(), TelemetryError>;
    fn flush(&self) -> Result<(), TelemetryError>;
}

/// CSV file opened in append mode.
///
/// The header is written only when the file is new or empty. Appends are
/// serialized through a mutex and flushed immediately, so every row is whole
/// on disk before the next tick starts.
pub struct CsvSink {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl CsvSink {
    pub fn open(path: impl AsRef<Path>, header: &[String]) -> Result<Self, TelemetryError> {
        let path = path.as_ref().to_path_buf();
        let sink_err = |source: csv::Error| TelemetryError::Sink {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| sink_err(e.into()))?;
        let fresh = file.metadata().map_err(|e| sink_err(e.into()))?.len() == 0;
        debug!(path = %path.display(), fresh, "Opened CSV sink");

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if fresh {
            writer.write_record(header).map_err(sink_err)?;
            writer.flush().map_err(|e| sink_err(e.into()))?;
        }

        Ok(Self {
            path,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_writer(
        &self,
        f: impl FnOnce(&mut csv::Writer<File>) -> Result<(), csv::Error>,
    ) -> Result<(), TelemetryError> {
        let mut writer = self.writer.lock().map_err(|_| TelemetryError::Sink {
            path: self.path.clone(),
            source: std::io::Error::other("sink lock poisoned").into(),
        })?;
        f(&mut writer).map_err(|source| TelemetryError::Sink {
            path: self.path.clone(),
            source,
        })
    }
}

impl RowSink for CsvSink {
    fn append(&self, record: &[String]) -> Result<(), TelemetryError> {
        self.with_writer(|w| {
            w.write_record(record)?;
            w.flush()?;
            Ok(())
        })
    }

    fn flush(&self) -> Result<(), TelemetryError> {
        self.with_writer(|w| Ok(w.flush()?))
    }
}
