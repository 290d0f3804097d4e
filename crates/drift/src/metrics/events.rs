//! Internal events for drift metrics emission.
//!
//! Every metric carries a `target` label with the qualified table name.

use std::time::Duration;

use metrics::{counter, histogram};
use tracing::trace;

use drift_core::InternalEvent;

/// Event emitted when rows have been encoded into local files.
pub struct RowsEncoded {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for RowsEncoded {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Rows encoded");
        counter!("drift_rows_encoded_total", "target" => self.target).increment(self.count);
    }
}

/// Event emitted when a local gzip file is closed.
pub struct FileWritten {
    pub rows: u64,
    /// Uncompressed bytes.
    pub bytes: u64,
    pub target: String,
}

impl InternalEvent for FileWritten {
    fn emit(self) {
        trace!(rows = self.rows, bytes = self.bytes, target = %self.target, "File written");
        counter!("drift_files_written_total", "target" => self.target.clone()).increment(1);
        counter!("drift_bytes_written_total", "target" => self.target).increment(self.bytes);
    }
}

/// Event emitted when a file is uploaded to the stage.
pub struct FileStaged {
    pub target: String,
}

impl InternalEvent for FileStaged {
    fn emit(self) {
        trace!(target = %self.target, "File staged");
        counter!("drift_files_staged_total", "target" => self.target).increment(1);
    }
}

/// Event emitted with the counts reported by the load command.
pub struct RowsLoaded {
    pub loaded: u64,
    pub rejected: u64,
    pub target: String,
}

impl InternalEvent for RowsLoaded {
    fn emit(self) {
        trace!(loaded = self.loaded, rejected = self.rejected, target = %self.target, "Rows loaded");
        counter!("drift_rows_loaded_total", "target" => self.target.clone()).increment(self.loaded);
        counter!("drift_rows_rejected_total", "target" => self.target).increment(self.rejected);
    }
}

/// Event emitted when a session finishes successfully.
pub struct LoadCompleted {
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for LoadCompleted {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis() as u64, target = %self.target, "Load completed");
        histogram!("drift_load_duration_seconds", "target" => self.target)
            .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a session fails.
pub struct SessionFailed {
    /// Phase label, see `LoadError::phase`.
    pub phase: &'static str,
    pub target: String,
}

impl InternalEvent for SessionFailed {
    fn emit(self) {
        trace!(phase = self.phase, target = %self.target, "Session failed");
        counter!(
            "drift_session_failures_total",
            "target" => self.target,
            "phase" => self.phase
        )
        .increment(1);
    }
}
