//! The file session: gzip files for one load, rotated by row count.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use flate2::Compression;
use flate2::write::GzEncoder;
use snafu::prelude::*;
use tracing::{debug, info, warn};

use drift_core::emit;

use super::naming::FileNaming;
use crate::error::{
    CloseFileSnafu, CreateWorkDirSnafu, NoOpenFileSnafu, OpenFileSnafu, RemoveFileSnafu, SinkError,
    WriteFileSnafu,
};
use crate::metrics::FileWritten;

/// When to close the current file and start the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollingPolicy {
    /// Roll after every `n` rows.
    RowCount(u64),
    /// Write everything to one file.
    Never,
}

impl RollingPolicy {
    /// Policy for a configured split size; zero or negative disables rotation.
    pub fn from_split_size(split_size: i64) -> Self {
        match u64::try_from(split_size) {
            Ok(rows) if rows > 0 => RollingPolicy::RowCount(rows),
            _ => RollingPolicy::Never,
        }
    }

    /// Check if the current file should be rolled after the last row.
    pub fn should_roll(&self, stats: &WriterStats) -> bool {
        match self {
            RollingPolicy::RowCount(rows) => {
                stats.rows_in_file > 0 && stats.rows_in_file % rows == 0
            }
            RollingPolicy::Never => false,
        }
    }
}

/// Running counters for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Rows written to the file currently open.
    pub rows_in_file: u64,
    /// Uncompressed bytes written to the file currently open.
    pub bytes_in_file: u64,
    /// Rows written in the whole session.
    pub total_rows: u64,
}

/// A file produced by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedFile {
    pub name: String,
    pub path: PathBuf,
    pub rows: u64,
    /// Uncompressed bytes.
    pub bytes: u64,
}

struct OpenFile {
    /// Position in `FileSession::produced`.
    index: usize,
    path: PathBuf,
    writer: GzEncoder<BufWriter<File>>,
}

/// Owns the gzip output files of one load session.
///
/// Files are named by [`FileNaming`], opened lazily by [`FileSession::write_row`]
/// and closed when the [`RollingPolicy`] says so. The list of produced files
/// is ordered and free of duplicates.
pub struct FileSession {
    naming: FileNaming,
    policy: RollingPolicy,
    next_split: u32,
    stats: WriterStats,
    current: Option<OpenFile>,
    produced: Vec<ProducedFile>,
    target: String,
}

impl FileSession {
    /// `target` labels logs and metrics.
    pub fn new(naming: FileNaming, policy: RollingPolicy, target: impl Into<String>) -> Self {
        Self {
            naming,
            policy,
            next_split: 0,
            stats: WriterStats::default(),
            current: None,
            produced: Vec::new(),
            target: target.into(),
        }
    }

    pub fn naming(&self) -> &FileNaming {
        &self.naming
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    /// Split number the next [`FileSession::open_file`] will use.
    pub fn next_split(&self) -> u32 {
        self.next_split
    }

    pub fn has_open_file(&self) -> bool {
        self.current.is_some()
    }

    pub fn produced_files(&self) -> &[ProducedFile] {
        &self.produced
    }

    pub fn file_names(&self) -> Vec<String> {
        self.produced.iter().map(|f| f.name.clone()).collect()
    }

    /// Open the next split, closing the current file first if one is open.
    pub fn open_file(&mut self) -> Result<PathBuf, SinkError> {
        let split = self.next_split;
        self.next_split += 1;
        self.open_split(split)
    }

    /// Open the file for `split`. A file this session already produced is
    /// appended to as a new gzip member.
    pub fn open_split(&mut self, split: u32) -> Result<PathBuf, SinkError> {
        self.close_file()?;

        let work_directory = self.naming.work_directory();
        std::fs::create_dir_all(work_directory).context(CreateWorkDirSnafu {
            path: work_directory,
        })?;

        let name = self.naming.file_name(split);
        let path = self.naming.path(split);
        let existing = self.produced.iter().position(|f| f.path == path);

        let mut options = OpenOptions::new();
        match existing {
            Some(_) => options.create(true).append(true),
            None => options.create(true).write(true).truncate(true),
        };
        let file = options.open(&path).context(OpenFileSnafu { path: &path })?;

        let index = existing.unwrap_or_else(|| {
            self.produced.push(ProducedFile {
                name: name.clone(),
                path: path.clone(),
                rows: 0,
                bytes: 0,
            });
            self.produced.len() - 1
        });

        debug!(target = %self.target, file = %name, append = existing.is_some(), "Opened file");
        self.stats.rows_in_file = 0;
        self.stats.bytes_in_file = 0;
        self.current = Some(OpenFile {
            index,
            path: path.clone(),
            writer: GzEncoder::new(BufWriter::new(file), Compression::default()),
        });
        Ok(path)
    }

    /// Write raw bytes to the current file.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        let open = self.current.as_mut().context(NoOpenFileSnafu)?;
        open.writer
            .write_all(bytes)
            .context(WriteFileSnafu { path: &open.path })?;
        self.stats.bytes_in_file += bytes.len() as u64;
        self.produced[open.index].bytes += bytes.len() as u64;
        Ok(())
    }

    /// Count one complete row in the current file.
    pub fn record_row(&mut self) {
        self.stats.rows_in_file += 1;
        self.stats.total_rows += 1;
        if let Some(open) = &self.current {
            self.produced[open.index].rows += 1;
        }
    }

    /// Close the current file if the rolling policy is met. Returns whether
    /// a file was closed.
    pub fn rotate_if_needed(&mut self) -> Result<bool, SinkError> {
        if self.current.is_none() || !self.policy.should_roll(&self.stats) {
            return Ok(false);
        }
        self.close_file()?;
        Ok(true)
    }

    /// Write one encoded row: open a file if none is open, write, count,
    /// rotate.
    pub fn write_row(&mut self, line: &[u8]) -> Result<(), SinkError> {
        if self.current.is_none() {
            self.open_file()?;
        }
        self.write(line)?;
        self.record_row();
        self.rotate_if_needed()?;
        Ok(())
    }

    /// Finish the gzip stream and flush the current file. No-op without one.
    pub fn close_file(&mut self) -> Result<(), SinkError> {
        let Some(open) = self.current.take() else {
            return Ok(());
        };

        let mut inner = open
            .writer
            .finish()
            .context(CloseFileSnafu { path: &open.path })?;
        inner.flush().context(CloseFileSnafu { path: &open.path })?;

        let produced = &self.produced[open.index];
        info!(
            target = %self.target,
            file = %produced.name,
            rows = self.stats.rows_in_file,
            "Closed file"
        );
        emit!(FileWritten {
            rows: self.stats.rows_in_file,
            bytes: self.stats.bytes_in_file,
            target: self.target.clone(),
        });
        Ok(())
    }

    /// Close the current file, logging instead of failing. Used on the
    /// failure path, where the first error is the one reported.
    pub fn close_quietly(&mut self) {
        if let Err(e) = self.close_file() {
            warn!(target = %self.target, error = %e, "Failed to close file");
        }
    }

    /// Delete every produced file. Files already gone are skipped.
    ///
    /// Returns the number of files removed.
    pub fn cleanup(&mut self) -> Result<usize, SinkError> {
        self.close_file()?;
        let mut removed = 0;
        for file in &self.produced {
            match std::fs::remove_file(&file.path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).context(RemoveFileSnafu { path: &file.path }),
            }
        }
        debug!(target = %self.target, removed, "Removed local files");
        Ok(removed)
    }
}

impl Drop for FileSession {
    fn drop(&mut self) {
        if self.current.is_some() {
            self.close_quietly();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use flate2::read::MultiGzDecoder;
    use std::io::Read;
    use std::path::Path;
    use tempfile::TempDir;

    fn session(dir: &TempDir, split_size: i64) -> FileSession {
        let started = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        FileSession::new(
            FileNaming::at(dir.path(), "orders", 0, "0", started),
            RollingPolicy::from_split_size(split_size),
            "orders",
        )
    }

    fn read_gz(path: &Path) -> String {
        let mut out = String::new();
        MultiGzDecoder::new(File::open(path).unwrap())
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    fn write_rows(session: &mut FileSession, count: usize) {
        for i in 0..count {
            session.write_row(format!("row{i}\n").as_bytes()).unwrap();
        }
    }

    #[test]
    fn test_rolling_policy() {
        let stats = |rows| WriterStats {
            rows_in_file: rows,
            ..WriterStats::default()
        };
        let policy = RollingPolicy::from_split_size(2);
        assert!(!policy.should_roll(&stats(0)));
        assert!(!policy.should_roll(&stats(1)));
        assert!(policy.should_roll(&stats(2)));
        assert_eq!(RollingPolicy::from_split_size(0), RollingPolicy::Never);
        assert_eq!(RollingPolicy::from_split_size(-5), RollingPolicy::Never);
    }

    #[test]
    fn test_rotation_splits_rows() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, 2);

        write_rows(&mut session, 5);
        session.close_file().unwrap();

        let rows: Vec<u64> = session.produced_files().iter().map(|f| f.rows).collect();
        assert_eq!(rows, [2, 2, 1]);
        assert_eq!(
            session.file_names(),
            [
                "orders_20240601_120000_0_0_0.gz",
                "orders_20240601_120000_0_0_1.gz",
                "orders_20240601_120000_0_0_2.gz",
            ]
        );
        assert_eq!(read_gz(&session.produced_files()[1].path), "row2\nrow3\n");
        assert_eq!(session.stats().total_rows, 5);
    }

    #[test]
    fn test_exact_multiple_leaves_no_empty_file() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, 2);

        write_rows(&mut session, 4);
        assert!(!session.has_open_file());
        session.close_file().unwrap();

        assert_eq!(session.produced_files().len(), 2);
        assert!(session.produced_files().iter().all(|f| f.rows == 2));
    }

    #[test]
    fn test_rotation_disabled_writes_one_file() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, 0);

        write_rows(&mut session, 7);
        session.close_file().unwrap();

        assert_eq!(session.produced_files().len(), 1);
        assert_eq!(session.produced_files()[0].rows, 7);
        assert_eq!(read_gz(&session.produced_files()[0].path).lines().count(), 7);
    }

    #[test]
    fn test_reopen_appends_without_duplicating() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, 0);

        session.open_split(0).unwrap();
        session.write(b"first\n").unwrap();
        session.record_row();
        session.close_file().unwrap();

        session.open_split(0).unwrap();
        session.write(b"second\n").unwrap();
        session.record_row();
        session.close_file().unwrap();

        assert_eq!(session.produced_files().len(), 1);
        assert_eq!(session.produced_files()[0].rows, 2);
        assert_eq!(read_gz(&session.produced_files()[0].path), "first\nsecond\n");
    }

    #[test]
    fn test_write_without_open_file_fails() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, 10);
        assert!(matches!(session.write(b"x").unwrap_err(), SinkError::NoOpenFile));
    }

    #[test]
    fn test_creates_missing_work_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let mut session = FileSession::new(
            FileNaming::new(&nested, "t", 0, "0"),
            RollingPolicy::Never,
            "t",
        );

        let path = session.open_file().unwrap();
        assert!(path.starts_with(&nested));
        assert!(path.exists());
    }

    #[test]
    fn test_cleanup_removes_files() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, 1);

        write_rows(&mut session, 3);
        let paths: Vec<PathBuf> = session.produced_files().iter().map(|f| f.path.clone()).collect();
        std::fs::remove_file(&paths[0]).unwrap();

        assert_eq!(session.cleanup().unwrap(), 2);
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[test]
    fn test_drop_finishes_open_file() {
        let dir = TempDir::new().unwrap();
        let path = {
            let mut session = session(&dir, 0);
            write_rows(&mut session, 2);
            session.produced_files()[0].path.clone()
        };
        assert_eq!(read_gz(&path), "row0\nrow1\n");
    }
}
