//! Output file naming.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

const SESSION_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Produces `{table}_{timestamp}_{worker}_{partition}_{split}.gz` names.
///
/// The timestamp is fixed when the session starts, so all files of one
/// session share it and differ only in the split number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNaming {
    work_directory: PathBuf,
    table: String,
    session_timestamp: String,
    worker_number: u32,
    partition_id: String,
}

impl FileNaming {
    /// Naming for a session starting now.
    pub fn new(
        work_directory: impl Into<PathBuf>,
        table: impl Into<String>,
        worker_number: u32,
        partition_id: impl Into<String>,
    ) -> Self {
        Self::at(
            work_directory,
            table,
            worker_number,
            partition_id,
            Local::now().naive_local(),
        )
    }

    /// Naming for a session that started at `started`.
    pub fn at(
        work_directory: impl Into<PathBuf>,
        table: impl Into<String>,
        worker_number: u32,
        partition_id: impl Into<String>,
        started: NaiveDateTime,
    ) -> Self {
        Self {
            work_directory: work_directory.into(),
            table: table.into(),
            session_timestamp: started.format(SESSION_TIMESTAMP_FORMAT).to_string(),
            worker_number,
            partition_id: partition_id.into(),
        }
    }

    pub fn work_directory(&self) -> &Path {
        &self.work_directory
    }

    pub fn file_name(&self, split: u32) -> String {
        format!(
            "{}_{}_{}_{}_{}.gz",
            self.table, self.session_timestamp, self.worker_number, self.partition_id, split
        )
    }

    pub fn path(&self, split: u32) -> PathBuf {
        self.work_directory.join(self.file_name(split))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn naming() -> FileNaming {
        let started = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(9, 8, 7)
            .unwrap();
        FileNaming::at("/tmp/work", "orders", 2, "p0", started)
    }

    #[test]
    fn test_file_name_layout() {
        assert_eq!(naming().file_name(0), "orders_20240105_090807_2_p0_0.gz");
        assert_eq!(naming().file_name(12), "orders_20240105_090807_2_p0_12.gz");
    }

    #[test]
    fn test_path_is_inside_work_directory() {
        assert_eq!(
            naming().path(1),
            PathBuf::from("/tmp/work/orders_20240105_090807_2_p0_1.gz")
        );
    }
}
