//! Load results and their aggregation.

use crate::warehouse::ResultRow;

/// Load status the warehouse reports for a file it could not load.
const LOAD_FAILED: &str = "LOAD_FAILED";

/// Per-file result of the load command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileLoadResult {
    /// Staged file name, when the result row names one.
    pub file: Option<String>,
    pub status: Option<String>,
    pub rows_loaded: u64,
    pub errors_seen: u64,
    pub first_error: Option<String>,
}

impl FileLoadResult {
    pub fn from_row(row: &ResultRow) -> Self {
        Self {
            file: row.get("file").map(str::to_string),
            status: row.get("status").map(str::to_string),
            rows_loaded: row.get_count("rows_loaded").unwrap_or(0),
            errors_seen: row.get_count("errors_seen").unwrap_or(0),
            first_error: row
                .get("first_error")
                .filter(|e| !e.is_empty())
                .map(str::to_string),
        }
    }

    /// Whether the warehouse rejected this file. Rejections are reported,
    /// the session still succeeds because the error policy was applied
    /// server-side.
    pub fn is_rejected(&self) -> bool {
        let failed = self
            .status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(LOAD_FAILED));
        failed || (self.rows_loaded == 0 && self.first_error.is_some())
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Rows encoded into local files.
    pub rows_written: u64,
    /// Names of the local files, in production order.
    pub files: Vec<String>,
    pub files_staged: usize,
    /// Sum of `rows_loaded` over all result rows.
    pub rows_loaded: u64,
    /// Sum of `errors_seen` over all result rows.
    pub rows_rejected: u64,
    pub results: Vec<FileLoadResult>,
    /// Local files deleted after the load.
    pub files_removed: usize,
}

impl LoadOutcome {
    /// Fold the load command's result rows into the outcome.
    pub fn record_results(&mut self, rows: &[ResultRow]) {
        for row in rows {
            let result = FileLoadResult::from_row(row);
            self.rows_loaded += result.rows_loaded;
            self.rows_rejected += result.errors_seen;
            self.results.push(result);
        }
    }

    pub fn rejected_files(&self) -> impl Iterator<Item = &FileLoadResult> {
        self.results.iter().filter(|r| r.is_rejected())
    }
}
