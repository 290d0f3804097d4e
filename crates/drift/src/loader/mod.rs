//! The load orchestrator.
//!
//! A [`BulkLoader`] drives one session through its states:
//!
//! ```text
//! Init --first row--> Streaming --finish--> Finalizing --> Done
//!   \___________________\________________________\______> Failed
//! ```
//!
//! On the first row it connects, resolves the target schema and field
//! mapping and opens the first file. Rows are then encoded and written with
//! rotation. `finish` closes the last file, uploads every file, runs one
//! `COPY INTO` naming all of them, commits and removes local files. Any
//! error moves the loader to `Failed`, keeps local files and disconnects.

mod outcome;

pub use outcome::{FileLoadResult, LoadOutcome};

use std::fmt;
use std::time::Instant;

use snafu::prelude::*;
use tracing::{debug, error, info, warn};

use drift_core::emit;

use crate::config::{DataType, LoaderConfig};
use crate::copy::{CopyStatementBuilder, put_statement};
use crate::encoder::{RecordDelimiters, RecordEncoder};
use crate::error::{
    CommitSnafu, ConnectionSnafu, InvalidStateSnafu, LoadError, LoadSnafu, StagingRejectedSnafu,
    StagingSnafu,
};
use crate::mapping::FieldMapping;
use crate::metrics::{FileStaged, LoadCompleted, RowsEncoded, RowsLoaded, SessionFailed};
use crate::schema::resolve_target_schema;
use crate::sink::{FileNaming, FileSession, RollingPolicy};
use crate::source::{RowSource, Value};
use crate::warehouse::WarehouseConnection;

/// Upload status that fails the session.
const UPLOAD_ERROR: &str = "ERROR";

/// Lifecycle state of a [`BulkLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Init,
    Streaming,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadState::Init => "init",
            LoadState::Streaming => "streaming",
            LoadState::Finalizing => "finalizing",
            LoadState::Done => "done",
            LoadState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Stages a row stream into gzip files and loads them into one table.
pub struct BulkLoader<C: WarehouseConnection> {
    config: LoaderConfig,
    input_fields: Vec<String>,
    connection: C,
    connected: bool,
    state: LoadState,
    session: FileSession,
    delimiters: RecordDelimiters,
    encoder: Option<RecordEncoder>,
    /// Reused buffer for one encoded line.
    line: Vec<u8>,
    /// Qualified table name, used in SQL, logs and metric labels.
    target: String,
    started: Instant,
}

impl<C: WarehouseConnection> BulkLoader<C> {
    /// Create a loader for rows with the given field names.
    ///
    /// Validates the configuration and the output encoding; nothing touches
    /// the warehouse or the filesystem until the first row.
    pub fn new(
        config: LoaderConfig,
        input_fields: Vec<String>,
        connection: C,
    ) -> Result<Self, LoadError> {
        config.validate()?;
        let delimiters = RecordDelimiters::from_options(&config.csv)?;
        let target = config.qualified_table();

        let naming = FileNaming::new(
            &config.work_directory,
            &config.target.table,
            config.worker_number,
            &config.partition_id,
        );
        let session = FileSession::new(
            naming,
            RollingPolicy::from_split_size(config.split_size),
            &target,
        );

        Ok(Self {
            config,
            input_fields,
            connection,
            connected: false,
            state: LoadState::Init,
            session,
            delimiters,
            encoder: None,
            line: Vec::new(),
            target,
            started: Instant::now(),
        })
    }

    /// Load every row of `source`.
    pub async fn run<S>(
        config: LoaderConfig,
        source: &mut S,
        connection: C,
    ) -> Result<LoadOutcome, LoadError>
    where
        S: RowSource + ?Sized,
    {
        let mut loader = Self::new(config, source.fields().to_vec(), connection)?;
        loop {
            match source.next_row() {
                Ok(Some(row)) => loader.write_row(&row).await?,
                Ok(None) => break,
                Err(source) => return Err(loader.fail(LoadError::Source { source }).await),
            }
        }
        loader.finish().await
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn session(&self) -> &FileSession {
        &self.session
    }

    /// Encode and write one row.
    pub async fn write_row(&mut self, row: &[Value]) -> Result<(), LoadError> {
        match self.state {
            LoadState::Init => {
                if let Err(e) = self.start().await {
                    return Err(self.fail(e).await);
                }
            }
            LoadState::Streaming => {}
            state => return InvalidStateSnafu { state }.fail(),
        }

        if let Err(e) = self.append(row) {
            return Err(self.fail(e).await);
        }
        Ok(())
    }

    /// Close the last file, stage and load everything, commit and clean up.
    ///
    /// A session that never received a row finishes without touching the
    /// warehouse.
    pub async fn finish(mut self) -> Result<LoadOutcome, LoadError> {
        match self.state {
            LoadState::Init => {
                info!(target = %self.target, "No rows received, nothing to load");
                self.state = LoadState::Done;
                return Ok(LoadOutcome::default());
            }
            LoadState::Streaming => {}
            state => return InvalidStateSnafu { state }.fail(),
        }

        match self.finalize().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Init -> Streaming.
    async fn start(&mut self) -> Result<(), LoadError> {
        self.connection.connect().await.context(ConnectionSnafu)?;
        self.connected = true;

        let schema = match self.config.data_type {
            DataType::Json => None,
            DataType::Csv => Some(resolve_target_schema(&mut self.connection, &self.target).await?),
        };
        let mapping = FieldMapping::resolve(&self.config, &self.input_fields, schema.as_ref())?;
        info!(
            target = %self.target,
            columns = mapping.width(),
            data_type = ?self.config.data_type,
            "Starting load session"
        );

        self.encoder = Some(RecordEncoder::new(
            mapping,
            self.delimiters.clone(),
            self.config.csv.null_value.as_bytes(),
            self.config.csv.error_on_column_mismatch,
        ));
        self.session.open_file()?;
        self.state = LoadState::Streaming;
        Ok(())
    }

    fn append(&mut self, row: &[Value]) -> Result<(), LoadError> {
        let Some(encoder) = &self.encoder else {
            return InvalidStateSnafu { state: self.state }.fail();
        };

        self.line.clear();
        let row_number = self.session.stats().total_rows + 1;
        encoder.encode(row, row_number, &mut self.line)?;
        self.session.write_row(&self.line)?;
        Ok(())
    }

    /// Streaming -> Finalizing -> Done.
    async fn finalize(&mut self) -> Result<LoadOutcome, LoadError> {
        self.state = LoadState::Finalizing;
        self.session.close_file()?;

        let mut outcome = LoadOutcome {
            rows_written: self.session.stats().total_rows,
            files: self.session.file_names(),
            ..LoadOutcome::default()
        };
        emit!(RowsEncoded {
            count: outcome.rows_written,
            target: self.target.clone(),
        });

        let location = self.config.stage_location();
        for file in self.session.produced_files() {
            let sql = put_statement(&file.path, &location);
            let rows = self
                .connection
                .execute_query(&sql)
                .await
                .context(StagingSnafu {
                    file: file.name.as_str(),
                })?;

            let rejected = rows.iter().find(|row| {
                row.get("status")
                    .is_some_and(|status| status.eq_ignore_ascii_case(UPLOAD_ERROR))
            });
            if let Some(row) = rejected {
                return StagingRejectedSnafu {
                    file: file.name.as_str(),
                    status: row.get("status").unwrap_or(UPLOAD_ERROR),
                    message: row.get("message").unwrap_or("no message"),
                }
                .fail();
            }

            outcome.files_staged += 1;
            debug!(target = %self.target, file = %file.name, "Staged file");
            emit!(FileStaged {
                target: self.target.clone(),
            });
        }

        let debug_mode = self.config.is_debug();
        let purge = (!debug_mode).then_some(self.config.remove_files);
        let copy = CopyStatementBuilder::new(&self.target, location, self.config.file_format())
            .with_on_error(self.config.on_error_policy())
            .with_purge(purge)
            .build(&outcome.files);
        let rows = self
            .connection
            .execute_query(&copy)
            .await
            .context(LoadSnafu)?;
        outcome.record_results(&rows);

        for rejected in outcome.rejected_files() {
            warn!(
                target = %self.target,
                file = rejected.file.as_deref().unwrap_or("unknown"),
                status = rejected.status.as_deref().unwrap_or(""),
                error = rejected.first_error.as_deref().unwrap_or(""),
                "File rejected by the warehouse"
            );
        }
        emit!(RowsLoaded {
            loaded: outcome.rows_loaded,
            rejected: outcome.rows_rejected,
            target: self.target.clone(),
        });

        self.connection
            .execute_statement("COMMIT")
            .await
            .context(CommitSnafu)?;

        if debug_mode || self.connection.keeps_local_files() {
            info!(target = %self.target, files = outcome.files.len(), "Keeping local files");
        } else {
            match self.session.cleanup() {
                Ok(removed) => outcome.files_removed = removed,
                Err(e) => warn!(target = %self.target, error = %e, "Failed to remove local files"),
            }
        }

        self.disconnect().await;
        self.state = LoadState::Done;

        let duration = self.started.elapsed();
        info!(
            target = %self.target,
            rows_written = outcome.rows_written,
            files = outcome.files.len(),
            rows_loaded = outcome.rows_loaded,
            rows_rejected = outcome.rows_rejected,
            elapsed_ms = duration.as_millis() as u64,
            "Load complete"
        );
        emit!(LoadCompleted {
            duration,
            target: self.target.clone(),
        });
        Ok(outcome)
    }

    /// Enter `Failed`: close the open file, disconnect, keep local files.
    async fn fail(&mut self, error: LoadError) -> LoadError {
        self.state = LoadState::Failed;
        self.session.close_quietly();
        self.disconnect().await;

        error!(
            target = %self.target,
            phase = error.phase(),
            error = %error,
            files = self.session.produced_files().len(),
            "Load session failed, local files kept"
        );
        emit!(SessionFailed {
            phase: error.phase(),
            target: self.target.clone(),
        });
        error
    }

    async fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        if let Err(e) = self.connection.disconnect().await {
            warn!(target = %self.target, error = %e, "Failed to disconnect");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnConfig, FieldMappingEntry};
    use crate::error::{MappingError, RemoteSnafu, WarehouseError};
    use crate::source::VecSource;
    use crate::warehouse::ResultRow;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default)]
    struct MockState {
        statements: Vec<String>,
        connects: usize,
        disconnects: usize,
        upload_status: Option<String>,
        fail_copy: bool,
        fail_commit: bool,
    }

    #[derive(Clone)]
    struct MockWarehouse {
        columns: Vec<ColumnConfig>,
        state: Arc<Mutex<MockState>>,
    }

    impl MockWarehouse {
        fn new(columns: &[(&str, &str)]) -> Self {
            Self {
                columns: columns
                    .iter()
                    .map(|(name, type_name)| ColumnConfig {
                        name: name.to_string(),
                        type_name: type_name.to_string(),
                    })
                    .collect(),
                state: Arc::new(Mutex::new(MockState::default())),
            }
        }

        fn statements(&self) -> Vec<String> {
            self.state.lock().unwrap().statements.clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.statements()
                .iter()
                .filter(|s| s.starts_with(prefix))
                .count()
        }
    }

    #[async_trait]
    impl WarehouseConnection for MockWarehouse {
        async fn connect(&mut self) -> Result<(), WarehouseError> {
            self.state.lock().unwrap().connects += 1;
            Ok(())
        }

        async fn execute_query(&mut self, sql: &str) -> Result<Vec<ResultRow>, WarehouseError> {
            let mut state = self.state.lock().unwrap();
            state.statements.push(sql.to_string());

            if sql.starts_with("DESC") {
                return Ok(self
                    .columns
                    .iter()
                    .map(|c| ResultRow::new().with("name", &c.name).with("type", &c.type_name))
                    .collect());
            }
            if sql.starts_with("PUT") {
                let status = state.upload_status.clone().unwrap_or_else(|| "UPLOADED".into());
                return Ok(vec![ResultRow::new().with("status", status).with("message", "quota")]);
            }
            if state.fail_copy {
                return RemoteSnafu { message: "copy refused" }.fail();
            }
            Ok(vec![
                ResultRow::new()
                    .with("file", "f0")
                    .with("status", "LOADED")
                    .with("rows_loaded", "2")
                    .with("errors_seen", "0"),
                ResultRow::new()
                    .with("file", "f1")
                    .with("status", "LOAD_FAILED")
                    .with("rows_loaded", "0")
                    .with("errors_seen", "1")
                    .with("first_error", "bad value"),
            ])
        }

        async fn execute_statement(&mut self, sql: &str) -> Result<(), WarehouseError> {
            let mut state = self.state.lock().unwrap();
            state.statements.push(sql.to_string());
            if state.fail_commit {
                return RemoteSnafu { message: "commit refused" }.fail();
            }
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), WarehouseError> {
            self.state.lock().unwrap().disconnects += 1;
            Ok(())
        }
    }

    fn config(dir: &TempDir) -> LoaderConfig {
        let mut config = LoaderConfig::for_table("orders");
        config.target.schema = Some("public".into());
        config.work_directory = dir.path().to_path_buf();
        config.split_size = 2;
        config
    }

    fn rows(count: i64) -> Vec<Vec<Value>> {
        (0..count)
            .map(|i| vec![Value::Integer(i), Value::from(format!("name {i}"))])
            .collect()
    }

    fn fields() -> Vec<String> {
        vec!["id".into(), "name".into()]
    }

    fn warehouse() -> MockWarehouse {
        MockWarehouse::new(&[("ID", "NUMBER(38,0)"), ("NAME", "VARCHAR")])
    }

    #[tokio::test]
    async fn test_full_session() {
        let dir = TempDir::new().unwrap();
        let conn = warehouse();
        let mut loader = BulkLoader::new(config(&dir), fields(), conn.clone()).unwrap();
        assert_eq!(loader.state(), LoadState::Init);

        for row in rows(5) {
            loader.write_row(&row).await.unwrap();
        }
        assert_eq!(loader.state(), LoadState::Streaming);

        let outcome = loader.finish().await.unwrap();

        assert_eq!(outcome.rows_written, 5);
        assert_eq!(outcome.files.len(), 3);
        assert_eq!(outcome.files_staged, 3);
        assert_eq!(outcome.rows_loaded, 2);
        assert_eq!(outcome.rows_rejected, 1);
        assert_eq!(outcome.rejected_files().count(), 1);
        assert_eq!(outcome.files_removed, 3);

        let statements = conn.statements();
        assert_eq!(statements.len(), 6);
        assert_eq!(statements[0], "DESC TABLE public.orders");
        for (put, file) in statements[1..4].iter().zip(&outcome.files) {
            assert!(put.starts_with("PUT 'file://"));
            assert!(put.contains(file.as_str()));
            assert!(put.ends_with("@~/orders/ AUTO_COMPRESS = FALSE SOURCE_COMPRESSION = GZIP"));
        }
        let copy = &statements[4];
        assert!(copy.starts_with("COPY INTO public.orders FROM @~/orders/"));
        for file in &outcome.files {
            assert!(copy.contains(file.as_str()));
        }
        assert!(copy.contains("PURGE = TRUE"));
        assert_eq!(statements[5], "COMMIT");

        let state = conn.state.lock().unwrap();
        assert_eq!((state.connects, state.disconnects), (1, 1));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_stream_does_nothing() {
        let dir = TempDir::new().unwrap();
        let conn = warehouse();
        let loader = BulkLoader::new(config(&dir), fields(), conn.clone()).unwrap();

        let outcome = loader.finish().await.unwrap();

        assert_eq!(outcome, LoadOutcome::default());
        assert!(conn.statements().is_empty());
        assert_eq!(conn.state.lock().unwrap().connects, 0);
    }

    #[tokio::test]
    async fn test_upload_error_fails_and_keeps_files() {
        let dir = TempDir::new().unwrap();
        let conn = warehouse();
        conn.state.lock().unwrap().upload_status = Some("error".into());

        let mut source = VecSource::new(fields(), rows(3));
        let err = BulkLoader::run(config(&dir), &mut source, conn.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::StagingRejected { .. }));
        assert_eq!(err.phase(), "staging");
        assert!(err.to_string().contains("quota"));
        assert_eq!(conn.count("PUT"), 1);
        assert_eq!(conn.count("COPY"), 0);
        assert_eq!(conn.state.lock().unwrap().disconnects, 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_copy_failure_is_load_error() {
        let dir = TempDir::new().unwrap();
        let conn = warehouse();
        conn.state.lock().unwrap().fail_copy = true;

        let mut source = VecSource::new(fields(), rows(1));
        let err = BulkLoader::run(config(&dir), &mut source, conn.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::Load { .. }));
        assert_eq!(conn.count("COMMIT"), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_commit_failure_is_commit_error() {
        let dir = TempDir::new().unwrap();
        let conn = warehouse();
        conn.state.lock().unwrap().fail_commit = true;

        let mut source = VecSource::new(fields(), rows(1));
        let err = BulkLoader::run(config(&dir), &mut source, conn.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::Commit { .. }));
        assert!(err.to_string().starts_with("Commit error"));
    }

    #[tokio::test]
    async fn test_mapping_error_writes_no_file() {
        let dir = TempDir::new().unwrap();
        let conn = warehouse();
        let mut config = config(&dir);
        config.specify_fields = true;
        config.fields = vec![FieldMappingEntry::new("id", "ID")];

        let mut loader = BulkLoader::new(config, fields(), conn.clone()).unwrap();
        let err = loader.write_row(&rows(1)[0]).await.unwrap_err();

        assert!(matches!(
            err,
            LoadError::FieldMapping {
                source: MappingError::UnmappedColumn { .. }
            }
        ));
        assert_eq!(loader.state(), LoadState::Failed);
        assert!(loader.session().produced_files().is_empty());
        assert_eq!(conn.state.lock().unwrap().disconnects, 1);

        let err = loader.write_row(&rows(1)[0]).await.unwrap_err();
        assert!(matches!(err, LoadError::InvalidState { state: LoadState::Failed }));
    }

    #[tokio::test]
    async fn test_json_mode_skips_schema_resolution() {
        let dir = TempDir::new().unwrap();
        let conn = MockWarehouse::new(&[]);
        let mut config = config(&dir);
        config.data_type = DataType::Json;
        config.json.field = Some("doc".into());

        let mut source = VecSource::new(
            vec!["id".into(), "doc".into()],
            vec![vec![Value::Integer(1), Value::from(r#"{"a":1}"#)]],
        );
        let outcome = BulkLoader::run(config, &mut source, conn.clone()).await.unwrap();

        assert_eq!(outcome.rows_written, 1);
        assert_eq!(conn.count("DESC"), 0);
        let copy = conn
            .statements()
            .into_iter()
            .find(|s| s.starts_with("COPY"))
            .unwrap();
        assert!(copy.contains("TYPE = 'JSON'"));
    }

    #[tokio::test]
    async fn test_debug_mode_keeps_files_and_skips_purge() {
        let dir = TempDir::new().unwrap();
        let conn = warehouse();
        let mut config = config(&dir);
        config.debug = true;

        let mut source = VecSource::new(fields(), rows(2));
        let outcome = BulkLoader::run(config, &mut source, conn.clone()).await.unwrap();

        assert_eq!(outcome.files_removed, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert!(conn.statements().iter().all(|s| !s.contains("PURGE")));
    }

    #[test]
    fn test_unsupported_encoding_is_rejected_up_front() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.csv.encoding = "Windows-1252".into();

        let result = BulkLoader::new(config, fields(), warehouse());
        assert!(matches!(result, Err(LoadError::Encoding { .. })));
    }
}
