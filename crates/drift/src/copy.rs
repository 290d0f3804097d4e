//! Load command rendering: `PUT` for each staged file and one `COPY INTO`.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::encoder::{WAREHOUSE_DATE_FORMAT, WAREHOUSE_TIME_FORMAT, WAREHOUSE_TIMESTAMP_FORMAT};

/// Kind of stage the files are uploaded to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    /// The user's personal stage.
    #[default]
    User,
    /// The target table's own stage.
    Table,
    /// A named internal stage.
    InternalStage,
}

/// A resolved stage reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageLocation {
    /// `@~/{table}`
    User { table: String },
    /// `@{schema}.%{table}` or `@%{table}`
    Table {
        schema: Option<String>,
        table: String,
    },
    /// `@{schema}.{stage}` or `@{stage}`
    Named {
        schema: Option<String>,
        stage: String,
    },
}

impl StageLocation {
    pub fn resolve(
        location_type: LocationType,
        schema: Option<&str>,
        table: &str,
        stage_name: Option<&str>,
    ) -> Self {
        let schema = schema.filter(|s| !s.is_empty()).map(str::to_string);
        match location_type {
            LocationType::User => StageLocation::User {
                table: table.to_string(),
            },
            LocationType::Table => StageLocation::Table {
                schema,
                table: table.to_string(),
            },
            LocationType::InternalStage => StageLocation::Named {
                schema,
                stage: stage_name.unwrap_or_default().to_string(),
            },
        }
    }
}

impl fmt::Display for StageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageLocation::User { table } => write!(f, "@~/{table}"),
            StageLocation::Table {
                schema: Some(schema),
                table,
            } => write!(f, "@{schema}.%{table}"),
            StageLocation::Table {
                schema: None,
                table,
            } => write!(f, "@%{table}"),
            StageLocation::Named {
                schema: Some(schema),
                stage,
            } => write!(f, "@{schema}.{stage}"),
            StageLocation::Named {
                schema: None,
                stage,
            } => write!(f, "@{stage}"),
        }
    }
}

/// What the warehouse does with bad records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    Continue,
    SkipFile,
    SkipFilePercent,
    #[default]
    Abort,
}

/// An [`OnError`] mode with its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnErrorPolicy {
    pub mode: OnError,
    /// Error count (`skip_file`) or percentage (`skip_file_percent`).
    pub limit: i64,
}

impl OnErrorPolicy {
    pub fn new(mode: OnError, limit: i64) -> Self {
        Self { mode, limit }
    }

    /// The quoted `ON_ERROR` value.
    pub fn clause(&self) -> String {
        match (self.mode, self.limit) {
            (OnError::Continue, _) => "'CONTINUE'".to_string(),
            (OnError::Abort, _) => "'ABORT_STATEMENT'".to_string(),
            (OnError::SkipFile | OnError::SkipFilePercent, limit) if limit <= 0 => {
                "'SKIP_FILE'".to_string()
            }
            (OnError::SkipFile, limit) => format!("'SKIP_FILE_{limit}'"),
            (OnError::SkipFilePercent, limit) => format!("'SKIP_FILE_{limit}%'"),
        }
    }
}

/// Delimited file format options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvFormat {
    pub field_delimiter: String,
    pub record_delimiter: String,
    pub enclosure: String,
    pub trim_space: bool,
    pub null_if: Vec<String>,
    pub error_on_column_count_mismatch: bool,
}

/// JSON file format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonFormat {
    pub enable_octal: bool,
    pub allow_duplicate: bool,
    pub strip_null_values: bool,
    pub ignore_utf8_errors: bool,
}

/// The `FILE_FORMAT` of the staged files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileFormat {
    Csv(CsvFormat),
    Json(JsonFormat),
}

impl FileFormat {
    fn render(&self, sql: &mut String) {
        match self {
            FileFormat::Csv(csv) => {
                sql.push_str("TYPE = 'CSV'");
                push_option(sql, "FIELD_DELIMITER", &sql_literal(&csv.field_delimiter));
                push_option(sql, "RECORD_DELIMITER", &sql_literal(&csv.record_delimiter));
                push_option(sql, "ESCAPE", "NONE");
                push_option(sql, "ESCAPE_UNENCLOSED_FIELD", "NONE");
                if !csv.enclosure.is_empty() {
                    push_option(sql, "FIELD_OPTIONALLY_ENCLOSED_BY", &sql_literal(&csv.enclosure));
                }
                push_option(sql, "SKIP_HEADER", "0");
                push_option(sql, "DATE_FORMAT", &sql_literal(WAREHOUSE_DATE_FORMAT));
                push_option(sql, "TIME_FORMAT", &sql_literal(WAREHOUSE_TIME_FORMAT));
                push_option(sql, "TIMESTAMP_FORMAT", &sql_literal(WAREHOUSE_TIMESTAMP_FORMAT));
                push_option(sql, "TRIM_SPACE", sql_bool(csv.trim_space));
                if !csv.null_if.is_empty() {
                    let values: Vec<String> = csv.null_if.iter().map(|v| sql_literal(v)).collect();
                    push_option(sql, "NULL_IF", &format!("({})", values.join(", ")));
                }
                push_option(
                    sql,
                    "ERROR_ON_COLUMN_COUNT_MISMATCH",
                    sql_bool(csv.error_on_column_count_mismatch),
                );
                push_option(sql, "COMPRESSION", "'GZIP'");
            }
            FileFormat::Json(json) => {
                sql.push_str("TYPE = 'JSON'");
                push_option(sql, "COMPRESSION", "'GZIP'");
                push_option(sql, "STRIP_OUTER_ARRAY", "FALSE");
                push_option(sql, "ENABLE_OCTAL", sql_bool(json.enable_octal));
                push_option(sql, "ALLOW_DUPLICATE", sql_bool(json.allow_duplicate));
                push_option(sql, "STRIP_NULL_VALUES", sql_bool(json.strip_null_values));
                push_option(sql, "IGNORE_UTF8_ERRORS", sql_bool(json.ignore_utf8_errors));
            }
        }
    }
}

/// Builds the `COPY INTO` statement for a set of staged files.
#[derive(Debug, Clone)]
pub struct CopyStatementBuilder {
    table: String,
    location: StageLocation,
    format: FileFormat,
    on_error: OnErrorPolicy,
    purge: Option<bool>,
}

impl CopyStatementBuilder {
    /// `table` is the possibly schema-qualified target name.
    pub fn new(table: impl Into<String>, location: StageLocation, format: FileFormat) -> Self {
        Self {
            table: table.into(),
            location,
            format,
            on_error: OnErrorPolicy::new(OnError::Abort, 0),
            purge: None,
        }
    }

    pub fn with_on_error(mut self, on_error: OnErrorPolicy) -> Self {
        self.on_error = on_error;
        self
    }

    /// `Some` adds a `PURGE` clause, `None` omits it.
    pub fn with_purge(mut self, purge: Option<bool>) -> Self {
        self.purge = purge;
        self
    }

    pub fn location(&self) -> &StageLocation {
        &self.location
    }

    /// Render the statement naming exactly `files`, in order.
    pub fn build<S: AsRef<str>>(&self, files: &[S]) -> String {
        let file_list: Vec<String> = files.iter().map(|f| sql_literal(f.as_ref())).collect();

        let mut sql = format!(
            "COPY INTO {} FROM {}/ FILES = ({}) FILE_FORMAT = ( ",
            self.table,
            self.location,
            file_list.join(", ")
        );
        self.format.render(&mut sql);
        sql.push_str(" ) ON_ERROR = ");
        sql.push_str(&self.on_error.clause());
        if let Some(purge) = self.purge {
            push_option(&mut sql, "PURGE", sql_bool(purge));
        }
        sql.push_str(" ;");
        sql
    }
}

/// Upload command for one local gzip file.
pub fn put_statement(path: &Path, location: &StageLocation) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let uri = absolute.to_string_lossy().replace('\\', "/");
    let uri = if uri.starts_with('/') {
        format!("file://{uri}")
    } else {
        format!("file:///{uri}")
    };
    format!(
        "PUT {} {location}/ AUTO_COMPRESS = FALSE SOURCE_COMPRESSION = GZIP",
        sql_literal(&uri)
    )
}

/// Quote `value` as an SQL string literal, escaping control characters.
pub fn sql_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("''"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

fn sql_bool(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}

fn push_option(sql: &mut String, name: &str, value: &str) {
    sql.push(' ');
    sql.push_str(name);
    sql.push_str(" = ");
    sql.push_str(value);
}
