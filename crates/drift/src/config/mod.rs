//! Configuration for a drift load session.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::copy::{
    CsvFormat, FileFormat, JsonFormat, LocationType, OnError, OnErrorPolicy, StageLocation,
};
use crate::error::ConfigError;
use crate::mapping::TrimType;
use drift_core::error::{
    EmptyDelimiterSnafu, EmptyFieldMappingSnafu, EmptyTargetTableSnafu, FieldsWithJsonSnafu,
    InvalidEnclosureSnafu, MissingStageNameSnafu,
};

/// Environment variable that turns on debug mode (files kept, no PURGE).
pub const DEBUG_MODE_ENV: &str = "DRIFT_DEBUG_MODE";

/// Top-level load session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    /// Table to load into.
    pub target: TargetConfig,
    /// Where staged files are uploaded.
    #[serde(default)]
    pub location: LocationConfig,
    /// Local directory for the gzip files.
    #[serde(default = "default_work_directory")]
    pub work_directory: PathBuf,
    /// Rows per file before rotating; zero or less disables rotation.
    #[serde(default = "default_split_size")]
    pub split_size: i64,
    #[serde(default)]
    pub on_error: OnError,
    /// Threshold for the `skip_file` and `skip_file_percent` policies.
    #[serde(default)]
    pub error_limit: i64,
    /// Purge staged files after a successful load.
    #[serde(default = "default_true")]
    pub remove_files: bool,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub csv: CsvOptions,
    #[serde(default)]
    pub json: JsonOptions,
    /// Use `fields` instead of positional mapping.
    #[serde(default)]
    pub specify_fields: bool,
    #[serde(default)]
    pub fields: Vec<FieldMappingEntry>,
    /// Worker number, part of every file name.
    #[serde(default)]
    pub worker_number: u32,
    /// Partition id, part of every file name.
    #[serde(default = "default_partition_id")]
    pub partition_id: String,
    /// Keep local and staged files (also enabled by `DRIFT_DEBUG_MODE=true`).
    #[serde(default)]
    pub debug: bool,
}

fn default_work_directory() -> PathBuf {
    std::env::temp_dir()
}

fn default_split_size() -> i64 {
    20_000
}

fn default_true() -> bool {
    true
}

fn default_partition_id() -> String {
    "0".to_string()
}

/// The target table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
    /// Column declarations, used when no live warehouse can be described.
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

/// A declared target column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnConfig {
    pub name: String,
    /// Warehouse type name, e.g. `NUMBER(38,0)` or `TIMESTAMP_NTZ`.
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Stage selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationConfig {
    #[serde(rename = "type", default)]
    pub location_type: LocationType,
    /// Required for `internal_stage`.
    #[serde(default)]
    pub stage_name: Option<String>,
}

/// Output file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Csv,
    Json,
}

/// Delimited output options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CsvOptions {
    /// Let the warehouse trim surrounding whitespace.
    #[serde(default)]
    pub trim_whitespace: bool,
    /// Comma-separated strings the warehouse reads as NULL.
    #[serde(default)]
    pub null_if: Option<String>,
    #[serde(default = "default_true")]
    pub error_on_column_mismatch: bool,
    /// Bytes written for a null value.
    #[serde(default)]
    pub null_value: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_record_delimiter")]
    pub record_delimiter: String,
    #[serde(default = "default_enclosure")]
    pub enclosure: String,
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            trim_whitespace: false,
            null_if: None,
            error_on_column_mismatch: true,
            null_value: String::new(),
            delimiter: default_delimiter(),
            record_delimiter: default_record_delimiter(),
            enclosure: default_enclosure(),
            encoding: default_encoding(),
        }
    }
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_record_delimiter() -> String {
    "\n".to_string()
}

fn default_enclosure() -> String {
    "\"".to_string()
}

fn default_encoding() -> String {
    "UTF-8".to_string()
}

/// JSON output options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonOptions {
    #[serde(default)]
    pub strip_null: bool,
    #[serde(default)]
    pub ignore_utf8: bool,
    #[serde(default)]
    pub allow_duplicate_elements: bool,
    #[serde(default)]
    pub enable_octal: bool,
    /// Input field holding the JSON document. Optional when the input has
    /// a single field.
    #[serde(default)]
    pub field: Option<String>,
}

/// One explicit stream field to table column mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldMappingEntry {
    pub stream_field: String,
    pub table_field: String,
    #[serde(default)]
    pub trim: TrimType,
    /// Maximum length in bytes.
    #[serde(default)]
    pub length: Option<usize>,
    /// Pad shorter values with spaces up to `length`.
    #[serde(default)]
    pub pad: bool,
}

impl FieldMappingEntry {
    pub fn new(stream_field: impl Into<String>, table_field: impl Into<String>) -> Self {
        Self {
            stream_field: stream_field.into(),
            table_field: table_field.into(),
            trim: TrimType::None,
            length: None,
            pad: false,
        }
    }
}

impl LoaderConfig {
    /// Minimal configuration for `table` with every option at its default.
    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            target: TargetConfig {
                schema: None,
                table: table.into(),
                columns: Vec::new(),
            },
            location: LocationConfig::default(),
            work_directory: default_work_directory(),
            split_size: default_split_size(),
            on_error: OnError::default(),
            error_limit: 0,
            remove_files: true,
            data_type: DataType::default(),
            csv: CsvOptions::default(),
            json: JsonOptions::default(),
            specify_fields: false,
            fields: Vec::new(),
            worker_number: 0,
            partition_id: default_partition_id(),
            debug: false,
        }
    }

    /// Load and validate a YAML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = drift_core::read_yaml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from YAML text.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = drift_core::parse_yaml(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.target.table.trim().is_empty(), EmptyTargetTableSnafu);

        if self.location.location_type == LocationType::InternalStage {
            let named = self
                .location
                .stage_name
                .as_deref()
                .is_some_and(|name| !name.trim().is_empty());
            ensure!(named, MissingStageNameSnafu);
        }

        if self.uses_explicit_fields() {
            ensure!(self.data_type != DataType::Json, FieldsWithJsonSnafu);
            for (index, entry) in self.fields.iter().enumerate() {
                ensure!(
                    !entry.stream_field.trim().is_empty() && !entry.table_field.trim().is_empty(),
                    EmptyFieldMappingSnafu { index }
                );
            }
        }

        ensure!(
            !self.csv.delimiter.is_empty(),
            EmptyDelimiterSnafu { option: "delimiter" }
        );
        ensure!(
            !self.csv.record_delimiter.is_empty(),
            EmptyDelimiterSnafu {
                option: "record_delimiter"
            }
        );
        ensure!(
            self.csv.enclosure.chars().count() == 1,
            InvalidEnclosureSnafu {
                value: self.csv.enclosure.as_str()
            }
        );

        Ok(())
    }

    /// Whether the explicit `fields` mapping is in effect.
    pub fn uses_explicit_fields(&self) -> bool {
        self.specify_fields && !self.fields.is_empty()
    }

    /// Debug mode keeps local files and omits PURGE from the load command.
    pub fn is_debug(&self) -> bool {
        self.debug
            || std::env::var(DEBUG_MODE_ENV).is_ok_and(|value| value.eq_ignore_ascii_case("true"))
    }

    /// `schema.table`, or just `table` without a schema.
    pub fn qualified_table(&self) -> String {
        match self.target.schema.as_deref().filter(|s| !s.is_empty()) {
            Some(schema) => format!("{schema}.{}", self.target.table),
            None => self.target.table.clone(),
        }
    }

    pub fn stage_location(&self) -> StageLocation {
        StageLocation::resolve(
            self.location.location_type,
            self.target.schema.as_deref(),
            &self.target.table,
            self.location.stage_name.as_deref(),
        )
    }

    pub fn on_error_policy(&self) -> OnErrorPolicy {
        OnErrorPolicy::new(self.on_error, self.error_limit)
    }

    /// The `FILE_FORMAT` options matching the files this session writes.
    pub fn file_format(&self) -> FileFormat {
        match self.data_type {
            DataType::Csv => FileFormat::Csv(CsvFormat {
                field_delimiter: self.csv.delimiter.clone(),
                record_delimiter: self.csv.record_delimiter.clone(),
                enclosure: self.csv.enclosure.clone(),
                trim_space: self.csv.trim_whitespace,
                null_if: self.null_if_values(),
                error_on_column_count_mismatch: self.csv.error_on_column_mismatch,
            }),
            DataType::Json => FileFormat::Json(JsonFormat {
                enable_octal: self.json.enable_octal,
                allow_duplicate: self.json.allow_duplicate_elements,
                strip_null_values: self.json.strip_null,
                ignore_utf8_errors: self.json.ignore_utf8,
            }),
        }
    }

    /// `null_if` split on commas. An unset or empty option yields nothing.
    pub fn null_if_values(&self) -> Vec<String> {
        match self.csv.null_if.as_deref() {
            Some(list) if !list.is_empty() => list.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }
}
