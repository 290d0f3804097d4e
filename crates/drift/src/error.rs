//! Error types for the drift bulk loader.
//!
//! Every concern has its own snafu enum; [`LoadError`] is the top-level error
//! returned by the loader and names the phase that failed.

use std::path::PathBuf;

use snafu::prelude::*;

// Re-export common errors
pub use drift_core::error::ConfigError;

use crate::loader::LoadState;

/// Errors raised by the warehouse connection collaborator.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WarehouseError {
    /// The warehouse rejected or failed to run a command.
    #[snafu(display("{message}"))]
    Remote { message: String },

    /// Failed to write a statement to the script output.
    #[snafu(display("Failed to write SQL script output: {source}"))]
    ScriptOutput { source: std::io::Error },

    /// The script connection cannot answer a metadata query.
    #[snafu(display("No columns declared for {table}; add target.columns to describe it"))]
    UndeclaredColumns { table: String },
}

/// Errors that can occur while reading input rows.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// Failed to open the input file.
    #[snafu(display("Failed to open input {}: {source}", path.display()))]
    OpenInput {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read or decompress the input.
    #[snafu(display("Failed to read input at line {line}: {source}"))]
    ReadInput {
        line: u64,
        source: std::io::Error,
    },

    /// A line is not valid JSON.
    #[snafu(display("Invalid JSON at line {line}: {source}"))]
    ParseRecord {
        line: u64,
        source: serde_json::Error,
    },

    /// A line is valid JSON but not an object.
    #[snafu(display("Expected a JSON object at line {line}"))]
    NotAnObject { line: u64 },
}

/// Errors that can occur while resolving the target table's columns.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SchemaError {
    /// The metadata query failed.
    #[snafu(display("Failed to describe {table}: {source}"))]
    Describe {
        table: String,
        source: WarehouseError,
    },

    /// The metadata query returned no columns.
    #[snafu(display("Table {table} not found or has no columns"))]
    TableNotFound { table: String },

    /// A metadata row is missing a required attribute.
    #[snafu(display("Column metadata for {table} is missing '{attribute}'"))]
    MissingAttribute { table: String, attribute: String },
}

/// Errors that can occur while mapping input fields to target columns.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MappingError {
    /// A mapped stream field is not present in the input.
    #[snafu(display("Stream field '{field}' not found in input fields"))]
    StreamFieldNotFound { field: String },

    /// A mapped table field is not a column of the target table.
    #[snafu(display("Table field '{field}' not found in {table}"))]
    TableFieldNotFound { field: String, table: String },

    /// Two mapping entries target the same column.
    #[snafu(display("Table field '{field}' is mapped more than once"))]
    DuplicateTargetField { field: String },

    /// A column has no source while column count mismatches are errors.
    #[snafu(display(
        "Table column '{column}' has no mapped stream field and error_on_column_mismatch is enabled"
    ))]
    UnmappedColumn { column: String },

    /// The configured JSON document field is not present in the input.
    #[snafu(display("JSON field '{field}' not found in input fields"))]
    JsonFieldNotFound { field: String },

    /// No JSON document field was configured and the input has several.
    #[snafu(display("JSON output needs json.field when the input has {count} fields"))]
    JsonFieldRequired { count: usize },

    /// A row is shorter than the mapping requires.
    #[snafu(display("Row {row} has no value for column '{column}'"))]
    MissingSourceValue { row: u64, column: String },

    /// A value could not be converted to its column's type.
    #[snafu(display("Row {row} column '{column}': {source}"))]
    InvalidValue {
        row: u64,
        column: String,
        source: CoercionError,
    },
}

/// Errors that can occur while converting a value to a column type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CoercionError {
    /// Text that does not parse as the column's type.
    #[snafu(display("cannot read '{text}' as {category}"))]
    UnparsableText { text: String, category: &'static str },

    /// NaN and infinities have no numeric representation in the warehouse.
    #[snafu(display("{value} is not a finite number"))]
    NonFiniteNumber { value: f64 },
}

/// Errors that can occur while preparing the record encoder.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EncodeError {
    /// Only UTF-8 output is supported.
    #[snafu(display("Unsupported character encoding '{encoding}', only UTF-8 is supported"))]
    UnsupportedEncoding { encoding: String },
}

/// Errors that can occur while writing local gzip files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Failed to create the work directory.
    #[snafu(display("Failed to create work directory {}: {source}", path.display()))]
    CreateWorkDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to open an output file.
    #[snafu(display("Failed to open {}: {source}", path.display()))]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write to an output file.
    #[snafu(display("Failed to write {}: {source}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to finish and flush an output file.
    #[snafu(display("Failed to close {}: {source}", path.display()))]
    CloseFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to delete an output file during cleanup.
    #[snafu(display("Failed to remove {}: {source}", path.display()))]
    RemoveFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A write was attempted with no open file.
    #[snafu(display("No output file is open"))]
    NoOpenFile,
}

/// Top-level loader errors. Each variant names the phase that failed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoadError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Reading input rows failed.
    #[snafu(display("Row source error: {source}"))]
    Source { source: SourceError },

    /// Connecting to the warehouse failed.
    #[snafu(display("Connection error: {source}"))]
    Connection { source: WarehouseError },

    /// Resolving target columns failed.
    #[snafu(display("Schema resolution error: {source}"))]
    SchemaResolution { source: SchemaError },

    /// Mapping input fields to target columns failed.
    #[snafu(display("Field mapping error: {source}"))]
    FieldMapping { source: MappingError },

    /// The encoder could not be prepared.
    #[snafu(display("Encoding error: {source}"))]
    Encoding { source: EncodeError },

    /// Local file I/O failed.
    #[snafu(display("File I/O error: {source}"))]
    FileIo { source: SinkError },

    /// Uploading a file to the stage failed.
    #[snafu(display("Staging error for {file}: {source}"))]
    Staging {
        file: String,
        source: WarehouseError,
    },

    /// The stage upload reported an error status.
    #[snafu(display("Staging error for {file}: upload reported {status}: {message}"))]
    StagingRejected {
        file: String,
        status: String,
        message: String,
    },

    /// The load command failed.
    #[snafu(display("Load error: {source}"))]
    Load { source: WarehouseError },

    /// The final commit failed.
    #[snafu(display("Commit error: {source}"))]
    Commit { source: WarehouseError },

    /// The loader was used after it failed or finished.
    #[snafu(display("Loader cannot accept work in state {state}"))]
    InvalidState { state: LoadState },
}

impl LoadError {
    /// Short phase name, used as a metrics label.
    pub fn phase(&self) -> &'static str {
        match self {
            LoadError::Config { .. } => "config",
            LoadError::Source { .. } => "source",
            LoadError::Connection { .. } => "connection",
            LoadError::SchemaResolution { .. } => "schema",
            LoadError::FieldMapping { .. } => "mapping",
            LoadError::Encoding { .. } => "encoding",
            LoadError::FileIo { .. } => "file_io",
            LoadError::Staging { .. } | LoadError::StagingRejected { .. } => "staging",
            LoadError::Load { .. } => "load",
            LoadError::Commit { .. } => "commit",
            LoadError::InvalidState { .. } => "state",
        }
    }
}

impl From<ConfigError> for LoadError {
    fn from(source: ConfigError) -> Self {
        LoadError::Config { source }
    }
}

impl From<SourceError> for LoadError {
    fn from(source: SourceError) -> Self {
        LoadError::Source { source }
    }
}

impl From<SchemaError> for LoadError {
    fn from(source: SchemaError) -> Self {
        LoadError::SchemaResolution { source }
    }
}

impl From<MappingError> for LoadError {
    fn from(source: MappingError) -> Self {
        LoadError::FieldMapping { source }
    }
}

impl From<EncodeError> for LoadError {
    fn from(source: EncodeError) -> Self {
        LoadError::Encoding { source }
    }
}

impl From<SinkError> for LoadError {
    fn from(source: SinkError) -> Self {
        LoadError::FileIo { source }
    }
}
