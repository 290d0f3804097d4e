//! Configuration error types shared by drift crates.

use std::path::PathBuf;

use snafu::prelude::*;

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Target table name is empty.
    #[snafu(display("Target table cannot be empty"))]
    EmptyTargetTable,

    /// A named internal stage was selected without a stage name.
    #[snafu(display("Location type 'internal_stage' requires a stage_name"))]
    MissingStageName,

    /// An explicit field mapping entry has an empty side.
    #[snafu(display(
        "Field mapping entry {index} must name both a stream_field and a table_field"
    ))]
    EmptyFieldMapping { index: usize },

    /// Explicit field mappings only apply to delimited output.
    #[snafu(display("Explicit field mappings cannot be combined with data_type 'json'"))]
    FieldsWithJson,

    /// A delimiter option is empty.
    #[snafu(display("Option '{option}' cannot be empty"))]
    EmptyDelimiter { option: String },

    /// The enclosure must be a single character.
    #[snafu(display("Enclosure must be a single character, got '{value}'"))]
    InvalidEnclosure { value: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Unsupported config file format.
    #[snafu(display("Unsupported config format for {}: only .yaml/.yml supported", path.display()))]
    UnsupportedFormat { path: PathBuf },
}
