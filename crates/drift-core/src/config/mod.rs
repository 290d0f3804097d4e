//! Configuration file helpers: environment interpolation and YAML loading.

mod vars;

pub use vars::{InterpolationResult, interpolate, interpolate_with};

use std::path::Path;

use serde::de::DeserializeOwned;
use snafu::prelude::*;
use tracing::debug;

use crate::error::{
    ConfigError, EnvInterpolationSnafu, ReadFileSnafu, UnsupportedFormatSnafu, YamlParseSnafu,
};

/// Check if a path has a YAML extension.
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "yaml" || ext == "yml")
        .unwrap_or(false)
}

/// Interpolate environment variables in `contents` and deserialize the result.
pub fn parse_yaml<T: DeserializeOwned>(contents: &str) -> Result<T, ConfigError> {
    let interpolated = interpolate(contents);
    ensure!(
        interpolated.is_ok(),
        EnvInterpolationSnafu {
            message: interpolated.errors.join("\n"),
        }
    );
    serde_yaml::from_str(&interpolated.text).context(YamlParseSnafu)
}

/// Read a YAML file from disk and deserialize it with [`parse_yaml`].
pub fn read_yaml_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    ensure!(is_yaml_file(path), UnsupportedFormatSnafu { path });
    debug!(path = %path.display(), "Loading configuration");
    let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
    parse_yaml(&contents)
}
