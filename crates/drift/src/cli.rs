//! Command line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::source::InputCompression;

/// Stage an NDJSON stream into gzip files and load it into a warehouse
/// table. The generated SQL is written to stdout.
#[derive(Parser, Debug)]
#[command(name = "drift")]
#[command(version, about)]
pub struct CliArgs {
    /// Path to the loader configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Path to the NDJSON input file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Input compression, inferred from the file extension when omitted
    #[arg(long, value_enum)]
    pub compression: Option<InputCompression>,

    /// Input field names in order; taken from the first record when omitted
    #[arg(long, value_delimiter = ',')]
    pub fields: Option<Vec<String>>,
}

impl CliArgs {
    pub fn input_compression(&self) -> InputCompression {
        self.compression
            .unwrap_or_else(|| InputCompression::from_path(&self.input))
    }
}
