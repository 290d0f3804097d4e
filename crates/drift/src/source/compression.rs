//! Decompression codecs for row source input.

use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// A codec that turns a compressed byte stream into a buffered plain one.
pub trait CompressionCodec: Send + Sync {
    /// Wrap `input` in a streaming decoder.
    fn wrap_reader(&self, input: Box<dyn Read + Send>) -> io::Result<Box<dyn BufRead + Send>>;

    /// Human-readable name of this codec (for logging/debugging).
    fn name(&self) -> &'static str;
}

/// Gzip codec using flate2. Concatenated gzip members are read as one stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec;

impl CompressionCodec for GzipCodec {
    fn wrap_reader(&self, input: Box<dyn Read + Send>) -> io::Result<Box<dyn BufRead + Send>> {
        Ok(Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(
            input,
        ))))
    }

    fn name(&self) -> &'static str {
        "gzip"
    }
}

/// Zstandard codec using zstd.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdCodec;

impl CompressionCodec for ZstdCodec {
    fn wrap_reader(&self, input: Box<dyn Read + Send>) -> io::Result<Box<dyn BufRead + Send>> {
        let decoder = zstd::stream::read::Decoder::new(input)?;
        Ok(Box::new(BufReader::new(decoder)))
    }

    fn name(&self) -> &'static str {
        "zstd"
    }
}

/// Pass-through codec for uncompressed input.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCodec;

impl CompressionCodec for NoopCodec {
    fn wrap_reader(&self, input: Box<dyn Read + Send>) -> io::Result<Box<dyn BufRead + Send>> {
        Ok(Box::new(BufReader::new(input)))
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Compression of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputCompression {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl InputCompression {
    /// Guess the compression from a file extension (`.gz`, `.zst`).
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("gz" | "gzip") => InputCompression::Gzip,
            Some("zst" | "zstd") => InputCompression::Zstd,
            _ => InputCompression::None,
        }
    }

    pub fn codec(&self) -> &'static dyn CompressionCodec {
        match self {
            InputCompression::None => &NoopCodec,
            InputCompression::Gzip => &GzipCodec,
            InputCompression::Zstd => &ZstdCodec,
        }
    }
}
