//! Row sources feeding the loader.

mod compression;
mod reader;
mod value;

pub use compression::{CompressionCodec, GzipCodec, InputCompression, NoopCodec, ZstdCodec};
pub use reader::NdjsonSource;
pub use value::{Row, Value};

use crate::error::SourceError;

/// A stream of rows with a fixed set of field names.
pub trait RowSource {
    /// Input field names, positionally aligned with every row.
    fn fields(&self) -> &[String];

    /// Next row, or `None` at the end of the stream.
    fn next_row(&mut self) -> Result<Option<Row>, SourceError>;
}

/// In-memory source, handy for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    fields: Vec<String>,
    rows: std::collections::VecDeque<Row>,
}

impl VecSource {
    pub fn new(fields: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            fields,
            rows: rows.into(),
        }
    }
}

impl RowSource for VecSource {
    fn fields(&self) -> &[String] {
        &self.fields
    }

    fn next_row(&mut self) -> Result<Option<Row>, SourceError> {
        Ok(self.rows.pop_front())
    }
}
