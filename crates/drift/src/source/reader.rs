//! NDJSON row source.

use std::fs::File;
use std::io::BufRead;
use std::path::Path;

use serde_json::{Map, Value as JsonValue};
use snafu::prelude::*;
use tracing::debug;

use super::compression::InputCompression;
use super::{Row, RowSource, Value};
use crate::error::{NotAnObjectSnafu, OpenInputSnafu, ParseRecordSnafu, ReadInputSnafu, SourceError};

/// Reads newline-delimited JSON objects as rows.
///
/// Field names are either given up front or taken from the keys of the first
/// record, in document order. Keys missing from a later record read as null
/// and keys not in the field list are ignored.
pub struct NdjsonSource {
    fields: Vec<String>,
    reader: Box<dyn BufRead + Send>,
    /// First record, read ahead to discover field names.
    pending: Option<Map<String, JsonValue>>,
    line_number: u64,
    buf: String,
}

impl NdjsonSource {
    /// Open an NDJSON file with the given compression.
    pub fn open(
        path: &Path,
        compression: InputCompression,
        fields: Option<Vec<String>>,
    ) -> Result<Self, SourceError> {
        let file = File::open(path).context(OpenInputSnafu { path })?;
        let reader = compression
            .codec()
            .wrap_reader(Box::new(file))
            .context(OpenInputSnafu { path })?;
        debug!(
            path = %path.display(),
            codec = compression.codec().name(),
            "Opened row source"
        );
        Self::from_reader(reader, fields)
    }

    /// Build a source over an already decompressed reader.
    pub fn from_reader(
        reader: Box<dyn BufRead + Send>,
        fields: Option<Vec<String>>,
    ) -> Result<Self, SourceError> {
        let mut source = Self {
            fields: fields.clone().unwrap_or_default(),
            reader,
            pending: None,
            line_number: 0,
            buf: String::new(),
        };

        if fields.is_none() {
            source.pending = source.read_record()?;
            if let Some(first) = &source.pending {
                source.fields = first.keys().cloned().collect();
            }
        }

        Ok(source)
    }

    /// Read the next non-blank line as a JSON object.
    fn read_record(&mut self) -> Result<Option<Map<String, JsonValue>>, SourceError> {
        loop {
            self.buf.clear();
            self.line_number += 1;
            let read = self
                .reader
                .read_line(&mut self.buf)
                .context(ReadInputSnafu {
                    line: self.line_number,
                })?;
            if read == 0 {
                return Ok(None);
            }

            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }

            let parsed: JsonValue = serde_json::from_str(line).context(ParseRecordSnafu {
                line: self.line_number,
            })?;
            return match parsed {
                JsonValue::Object(map) => Ok(Some(map)),
                _ => NotAnObjectSnafu {
                    line: self.line_number,
                }
                .fail(),
            };
        }
    }

    fn to_row(&self, mut record: Map<String, JsonValue>) -> Row {
        self.fields
            .iter()
            .map(|name| {
                record
                    .remove(name)
                    .map(Value::from_json)
                    .unwrap_or(Value::Null)
            })
            .collect()
    }
}

impl RowSource for NdjsonSource {
    fn fields(&self) -> &[String] {
        &self.fields
    }

    fn next_row(&mut self) -> Result<Option<Row>, SourceError> {
        let record = match self.pending.take() {
            Some(record) => Some(record),
            None => self.read_record()?,
        };
        Ok(record.map(|record| self.to_row(record)))
    }
}
