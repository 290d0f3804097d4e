//! Record encoding: one row in, the exact bytes of one output line out.

mod format;

pub use format::{
    DATE_MASK, TIME_MASK, TIMESTAMP_MASK, WAREHOUSE_DATE_FORMAT, WAREHOUSE_TIME_FORMAT,
    WAREHOUSE_TIMESTAMP_FORMAT, format_value,
};

use snafu::prelude::*;

use crate::config::CsvOptions;
use crate::error::{
    EncodeError, InvalidValueSnafu, MappingError, MissingSourceValueSnafu, UnsupportedEncodingSnafu,
};
use crate::mapping::FieldMapping;
use crate::source::Value;

/// Byte sequences that structure the output, resolved once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDelimiters {
    pub separator: Vec<u8>,
    pub terminator: Vec<u8>,
    pub enclosure: Vec<u8>,
    /// Written before an enclosure inside an enclosed value. Always equal to
    /// the enclosure, so `"` is escaped as `""`.
    pub escape: Vec<u8>,
}

impl Default for RecordDelimiters {
    fn default() -> Self {
        Self::new(",", "\n", "\"")
    }
}

impl RecordDelimiters {
    pub fn new(separator: &str, terminator: &str, enclosure: &str) -> Self {
        Self {
            separator: separator.as_bytes().to_vec(),
            terminator: terminator.as_bytes().to_vec(),
            enclosure: enclosure.as_bytes().to_vec(),
            escape: enclosure.as_bytes().to_vec(),
        }
    }

    /// Resolve delimiters from CSV options. Only UTF-8 output is supported.
    pub fn from_options(options: &CsvOptions) -> Result<Self, EncodeError> {
        ensure_utf8(&options.encoding)?;
        Ok(Self::new(
            &options.delimiter,
            &options.record_delimiter,
            &options.enclosure,
        ))
    }

    /// Whether `value` contains any sequence that forces enclosing.
    pub fn needs_enclosure(&self, value: &[u8]) -> bool {
        [
            &self.separator,
            &self.enclosure,
            &self.escape,
            &self.terminator,
        ]
        .into_iter()
        .any(|needle| contains(value, needle))
    }
}

/// Check a declared character encoding name.
pub fn ensure_utf8(encoding: &str) -> Result<(), EncodeError> {
    let normalized = encoding.trim().to_ascii_uppercase().replace(['-', '_'], "");
    ensure!(
        normalized.is_empty() || normalized == "UTF8",
        UnsupportedEncodingSnafu { encoding }
    );
    Ok(())
}

/// Encodes rows according to a [`FieldMapping`].
#[derive(Debug, Clone)]
pub struct RecordEncoder {
    mapping: FieldMapping,
    delimiters: RecordDelimiters,
    null_value: Vec<u8>,
    strict: bool,
}

impl RecordEncoder {
    /// `strict` turns missing source values into errors instead of nulls.
    pub fn new(
        mapping: FieldMapping,
        delimiters: RecordDelimiters,
        null_value: impl Into<Vec<u8>>,
        strict: bool,
    ) -> Self {
        Self {
            mapping,
            delimiters,
            null_value: null_value.into(),
            strict,
        }
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Append the encoded line for `row` to `out`.
    ///
    /// `row_number` is 1-based and only used in error messages.
    pub fn encode(&self, row: &[Value], row_number: u64, out: &mut Vec<u8>) -> Result<(), MappingError> {
        match &self.mapping {
            FieldMapping::Columns(columns) => {
                for (position, column) in columns.iter().enumerate() {
                    if position > 0 {
                        out.extend_from_slice(&self.delimiters.separator);
                    }

                    let value = column.source_index.and_then(|index| row.get(index));
                    ensure!(
                        value.is_some() || !self.strict,
                        MissingSourceValueSnafu {
                            row: row_number,
                            column: column.target_name.as_str(),
                        }
                    );

                    let formatted = match value {
                        Some(value) => format_value(value, column.category, &column.format)
                            .context(InvalidValueSnafu {
                                row: row_number,
                                column: column.target_name.as_str(),
                            })?,
                        None => None,
                    };
                    match formatted {
                        Some(bytes) => self.write_field(&bytes, out),
                        None => out.extend_from_slice(&self.null_value),
                    }
                }
            }
            FieldMapping::Json { source_index } => {
                let value = row.get(*source_index);
                ensure!(
                    value.is_some() || !self.strict,
                    MissingSourceValueSnafu {
                        row: row_number,
                        column: "json document",
                    }
                );
                write_json_document(value.unwrap_or(&Value::Null), out);
            }
        }

        out.extend_from_slice(&self.delimiters.terminator);
        Ok(())
    }

    /// Write one formatted field, enclosing and escaping it if needed.
    fn write_field(&self, value: &[u8], out: &mut Vec<u8>) {
        let d = &self.delimiters;
        if !d.needs_enclosure(value) {
            out.extend_from_slice(value);
            return;
        }

        out.extend_from_slice(&d.enclosure);
        let mut start = 0;
        while let Some(offset) = find(&value[start..], &d.enclosure) {
            let at = start + offset;
            out.extend_from_slice(&value[start..at]);
            out.extend_from_slice(&d.escape);
            out.extend_from_slice(&d.enclosure);
            start = at + d.enclosure.len();
        }
        out.extend_from_slice(&value[start..]);
        out.extend_from_slice(&d.enclosure);
    }
}

/// JSON documents are written as-is; other values use their JSON form.
fn write_json_document(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::String(text) | Value::Decimal(text) => out.extend_from_slice(text.as_bytes()),
        Value::Boolean(b) => out.extend_from_slice(if *b { b"true".as_slice() } else { b"false" }),
        Value::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Value::Float(f) => out.extend_from_slice(f.to_string().as_bytes()),
        Value::Date(d) => write_json_string(&d.format(DATE_MASK).to_string(), out),
        Value::Time(t) => write_json_string(&t.format(TIME_MASK).to_string(), out),
        Value::Timestamp(ts) => write_json_string(&ts.format(TIMESTAMP_MASK).to_string(), out),
    }
}

fn write_json_string(text: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    out.extend_from_slice(text.as_bytes());
    out.push(b'"');
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}
