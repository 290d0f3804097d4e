//! Field mapping: which input field feeds which output column.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::config::{DataType, FieldMappingEntry, LoaderConfig};
use crate::error::{
    DuplicateTargetFieldSnafu, JsonFieldNotFoundSnafu, JsonFieldRequiredSnafu, MappingError,
    StreamFieldNotFoundSnafu, TableFieldNotFoundSnafu, UnmappedColumnSnafu,
};
use crate::schema::{TargetSchema, TypeCategory};

/// Whitespace trimming applied to string values before writing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrimType {
    #[default]
    None,
    Left,
    Right,
    Both,
}

impl TrimType {
    pub fn apply<'a>(&self, value: &'a str) -> &'a str {
        match self {
            TrimType::None => value,
            TrimType::Left => value.trim_start(),
            TrimType::Right => value.trim_end(),
            TrimType::Both => value.trim(),
        }
    }
}

/// Per-column string formatting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldFormat {
    pub trim: TrimType,
    /// Maximum length in bytes; longer values are cut.
    pub max_length: Option<usize>,
    /// Pad shorter values with spaces up to `max_length`.
    pub pad: bool,
}

impl From<&FieldMappingEntry> for FieldFormat {
    fn from(entry: &FieldMappingEntry) -> Self {
        Self {
            trim: entry.trim,
            max_length: entry.length,
            pad: entry.pad,
        }
    }
}

/// One output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedColumn {
    /// Input position, `None` when nothing feeds this column.
    pub source_index: Option<usize>,
    pub target_name: String,
    pub category: TypeCategory,
    pub format: FieldFormat,
}

/// The resolved mapping for a session. Built once, never changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMapping {
    /// Delimited output, one entry per output column in output order.
    Columns(Vec<MappedColumn>),
    /// JSON output, one input field holding the whole document.
    Json { source_index: usize },
}

impl FieldMapping {
    /// Resolve the mapping for `config` over the given input fields.
    ///
    /// `schema` is required for explicit mappings and optional otherwise.
    pub fn resolve(
        config: &LoaderConfig,
        input_fields: &[String],
        schema: Option<&TargetSchema>,
    ) -> Result<Self, MappingError> {
        if config.data_type == DataType::Json {
            return Self::json(input_fields, config.json.field.as_deref());
        }

        match schema {
            Some(schema) if config.uses_explicit_fields() => Self::explicit(
                input_fields,
                schema,
                &config.fields,
                config.csv.error_on_column_mismatch,
            ),
            _ => Ok(Self::positional(input_fields, schema)),
        }
    }

    /// Map explicit `stream_field -> table_field` entries onto the table.
    ///
    /// Output follows table column order. Columns without an entry get no
    /// source and are written as null, unless `strict` is set, in which case
    /// they are an error.
    pub fn explicit(
        input_fields: &[String],
        schema: &TargetSchema,
        entries: &[FieldMappingEntry],
        strict: bool,
    ) -> Result<Self, MappingError> {
        let mut sources: Vec<Option<(usize, FieldFormat)>> = vec![None; schema.len()];

        for entry in entries {
            let source_index = position(input_fields, &entry.stream_field).context(
                StreamFieldNotFoundSnafu {
                    field: entry.stream_field.as_str(),
                },
            )?;
            let column_index =
                schema
                    .index_of(&entry.table_field)
                    .context(TableFieldNotFoundSnafu {
                        field: entry.table_field.as_str(),
                        table: schema.table(),
                    })?;
            ensure!(
                sources[column_index].is_none(),
                DuplicateTargetFieldSnafu {
                    field: entry.table_field.as_str()
                }
            );
            sources[column_index] = Some((source_index, FieldFormat::from(entry)));
        }

        let mut columns = Vec::with_capacity(schema.len());
        for (column, source) in schema.columns().iter().zip(sources) {
            ensure!(
                !strict || source.is_some(),
                UnmappedColumnSnafu {
                    column: column.name.as_str()
                }
            );
            let (source_index, format) = match source {
                Some((index, format)) => (Some(index), format),
                None => (None, FieldFormat::default()),
            };
            columns.push(MappedColumn {
                source_index,
                target_name: column.name.clone(),
                category: column.category,
                format,
            });
        }

        Ok(FieldMapping::Columns(columns))
    }

    /// Identity mapping: input field `i` becomes output column `i`.
    ///
    /// Categories come from the schema when it has a column at that position,
    /// otherwise values are written as strings.
    pub fn positional(input_fields: &[String], schema: Option<&TargetSchema>) -> Self {
        let columns = input_fields
            .iter()
            .enumerate()
            .map(|(index, field)| {
                let column = schema.and_then(|schema| schema.get(index));
                MappedColumn {
                    source_index: Some(index),
                    target_name: column.map_or_else(|| field.clone(), |c| c.name.clone()),
                    category: column.map_or(TypeCategory::String, |c| c.category),
                    format: FieldFormat::default(),
                }
            })
            .collect();
        FieldMapping::Columns(columns)
    }

    /// Select the input field holding the JSON document.
    pub fn json(input_fields: &[String], field: Option<&str>) -> Result<Self, MappingError> {
        let source_index = match field {
            Some(field) => {
                position(input_fields, field).context(JsonFieldNotFoundSnafu { field })?
            }
            None => {
                ensure!(
                    input_fields.len() == 1,
                    JsonFieldRequiredSnafu {
                        count: input_fields.len()
                    }
                );
                0
            }
        };
        Ok(FieldMapping::Json { source_index })
    }

    /// Number of output columns (1 for JSON).
    pub fn width(&self) -> usize {
        match self {
            FieldMapping::Columns(columns) => columns.len(),
            FieldMapping::Json { .. } => 1,
        }
    }
}

fn position(fields: &[String], name: &str) -> Option<usize> {
    fields
        .iter()
        .position(|field| field.eq_ignore_ascii_case(name))
}
