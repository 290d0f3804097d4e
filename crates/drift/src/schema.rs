//! Target table schema resolution.

use snafu::prelude::*;
use tracing::debug;

use crate::error::{DescribeSnafu, MissingAttributeSnafu, SchemaError, TableNotFoundSnafu};
use crate::warehouse::WarehouseConnection;

/// Coarse type of a target column, deciding how values are formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Timestamp,
    Date,
    Time,
    Number,
    String,
}

impl TypeCategory {
    /// Classify a warehouse type name by case-insensitive prefix.
    ///
    /// `TIMESTAMP_NTZ(9)` is a timestamp, not a time, so the longer prefix
    /// is checked first.
    pub fn from_type_name(type_name: &str) -> Self {
        let upper = type_name.trim().to_ascii_uppercase();
        if upper.starts_with("TIMESTAMP") {
            TypeCategory::Timestamp
        } else if upper.starts_with("DATE") {
            TypeCategory::Date
        } else if upper.starts_with("TIME") {
            TypeCategory::Time
        } else if upper.starts_with("NUMBER") || upper.starts_with("FLOAT") {
            TypeCategory::Number
        } else {
            TypeCategory::String
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeCategory::Timestamp => "timestamp",
            TypeCategory::Date => "date",
            TypeCategory::Time => "time",
            TypeCategory::Number => "number",
            TypeCategory::String => "string",
        }
    }
}

/// A column of the target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetColumn {
    pub name: String,
    pub category: TypeCategory,
}

impl TargetColumn {
    pub fn new(name: impl Into<String>, type_name: &str) -> Self {
        Self {
            name: name.into(),
            category: TypeCategory::from_type_name(type_name),
        }
    }
}

/// Columns of the target table in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSchema {
    table: String,
    columns: Vec<TargetColumn>,
}

impl TargetSchema {
    pub fn new(table: impl Into<String>, columns: Vec<TargetColumn>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[TargetColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TargetColumn> {
        self.columns.get(index)
    }

    /// Position of a column, matched case-insensitively.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
    }
}

/// The metadata query for `table` (already schema-qualified if needed).
pub fn describe_statement(table: &str) -> String {
    format!("DESC TABLE {table}")
}

/// Ask the warehouse for the columns of `table`.
///
/// Result rows must carry `name` and `type` columns, in table order.
pub async fn resolve_target_schema<C>(
    connection: &mut C,
    table: &str,
) -> Result<TargetSchema, SchemaError>
where
    C: WarehouseConnection + ?Sized,
{
    let rows = connection
        .execute_query(&describe_statement(table))
        .await
        .context(DescribeSnafu { table })?;
    ensure!(!rows.is_empty(), TableNotFoundSnafu { table });

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let name = row
            .get("name")
            .context(MissingAttributeSnafu {
                table,
                attribute: "name",
            })?;
        let type_name = row
            .get("type")
            .context(MissingAttributeSnafu {
                table,
                attribute: "type",
            })?;
        columns.push(TargetColumn::new(name, type_name));
    }

    debug!(target = %table, columns = columns.len(), "Resolved target schema");
    Ok(TargetSchema::new(table, columns))
}
