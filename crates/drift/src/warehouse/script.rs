//! A connection that writes the load script instead of executing it.

use std::io::Write;

use async_trait::async_trait;
use snafu::prelude::*;
use tracing::debug;

use super::{ResultRow, WarehouseConnection};
use crate::config::ColumnConfig;
use crate::error::{ScriptOutputSnafu, UndeclaredColumnsSnafu, WarehouseError};

/// Writes every command to `out` as an SQL script.
///
/// Table metadata is answered from the columns declared in configuration,
/// uploads always report `UPLOADED` and the load command reports no rows.
/// The staged gzip files stay on disk so the script can be run later.
pub struct SqlScriptConnection<W: Write + Send> {
    out: W,
    columns: Vec<ColumnConfig>,
}

impl<W: Write + Send> SqlScriptConnection<W> {
    pub fn new(out: W, columns: Vec<ColumnConfig>) -> Self {
        Self { out, columns }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &str) -> Result<(), WarehouseError> {
        writeln!(self.out, "{line}").context(ScriptOutputSnafu)
    }

    fn write_statement(&mut self, sql: &str) -> Result<(), WarehouseError> {
        let sql = sql.trim();
        if sql.ends_with(';') {
            self.write_line(sql)
        } else {
            self.write_line(&format!("{sql};"))
        }
    }

    fn describe(&self, sql: &str) -> Result<Vec<ResultRow>, WarehouseError> {
        let table = sql
            .trim()
            .trim_end_matches(';')
            .rsplit(' ')
            .next()
            .unwrap_or_default();
        ensure!(!self.columns.is_empty(), UndeclaredColumnsSnafu { table });
        Ok(self
            .columns
            .iter()
            .map(|column| {
                ResultRow::new()
                    .with("name", column.name.as_str())
                    .with("type", column.type_name.as_str())
            })
            .collect())
    }

    fn upload_result(sql: &str) -> ResultRow {
        let source = sql
            .split('\'')
            .nth(1)
            .and_then(|uri| uri.rsplit('/').next())
            .unwrap_or_default();
        ResultRow::new()
            .with("source", source)
            .with("target", source)
            .with("status", "UPLOADED")
    }
}

fn starts_with_keyword(sql: &str, keyword: &str) -> bool {
    sql.trim_start()
        .get(..keyword.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(keyword))
}

#[async_trait]
impl<W: Write + Send> WarehouseConnection for SqlScriptConnection<W> {
    async fn connect(&mut self) -> Result<(), WarehouseError> {
        debug!("Script connection opened");
        Ok(())
    }

    async fn execute_query(&mut self, sql: &str) -> Result<Vec<ResultRow>, WarehouseError> {
        if starts_with_keyword(sql, "DESC") {
            // Metadata is resolved locally, keep it out of the runnable script.
            let rows = self.describe(sql)?;
            self.write_line(&format!("-- {} (answered from configuration)", sql.trim()))?;
            return Ok(rows);
        }

        self.write_statement(sql)?;
        if starts_with_keyword(sql, "PUT") {
            return Ok(vec![Self::upload_result(sql)]);
        }
        Ok(Vec::new())
    }

    async fn execute_statement(&mut self, sql: &str) -> Result<(), WarehouseError> {
        self.write_statement(sql)
    }

    async fn disconnect(&mut self) -> Result<(), WarehouseError> {
        self.out.flush().context(ScriptOutputSnafu)
    }

    fn keeps_local_files(&self) -> bool {
        true
    }
}
