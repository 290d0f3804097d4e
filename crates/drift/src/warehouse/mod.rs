//! The warehouse connection collaborator.
//!
//! The loader only needs four operations from a warehouse: connect, run a
//! query that returns rows, run a statement, disconnect. Authentication and
//! transport live behind [`WarehouseConnection`].

mod script;

pub use script::SqlScriptConnection;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::WarehouseError;

/// One row of a command result, columns in result order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    columns: IndexMap<String, Option<String>>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a non-null column.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, Some(value.into()));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        self.columns.insert(name.into(), value);
    }

    /// Look up a column by name, ignoring ASCII case. Null reads as `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(column, _)| column.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_deref())
    }

    /// Look up a column and parse it as an unsigned count.
    pub fn get_count(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }
}

/// An open session with the warehouse.
#[async_trait]
pub trait WarehouseConnection: Send {
    async fn connect(&mut self) -> Result<(), WarehouseError>;

    /// Run a command that returns rows (metadata, PUT, COPY).
    async fn execute_query(&mut self, sql: &str) -> Result<Vec<ResultRow>, WarehouseError>;

    /// Run a command whose result is not needed (COMMIT).
    async fn execute_statement(&mut self, sql: &str) -> Result<(), WarehouseError>;

    async fn disconnect(&mut self) -> Result<(), WarehouseError>;

    /// Whether staged files must stay on disk after the session commits,
    /// for connections that record commands instead of running them.
    fn keeps_local_files(&self) -> bool {
        false
    }
}

#[async_trait]
impl<C: WarehouseConnection + ?Sized> WarehouseConnection for Box<C> {
    async fn connect(&mut self) -> Result<(), WarehouseError> {
        (**self).connect().await
    }

    async fn execute_query(&mut self, sql: &str) -> Result<Vec<ResultRow>, WarehouseError> {
        (**self).execute_query(sql).await
    }

    async fn execute_statement(&mut self, sql: &str) -> Result<(), WarehouseError> {
        (**self).execute_statement(sql).await
    }

    async fn disconnect(&mut self) -> Result<(), WarehouseError> {
        (**self).disconnect().await
    }

    fn keeps_local_files(&self) -> bool {
        (**self).keeps_local_files()
    }
}
