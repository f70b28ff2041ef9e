//! Store abstraction layer for db-ask.
//!
//! Provides a trait-based interface for the relational store, so the
//! translation pipeline can run against SQLite or a test double.

mod mock;
mod schema;
mod sqlite;
mod types;

pub use mock::{FailingStoreClient, MockStoreClient};
pub use schema::{ColumnInfo, ColumnType, SchemaDescription, TableInfo};
pub use sqlite::SqliteClient;
pub use types::{ExecutionError, ExecutionErrorKind, QueryResult, ResultColumn, Row, Value};

use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Default number of rows a query may return.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

/// Default wall-clock budget for one query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of sample rows collected per table.
pub const DEFAULT_SAMPLE_ROWS: usize = 3;

/// Hard upper bound on sample rows per table.
pub const MAX_SAMPLE_ROWS: usize = 5;

/// Default length after which sample cell text is truncated.
pub const DEFAULT_MAX_CELL_CHARS: usize = 64;

/// Row and time limits applied to a single query execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionBudget {
    pub max_rows: usize,
    pub timeout: Duration,
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Controls how much sample data introspection collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntrospectionOptions {
    /// Rows per table, capped at `MAX_SAMPLE_ROWS`.
    pub sample_rows: usize,
    /// Text cells longer than this are truncated.
    pub max_cell_chars: usize,
}

impl IntrospectionOptions {
    /// Returns the sample row count after applying the hard cap.
    pub fn effective_sample_rows(&self) -> usize {
        self.sample_rows.min(MAX_SAMPLE_ROWS)
    }
}

impl Default for IntrospectionOptions {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_SAMPLE_ROWS,
            max_cell_chars: DEFAULT_MAX_CELL_CHARS,
        }
    }
}

/// Opens a store client for the given connection configuration.
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn StoreClient>> {
    let client = SqliteClient::connect(config).await?;
    Ok(Box::new(client))
}

/// Trait defining the interface for store clients.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Introspects the store, returning tables, columns and sample rows.
    async fn introspect_schema(&self, options: &IntrospectionOptions) -> Result<SchemaDescription>;

    /// Executes a single statement within the given budget.
    async fn execute_query(
        &self,
        sql: &str,
        budget: &ExecutionBudget,
    ) -> std::result::Result<QueryResult, ExecutionError>;

    /// Closes the store connection.
    async fn close(&self) -> Result<()>;
}
