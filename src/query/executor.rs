//! Budgeted execution of validated statements.
//!
//! Provides isolated query execution that can be tested independently
//! of the correction loop.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::db::{ExecutionBudget, ExecutionError, QueryResult, StoreClient};
use crate::validate::ValidatedSql;

/// Query executor that runs validated statements within a budget.
pub struct QueryExecutor<'a> {
    store: &'a dyn StoreClient,
    budget: ExecutionBudget,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new query executor.
    pub fn new(store: &'a dyn StoreClient, budget: ExecutionBudget) -> Self {
        Self { store, budget }
    }

    pub fn budget(&self) -> &ExecutionBudget {
        &self.budget
    }

    /// Executes a statement that passed validation.
    ///
    /// Taking `ValidatedSql` rather than text means an unvalidated
    /// candidate cannot reach the store through this path.
    pub async fn execute(&self, sql: &ValidatedSql) -> Result<QueryResult, ExecutionError> {
        debug!(
            statement = %sql.statement_type(),
            max_rows = self.budget.max_rows,
            timeout_ms = self.budget.timeout.as_millis() as u64,
            "Executing statement"
        );

        let start = Instant::now();
        let result = self.store.execute_query(sql.sql(), &self.budget).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(query_result) => info!(
                rows = query_result.row_count,
                truncated = query_result.was_truncated,
                elapsed_ms = elapsed.as_millis() as u64,
                "Query executed"
            ),
            Err(e) => warn!(
                kind = %e.kind,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e.message,
                "Query failed"
            ),
        }

        result
    }
}
