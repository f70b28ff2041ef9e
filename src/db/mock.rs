//! Mock store clients for testing.
//!
//! Provides scripted store implementations for headless testing of the
//! translation pipeline.

use super::{
    ExecutionBudget, ExecutionError, ExecutionErrorKind, IntrospectionOptions, QueryResult,
    SchemaDescription, StoreClient,
};
use crate::error::{AskError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// A mock store client that returns predefined results.
///
/// Responses are matched by case-insensitive substring against the
/// executed SQL, first match wins. Every executed statement is recorded.
pub struct MockStoreClient {
    schema: SchemaDescription,
    responses: Vec<(String, std::result::Result<QueryResult, ExecutionError>)>,
    default_result: QueryResult,
    executed: Mutex<Vec<String>>,
}

impl MockStoreClient {
    /// Creates a new mock store client with the given schema.
    pub fn new(schema: SchemaDescription) -> Self {
        Self {
            schema,
            responses: Vec::new(),
            default_result: QueryResult::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Returns `result` for any SQL containing `pattern`.
    pub fn with_result(mut self, pattern: impl Into<String>, result: QueryResult) -> Self {
        self.responses
            .push((pattern.into().to_lowercase(), Ok(result)));
        self
    }

    /// Fails any SQL containing `pattern` with the given error.
    pub fn with_error(mut self, pattern: impl Into<String>, error: ExecutionError) -> Self {
        self.responses
            .push((pattern.into().to_lowercase(), Err(error)));
        self
    }

    /// Sets the result returned when no pattern matches.
    pub fn with_default_result(mut self, result: QueryResult) -> Self {
        self.default_result = result;
        self
    }

    /// Returns every statement executed so far, in order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StoreClient for MockStoreClient {
    async fn introspect_schema(&self, _options: &IntrospectionOptions) -> Result<SchemaDescription> {
        Ok(self.schema.clone())
    }

    async fn execute_query(
        &self,
        sql: &str,
        budget: &ExecutionBudget,
    ) -> std::result::Result<QueryResult, ExecutionError> {
        if let Ok(mut log) = self.executed.lock() {
            log.push(sql.to_string());
        }

        let lower = sql.to_lowercase();
        let response = self
            .responses
            .iter()
            .find(|(pattern, _)| lower.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| Ok(self.default_result.clone()));

        response.map(|mut result| {
            if result.rows.len() > budget.max_rows {
                result.total_rows = Some(result.rows.len());
                result.rows.truncate(budget.max_rows);
                result.row_count = budget.max_rows;
                result.was_truncated = true;
            }
            result.with_execution_time(Duration::from_millis(1))
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A store client whose every operation fails.
///
/// Useful for exercising error paths around connection loss.
pub struct FailingStoreClient {
    message: String,
}

impl FailingStoreClient {
    /// Creates a failing client that reports the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl StoreClient for FailingStoreClient {
    async fn introspect_schema(&self, _options: &IntrospectionOptions) -> Result<SchemaDescription> {
        Err(AskError::introspection(self.message.clone()))
    }

    async fn execute_query(
        &self,
        _sql: &str,
        _budget: &ExecutionBudget,
    ) -> std::result::Result<QueryResult, ExecutionError> {
        Err(ExecutionError::new(
            ExecutionErrorKind::Unknown,
            self.message.clone(),
        ))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
