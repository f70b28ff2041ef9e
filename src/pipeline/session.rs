//! Per-connection session state and the caller-facing entry point.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{explain_sql, suggest_questions, Attempt, CorrectionLoop, LoopOutcome, PipelineConfig};
use crate::db::{QueryResult, SchemaDescription, StoreClient};
use crate::error::Result;
use crate::llm::{GenerationClient, PromptBuilder};

/// Everything the caller gets back for one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResponse {
    pub question: String,
    /// The accepted SQL, or on failure the last SQL attempted.
    pub sql: Option<String>,
    /// Result rows when the question was answered.
    pub rows: Option<QueryResult>,
    /// User-facing failure message.
    pub error: Option<String>,
    /// Full attempt history for diagnostics.
    pub attempts: Vec<Attempt>,
}

impl TranslationResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.rows.is_some()
    }

    fn from_outcome(question: &str, outcome: LoopOutcome) -> Self {
        let last_sql = outcome.last_sql().map(str::to_string);
        let last_reason = outcome.last_failure().map(|f| f.to_string());

        match outcome {
            LoopOutcome::Succeeded {
                candidate,
                result,
                attempts,
            } => Self {
                question: question.to_string(),
                sql: Some(candidate.sql),
                rows: Some(result),
                error: None,
                attempts,
            },
            LoopOutcome::Failed { attempts } => {
                let reason = last_reason.unwrap_or_else(|| "unknown failure".to_string());
                let error = match &last_sql {
                    Some(sql) => format!(
                        "Could not answer the question after {} attempts. Last SQL: {}. Last error: {}",
                        attempts.len(),
                        sql,
                        reason
                    ),
                    None => format!(
                        "Could not answer the question after {} attempts. Last error: {}",
                        attempts.len(),
                        reason
                    ),
                };
                Self {
                    question: question.to_string(),
                    sql: last_sql,
                    rows: None,
                    error: Some(error),
                    attempts,
                }
            }
        }
    }
}

/// A translation session bound to one store.
///
/// Owns the store handle, the schema introspected when the session opened
/// and the generation client. Questions are processed one at a time.
pub struct Session {
    store: Box<dyn StoreClient>,
    schema: Arc<SchemaDescription>,
    generator: Box<dyn GenerationClient>,
    config: PipelineConfig,
    in_flight: Mutex<()>,
}

impl Session {
    /// Opens a session, introspecting the store.
    ///
    /// Fails when the store cannot be read or has no tables.
    pub async fn open(
        store: Box<dyn StoreClient>,
        generator: Box<dyn GenerationClient>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let schema = store.introspect_schema(&config.introspection).await?;
        info!(tables = schema.tables().len(), "Session opened");

        Ok(Self {
            store,
            schema: Arc::new(schema),
            generator,
            config,
            in_flight: Mutex::new(()),
        })
    }

    pub fn schema(&self) -> &Arc<SchemaDescription> {
        &self.schema
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Translates a question into SQL, runs it, and returns the outcome.
    pub async fn translate_and_run(&self, question: &str) -> Result<TranslationResponse> {
        self.translate_and_run_with_cancel(question, &CancellationToken::new())
            .await
    }

    /// Like `translate_and_run`, abandoning the loop between attempts once
    /// `cancel` fires.
    pub async fn translate_and_run_with_cancel(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<TranslationResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(TranslationResponse {
                question: String::new(),
                sql: None,
                rows: None,
                error: Some("Please enter a question.".to_string()),
                attempts: Vec::new(),
            });
        }

        let _guard = self.in_flight.lock().await;
        debug!(question = %question, "Translating question");

        let outcome = CorrectionLoop::new(
            self.store.as_ref(),
            &self.schema,
            self.generator.as_ref(),
            &self.config,
        )
        .run(question, cancel)
        .await?;

        Ok(TranslationResponse::from_outcome(question, outcome))
    }

    /// Explains what a statement does, in plain language.
    pub async fn explain(&self, sql: &str) -> Result<String> {
        let builder = PromptBuilder::new(self.config.dialect.clone());
        explain_sql(self.generator.as_ref(), &builder, sql).await
    }

    /// Starter questions for this session's schema.
    pub fn suggest_questions(&self) -> Vec<String> {
        suggest_questions(&self.schema)
    }

    /// Ends the session and closes the store.
    pub async fn close(self) -> Result<()> {
        self.store.close().await
    }
}
