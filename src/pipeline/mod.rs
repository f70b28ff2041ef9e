//! The question-to-result translation pipeline.
//!
//! `CorrectionLoop` drives prompt building, generation, sanitization,
//! validation and execution for one question, feeding each failure back into
//! the next prompt. `Session` owns the per-connection state and serializes
//! questions against it.

mod correction;
mod explain;
mod session;
mod suggest;

pub use correction::CorrectionLoop;
pub use explain::explain_sql;
pub use session::{Session, TranslationResponse};
pub use suggest::{suggest_questions, MAX_SUGGESTIONS};

use crate::db::{ExecutionBudget, ExecutionError, IntrospectionOptions, QueryResult};
use crate::llm::{CorrectionContext, Prompt, DEFAULT_DIALECT};
use crate::sanitize::{CandidateSql, SanitizationError};
use crate::validate::ValidationError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Default maximum number of attempts per question.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause after a transient generation failure.
pub const DEFAULT_GENERATION_BACKOFF: Duration = Duration::from_millis(500);

/// Longest stretch of raw output echoed back to the model on retry.
const MAX_ECHOED_OUTPUT_CHARS: usize = 2_000;

/// Configuration for one session's pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Attempts per question, at least 1.
    pub max_attempts: u32,
    /// Permit INSERT/UPDATE/DELETE and DDL statements.
    pub allow_mutations: bool,
    /// Dialect named in the prompt.
    pub dialect: String,
    pub budget: ExecutionBudget,
    pub introspection: IntrospectionOptions,
    /// Pause after a transient generation failure before the next attempt.
    pub generation_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            allow_mutations: false,
            dialect: DEFAULT_DIALECT.to_string(),
            budget: ExecutionBudget::default(),
            introspection: IntrospectionOptions::default(),
            generation_backoff: DEFAULT_GENERATION_BACKOFF,
        }
    }
}

impl PipelineConfig {
    /// The attempt cap with the lower bound applied.
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Why a single attempt did not produce a result.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", content = "error", rename_all = "snake_case")]
pub enum AttemptFailure {
    /// A generation failure. A transient one consumes the attempt; a fatal
    /// one after earlier attempts ends the loop.
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("could not extract SQL: {0}")]
    Sanitization(SanitizationError),

    #[error("validation failed: {0}")]
    Validation(ValidationError),

    #[error("execution failed: {0}")]
    Execution(ExecutionError),
}

impl AttemptFailure {
    /// Stage at which the attempt failed.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generation(_) => "generation",
            Self::Sanitization(_) => "sanitization",
            Self::Validation(_) => "validation",
            Self::Execution(_) => "execution",
        }
    }

    /// Guidance added to the next prompt.
    pub fn correction_hint(&self) -> Option<&'static str> {
        match self {
            Self::Generation(_) => None,
            Self::Sanitization(_) => Some(
                "Respond with only the SQL statement, starting with SELECT or WITH, and no other text.",
            ),
            Self::Validation(ValidationError::UnknownIdentifier { .. }) => {
                Some("Use only the table and column names listed in the schema.")
            }
            Self::Validation(ValidationError::ForbiddenStatement { .. }) => {
                Some("Only read-only SELECT queries are allowed.")
            }
            Self::Validation(ValidationError::Unbalanced { .. }) => {
                Some("Make sure every parenthesis and quote is closed.")
            }
            Self::Validation(ValidationError::MultipleStatements) => {
                Some("Return a single statement.")
            }
            Self::Execution(e) if e.kind.needs_narrower_query() => Some(
                "The query was too expensive. Reduce its scope: add a LIMIT clause or a WHERE filter, or aggregate instead of returning every row.",
            ),
            Self::Execution(_) => None,
        }
    }

    /// Builds the feedback for the next attempt.
    ///
    /// Echoes the rejected candidate, or the raw output when nothing was recovered.
    pub fn correction_context(
        &self,
        candidate: Option<&CandidateSql>,
        raw_output: &str,
    ) -> CorrectionContext {
        let previous_output = match candidate {
            Some(candidate) => candidate.sql.clone(),
            None if raw_output.trim().is_empty() => "(empty response)".to_string(),
            None => raw_output.chars().take(MAX_ECHOED_OUTPUT_CHARS).collect(),
        };
        CorrectionContext::new(previous_output, self.to_string()).with_hint(self.correction_hint())
    }
}

/// Final state of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded { row_count: usize },
    Failed { failure: AttemptFailure },
}

/// One pass through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    /// 1-based attempt number.
    pub number: u32,
    #[serde(skip)]
    pub prompt: Prompt,
    /// Raw generation output, absent when generation failed.
    pub raw_output: Option<String>,
    /// Sanitized candidate, absent when sanitization failed.
    pub candidate: Option<CandidateSql>,
    pub outcome: AttemptOutcome,
}

impl Attempt {
    pub fn failure(&self) -> Option<&AttemptFailure> {
        match &self.outcome {
            AttemptOutcome::Failed { failure } => Some(failure),
            AttemptOutcome::Succeeded { .. } => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Succeeded { .. })
    }
}

/// Terminal state of a correction loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    Succeeded {
        candidate: CandidateSql,
        result: QueryResult,
        attempts: Vec<Attempt>,
    },
    Failed {
        attempts: Vec<Attempt>,
    },
}

impl LoopOutcome {
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            Self::Succeeded { attempts, .. } | Self::Failed { attempts } => attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// The last candidate SQL any attempt produced.
    pub fn last_sql(&self) -> Option<&str> {
        match self {
            Self::Succeeded { candidate, .. } => Some(&candidate.sql),
            Self::Failed { attempts } => attempts
                .iter()
                .rev()
                .find_map(|a| a.candidate.as_ref())
                .map(|c| c.sql.as_str()),
        }
    }

    /// The failure of the final attempt, if the loop failed.
    pub fn last_failure(&self) -> Option<&AttemptFailure> {
        match self {
            Self::Succeeded { .. } => None,
            Self::Failed { attempts } => attempts.last().and_then(Attempt::failure),
        }
    }
}
