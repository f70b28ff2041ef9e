//! The self-correcting generation loop.
//!
//! State transitions, logged as they happen:
//! `Drafting -> Validating -> Executing -> Succeeded`, or on any failure
//! `Retrying -> Drafting` until the attempt cap, then `Failed`.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Attempt, AttemptFailure, AttemptOutcome, LoopOutcome, PipelineConfig};
use crate::db::{QueryResult, SchemaDescription, StoreClient};
use crate::error::{AskError, Result};
use crate::llm::{CorrectionContext, GenerationClient, PromptBuilder};
use crate::query::QueryExecutor;
use crate::sanitize::{CandidateSql, Sanitizer};
use crate::validate::Validator;

/// Orchestrates one question from prompt to result.
pub struct CorrectionLoop<'a> {
    store: &'a dyn StoreClient,
    schema: &'a SchemaDescription,
    generator: &'a dyn GenerationClient,
    config: &'a PipelineConfig,
    prompt_builder: PromptBuilder,
    sanitizer: Sanitizer,
    validator: Validator,
}

impl<'a> CorrectionLoop<'a> {
    pub fn new(
        store: &'a dyn StoreClient,
        schema: &'a SchemaDescription,
        generator: &'a dyn GenerationClient,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            store,
            schema,
            generator,
            config,
            prompt_builder: PromptBuilder::new(config.dialect.clone())
                .with_sample_rows(config.introspection.effective_sample_rows())
                .with_mutations(config.allow_mutations),
            sanitizer: Sanitizer::new(),
            validator: Validator::new(config.allow_mutations),
        }
    }

    /// Replaces the sanitizer, e.g. to add cleanup rules.
    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Runs the loop until a result, the attempt cap, or cancellation.
    ///
    /// A non-transient generation failure on the first attempt is returned as
    /// an error. On a later attempt it ends the loop as `Failed`, keeping the
    /// history so the caller still sees the last SQL tried. Everything else
    /// the loop recovers from is recorded in the attempt history.
    pub async fn run(&self, question: &str, cancel: &CancellationToken) -> Result<LoopOutcome> {
        let max_attempts = self.config.effective_max_attempts();
        let mut attempts = Vec::with_capacity(max_attempts as usize);
        let mut correction: Option<CorrectionContext> = None;

        for number in 1..=max_attempts {
            if cancel.is_cancelled() {
                info!(attempt = number, "Request cancelled between attempts");
                return Err(AskError::Cancelled);
            }

            debug!(attempt = number, state = "Drafting", "Generating SQL");
            let prompt = self
                .prompt_builder
                .build(self.schema, question, correction.as_ref());

            let raw = match self.generator.generate(&prompt).await {
                Ok(raw) => raw,
                Err(e) if e.is_transient() => {
                    warn!(attempt = number, error = %e, "Transient generation failure");
                    attempts.push(Attempt {
                        number,
                        prompt,
                        raw_output: None,
                        candidate: None,
                        outcome: AttemptOutcome::Failed {
                            failure: AttemptFailure::Generation(e.to_string()),
                        },
                    });
                    if number < max_attempts {
                        self.backoff(cancel).await?;
                    }
                    continue;
                }
                Err(e) if attempts.is_empty() => {
                    warn!(attempt = number, error = %e, "Generation failed");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        attempt = number,
                        state = "Failed",
                        error = %e,
                        "Generation failed after earlier attempts"
                    );
                    attempts.push(Attempt {
                        number,
                        prompt,
                        raw_output: None,
                        candidate: None,
                        outcome: AttemptOutcome::Failed {
                            failure: AttemptFailure::Generation(e.to_string()),
                        },
                    });
                    return Ok(LoopOutcome::Failed { attempts });
                }
            };

            match self.evaluate(number, &raw).await {
                Ok((candidate, result)) => {
                    info!(
                        attempt = number,
                        state = "Succeeded",
                        rows = result.row_count,
                        "Question answered"
                    );
                    attempts.push(Attempt {
                        number,
                        prompt,
                        raw_output: Some(raw),
                        candidate: Some(candidate.clone()),
                        outcome: AttemptOutcome::Succeeded {
                            row_count: result.row_count,
                        },
                    });
                    return Ok(LoopOutcome::Succeeded {
                        candidate,
                        result,
                        attempts,
                    });
                }
                Err((candidate, failure)) => {
                    if number < max_attempts {
                        info!(
                            attempt = number,
                            state = "Retrying",
                            stage = failure.kind(),
                            reason = %failure,
                            "Attempt failed, retrying with feedback"
                        );
                    }
                    correction = Some(failure.correction_context(candidate.as_ref(), &raw));
                    attempts.push(Attempt {
                        number,
                        prompt,
                        raw_output: Some(raw),
                        candidate,
                        outcome: AttemptOutcome::Failed { failure },
                    });
                }
            }
        }

        warn!(
            attempts = attempts.len(),
            state = "Failed",
            "Giving up after reaching the attempt limit"
        );
        Ok(LoopOutcome::Failed { attempts })
    }

    /// Sanitizes, validates and executes one raw output.
    ///
    /// On failure, returns the candidate if sanitization got that far.
    async fn evaluate(
        &self,
        number: u32,
        raw: &str,
    ) -> std::result::Result<(CandidateSql, QueryResult), (Option<CandidateSql>, AttemptFailure)>
    {
        let candidate = self
            .sanitizer
            .sanitize(raw, number)
            .map_err(|e| (None, AttemptFailure::Sanitization(e)))?;

        debug!(attempt = number, state = "Validating", sql = %candidate.sql);
        let validated = match self.validator.validate(candidate.clone(), self.schema) {
            Ok(validated) => validated,
            Err(e) => return Err((Some(candidate), AttemptFailure::Validation(e))),
        };

        debug!(attempt = number, state = "Executing", sql = %validated.sql());
        let executor = QueryExecutor::new(self.store, self.config.budget);
        match executor.execute(&validated).await {
            Ok(result) => Ok((validated.into_candidate(), result)),
            Err(e) => Err((
                Some(validated.into_candidate()),
                AttemptFailure::Execution(e),
            )),
        }
    }

    async fn backoff(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AskError::Cancelled),
            _ = tokio::time::sleep(self.config.generation_backoff) => Ok(()),
        }
    }
}
