//! Recovery of a single SQL statement from noisy generation output.
//!
//! The sanitizer runs an ordered list of independent [`SanitizeRule`]s over
//! the raw text. Each rule is a small text-to-text transformation, so new
//! cleanup steps can be added without touching the pipeline.

pub(crate) mod lexer;
mod rules;

pub use rules::{CollapseWhitespace, StripCodeFences, StripLeadingProse, StripTrailingText};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

/// Reasons sanitization can fail.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizationError {
    /// The output was empty or only whitespace and fences.
    #[error("the model returned no text")]
    EmptyInput,

    /// No statement-start keyword was found anywhere in the output.
    #[error("no SQL statement keyword (SELECT, WITH, ...) was found in the output")]
    NoStatementKeyword,
}

/// A statement believed to be a single SQL statement, with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateSql {
    /// The cleaned statement text.
    pub sql: String,
    /// Attempt number (1-based) that produced this candidate.
    pub attempt: u32,
    /// The unmodified generation output the statement was recovered from.
    pub raw_output: String,
}

impl CandidateSql {
    pub fn new(sql: impl Into<String>, attempt: u32, raw_output: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            attempt,
            raw_output: raw_output.into(),
        }
    }
}

/// A single cleanup step.
pub trait SanitizeRule: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Transforms the text, or fails when no statement can be recovered.
    fn apply(&self, text: &str) -> Result<String, SanitizationError>;
}

/// Ordered collection of sanitization rules.
pub struct Sanitizer {
    rules: Vec<Box<dyn SanitizeRule>>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Sanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.name()))
            .finish()
    }
}

impl Sanitizer {
    /// Creates a sanitizer with the standard rule order.
    pub fn new() -> Self {
        Self::with_rules(vec![
            Box::new(StripCodeFences),
            Box::new(StripLeadingProse),
            Box::new(StripTrailingText),
            Box::new(CollapseWhitespace),
        ])
    }

    /// Creates a sanitizer with a custom rule list.
    pub fn with_rules(rules: Vec<Box<dyn SanitizeRule>>) -> Self {
        Self { rules }
    }

    /// Appends a rule to the end of the list.
    pub fn push_rule(&mut self, rule: Box<dyn SanitizeRule>) {
        self.rules.push(rule);
    }

    /// Returns the rule names in application order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Recovers a candidate statement from raw generation output.
    pub fn sanitize(&self, raw: &str, attempt: u32) -> Result<CandidateSql, SanitizationError> {
        if raw.trim().is_empty() {
            return Err(SanitizationError::EmptyInput);
        }

        let mut text = raw.to_string();
        for rule in &self.rules {
            text = rule.apply(&text).inspect_err(|e| {
                debug!(rule = rule.name(), error = %e, "Sanitization rule rejected output");
            })?;
            trace!(rule = rule.name(), output = %text, "Applied sanitization rule");

            if text.trim().is_empty() {
                return Err(SanitizationError::EmptyInput);
            }
        }

        Ok(CandidateSql::new(text, attempt, raw))
    }
}
