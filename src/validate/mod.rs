//! Static acceptance checks for candidate SQL.
//!
//! Validation runs before anything touches the store. Each check is a named
//! [`ValidationRule`]; the first failing rule decides the outcome. A candidate
//! that passes every rule becomes a [`ValidatedSql`], the only type the
//! executor accepts.

mod rules;

pub use rules::{BalancedRule, KnownIdentifiersRule, SingleStatementRule, StatementTypeRule};

use crate::db::SchemaDescription;
use crate::sanitize::lexer::{tokenize, TokenKind};
use crate::sanitize::CandidateSql;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// The type of SQL statement detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Replace,
    Create,
    Drop,
    Alter,
    Explain,
    Pragma,
    /// Statement type could not be determined.
    Unknown,
}

impl StatementType {
    /// Classifies a statement by its leading keyword.
    ///
    /// For `WITH`, the type is that of the first top-level statement keyword
    /// following the common table expressions.
    pub fn classify(sql: &str) -> Self {
        let lexed = tokenize(sql);
        let mut words = lexed
            .with_depth()
            .into_iter()
            .filter(|(_, t)| !t.is_trivia());

        let Some((_, first)) = words.next() else {
            return Self::Unknown;
        };

        if first.is_word("WITH") {
            return words
                .filter(|(depth, t)| *depth == 0 && t.kind == TokenKind::Word)
                .map(|(_, t)| Self::from_keyword(t.text))
                .find(|ty| {
                    matches!(
                        ty,
                        Self::Select | Self::Insert | Self::Update | Self::Delete | Self::Replace
                    )
                })
                .unwrap_or(Self::Unknown);
        }

        if first.is_punct('(') {
            // Parenthesized compound select
            return Self::Select;
        }

        Self::from_keyword(first.text)
    }

    fn from_keyword(word: &str) -> Self {
        match word.to_ascii_uppercase().as_str() {
            "SELECT" | "VALUES" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "REPLACE" => Self::Replace,
            "CREATE" => Self::Create,
            "DROP" => Self::Drop,
            "ALTER" => Self::Alter,
            "EXPLAIN" => Self::Explain,
            "PRAGMA" => Self::Pragma,
            _ => Self::Unknown,
        }
    }

    /// Returns true for statements that never modify the store.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Select | Self::Explain)
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Replace => write!(f, "REPLACE"),
            Self::Create => write!(f, "CREATE"),
            Self::Drop => write!(f, "DROP"),
            Self::Alter => write!(f, "ALTER"),
            Self::Explain => write!(f, "EXPLAIN"),
            Self::Pragma => write!(f, "PRAGMA"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Reasons a candidate is rejected before execution.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("{statement} statements are not allowed; only read-only queries (SELECT) may run")]
    ForbiddenStatement { statement: StatementType },

    #[error("unbalanced statement: {reason}")]
    Unbalanced { reason: String },

    #[error("unknown identifier '{token}': it is not a table or column in the schema")]
    UnknownIdentifier { token: String },

    #[error("multiple statements are not allowed; return exactly one statement")]
    MultipleStatements,
}

/// A single validation check.
pub trait ValidationRule: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    fn check(&self, candidate: &CandidateSql, schema: &SchemaDescription)
        -> Result<(), ValidationError>;
}

/// A candidate that passed every validation rule.
///
/// Can only be produced by [`Validator::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql {
    candidate: CandidateSql,
    statement_type: StatementType,
}

impl ValidatedSql {
    /// The statement text.
    pub fn sql(&self) -> &str {
        &self.candidate.sql
    }

    pub fn candidate(&self) -> &CandidateSql {
        &self.candidate
    }

    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    pub fn into_candidate(self) -> CandidateSql {
        self.candidate
    }
}

/// Ordered collection of validation rules.
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.name()))
            .finish()
    }
}

impl Validator {
    /// Creates a validator with the standard rules.
    pub fn new(allow_mutations: bool) -> Self {
        Self::with_rules(vec![
            Box::new(BalancedRule),
            Box::new(StatementTypeRule::new(allow_mutations)),
            Box::new(SingleStatementRule),
            Box::new(KnownIdentifiersRule),
        ])
    }

    /// Creates a validator with a custom rule list.
    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    /// Returns the rule names in check order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Runs every rule in order, stopping at the first failure.
    pub fn validate(
        &self,
        candidate: CandidateSql,
        schema: &SchemaDescription,
    ) -> Result<ValidatedSql, ValidationError> {
        for rule in &self.rules {
            if let Err(e) = rule.check(&candidate, schema) {
                debug!(rule = rule.name(), error = %e, "Validation rule failed");
                return Err(e);
            }
        }

        let statement_type = StatementType::classify(&candidate.sql);
        Ok(ValidatedSql {
            candidate,
            statement_type,
        })
    }
}
