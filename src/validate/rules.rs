//! Individual validation rules.

use super::{StatementType, ValidationError, ValidationRule};
use crate::db::SchemaDescription;
use crate::sanitize::lexer::{tokenize, Unterminated};
use crate::sanitize::CandidateSql;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer, Word};
use std::collections::HashSet;
use tracing::debug;

/// Implicit row identifier columns every ordinary SQLite table has.
const IMPLICIT_COLUMNS: &[&str] = &["rowid", "oid", "_rowid_"];

/// Schema names SQLite always knows.
const BUILTIN_SCHEMAS: &[&str] = &["main", "temp"];

/// Parentheses and quotes must be balanced, comment-aware.
#[derive(Debug, Default, Clone, Copy)]
pub struct BalancedRule;

impl ValidationRule for BalancedRule {
    fn name(&self) -> &'static str {
        "balanced"
    }

    fn check(&self, candidate: &CandidateSql, _schema: &SchemaDescription) -> Result<(), ValidationError> {
        let lexed = tokenize(&candidate.sql);

        if let Some(open) = lexed.unterminated {
            let reason = match open {
                Unterminated::Quote('\'') => "unterminated string literal".to_string(),
                Unterminated::Quote(q) => format!("unterminated quoted identifier starting with {q}"),
                Unterminated::BlockComment => "unterminated /* comment".to_string(),
            };
            return Err(ValidationError::Unbalanced { reason });
        }

        let mut depth = 0usize;
        for token in lexed.significant() {
            if token.is_punct('(') {
                depth += 1;
            } else if token.is_punct(')') {
                depth = depth.checked_sub(1).ok_or_else(|| ValidationError::Unbalanced {
                    reason: "')' without a matching '('".to_string(),
                })?;
            }
        }

        if depth > 0 {
            return Err(ValidationError::Unbalanced {
                reason: format!("{depth} unclosed '('"),
            });
        }

        Ok(())
    }
}

/// Only read-only statements run unless mutations are enabled.
#[derive(Debug, Clone, Copy)]
pub struct StatementTypeRule {
    allow_mutations: bool,
}

impl StatementTypeRule {
    pub fn new(allow_mutations: bool) -> Self {
        Self { allow_mutations }
    }
}

impl ValidationRule for StatementTypeRule {
    fn name(&self) -> &'static str {
        "statement_type"
    }

    fn check(&self, candidate: &CandidateSql, _schema: &SchemaDescription) -> Result<(), ValidationError> {
        let statement = StatementType::classify(&candidate.sql);
        if statement.is_read_only() || (self.allow_mutations && statement != StatementType::Unknown) {
            Ok(())
        } else {
            Err(ValidationError::ForbiddenStatement { statement })
        }
    }
}

/// At most one top-level statement; a single trailing `;` is fine.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleStatementRule;

impl ValidationRule for SingleStatementRule {
    fn name(&self) -> &'static str {
        "single_statement"
    }

    fn check(&self, candidate: &CandidateSql, _schema: &SchemaDescription) -> Result<(), ValidationError> {
        let lexed = tokenize(&candidate.sql);
        let mut terminated = false;

        for token in lexed.significant() {
            if token.is_punct(';') {
                terminated = true;
            } else if terminated {
                return Err(ValidationError::MultipleStatements);
            }
        }

        Ok(())
    }
}

/// Identifiers must name a known table, column, alias or CTE.
///
/// Uses sqlparser's SQLite tokenizer rather than a full parse. Ambiguous
/// tokens are let through, leaving the store as the final arbiter: words the
/// tokenizer recognizes as keywords, double-quoted tokens (SQLite reads an
/// unknown `"x"` as the string 'x'), function names, `COLLATE` targets and
/// the implicit rowid columns.
#[derive(Debug, Default, Clone, Copy)]
pub struct KnownIdentifiersRule;

impl ValidationRule for KnownIdentifiersRule {
    fn name(&self) -> &'static str {
        "known_identifiers"
    }

    fn check(&self, candidate: &CandidateSql, schema: &SchemaDescription) -> Result<(), ValidationError> {
        let dialect = SQLiteDialect {};
        let tokens = match Tokenizer::new(&dialect, &candidate.sql).tokenize() {
            Ok(tokens) => tokens,
            Err(e) => {
                debug!(error = %e, "Tokenizer failed, skipping identifier check");
                return Ok(());
            }
        };
        let tokens: Vec<Token> = tokens
            .into_iter()
            .filter(|t| !matches!(t, Token::Whitespace(_)))
            .collect();

        let defined = defined_names(&tokens);
        let is_defined = |name: &str| defined.contains(&name.to_lowercase());

        for (i, token) in tokens.iter().enumerate() {
            let Token::Word(word) = token else {
                continue;
            };
            if !is_checkable(word) || is_exempt(&tokens, i) {
                continue;
            }

            let name = word.value.as_str();
            let after_period = i > 0 && tokens[i - 1] == Token::Period;
            let before_period = tokens.get(i + 1) == Some(&Token::Period);

            let known = if before_period {
                schema.has_table(name)
                    || is_defined(name)
                    || BUILTIN_SCHEMAS.iter().any(|s| s.eq_ignore_ascii_case(name))
            } else if after_period {
                schema.has_column(name) || schema.has_table(name) || is_defined(name)
            } else {
                schema.has_table(name) || schema.has_column(name) || is_defined(name)
            };

            if !known {
                return Err(ValidationError::UnknownIdentifier {
                    token: word.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Unquoted non-keyword words and backtick or bracket quoted names.
fn is_checkable(word: &Word) -> bool {
    match word.quote_style {
        None => word.keyword == Keyword::NoKeyword,
        Some('`') | Some('[') => true,
        Some(_) => false,
    }
}

fn is_exempt(tokens: &[Token], i: usize) -> bool {
    let Token::Word(word) = &tokens[i] else {
        return true;
    };

    // Function call
    if tokens.get(i + 1) == Some(&Token::LParen) {
        return true;
    }
    // Collation name
    if i > 0 && matches!(&tokens[i - 1], Token::Word(w) if w.keyword == Keyword::COLLATE) {
        return true;
    }
    IMPLICIT_COLUMNS
        .iter()
        .any(|c| c.eq_ignore_ascii_case(&word.value))
}

fn is_identifier(token: &Token) -> bool {
    match token {
        Token::Word(w) => w.keyword == Keyword::NoKeyword || w.quote_style.is_some(),
        _ => false,
    }
}

/// Collects names the statement defines for itself: aliases, CTE names and
/// CTE column lists. Returned lowercase.
fn defined_names(tokens: &[Token]) -> HashSet<String> {
    let mut defined = HashSet::new();

    for (i, token) in tokens.iter().enumerate() {
        let Token::Word(word) = token else {
            continue;
        };
        let prev = i.checked_sub(1).map(|p| &tokens[p]);
        let next = tokens.get(i + 1);

        // expr AS alias
        if matches!(prev, Some(Token::Word(w)) if w.keyword == Keyword::AS) {
            defined.insert(word.value.to_lowercase());
            continue;
        }

        // Implicit alias: `sales s`, `SUM(amount) total`
        if word.keyword == Keyword::NoKeyword
            && word.quote_style.is_none()
            && matches!(prev, Some(p) if is_identifier(p) || *p == Token::RParen)
        {
            defined.insert(word.value.to_lowercase());
            continue;
        }

        // CTE without column list: name AS (
        if matches!(next, Some(Token::Word(w)) if w.keyword == Keyword::AS)
            && tokens.get(i + 2) == Some(&Token::LParen)
        {
            defined.insert(word.value.to_lowercase());
            continue;
        }

        // CTE with column list: name (a, b) AS (
        if next == Some(&Token::LParen) {
            if let Some(close) = tokens[i + 1..].iter().position(|t| *t == Token::RParen) {
                let close = i + 1 + close;
                let is_cte = matches!(tokens.get(close + 1), Some(Token::Word(w)) if w.keyword == Keyword::AS)
                    && tokens.get(close + 2) == Some(&Token::LParen);
                if is_cte {
                    defined.insert(word.value.to_lowercase());
                    for inner in &tokens[i + 2..close] {
                        if let Token::Word(column) = inner {
                            defined.insert(column.value.to_lowercase());
                        }
                    }
                }
            }
        }
    }

    defined
}
