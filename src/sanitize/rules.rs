//! Individual cleanup rules applied to raw generation output.

use super::lexer::{tokenize, TokenKind};
use super::{SanitizationError, SanitizeRule};
use regex::Regex;
use std::sync::OnceLock;

/// Keywords that may begin a statement.
const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "REPLACE", "CREATE", "DROP", "ALTER",
];

/// Keywords that may begin a continuation line of a statement.
const CLAUSE_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "JOIN", "INNER",
    "LEFT", "RIGHT", "FULL", "CROSS", "OUTER", "NATURAL", "ON", "USING", "AND", "OR", "NOT",
    "UNION", "INTERSECT", "EXCEPT", "WITH", "AS", "CASE", "WHEN", "THEN", "ELSE", "END", "SET",
    "VALUES", "INTO", "WINDOW", "RETURNING", "DISTINCT",
];

const OBJECT_KINDS: &[&str] = &[
    "TABLE", "VIEW", "INDEX", "TRIGGER", "UNIQUE", "TEMP", "TEMPORARY", "VIRTUAL",
];

fn is_one_of(word: &str, list: &[&str]) -> bool {
    list.iter().any(|k| word.eq_ignore_ascii_case(k))
}

/// Removes markdown code fences and their language tags.
#[derive(Debug, Default, Clone, Copy)]
pub struct StripCodeFences;

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| {
            Regex::new(r"(?i)```[ \t]*(?:sqlite3?|sql|postgres(?:ql)?|mysql|tsql)?").ok()
        })
        .as_ref()
}

impl SanitizeRule for StripCodeFences {
    fn name(&self) -> &'static str {
        "strip_code_fences"
    }

    fn apply(&self, text: &str) -> Result<String, SanitizationError> {
        let stripped = match fence_regex() {
            Some(fence) => fence.replace_all(text, "").into_owned(),
            None => text.replace("```", ""),
        };
        Ok(stripped.trim().to_string())
    }
}

/// Discards everything before the statement keyword.
///
/// The scan is word-based and ignores quotes, so apostrophes in the prose
/// ("Here's the query") cannot hide the statement. Text that already opens
/// with a keyword is kept whole unless the keyword is capitalized like the
/// first word of a sentence. Otherwise matches are ranked: a keyword followed
/// by text shaped like that statement beats one that is not, and a keyword
/// that starts a line or is written in capitals beats a lowercase one in the
/// middle of a sentence. The earliest match of the best rank wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct StripLeadingProse;

impl SanitizeRule for StripLeadingProse {
    fn name(&self) -> &'static str {
        "strip_leading_prose"
    }

    fn apply(&self, text: &str) -> Result<String, SanitizationError> {
        let mut best: Option<(u8, usize)> = None;
        let mut rest = text;
        let mut offset = 0;

        while let Some((word, start)) = next_word(rest) {
            let at = offset + start;
            let end = start + word.len();
            if is_one_of(word, STATEMENT_KEYWORDS) {
                if text[..at].trim().is_empty() && !is_capitalized(word) {
                    return Ok(text[at..].to_string());
                }
                let rank = match_rank(
                    starts_statement(word, &rest[end..]),
                    starts_line(text, at) || is_upper(word),
                );
                if best.map_or(true, |(r, _)| rank < r) {
                    best = Some((rank, at));
                }
                if rank == 0 {
                    break;
                }
            }
            offset += end;
            rest = &rest[end..];
        }

        best.map(|(_, at)| text[at..].to_string())
            .ok_or(SanitizationError::NoStatementKeyword)
    }
}

/// Lower is better.
fn match_rank(shaped: bool, prominent: bool) -> u8 {
    match (shaped, prominent) {
        (true, true) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    }
}

fn starts_line(text: &str, at: usize) -> bool {
    text[..at]
        .rsplit('\n')
        .next()
        .map_or(true, |line| line.trim().is_empty())
}

fn is_upper(word: &str) -> bool {
    !word.chars().any(char::is_lowercase)
}

/// "Select", "With": how a keyword looks as the first word of a sentence.
fn is_capitalized(word: &str) -> bool {
    let mut chars = word.chars();
    chars.next().is_some_and(char::is_uppercase) && chars.any(char::is_lowercase)
}

/// Finds the next run of word characters, returning it with its byte offset.
fn next_word(text: &str) -> Option<(&str, usize)> {
    let start = text.find(|c: char| c.is_alphanumeric() || c == '_')?;
    let len = text[start..]
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(text.len() - start);
    Some((&text[start..start + len], start))
}

/// Splits off the next non-whitespace token: a word, a quoted name or one character.
fn next_piece(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    let first = text.chars().next()?;

    let len = if first.is_alphanumeric() || first == '_' {
        text.find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(text.len())
    } else if let Some(close) = match first {
        '"' | '`' => Some(first),
        '[' => Some(']'),
        _ => None,
    } {
        text[1..].find(close).map(|i| i + 2).unwrap_or(text.len())
    } else {
        first.len_utf8()
    };

    Some(text.split_at(len))
}

fn is_name(piece: &str) -> bool {
    piece
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '"' || c == '`' || c == '[')
}

fn starts_statement(keyword: &str, after: &str) -> bool {
    let upper = keyword.to_ascii_uppercase();
    match upper.as_str() {
        "SELECT" => starts_select(after),
        "WITH" => starts_with_clause(after),
        "INSERT" | "REPLACE" => starts_insert(after),
        "UPDATE" => starts_update(after),
        "DELETE" => next_piece(after).is_some_and(|(p, _)| p.eq_ignore_ascii_case("FROM")),
        "CREATE" | "DROP" => next_piece(after).is_some_and(|(p, _)| is_one_of(p, OBJECT_KINDS)),
        "ALTER" => next_piece(after).is_some_and(|(p, _)| p.eq_ignore_ascii_case("TABLE")),
        _ => false,
    }
}

fn starts_select(after: &str) -> bool {
    let Some((first, rest)) = next_piece(after) else {
        return false;
    };
    let Some(c) = first.chars().next() else {
        return false;
    };

    if matches!(c, '*' | '(' | '\'' | '"' | '`' | '[' | '-') || c.is_ascii_digit() {
        return true;
    }
    if is_one_of(first, SELECT_LEADERS) {
        return true;
    }
    if !is_name(first) || is_one_of(first, CLAUSE_KEYWORDS) {
        return false;
    }

    match next_piece(rest) {
        None => true,
        Some((p, rest)) => {
            matches!(p, "," | "." | "(" | ";" | "+" | "-" | "*" | "/" | "|" | "=" | "<" | ">" | "!" | "%")
                || is_one_of(p, SELECT_ITEM_FOLLOWERS)
                || (is_name(p) && !is_one_of(p, CLAUSE_KEYWORDS) && ends_select_item(rest))
        }
    }
}

/// Words that can open a select list.
const SELECT_LEADERS: &[&str] = &[
    "DISTINCT", "ALL", "CASE", "CAST", "COUNT", "SUM", "AVG", "MIN", "MAX", "NOT", "EXISTS",
    "NULL", "TRUE", "FALSE",
];

/// Words that can follow the first expression of a select list.
const SELECT_ITEM_FOLLOWERS: &[&str] = &[
    "FROM", "AS", "IS", "LIKE", "GLOB", "IN", "BETWEEN", "NOT", "AND", "OR", "COLLATE",
];

/// True when an implicit alias (`SELECT region r, ...`) is followed by the end
/// of the select item.
fn ends_select_item(after_alias: &str) -> bool {
    match next_piece(after_alias) {
        None => true,
        Some((p, _)) => p == "," || p == ";" || p.eq_ignore_ascii_case("FROM"),
    }
}

fn starts_with_clause(after: &str) -> bool {
    let Some((mut name, mut rest)) = next_piece(after) else {
        return false;
    };
    if name.eq_ignore_ascii_case("RECURSIVE") {
        match next_piece(rest) {
            Some(next) => (name, rest) = next,
            None => return false,
        }
    }
    if !is_name(name) {
        return false;
    }

    let Some((mut piece, mut rest)) = next_piece(rest) else {
        return false;
    };
    if piece == "(" {
        let Some(close) = rest.find(')') else {
            return false;
        };
        match next_piece(&rest[close + 1..]) {
            Some(next) => (piece, rest) = next,
            None => return false,
        }
    }
    if !piece.eq_ignore_ascii_case("AS") {
        return false;
    }

    match next_piece(rest) {
        Some((p, _)) => p == "(" || p.eq_ignore_ascii_case("MATERIALIZED") || p.eq_ignore_ascii_case("NOT"),
        None => false,
    }
}

fn starts_insert(after: &str) -> bool {
    let Some((piece, rest)) = next_piece(after) else {
        return false;
    };
    if piece.eq_ignore_ascii_case("INTO") {
        return true;
    }
    // INSERT OR REPLACE INTO ...
    piece.eq_ignore_ascii_case("OR")
        && next_piece(rest)
            .and_then(|(_, rest)| next_piece(rest))
            .is_some_and(|(p, _)| p.eq_ignore_ascii_case("INTO"))
}

fn starts_update(after: &str) -> bool {
    let Some((mut name, mut rest)) = next_piece(after) else {
        return false;
    };
    // UPDATE OR IGNORE t SET ...
    if name.eq_ignore_ascii_case("OR") {
        match next_piece(rest).and_then(|(_, rest)| next_piece(rest)) {
            Some(next) => (name, rest) = next,
            None => return false,
        }
    }
    is_name(name) && next_piece(rest).is_some_and(|(p, _)| p.eq_ignore_ascii_case("SET"))
}

/// Cuts explanatory text that follows the statement.
///
/// The statement ends at the first `;` outside quotes and comments. Without a
/// semicolon it ends before a line that reads as prose once parentheses are
/// balanced, or at a blank line unless the next line continues the statement
/// with a clause keyword.
#[derive(Debug, Default, Clone, Copy)]
pub struct StripTrailingText;

impl SanitizeRule for StripTrailingText {
    fn name(&self) -> &'static str {
        "strip_trailing_text"
    }

    fn apply(&self, text: &str) -> Result<String, SanitizationError> {
        let lexed = tokenize(text);

        for (depth, token) in lexed.with_depth() {
            if token.is_punct(';') {
                return Ok(text[..token.end()].to_string());
            }
            if depth > 0 || token.kind != TokenKind::Whitespace || !token.text.contains('\n') {
                continue;
            }
            let line = text[token.end()..].lines().next().unwrap_or_default();
            let blank_line = token.text.matches('\n').count() >= 2;
            if (blank_line && !opens_with_clause(line)) || is_prose_line(line) {
                return Ok(text[..token.start].trim_end().to_string());
            }
        }

        Ok(text.trim_end().to_string())
    }
}

fn opens_with_clause(line: &str) -> bool {
    let line = line.trim_start();
    next_word(line).is_some_and(|(word, start)| start == 0 && is_one_of(word, CLAUSE_KEYWORDS))
}

/// A line reads as prose when it does not open with a clause keyword and
/// either ends like a sentence or is a run of plain words led by a
/// capitalized one ("This query lists every region").
fn is_prose_line(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() || opens_with_clause(line) {
        return false;
    }
    if line.ends_with(['.', ':', '!', '?']) {
        return true;
    }

    let words: Vec<&str> = line.split_whitespace().collect();
    let plain_words = words.iter().all(|w| {
        w.trim_end_matches([',', '.'])
            .chars()
            .all(|c| c.is_alphabetic() || c == '\'' || c == '-')
    });
    words.len() >= 3 && plain_words && words.first().is_some_and(|w| is_capitalized(w))
}

/// Collapses whitespace and drops comments, leaving string literals untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct CollapseWhitespace;

impl SanitizeRule for CollapseWhitespace {
    fn name(&self) -> &'static str {
        "collapse_whitespace"
    }

    fn apply(&self, text: &str) -> Result<String, SanitizationError> {
        let mut out = String::with_capacity(text.len());
        for token in tokenize(text).tokens {
            if token.is_trivia() {
                if !out.is_empty() && !out.ends_with(' ') {
                    out.push(' ');
                }
            } else {
                out.push_str(token.text);
            }
        }
        Ok(out.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn apply(rule: &dyn SanitizeRule, text: &str) -> String {
        rule.apply(text).unwrap()
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(
            apply(&StripCodeFences, "```sql\nSELECT 1;\n```"),
            "SELECT 1;"
        );
        assert_eq!(apply(&StripCodeFences, "```SQLite\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(apply(&StripCodeFences, "```\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(apply(&StripCodeFences, "  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn test_strip_code_fences_keeps_fragment_after_tag() {
        assert_eq!(
            apply(&StripCodeFences, "```sql\nite SELECT 1\n```"),
            "ite SELECT 1"
        );
    }

    #[test]
    fn test_strip_leading_prose_drops_fragment() {
        assert_eq!(
            apply(&StripLeadingProse, "ite SELECT region FROM sales"),
            "SELECT region FROM sales"
        );
    }

    #[test]
    fn test_strip_leading_prose_ignores_apostrophes() {
        assert_eq!(
            apply(&StripLeadingProse, "Here's the query you'll want:\nSELECT * FROM sales"),
            "SELECT * FROM sales"
        );
    }

    #[test]
    fn test_strip_leading_prose_skips_keywords_used_as_words() {
        assert_eq!(
            apply(
                &StripLeadingProse,
                "To select the rows and update the view, run: SELECT amount FROM sales"
            ),
            "SELECT amount FROM sales"
        );
        assert_eq!(
            apply(&StripLeadingProse, "With this query: WITH t AS (SELECT 1) SELECT * FROM t"),
            "WITH t AS (SELECT 1) SELECT * FROM t"
        );
    }

    #[test]
    fn test_strip_leading_prose_requires_word_boundary() {
        assert_eq!(
            StripLeadingProse.apply("a selection of rows"),
            Err(SanitizationError::NoStatementKeyword)
        );
    }

    #[test]
    fn test_strip_leading_prose_recognizes_mutations() {
        assert_eq!(
            apply(&StripLeadingProse, "Sure. DELETE FROM sales"),
            "DELETE FROM sales"
        );
        assert_eq!(
            apply(&StripLeadingProse, "ok: UPDATE sales SET amount = 0"),
            "UPDATE sales SET amount = 0"
        );
        assert_eq!(
            apply(&StripLeadingProse, "INSERT OR REPLACE INTO t VALUES (1)"),
            "INSERT OR REPLACE INTO t VALUES (1)"
        );
        assert_eq!(apply(&StripLeadingProse, "DROP TABLE t"), "DROP TABLE t");
    }

    #[test]
    fn test_strip_leading_prose_keeps_statement_at_start() {
        for sql in [
            "SELECT region r, SUM(amount) AS total FROM sales GROUP BY region",
            "SELECT amount IS NULL AS missing FROM sales",
            "SELECT region LIKE 'N%' AS north FROM sales",
            "SELECT NOT EXISTS (SELECT 1 FROM sales)",
            "select region r from sales",
        ] {
            assert_eq!(apply(&StripLeadingProse, sql), sql);
        }
    }

    #[test]
    fn test_strip_leading_prose_prefers_line_start_over_sentence() {
        assert_eq!(
            apply(
                &StripLeadingProse,
                "I will select region, amount from the table:\n\nSELECT region, amount FROM sales"
            ),
            "SELECT region, amount FROM sales"
        );
    }

    #[test]
    fn test_strip_leading_prose_falls_back_to_unshaped_keyword() {
        assert_eq!(
            apply(&StripLeadingProse, "Answer:\nSELECT x'ff' AS raw"),
            "SELECT x'ff' AS raw"
        );
    }

    #[test]
    fn test_select_shapes() {
        assert!(starts_select(" region r, amount FROM sales"));
        assert!(starts_select(" amount BETWEEN 1 AND 5 FROM sales"));
        assert!(starts_select(" EXISTS (SELECT 1)"));
        assert!(!starts_select(" the rows and update the view"));
        assert!(!starts_select(" FROM sales"));
    }

    #[test]
    fn test_strip_leading_prose_no_keyword() {
        assert_eq!(
            StripLeadingProse.apply("I'm not sure what you mean."),
            Err(SanitizationError::NoStatementKeyword)
        );
    }

    #[test]
    fn test_strip_trailing_text_after_semicolon() {
        assert_eq!(
            apply(
                &StripTrailingText,
                "SELECT ';' AS s FROM t; This returns a semicolon."
            ),
            "SELECT ';' AS s FROM t;"
        );
    }

    #[test]
    fn test_strip_trailing_text_blank_line() {
        assert_eq!(
            apply(
                &StripTrailingText,
                "SELECT region\nFROM sales\n\nThis groups the sales by region"
            ),
            "SELECT region\nFROM sales"
        );
    }

    #[test]
    fn test_strip_trailing_text_prose_line() {
        assert_eq!(
            apply(
                &StripTrailingText,
                "SELECT region\nFROM sales\nThis query lists every region."
            ),
            "SELECT region\nFROM sales"
        );
    }

    #[test]
    fn test_strip_trailing_text_blank_line_before_clause() {
        assert_eq!(
            apply(
                &StripTrailingText,
                "SELECT region\nFROM sales\n\nWHERE amount > 5;"
            ),
            "SELECT region\nFROM sales\n\nWHERE amount > 5;"
        );
        assert_eq!(
            apply(&StripTrailingText, "SELECT region\nFROM sales\n\nORDER BY region"),
            "SELECT region\nFROM sales\n\nORDER BY region"
        );
    }

    #[test]
    fn test_strip_trailing_text_unpunctuated_prose_line() {
        assert_eq!(
            apply(
                &StripTrailingText,
                "SELECT region FROM sales\nThis query lists every region"
            ),
            "SELECT region FROM sales"
        );
    }

    #[test]
    fn test_prose_line_detection() {
        assert!(is_prose_line("This query lists every region"));
        assert!(is_prose_line("It returns one row per region."));
        assert!(!is_prose_line("WHERE amount > 5"));
        assert!(!is_prose_line("  SUM(amount) AS total"));
        assert!(!is_prose_line("sales s"));
        assert!(!is_prose_line(""));
    }

    #[test]
    fn test_strip_trailing_text_keeps_multiline_statement() {
        let sql = "SELECT region,\n  SUM(amount)\nFROM sales\nGROUP BY region";
        assert_eq!(apply(&StripTrailingText, sql), sql);
    }

    #[test]
    fn test_strip_trailing_text_blank_line_inside_literal_is_kept() {
        let sql = "SELECT 'a\n\nb' AS x";
        assert_eq!(apply(&StripTrailingText, sql), sql);
    }

    #[test]
    fn test_collapse_whitespace_preserves_literals() {
        assert_eq!(
            apply(
                &CollapseWhitespace,
                "SELECT  region,\n\t'two  spaces'\nFROM sales -- note\nWHERE 1"
            ),
            "SELECT region, 'two  spaces' FROM sales WHERE 1"
        );
    }
}
