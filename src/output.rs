//! Rendering of translation responses for the command line.

use crate::db::QueryResult;
use crate::error::{AskError, Result};
use crate::pipeline::TranslationResponse;
use serde_json::json;

/// Renders a response as human-readable text.
pub fn render_text(response: &TranslationResponse) -> String {
    let mut output = String::new();

    if let Some(sql) = &response.sql {
        output.push_str(&format!("SQL: {sql}\n\n"));
    }

    if let Some(error) = &response.error {
        output.push_str(&format!("Error: {error}\n"));
        for attempt in &response.attempts {
            if let Some(failure) = attempt.failure() {
                output.push_str(&format!("  attempt {}: {}\n", attempt.number, failure));
            }
        }
        return output.trim_end().to_string();
    }

    if let Some(result) = &response.rows {
        output.push_str(&render_result(result));
        if response.attempts.len() > 1 {
            output.push_str(&format!(
                "\nAnswered after {} attempts.",
                response.attempts.len()
            ));
        }
    }

    output.trim_end().to_string()
}

/// Renders a result set as an aligned table followed by a summary line.
pub fn render_result(result: &QueryResult) -> String {
    let headers: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
    let rows: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|v| v.to_display_string()).collect())
        .collect();

    let mut output = format_table(&headers, &rows);
    if !output.is_empty() {
        output.push('\n');
    }

    let noun = if result.row_count == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "({} {noun} in {} ms)",
        result.row_count,
        result.execution_time.as_millis()
    ));
    if let Some(warning) = result.truncation_warning() {
        output.push('\n');
        output.push_str(&warning);
    }
    output
}

/// Renders a response as a JSON document.
pub fn render_json(response: &TranslationResponse) -> Result<String> {
    let document = json!({
        "question": response.question,
        "sql": response.sql,
        "columns": response
            .rows
            .as_ref()
            .map(|r| r.columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>()),
        "rows": response.rows.as_ref().map(QueryResult::records),
        "row_count": response.rows.as_ref().map(|r| r.row_count),
        "was_truncated": response.rows.as_ref().map(|r| r.was_truncated),
        "total_rows": response.rows.as_ref().and_then(|r| r.total_rows),
        "error": response.error,
        "attempts": response.attempts,
    });

    serde_json::to_string_pretty(&document)
        .map_err(|e| AskError::internal(format!("Failed to serialize response: {e}")))
}

/// Formats a table as a string for display.
fn format_table(headers: &[String], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let mut output = String::new();

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    output.push_str(header_line.join(" │ ").trim_end());
    output.push('\n');

    let separator: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    output.push_str(&separator.join("─┼─"));
    output.push('\n');

    for row in rows {
        let row_line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = width)
            })
            .collect();
        output.push_str(row_line.join(" │ ").trim_end());
        output.push('\n');
    }

    output.trim_end().to_string()
}
