//! Starter questions derived from the schema.

use crate::db::SchemaDescription;

/// Maximum number of suggested questions.
pub const MAX_SUGGESTIONS: usize = 10;

/// Produces up to `MAX_SUGGESTIONS` example questions for the schema.
///
/// Every table gets row, count and distinct-value questions; tables with a
/// numeric column also get aggregate and top-N questions about it.
pub fn suggest_questions(schema: &SchemaDescription) -> Vec<String> {
    let mut questions = Vec::new();

    for table in schema.tables() {
        let name = &table.name;
        questions.push(format!("Show me the first 10 rows from {name}"));
        questions.push(format!("Count the total number of records in {name}"));
        if let Some(first) = table.columns.first() {
            questions.push(format!("Show me all unique values of {} in {name}", first.name));
        }

        if let Some(numeric) = table.columns.iter().find(|c| c.column_type.is_numeric()) {
            let column = &numeric.name;
            questions.push(format!("Calculate the average of {column} in {name}"));
            questions.push(format!("Find the maximum value of {column} in {name}"));
            questions.push(format!("Show me the top 5 records by {column} in {name}"));
        }

        if questions.len() >= MAX_SUGGESTIONS {
            break;
        }
    }

    questions.truncate(MAX_SUGGESTIONS);
    questions
}
