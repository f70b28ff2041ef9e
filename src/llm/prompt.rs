//! Prompt construction for generation requests.
//!
//! Builds the instruction payload from the schema description, the user's
//! question and, on retries, the previous failure. Building is a pure
//! function of its inputs, so identical inputs give identical prompts.

use crate::db::{SchemaDescription, TableInfo};
use serde::Serialize;

/// Default SQL dialect the model is asked to produce.
pub const DEFAULT_DIALECT: &str = "SQLite";

/// Maximum sample rows rendered per table.
pub const DEFAULT_PROMPT_SAMPLE_ROWS: usize = 3;

/// A composed generation request.
///
/// Split into the system instructions and the user turn so chat-style
/// backends can send them as separate messages. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    system: String,
    user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// System instructions, including the schema.
    pub fn system(&self) -> &str {
        &self.system
    }

    /// The user turn: the question and any correction context.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The whole payload as a single text, for backends without roles.
    pub fn full_text(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

/// What the previous attempt produced and why it was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionContext {
    /// The rejected candidate SQL, or the raw output when no SQL was recovered.
    pub previous_output: String,
    /// Human-readable failure reason.
    pub failure: String,
    /// Extra guidance for the next attempt, e.g. to narrow the query.
    pub hint: Option<&'static str>,
}

impl CorrectionContext {
    pub fn new(previous_output: impl Into<String>, failure: impl Into<String>) -> Self {
        Self {
            previous_output: previous_output.into(),
            failure: failure.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: Option<&'static str>) -> Self {
        self.hint = hint;
        self
    }
}

/// Builds prompts for SQL generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBuilder {
    dialect: String,
    sample_rows: usize,
    allow_mutations: bool,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_DIALECT)
    }
}

impl PromptBuilder {
    /// Creates a builder targeting the given SQL dialect.
    pub fn new(dialect: impl Into<String>) -> Self {
        Self {
            dialect: dialect.into(),
            sample_rows: DEFAULT_PROMPT_SAMPLE_ROWS,
            allow_mutations: false,
        }
    }

    /// Sets how many sample rows are shown per table.
    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    /// Allows the model to produce data-modifying statements.
    pub fn with_mutations(mut self, allow: bool) -> Self {
        self.allow_mutations = allow;
        self
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    /// Builds the prompt for one attempt.
    pub fn build(
        &self,
        schema: &SchemaDescription,
        question: &str,
        correction: Option<&CorrectionContext>,
    ) -> Prompt {
        let system = self.system_prompt(schema);

        let mut user = format!("Question: {}\n\n", question.trim());
        if let Some(correction) = correction {
            user.push_str(&format_correction(correction));
        }
        user.push_str("Generate SQL query:");

        Prompt::new(system, user)
    }

    /// Builds a prompt asking for a plain-language explanation of a statement.
    pub fn build_explanation_prompt(&self, sql: &str) -> Prompt {
        Prompt::new(
            format!(
                "You are an expert {} developer. Explain what the following SQL query does in simple terms.",
                self.dialect
            ),
            format!("SQL Query: {}\n\nExplain what this query does:", sql.trim()),
        )
    }

    fn system_prompt(&self, schema: &SchemaDescription) -> String {
        let statement_rule = if self.allow_mutations {
            "2. Start the response directly with SELECT, WITH, INSERT, UPDATE or DELETE"
        } else {
            "2. Start the response directly with SELECT or WITH; only read-only queries are allowed"
        };

        let mut prompt = format!(
            "You are an expert SQL developer. Your task is to convert natural language questions into SQL queries.

CRITICAL RULES:
1. Generate ONLY the SQL query - no explanations, no markdown, no extra text
{statement_rule}
3. Use {dialect} syntax
4. Use only the table and column names listed in the schema, spelled exactly as shown
5. Return exactly one statement and end it with a semicolon
6. Use LIMIT when the question does not need every row
7. Use aggregate functions (COUNT, SUM, AVG, MIN, MAX) with GROUP BY where appropriate
8. Use table aliases for clarity in queries that join tables

{schema}",
            dialect = self.dialect,
            schema = schema.format_for_llm(self.sample_rows),
        );

        if schema.tables().len() > 1 {
            prompt.push_str(
                "\nRELATIONSHIP HINTS:
- When joining tables, look for common column names (like 'id', 'customer_id', etc.)
- Use appropriate JOIN types (INNER, LEFT) based on the question
- When comparing data across tables, use UNION or JOIN as appropriate
",
            );
        }

        if let Some(first) = schema.tables().first() {
            prompt.push_str("\nEXAMPLES:\n");
            prompt.push_str(&few_shot_examples(first));
        }

        prompt.push_str(
            "\nThe user will ask a question about the data. Generate ONLY the SQL query starting with a SQL keyword.",
        );
        prompt
    }
}

fn format_correction(correction: &CorrectionContext) -> String {
    let mut text = format!(
        "Your previous answer was rejected.\nPrevious answer:\n{}\nError: {}\n",
        correction.previous_output.trim(),
        correction.failure
    );
    if let Some(hint) = correction.hint {
        text.push_str(&format!("Hint: {hint}\n"));
    }
    text.push_str("Fix the problem and answer the original question again.\n\n");
    text
}

/// Question/SQL pairs grounded in a real table so the model sees the expected shape.
fn few_shot_examples(table: &TableInfo) -> String {
    let name = &table.name;
    let mut examples = format!(
        "Question: How many records are in {name}?\nSQL: SELECT COUNT(*) FROM {name};\n"
    );

    if let Some(column) = table.columns.iter().find(|c| c.column_type.is_numeric()) {
        examples.push_str(&format!(
            "Question: What is the average {col} in {name}?\nSQL: SELECT AVG({col}) FROM {name};\n",
            col = column.name
        ));
    }

    if let Some(column) = table.columns.first() {
        examples.push_str(&format!(
            "Question: Show the first 10 values of {col} in {name}\nSQL: SELECT {col} FROM {name} LIMIT 10;\n",
            col = column.name
        ));
    }

    examples
}
