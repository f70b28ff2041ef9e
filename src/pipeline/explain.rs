//! Plain-language explanations of accepted statements.

use tracing::debug;

use crate::error::Result;
use crate::llm::{GenerationClient, PromptBuilder};

/// Asks the generation backend to explain what `sql` does.
pub async fn explain_sql(
    client: &dyn GenerationClient,
    builder: &PromptBuilder,
    sql: &str,
) -> Result<String> {
    debug!(sql = %sql, "Requesting explanation");
    let prompt = builder.build_explanation_prompt(sql);
    let explanation = client.generate(&prompt).await?;
    Ok(explanation.trim().to_string())
}
