//! Generation client factory.
//!
//! Centralizes provider-specific logic for creating generation clients.

use crate::error::{AskError, Result};
use crate::llm::{
    GeminiClient, GeminiConfig, GenerationClient, GenerationSettings, LlmProvider,
    MockGenerationClient, OpenAiClient, OpenAiConfig,
};

/// Environment variables consulted for each provider's API key, in order.
fn key_vars(provider: LlmProvider) -> &'static [&'static str] {
    match provider {
        LlmProvider::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        LlmProvider::OpenAi => &["OPENAI_API_KEY"],
        LlmProvider::Mock => &[],
    }
}

/// Resolves the API key for a provider.
///
/// The explicit key wins over the environment. Empty values are ignored.
pub fn resolve_api_key(provider: LlmProvider, api_key: Option<String>) -> Option<String> {
    api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| {
            key_vars(provider)
                .iter()
                .filter_map(|var| std::env::var(var).ok())
                .find(|k| !k.trim().is_empty())
        })
}

/// Creates a generation client for the given provider.
///
/// If `api_key` is provided, it takes precedence over environment variables:
/// `GEMINI_API_KEY` or `GOOGLE_API_KEY` for Gemini, `OPENAI_API_KEY` for OpenAI.
pub fn create_client(
    provider: LlmProvider,
    settings: GenerationSettings,
    api_key: Option<String>,
) -> Result<Box<dyn GenerationClient>> {
    if provider == LlmProvider::Mock {
        return Ok(Box::new(MockGenerationClient::new()));
    }

    let key = resolve_api_key(provider, api_key).ok_or_else(|| {
        AskError::config(format!(
            "No API key configured for {provider}. Pass --api-key or set {}.",
            key_vars(provider).join(" or ")
        ))
    })?;

    match provider {
        LlmProvider::Gemini => Ok(Box::new(GeminiClient::new(GeminiConfig::new(key, settings))?)),
        LlmProvider::OpenAi => Ok(Box::new(OpenAiClient::new(OpenAiConfig::new(key, settings))?)),
        LlmProvider::Mock => Ok(Box::new(MockGenerationClient::new())),
    }
}
