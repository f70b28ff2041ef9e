//! Text-generation integration for db-ask.
//!
//! Provides the `GenerationClient` trait and implementations for the
//! supported providers. Pipeline code only ever sees the trait, so a
//! scripted client can stand in for a real vendor in tests.

pub mod factory;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod prompt;

pub use factory::{create_client, resolve_api_key};
pub use gemini::{GeminiClient, GeminiConfig};
pub use mock::{MockGenerationClient, ScriptedReply};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use prompt::{CorrectionContext, Prompt, PromptBuilder, DEFAULT_DIALECT};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AskError, Result};

/// Default timeout for generation requests.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for clients that turn a prompt into raw text.
///
/// Implementations must be thread-safe (Send + Sync) to support async operations.
/// Transport, auth and quota problems are reported as `AskError::Generation`,
/// tagged transient or not. Text that is not SQL is a successful response.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generates a completion for the given prompt.
    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}

/// Settings shared by every backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    /// Model name; `None` selects the provider default.
    pub model: Option<String>,
    /// Sampling temperature. 0.0 is the most deterministic setting.
    pub temperature: f32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.0,
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }
}

/// Generation provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Google Gemini
    #[default]
    Gemini,
    /// OpenAI chat completions
    #[serde(rename = "openai")]
    OpenAi,
    /// Scripted client for testing (no API key required)
    Mock,
}

impl LlmProvider {
    /// Returns the provider as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => gemini::DEFAULT_MODEL,
            Self::OpenAi => openai::DEFAULT_MODEL,
            Self::Mock => "mock",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maps a non-success HTTP status to a generation error.
///
/// 401/403 and 400 will not improve on retry; 429 and 5xx may.
pub(crate) fn status_error(
    provider: &str,
    key_var: &str,
    status: reqwest::StatusCode,
    detail: Option<String>,
) -> AskError {
    use reqwest::StatusCode;

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AskError::generation_fatal(format!(
            "Authentication failed. Check your {key_var}."
        )),
        StatusCode::TOO_MANY_REQUESTS => {
            AskError::generation_transient("Rate limited. Please wait and try again.")
        }
        _ => {
            let message = match detail {
                Some(detail) => format!("{provider} API error ({status}): {detail}"),
                None => format!("{provider} API error ({status})"),
            };
            if status.is_server_error() {
                AskError::generation_transient(message)
            } else {
                AskError::generation_fatal(message)
            }
        }
    }
}

/// Maps a transport failure to a generation error.
pub(crate) fn request_error(provider: &str, error: &reqwest::Error) -> AskError {
    if error.is_timeout() {
        AskError::generation_transient("Request timed out. Try again.")
    } else if error.is_connect() {
        AskError::generation_transient(format!(
            "Failed to connect to the {provider} API. Check your network."
        ))
    } else {
        AskError::generation_fatal(format!("Request failed: {}", error))
    }
}
