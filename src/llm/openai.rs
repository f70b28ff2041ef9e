//! OpenAI generation client implementation.
//!
//! Implements the GenerationClient trait for OpenAI's chat completions API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AskError, Result};
use crate::llm::{request_error, status_error, GenerationClient, GenerationSettings, Prompt};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI API base URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI client configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Chat completions endpoint, overridable for compatible servers.
    pub url: String,
    pub settings: GenerationSettings,
}

impl OpenAiConfig {
    /// Creates a new config with the given API key and settings.
    pub fn new(api_key: impl Into<String>, settings: GenerationSettings) -> Self {
        Self {
            api_key: api_key.into(),
            url: OPENAI_API_URL.to_string(),
            settings,
        }
    }

    /// Points the client at a different endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        self.settings.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// OpenAI generation client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiClient {
    /// Creates a new OpenAI client with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.settings.timeout)
            .build()
            .map_err(|e| AskError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn build_request(&self, prompt: &Prompt) -> OpenAiRequest {
        OpenAiRequest {
            model: self.config.model().to_string(),
            messages: vec![
                OpenAiMessage {
                    role: "system".to_string(),
                    content: prompt.system().to_string(),
                },
                OpenAiMessage {
                    role: "user".to_string(),
                    content: prompt.user().to_string(),
                },
            ],
            temperature: self.config.settings.temperature,
        }
    }

    fn error_detail(body: &str) -> Option<String> {
        serde_json::from_str::<OpenAiErrorResponse>(body)
            .ok()
            .map(|e| e.error.message)
    }
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let request = self.build_request(prompt);
        debug!(model = %request.model, "OpenAI API request");

        let response = self
            .client
            .post(&self.config.url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error("OpenAI", &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AskError::generation_transient(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(status_error(
                "OpenAI",
                "OPENAI_API_KEY",
                status,
                Self::error_detail(&body),
            ));
        }

        let response: OpenAiResponse = serde_json::from_str(&body)
            .map_err(|e| AskError::generation_fatal(format!("Failed to parse response: {}", e)))?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}
