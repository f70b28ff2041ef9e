//! Mock generation client for testing.
//!
//! Provides deterministic responses: a scripted queue consumed one reply per
//! call, then pattern matches against the prompt's user turn, then a fixed
//! fallback.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{AskError, Result};
use crate::llm::{GenerationClient, Prompt};

/// Reply returned when nothing else matches.
const FALLBACK_REPLY: &str = "I don't understand that question. Could you please rephrase it?";

/// One scripted reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Raw text, returned as the model output.
    Text(String),
    /// A transport failure worth retrying.
    TransientError(String),
    /// A failure that will not go away on retry.
    FatalError(String),
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    fn into_result(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::TransientError(message) => Err(AskError::generation_transient(message)),
            Self::FatalError(message) => Err(AskError::generation_fatal(message)),
        }
    }
}

/// Mock generation client that returns canned responses.
///
/// Used for unit testing without making real API calls. Every prompt it
/// receives is recorded for later inspection.
#[derive(Debug, Default)]
pub struct MockGenerationClient {
    script: Mutex<VecDeque<ScriptedReply>>,
    /// Custom response mappings (pattern -> response).
    custom_responses: Vec<(String, String)>,
    prompts: Mutex<Vec<Prompt>>,
}

impl MockGenerationClient {
    /// Creates a new mock client with no script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client that returns the given replies in order.
    pub fn scripted(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Appends a reply to the script.
    pub fn then(self, reply: ScriptedReply) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
        self
    }

    /// Adds a custom response mapping.
    ///
    /// When the question contains `pattern`, the mock will return `response`.
    pub fn with_response(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.custom_responses.push((pattern.into(), response.into()));
        self
    }

    /// Returns every prompt received so far, in order.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }

    /// Number of `generate` calls made.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }

    fn mock_response(&self, input: &str) -> String {
        let input_lower = input.to_lowercase();

        self.custom_responses
            .iter()
            .find(|(pattern, _)| input_lower.contains(&pattern.to_lowercase()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| FALLBACK_REPLY.to_string())
    }
}

#[async_trait]
impl GenerationClient for MockGenerationClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }

        let scripted = self
            .script
            .lock()
            .map_err(|_| AskError::internal("mock script lock poisoned"))?
            .pop_front();

        match scripted {
            Some(reply) => reply.into_result(),
            None => Ok(self.mock_response(prompt.user())),
        }
    }
}
