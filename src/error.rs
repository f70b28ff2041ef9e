//! Error types for db-ask.
//!
//! `AskError` is the error that crosses the caller boundary. Failures that the
//! correction loop recovers from (sanitization, validation, execution) have
//! their own types in the pipeline modules and never surface here directly.

use thiserror::Error;

/// Main error type for db-ask operations.
#[derive(Error, Debug)]
pub enum AskError {
    /// Store connection errors (missing file, unreadable database, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Schema introspection errors (unreadable store, zero tables).
    #[error("Introspection error: {0}")]
    Introspection(String),

    /// Generation backend errors (transport, auth, quota, timeouts).
    #[error("Generation error: {message}")]
    Generation {
        message: String,
        /// Whether retrying the same request may succeed.
        transient: bool,
    },

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller abandoned the request between attempts.
    #[error("Request cancelled")]
    Cancelled,

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AskError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates an introspection error with the given message.
    pub fn introspection(msg: impl Into<String>) -> Self {
        Self::Introspection(msg.into())
    }

    /// Creates a generation error that is worth retrying.
    pub fn generation_transient(msg: impl Into<String>) -> Self {
        Self::Generation {
            message: msg.into(),
            transient: true,
        }
    }

    /// Creates a generation error that will not go away on retry.
    pub fn generation_fatal(msg: impl Into<String>) -> Self {
        Self::Generation {
            message: msg.into(),
            transient: false,
        }
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for generation failures the correction loop may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Generation {
                transient: true,
                ..
            }
        )
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Introspection(_) => "Introspection Error",
            Self::Generation { .. } => "Generation Error",
            Self::Config(_) => "Configuration Error",
            Self::Cancelled => "Cancelled",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using AskError.
pub type Result<T> = std::result::Result<T, AskError>;
