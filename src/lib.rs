//! db-ask - ask questions about tabular data in plain language.
//!
//! This library exposes the core modules for use by the binary and in
//! integration tests.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod query;
pub mod sanitize;
pub mod validate;
