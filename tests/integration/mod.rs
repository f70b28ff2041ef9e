//! Integration tests for db-ask.

pub mod common;
pub mod config_test;
pub mod pipeline_test;
pub mod query_test;
pub mod schema_test;
