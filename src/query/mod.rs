//! Query execution for db-ask.
//!
//! Isolates running validated statements against the store from the
//! correction loop that produces them.

pub mod executor;

pub use executor::QueryExecutor;
