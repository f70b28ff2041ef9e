//! Shared fixtures for the integration suites.

use db_ask::db::{SqliteClient, StoreClient};
use db_ask::pipeline::PipelineConfig;
use std::time::Duration;

const SALES_SEED: &[&str] = &[
    "CREATE TABLE sales (id INTEGER PRIMARY KEY, region TEXT NOT NULL, amount REAL, sold_on DATE)",
    "INSERT INTO sales (region, amount, sold_on) VALUES
        ('North', 120.0, '2024-01-03'),
        ('South', 80.5, '2024-01-04'),
        ('North', 30.0, '2024-02-11'),
        ('East', 55.25, '2024-02-12'),
        ('South', 19.5, '2024-03-01')",
    "CREATE TABLE regions (name TEXT, manager TEXT)",
    "INSERT INTO regions VALUES ('North', 'Ada'), ('South', 'Grace'), ('East', 'Linus')",
];

/// Runs seed statements against a client.
pub async fn seed(client: &SqliteClient, statements: &[&str]) {
    for statement in statements {
        sqlx::query(statement)
            .execute(client.pool())
            .await
            .unwrap();
    }
}

/// An in-memory database with `sales` and `regions` tables.
pub async fn sales_store() -> SqliteClient {
    let client = SqliteClient::in_memory().await.unwrap();
    seed(&client, SALES_SEED).await;
    client
}

/// The same data as a boxed store, ready for a session.
pub async fn boxed_sales_store() -> Box<dyn StoreClient> {
    Box::new(sales_store().await)
}

/// Pipeline defaults without the pause after transient failures.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        generation_backoff: Duration::ZERO,
        ..PipelineConfig::default()
    }
}
