//! Configuration-to-session integration tests.

use super::common::{fast_config, seed};
use clap::Parser;
use db_ask::cli::{resolve_connection, Cli};
use db_ask::config::{Config, StoreTarget};
use db_ask::db::{self, SqliteClient};
use db_ask::llm::{create_client, LlmProvider};
use db_ask::pipeline::Session;
use pretty_assertions::assert_eq;
use std::path::Path;
use tokio_test::assert_ok;

async fn write_database(path: &Path) {
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = sqlx::SqlitePool::connect_with(options).await.unwrap();
    let client = SqliteClient::from_pool(pool);
    seed(
        &client,
        &[
            "CREATE TABLE orders (id INTEGER, total REAL)",
            "INSERT INTO orders VALUES (1, 9.5), (2, 20.0)",
        ],
    )
    .await;
    client.pool().close().await;
}

#[tokio::test]
async fn test_named_connection_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("orders.db");
    write_database(&db_path).await;

    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "[llm]\nprovider = \"mock\"\n\n[pipeline]\nmax_attempts = 2\n\n[connections.shop]\npath = \"{}\"\n",
            db_path.display()
        ),
    )
    .unwrap();

    let cli = Cli::parse_from([
        "ask",
        "--config",
        config_path.to_str().unwrap(),
        "-c",
        "shop",
    ]);
    let mut config = Config::load_from_file(&cli.config_path()).unwrap();
    cli.apply_overrides(&mut config).unwrap();
    assert_eq!(config.llm.provider, LlmProvider::Mock);

    let connection = resolve_connection(&cli, &config).unwrap();
    assert_eq!(connection.target().unwrap(), StoreTarget::File(db_path.clone()));
    assert!(connection.read_only);

    let store = db::connect(&connection).await.unwrap();
    let generator = create_client(
        config.llm.provider,
        config.llm.generation_settings(),
        None,
    )
    .unwrap();
    let session = Session::open(store, generator, config.pipeline.to_pipeline_config())
        .await
        .unwrap();

    assert_eq!(session.config().max_attempts, 2);
    assert!(session.schema().has_table("orders"));

    // The mock backend never produces SQL for an unknown question.
    let response = session.translate_and_run("how many orders?").await.unwrap();
    assert!(!response.is_success());
    assert_eq!(response.attempts.len(), 2);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_read_only_connection_rejects_writes() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("orders.db");
    write_database(&db_path).await;

    let cli = Cli::parse_from(["ask", db_path.to_str().unwrap()]);
    let connection = resolve_connection(&cli, &Config::default()).unwrap();
    let store = db::connect(&connection).await.unwrap();

    let budget = fast_config().budget;
    let err = store
        .execute_query("DELETE FROM orders", &budget)
        .await
        .unwrap_err();
    assert!(err.message.contains("readonly"));

    let result = assert_ok!(
        store
            .execute_query("SELECT COUNT(*) FROM orders", &budget)
            .await
    );
    assert_eq!(result.rows[0][0], db_ask::db::Value::Int(2));
}
