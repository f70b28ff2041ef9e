//! Schema introspection integration tests.

use super::common::{sales_store, seed};
use db_ask::config::ConnectionConfig;
use db_ask::db::{self, ColumnType, IntrospectionOptions, SqliteClient, StoreClient, Value};
use db_ask::error::AskError;
use pretty_assertions::assert_eq;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_introspect_tables_in_creation_order() {
    let client = sales_store().await;
    let schema = client
        .introspect_schema(&IntrospectionOptions::default())
        .await
        .unwrap();

    let names: Vec<&str> = schema.tables().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["sales", "regions"]);

    let sales = schema.table("SALES").unwrap();
    let columns: Vec<(&str, ColumnType)> = sales
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.column_type))
        .collect();
    assert_eq!(
        columns,
        vec![
            ("id", ColumnType::Integer),
            ("region", ColumnType::Text),
            ("amount", ColumnType::Real),
            ("sold_on", ColumnType::DateTime),
        ]
    );
    assert!(!sales.column("region").unwrap().is_nullable);
    assert_eq!(sales.sample_rows.len(), 3);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_sample_rows_capped_and_cells_truncated() {
    let client = SqliteClient::in_memory().await.unwrap();
    let long_note = "x".repeat(200);
    let insert = format!(
        "INSERT INTO notes VALUES {}",
        (0..10)
            .map(|_| format!("('{long_note}')"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    seed(&client, &["CREATE TABLE notes (body TEXT)", &insert]).await;

    let schema = client
        .introspect_schema(&IntrospectionOptions {
            sample_rows: 50,
            max_cell_chars: 10,
        })
        .await
        .unwrap();

    let notes = schema.table("notes").unwrap();
    assert_eq!(notes.sample_rows.len(), 5);
    match &notes.sample_rows[0][0] {
        Value::String(s) => {
            assert!(s.len() < long_note.len());
            assert!(s.ends_with("..."));
        }
        other => panic!("Expected String sample, got {:?}", other),
    }
}

#[tokio::test]
async fn test_untyped_columns_use_observed_type() {
    let client = SqliteClient::in_memory().await.unwrap();
    seed(
        &client,
        &[
            "CREATE TABLE loose (a, b)",
            "INSERT INTO loose VALUES (1, 'one'), (2, 'two')",
        ],
    )
    .await;

    let schema = client
        .introspect_schema(&IntrospectionOptions::default())
        .await
        .unwrap();
    let loose = schema.table("loose").unwrap();
    assert_eq!(loose.columns[0].column_type, ColumnType::Integer);
    assert_eq!(loose.columns[1].column_type, ColumnType::Text);
}

#[tokio::test]
async fn test_empty_store_fails_introspection() {
    let client = SqliteClient::in_memory().await.unwrap();
    let err = client
        .introspect_schema(&IntrospectionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AskError::Introspection(_)));
}

#[tokio::test]
async fn test_connect_to_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");

    {
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = sqlx::SqlitePool::connect_with(options).await.unwrap();
        let writer = SqliteClient::from_pool(pool);
        seed(
            &writer,
            &[
                "CREATE TABLE products (name TEXT, price REAL)",
                "INSERT INTO products VALUES ('pen', 1.5)",
            ],
        )
        .await;
        writer.close().await.unwrap();
    }

    let config = ConnectionConfig::from_connection_string(&format!(
        "sqlite://{}",
        path.display()
    ))
    .unwrap();
    let store = db::connect(&config).await.unwrap();
    let schema = assert_ok!(
        store
            .introspect_schema(&IntrospectionOptions::default())
            .await
    );

    assert!(schema.has_table("products"));
    assert!(schema.has_column("PRICE"));
    assert!(schema.format_for_llm(3).contains("Table: products"));
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_connect_to_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config =
        ConnectionConfig::from_connection_string(&dir.path().join("absent.db").to_string_lossy())
            .unwrap();

    let err = db::connect(&config).await.err().unwrap();
    assert!(matches!(err, AskError::Connection(_)));
    assert!(err.to_string().contains("does not exist"));
}
