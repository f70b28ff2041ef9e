//! Validation and execution integration tests against a real SQLite store.

use super::common::sales_store;
use db_ask::db::{
    ExecutionBudget, ExecutionErrorKind, IntrospectionOptions, SchemaDescription, SqliteClient,
    StoreClient, Value,
};
use db_ask::query::QueryExecutor;
use db_ask::sanitize::Sanitizer;
use db_ask::validate::{StatementType, ValidatedSql, ValidationError, Validator};
use pretty_assertions::assert_eq;
use std::time::Duration;

async fn schema_of(client: &SqliteClient) -> SchemaDescription {
    client
        .introspect_schema(&IntrospectionOptions::default())
        .await
        .unwrap()
}

fn validated(raw: &str, schema: &SchemaDescription) -> ValidatedSql {
    let candidate = Sanitizer::new().sanitize(raw, 1).unwrap();
    Validator::new(false).validate(candidate, schema).unwrap()
}

#[tokio::test]
async fn test_sanitized_output_executes() {
    let client = sales_store().await;
    let schema = schema_of(&client).await;
    let sql = validated(
        "ite SELECT region, SUM(amount) AS total FROM sales GROUP BY region ORDER BY region;",
        &schema,
    );
    assert_eq!(sql.statement_type(), StatementType::Select);

    let executor = QueryExecutor::new(&client, ExecutionBudget::default());
    let result = executor.execute(&sql).await.unwrap();

    let columns: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["region", "total"]);
    assert_eq!(
        result.rows,
        vec![
            vec![Value::from("East"), Value::Float(55.25)],
            vec![Value::from("North"), Value::Float(150.0)],
            vec![Value::from("South"), Value::Float(100.0)],
        ]
    );
    assert!(!result.was_truncated);
}

#[tokio::test]
async fn test_join_with_aliases_executes() {
    let client = sales_store().await;
    let schema = schema_of(&client).await;
    let sql = validated(
        "```sql\nSELECT r.manager, COUNT(*) AS n\nFROM sales s JOIN regions r ON r.name = s.region\nGROUP BY r.manager\nORDER BY n DESC, r.manager\n```",
        &schema,
    );

    let result = QueryExecutor::new(&client, ExecutionBudget::default())
        .execute(&sql)
        .await
        .unwrap();
    assert_eq!(result.row_count, 3);
    assert_eq!(result.rows[0][0], Value::from("Ada"));
}

#[tokio::test]
async fn test_row_cap_truncates_without_failing() {
    let client = sales_store().await;
    let schema = schema_of(&client).await;
    let sql = validated("SELECT * FROM sales", &schema);

    let budget = ExecutionBudget {
        max_rows: 2,
        timeout: Duration::from_secs(5),
    };
    let result = QueryExecutor::new(&client, budget)
        .execute(&sql)
        .await
        .unwrap();

    assert_eq!(result.row_count, 2);
    assert!(result.was_truncated);
    assert_eq!(result.total_rows, Some(5));
    assert_eq!(
        result.truncation_warning().as_deref(),
        Some("Result truncated: showing 2 of 5 rows")
    );
}

#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let client = sales_store().await;
    let schema = schema_of(&client).await;
    let sql = validated("SELECT region, amount FROM sales WHERE amount > 1000", &schema);

    let result = QueryExecutor::new(&client, ExecutionBudget::default())
        .execute(&sql)
        .await
        .unwrap();
    assert!(result.is_empty());
    assert_eq!(result.columns.len(), 2);
}

#[tokio::test]
async fn test_store_errors_are_classified() {
    let client = sales_store().await;
    let schema = schema_of(&client).await;
    let executor = QueryExecutor::new(&client, ExecutionBudget::default());

    let err = executor
        .execute(&validated("SELECT median(amount) FROM sales", &schema))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ExecutionErrorKind::Reference);

    let err = executor
        .execute(&validated("SELECT region FROM sales WHERE", &schema))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ExecutionErrorKind::Syntax);
}

#[tokio::test]
async fn test_validator_rejects_before_execution() {
    let client = sales_store().await;
    let schema = schema_of(&client).await;
    let validator = Validator::new(false);
    let sanitizer = Sanitizer::new();

    let delete = sanitizer.sanitize("DELETE FROM sales", 1).unwrap();
    assert_eq!(
        validator.validate(delete, &schema).unwrap_err(),
        ValidationError::ForbiddenStatement {
            statement: StatementType::Delete
        }
    );

    let unknown = sanitizer
        .sanitize("SELECT SUM(profit) FROM sales", 1)
        .unwrap();
    assert_eq!(
        validator.validate(unknown, &schema).unwrap_err(),
        ValidationError::UnknownIdentifier {
            token: "profit".to_string()
        }
    );

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
        .fetch_one(client.pool())
        .await
        .unwrap();
    assert_eq!(count, 5);
}

#[tokio::test]
async fn test_mutation_allowed_when_enabled() {
    let client = sales_store().await;
    let schema = schema_of(&client).await;
    let candidate = Sanitizer::new()
        .sanitize("UPDATE sales SET amount = 0 WHERE region = 'East';", 1)
        .unwrap();
    let sql = Validator::new(true).validate(candidate, &schema).unwrap();
    assert_eq!(sql.statement_type(), StatementType::Update);

    QueryExecutor::new(&client, ExecutionBudget::default())
        .execute(&sql)
        .await
        .unwrap();

    let amount: f64 = sqlx::query_scalar("SELECT amount FROM sales WHERE region = 'East'")
        .fetch_one(client.pool())
        .await
        .unwrap();
    assert_eq!(amount, 0.0);
}
