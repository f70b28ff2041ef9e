//! End-to-end pipeline tests: scripted generation against real and
//! recording stores.

use super::common::{boxed_sales_store, fast_config, sales_store};
use db_ask::db::{
    ExecutionError, ExecutionErrorKind, IntrospectionOptions, MockStoreClient, QueryResult,
    ResultColumn, StoreClient, Value,
};
use db_ask::error::AskError;
use db_ask::llm::{MockGenerationClient, ScriptedReply};
use db_ask::output::render_json;
use db_ask::pipeline::{AttemptFailure, CorrectionLoop, LoopOutcome, PipelineConfig, Session};
use db_ask::sanitize::SanitizationError;
use db_ask::validate::{StatementType, ValidationError};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn replies(texts: &[&str]) -> Vec<ScriptedReply> {
    texts.iter().map(|t| ScriptedReply::text(*t)).collect()
}

#[tokio::test]
async fn test_prose_fragment_before_select_is_answered() {
    let generator = MockGenerationClient::scripted(replies(&[
        "ite SELECT region, SUM(amount) FROM sales GROUP BY region ORDER BY region",
    ]));
    let session = Session::open(boxed_sales_store().await, Box::new(generator), fast_config())
        .await
        .unwrap();

    let response = session
        .translate_and_run("total sales by region")
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(
        response.sql.as_deref(),
        Some("SELECT region, SUM(amount) FROM sales GROUP BY region ORDER BY region")
    );
    let rows = response.rows.unwrap();
    assert_eq!(rows.row_count, 3);
    assert_eq!(rows.rows[1], vec![Value::from("North"), Value::Float(150.0)]);
    assert_eq!(response.attempts.len(), 1);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_unknown_column_is_corrected_on_second_attempt() {
    let store = sales_store().await;
    let schema = store
        .introspect_schema(&IntrospectionOptions::default())
        .await
        .unwrap();
    let config = fast_config();
    let generator = MockGenerationClient::scripted(replies(&[
        "SELECT SUM(profit) FROM sales",
        "SELECT SUM(amount) FROM sales",
    ]));

    let outcome = CorrectionLoop::new(&store, &schema, &generator, &config)
        .run("total profit", &CancellationToken::new())
        .await
        .unwrap();

    let LoopOutcome::Succeeded {
        candidate,
        result,
        attempts,
    } = outcome
    else {
        panic!("expected success");
    };
    assert_eq!(attempts.len(), 2);
    assert_eq!(candidate.sql, "SELECT SUM(amount) FROM sales");
    assert_eq!(candidate.attempt, 2);
    assert_eq!(result.rows, vec![vec![Value::Float(305.25)]]);
    assert_eq!(
        attempts[0].failure(),
        Some(&AttemptFailure::Validation(
            ValidationError::UnknownIdentifier {
                token: "profit".to_string()
            }
        ))
    );

    let retry = &generator.prompts()[1];
    assert!(retry.user().contains("SELECT SUM(profit) FROM sales"));
    assert!(retry.user().contains("unknown identifier 'profit'"));
    assert!(retry.user().starts_with("Question: total profit"));
}

#[tokio::test]
async fn test_empty_output_exhausts_attempts_without_execution() {
    let schema = sales_store()
        .await
        .introspect_schema(&IntrospectionOptions::default())
        .await
        .unwrap();
    let store = MockStoreClient::new(schema.clone());
    let config = fast_config();
    let generator = MockGenerationClient::scripted(replies(&["", "  \n", "```\n```"]));

    let outcome = CorrectionLoop::new(&store, &schema, &generator, &config)
        .run("anything", &CancellationToken::new())
        .await
        .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.attempts().len(), 3);
    for attempt in outcome.attempts() {
        assert_eq!(
            attempt.failure(),
            Some(&AttemptFailure::Sanitization(SanitizationError::EmptyInput))
        );
    }
    assert_eq!(outcome.last_sql(), None);
    assert!(store.executed_queries().is_empty());
    assert_eq!(generator.call_count(), 3);
}

#[tokio::test]
async fn test_mutations_never_reach_the_store() {
    let schema = sales_store()
        .await
        .introspect_schema(&IntrospectionOptions::default())
        .await
        .unwrap();
    let store = MockStoreClient::new(schema.clone());
    let config = fast_config();
    let generator = MockGenerationClient::scripted(replies(&[
        "DELETE FROM sales",
        "Sure! DROP TABLE sales;",
        "SELECT 1; DELETE FROM sales",
    ]));

    let outcome = CorrectionLoop::new(&store, &schema, &generator, &config)
        .run("remove everything", &CancellationToken::new())
        .await
        .unwrap();

    let failures: Vec<_> = outcome
        .attempts()
        .iter()
        .map(|a| a.failure().cloned())
        .collect();
    assert_eq!(
        failures[0],
        Some(AttemptFailure::Validation(
            ValidationError::ForbiddenStatement {
                statement: StatementType::Delete
            }
        ))
    );
    assert_eq!(
        failures[1],
        Some(AttemptFailure::Validation(
            ValidationError::ForbiddenStatement {
                statement: StatementType::Drop
            }
        ))
    );
    // Text after the first semicolon is dropped, so only the SELECT runs.
    assert!(outcome.is_success());
    assert_eq!(outcome.last_sql(), Some("SELECT 1;"));
    assert_eq!(store.executed_queries(), vec!["SELECT 1;".to_string()]);
}

#[tokio::test]
async fn test_execution_error_feeds_back_store_message() {
    let generator = MockGenerationClient::scripted(replies(&[
        "SELECT median(amount) FROM sales",
        "SELECT AVG(amount) FROM sales",
    ]));
    let store = sales_store().await;
    let schema = store
        .introspect_schema(&IntrospectionOptions::default())
        .await
        .unwrap();
    let config = fast_config();

    let outcome = CorrectionLoop::new(&store, &schema, &generator, &config)
        .run("median sale", &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.is_success());
    match outcome.attempts()[0].failure() {
        Some(AttemptFailure::Execution(e)) => assert_eq!(e.kind, ExecutionErrorKind::Reference),
        other => panic!("Expected execution failure, got {:?}", other),
    }
    assert!(generator.prompts()[1].user().contains("no such function"));
}

#[tokio::test]
async fn test_timeout_adds_narrowing_hint() {
    let schema = sales_store()
        .await
        .introspect_schema(&IntrospectionOptions::default())
        .await
        .unwrap();
    let store = MockStoreClient::new(schema.clone())
        .with_error(
            "select *",
            ExecutionError::new(ExecutionErrorKind::Timeout, "query exceeded the time budget"),
        )
        .with_default_result(QueryResult::with_data(
            vec![ResultColumn::new("region", "TEXT")],
            vec![vec![Value::from("North")]],
        ));
    let config = fast_config();
    let generator = MockGenerationClient::scripted(replies(&[
        "SELECT * FROM sales",
        "SELECT region FROM sales LIMIT 10",
    ]));

    let outcome = CorrectionLoop::new(&store, &schema, &generator, &config)
        .run("show sales", &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.is_success());
    let retry = generator.prompts()[1].user().to_string();
    assert!(retry.contains("timeout error"));
    assert!(retry.contains("LIMIT"));
}

#[tokio::test]
async fn test_attempt_cap_is_never_exceeded() {
    let schema = sales_store()
        .await
        .introspect_schema(&IntrospectionOptions::default())
        .await
        .unwrap();
    let store = MockStoreClient::new(schema.clone());
    let config = PipelineConfig {
        max_attempts: 2,
        ..fast_config()
    };
    let generator = MockGenerationClient::scripted(replies(&[
        "SELECT nope FROM sales",
        "SELECT nope FROM sales",
        "SELECT nope FROM sales",
        "SELECT region FROM sales",
    ]));

    let outcome = CorrectionLoop::new(&store, &schema, &generator, &config)
        .run("q", &CancellationToken::new())
        .await
        .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.attempts().len(), 2);
    assert_eq!(generator.call_count(), 2);
}

#[tokio::test]
async fn test_identical_inputs_give_identical_outcomes() {
    async fn answer() -> (Option<String>, Option<QueryResult>, usize) {
        let generator = MockGenerationClient::scripted(replies(&[
            "SELECT revenue FROM sales",
            "```sql\nSELECT region, COUNT(*) FROM sales GROUP BY region ORDER BY region;\n```",
        ]));
        let session = Session::open(boxed_sales_store().await, Box::new(generator), fast_config())
            .await
            .unwrap();
        let response = session.translate_and_run("sales per region").await.unwrap();
        let rows = response.rows.map(|mut r| {
            r.execution_time = Duration::ZERO;
            r
        });
        (response.sql, rows, response.attempts.len())
    }

    let first = answer().await;
    let second = answer().await;
    assert_eq!(first, second);
    assert_eq!(first.2, 2);
}

#[tokio::test]
async fn test_cancellation_during_backoff() {
    let store = sales_store().await;
    let schema = store
        .introspect_schema(&IntrospectionOptions::default())
        .await
        .unwrap();
    let config = PipelineConfig {
        generation_backoff: Duration::from_secs(60),
        ..PipelineConfig::default()
    };
    let generator = MockGenerationClient::scripted([
        ScriptedReply::TransientError("503 Service Unavailable".to_string()),
        ScriptedReply::text("SELECT region FROM sales"),
    ]);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = CorrectionLoop::new(&store, &schema, &generator, &config)
        .run("q", &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, AskError::Cancelled));
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test]
async fn test_fatal_generation_error_surfaces_from_session() {
    let generator =
        MockGenerationClient::scripted([ScriptedReply::FatalError("Authentication failed".into())]);
    let session = Session::open(boxed_sales_store().await, Box::new(generator), fast_config())
        .await
        .unwrap();

    let err = session.translate_and_run("q").await.unwrap_err();
    assert_eq!(err.category(), "Generation Error");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_fatal_generation_error_after_correction_reports_last_sql() {
    let generator = MockGenerationClient::scripted([
        ScriptedReply::text("SELECT profit FROM sales"),
        ScriptedReply::FatalError("quota exhausted".into()),
    ]);
    let session = Session::open(boxed_sales_store().await, Box::new(generator), fast_config())
        .await
        .unwrap();

    let response = session.translate_and_run("total profit").await.unwrap();

    assert!(!response.is_success());
    assert_eq!(response.sql.as_deref(), Some("SELECT profit FROM sales"));
    assert_eq!(response.attempts.len(), 2);
    assert!(matches!(
        response.attempts[0].failure(),
        Some(AttemptFailure::Validation(_))
    ));
    let error = response.error.unwrap();
    assert!(error.contains("Last SQL: SELECT profit FROM sales"));
    assert!(error.contains("quota exhausted"));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_failed_response_renders_as_json() {
    let generator = MockGenerationClient::new();
    let session = Session::open(boxed_sales_store().await, Box::new(generator), fast_config())
        .await
        .unwrap();

    let response = session.translate_and_run("what's up?").await.unwrap();
    assert!(!response.is_success());
    assert_eq!(response.attempts.len(), 3);

    let value: serde_json::Value = serde_json::from_str(&render_json(&response).unwrap()).unwrap();
    assert_eq!(value["rows"], serde_json::Value::Null);
    assert_eq!(value["attempts"][0]["outcome"]["failure"]["stage"], "sanitization");
    assert!(value["error"].as_str().unwrap().contains("after 3 attempts"));
}

#[tokio::test]
async fn test_session_explains_and_suggests() {
    let generator = MockGenerationClient::new()
        .with_response("SQL Query:", "  Adds up the amount column.  ");
    let session = Session::open(boxed_sales_store().await, Box::new(generator), fast_config())
        .await
        .unwrap();

    let explanation = session.explain("SELECT SUM(amount) FROM sales").await.unwrap();
    assert_eq!(explanation, "Adds up the amount column.");

    let suggestions = session.suggest_questions();
    assert!(suggestions.len() <= 10);
    assert_eq!(suggestions[0], "Show me the first 10 rows from sales");
}
