//! SQLite store client implementation.
//!
//! Provides the `SqliteClient` struct that implements the `StoreClient` trait
//! for SQLite databases using sqlx.

use crate::config::{ConnectionConfig, StoreTarget};
use crate::db::{
    ColumnInfo, ColumnType, ExecutionBudget, ExecutionError, ExecutionErrorKind,
    IntrospectionOptions, QueryResult, ResultColumn, Row, SchemaDescription, StoreClient,
    TableInfo, Value,
};
use crate::error::{AskError, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, Statement, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 100;

/// Virtual machine steps between deadline checks.
const PROGRESS_HANDLER_OPS: i32 = 1_000;

/// Extra wall-clock time allowed for an interrupted statement to unwind.
const INTERRUPT_GRACE: Duration = Duration::from_millis(250);

/// Rows past the cap are counted up to this total, then counting stops.
const MAX_COUNTED_ROWS: usize = 100_000;

/// SQLite store client.
#[derive(Debug, Clone)]
pub struct SqliteClient {
    pool: SqlitePool,
}

impl SqliteClient {
    /// Creates a client from an existing connection pool.
    ///
    /// This is primarily useful for testing.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a private in-memory database.
    ///
    /// A single connection is kept alive for the pool's lifetime so the
    /// database is not discarded between queries.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AskError::connection(format!("Invalid in-memory options: {e}")))?;
        let pool = Self::memory_pool_options()
            .connect_with(options)
            .await
            .map_err(|e| AskError::connection(format!("Failed to open in-memory database: {e}")))?;
        Ok(Self { pool })
    }

    /// Returns the underlying pool, e.g. for loading data.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Connects using the given configuration.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let (options, pool_options) = match config.target()? {
            StoreTarget::Memory => (
                SqliteConnectOptions::from_str("sqlite::memory:")
                    .map_err(|e| AskError::connection(format!("Invalid in-memory options: {e}")))?,
                Self::memory_pool_options(),
            ),
            StoreTarget::File(path) => {
                if !path.exists() {
                    return Err(AskError::connection(format!(
                        "Database file '{}' does not exist.",
                        path.display()
                    )));
                }
                (
                    SqliteConnectOptions::new()
                        .filename(&path)
                        .read_only(config.read_only)
                        .busy_timeout(Duration::from_secs(5)),
                    SqlitePoolOptions::new()
                        .max_connections(4)
                        .acquire_timeout(Duration::from_secs(10)),
                )
            }
        };

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            match pool_options.clone().connect_with(options.clone()).await {
                Ok(pool) => {
                    debug!(target = %config.display_string(), "Connected to store");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2; // Exponential backoff
                    } else {
                        break;
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => AskError::connection(format!(
                "Cannot open {}: {e}",
                config.display_string()
            )),
            None => AskError::internal("no connection attempt was made"),
        })
    }

    fn memory_pool_options() -> SqlitePoolOptions {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    }

    /// Lists user tables in creation order.
    async fn fetch_table_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT name
            FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AskError::introspection(format!("Failed to list tables: {e}")))
    }

    /// Fetches columns for a specific table, in declaration order.
    async fn fetch_columns(&self, table_name: &str) -> Result<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT name, type, "notnull"
            FROM pragma_table_info(?1)
            ORDER BY cid
            "#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AskError::introspection(format!("Failed to fetch columns for {table_name}: {e}"))
        })?;

        Ok(rows
            .into_iter()
            .map(|(name, declared, not_null)| ColumnInfo::new(name, declared).nullable(not_null == 0))
            .collect())
    }

    /// Fetches up to `options.sample_rows` rows with long text truncated.
    async fn fetch_sample_rows(
        &self,
        table_name: &str,
        options: &IntrospectionOptions,
    ) -> Result<Vec<Row>> {
        let limit = options.effective_sample_rows();
        if limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            quote_identifier(table_name),
            limit
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AskError::introspection(format!("Failed to sample rows from {table_name}: {e}"))
            })?;

        Ok(rows
            .iter()
            .map(|row| {
                convert_row(row)
                    .into_iter()
                    .map(|value| value.truncated(options.max_cell_chars))
                    .collect()
            })
            .collect())
    }

    /// Fetches result column metadata without reading any rows.
    async fn fetch_column_metadata(&self, sql: &str) -> Vec<ResultColumn> {
        match (&self.pool).prepare(sql).await {
            Ok(statement) => statement
                .columns()
                .iter()
                .map(|col| ResultColumn::new(col.name(), col.type_info().name()))
                .collect(),
            Err(e) => {
                debug!("Could not prepare statement for column metadata: {e}");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl StoreClient for SqliteClient {
    async fn introspect_schema(&self, options: &IntrospectionOptions) -> Result<SchemaDescription> {
        let table_names = self.fetch_table_names().await?;
        let mut tables = Vec::with_capacity(table_names.len());

        for table_name in table_names {
            let mut columns = self.fetch_columns(&table_name).await?;
            let sample_rows = self.fetch_sample_rows(&table_name, options).await?;

            // Undeclared columns fall back to the types seen in the samples.
            for (index, column) in columns.iter_mut().enumerate() {
                if column.column_type == ColumnType::Unknown && column.declared_type.is_empty() {
                    column.column_type =
                        ColumnType::observed(sample_rows.iter().filter_map(|row| row.get(index)));
                }
            }

            debug!(
                table = %table_name,
                columns = columns.len(),
                samples = sample_rows.len(),
                "Introspected table"
            );

            tables.push(TableInfo {
                name: table_name,
                columns,
                sample_rows,
            });
        }

        SchemaDescription::new(tables)
    }

    async fn execute_query(
        &self,
        sql: &str,
        budget: &ExecutionBudget,
    ) -> std::result::Result<QueryResult, ExecutionError> {
        let start = Instant::now();
        let deadline = start + budget.timeout;
        let timed_out = || {
            ExecutionError::new(
                ExecutionErrorKind::Timeout,
                format!(
                    "Query exceeded the {} second time budget",
                    budget.timeout.as_secs_f64()
                ),
            )
        };

        let mut conn = self.pool.acquire().await.map_err(map_query_error)?;

        // SQLite polls the handler while stepping, so a statement that outlives
        // the budget is interrupted in the engine and the connection is freed.
        conn.lock_handle()
            .await
            .map_err(map_query_error)?
            .set_progress_handler(PROGRESS_HANDLER_OPS, move || Instant::now() < deadline);

        let fetched = tokio::time::timeout(
            budget.timeout + INTERRUPT_GRACE,
            fetch_rows(&mut conn, sql, budget.max_rows),
        )
        .await;

        match conn.lock_handle().await {
            Ok(mut handle) => handle.remove_progress_handler(),
            Err(e) => debug!("Could not clear progress handler: {e}"),
        }
        drop(conn);

        let fetched = match fetched {
            Err(_) => return Err(timed_out()),
            Ok(Err(e)) if is_interrupt(&e) => return Err(timed_out()),
            Ok(fetched) => fetched.map_err(map_query_error)?,
        };

        let execution_time = start.elapsed();
        let was_truncated = fetched.observed > budget.max_rows;

        if was_truncated {
            warn!(
                observed = fetched.observed,
                "Query returned more than {} rows, truncating", budget.max_rows
            );
        }

        let columns = match fetched.columns {
            Some(columns) => columns,
            None => self.fetch_column_metadata(sql).await,
        };
        let row_count = fetched.rows.len();

        Ok(QueryResult {
            columns,
            rows: fetched.rows,
            execution_time,
            row_count,
            total_rows: fetched.exhausted.then_some(fetched.observed),
            was_truncated,
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Rows read from one statement.
struct Fetched {
    columns: Option<Vec<ResultColumn>>,
    rows: Vec<Row>,
    /// Rows seen, including those counted past the cap.
    observed: usize,
    /// Whether the statement ran to completion, making `observed` exact.
    exhausted: bool,
}

/// Streams rows up to `max_rows`, then keeps counting without converting.
///
/// Counting stops at `MAX_COUNTED_ROWS`, or quietly when the deadline
/// interrupts it, since the capped rows are already in hand.
async fn fetch_rows(
    conn: &mut SqliteConnection,
    sql: &str,
    max_rows: usize,
) -> std::result::Result<Fetched, sqlx::Error> {
    let mut stream = sqlx::query(sql).fetch(conn);
    let mut fetched = Fetched {
        columns: None,
        rows: Vec::new(),
        observed: 0,
        exhausted: false,
    };

    loop {
        let row = match stream.try_next().await {
            Ok(Some(row)) => row,
            Ok(None) => {
                fetched.exhausted = true;
                break;
            }
            Err(e) if fetched.observed > max_rows && is_interrupt(&e) => break,
            Err(e) => return Err(e),
        };

        fetched.observed += 1;
        if fetched.observed > max_rows {
            if fetched.observed >= MAX_COUNTED_ROWS {
                break;
            }
            continue;
        }
        if fetched.columns.is_none() {
            fetched.columns = Some(result_columns(&row));
        }
        fetched.rows.push(convert_row(&row));
    }

    Ok(fetched)
}

fn is_interrupt(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(e) if e.message().contains("interrupted"))
}

/// Quotes an identifier for interpolation into SQL text.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn result_columns(row: &SqliteRow) -> Vec<ResultColumn> {
    row.columns()
        .iter()
        .map(|col| ResultColumn::new(col.name(), col.type_info().name()))
        .collect()
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Converts a single column value using the value's runtime storage class.
///
/// SQLite is dynamically typed, so the declared column type is only a hint.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let storage_class = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "REAL" | "NUMERIC" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        // Text and anything else: try to get as string
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Determines if a connection error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();
    error_str.contains("database is locked")
        || error_str.contains("busy")
        || error_str.contains("timed out")
}

/// Maps a sqlx query error to a structured execution error.
fn map_query_error(error: sqlx::Error) -> ExecutionError {
    match error {
        sqlx::Error::PoolTimedOut => ExecutionError::new(
            ExecutionErrorKind::Timeout,
            "Timed out waiting for a database connection",
        ),
        sqlx::Error::Database(db_error) => {
            let message = db_error.message().to_string();
            ExecutionError::new(classify_sqlite_message(&message), message)
        }
        other => {
            let message = other.to_string();
            ExecutionError::new(classify_sqlite_message(&message), message)
        }
    }
}

/// Classifies a SQLite error message into an execution error kind.
fn classify_sqlite_message(message: &str) -> ExecutionErrorKind {
    let lower = message.to_lowercase();

    if lower.contains("syntax error")
        || lower.contains("incomplete input")
        || lower.contains("unrecognized token")
        || lower.contains("near \"")
    {
        ExecutionErrorKind::Syntax
    } else if lower.contains("no such table")
        || lower.contains("no such column")
        || lower.contains("no such function")
        || lower.contains("ambiguous column")
        || lower.contains("misuse of aggregate")
        || lower.contains("wrong number of arguments")
    {
        ExecutionErrorKind::Reference
    } else if lower.contains("too big")
        || lower.contains("out of memory")
        || lower.contains("database or disk is full")
        || lower.contains("too many")
        || lower.contains("interrupted")
    {
        ExecutionErrorKind::ResourceLimit
    } else if lower.contains("timed out") || lower.contains("timeout") {
        ExecutionErrorKind::Timeout
    } else {
        ExecutionErrorKind::Unknown
    }
}
