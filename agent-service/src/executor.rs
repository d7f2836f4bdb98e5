//! MySQL statement executor.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{Column, MySqlPool, Row as _, TypeInfo, ValueRef};

use common::config::DatabaseConfig;
use common::errors::{AppError, AppResult};
use common::models::{QueryOutcome, Row, SqlStatement};
use common::utils::SqlValidator;

/// Runs statements and reports the outcome as a record.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Runs one statement. Failures come back as [`QueryOutcome::Error`].
    async fn run(&self, statement: &SqlStatement) -> QueryOutcome;

    /// Checks that the database answers.
    async fn ping(&self) -> AppResult<()>;

    /// Releases the underlying connections.
    async fn close(&self) {}
}

/// Executor backed by a sqlx MySQL pool.
pub struct MySqlExecutor {
    pool: MySqlPool,
}

impl MySqlExecutor {
    /// Opens the connection described by `config`.
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;
        tracing::info!(
            url = %config.redacted_url(),
            max_connections = config.max_connections,
            "Database connected"
        );
        Ok(Self { pool })
    }

    async fn try_run(&self, statement: &SqlStatement) -> AppResult<QueryOutcome> {
        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = query.bind(param.as_str());
        }

        if statement.is_select() {
            let rows = query.fetch_all(&self.pool).await?;
            let rows = rows.iter().map(row_to_json).collect::<AppResult<Vec<_>>>()?;
            return Ok(QueryOutcome::Rows(rows));
        }

        let mut tx = self.pool.begin().await?;
        let result = query.execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(QueryOutcome::executed(statement, result.rows_affected()))
    }
}

#[async_trait]
impl SqlExecutor for MySqlExecutor {
    async fn run(&self, statement: &SqlStatement) -> QueryOutcome {
        let start = Instant::now();
        let outcome = self
            .try_run(statement)
            .await
            .unwrap_or_else(QueryOutcome::error);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            QueryOutcome::Rows(rows) => {
                tracing::info!(sql = %statement, rows = rows.len(), elapsed_ms, "Query returned rows")
            }
            QueryOutcome::Status { affected_rows, .. } => tracing::info!(
                sql = %statement,
                affected_rows,
                modification = SqlValidator::is_modification(&statement.sql),
                elapsed_ms,
                "Statement committed"
            ),
            QueryOutcome::Error { error } => {
                tracing::warn!(sql = %statement, error = %error, elapsed_ms, "Statement failed")
            }
        }
        outcome
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database connection closed");
    }
}

/// Converts a row into a column-ordered JSON map.
fn row_to_json(row: &MySqlRow) -> AppResult<Row> {
    let mut map = Row::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), column_value(row, index)?);
    }
    Ok(map)
}

fn column_value(row: &MySqlRow, index: usize) -> AppResult<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "BOOLEAN" => json!(row.try_get::<bool, _>(index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            json!(row.try_get::<i64, _>(index)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => json!(row.try_get::<u64, _>(index)?),
        "YEAR" => json!(row.try_get_unchecked::<u16, _>(index)?),
        "FLOAT" => json!(row.try_get::<f32, _>(index)?),
        "DOUBLE" => json!(row.try_get::<f64, _>(index)?),
        "DATE" => json!(row.try_get::<chrono::NaiveDate, _>(index)?.to_string()),
        "TIME" => json!(row.try_get::<chrono::NaiveTime, _>(index)?.to_string()),
        "DATETIME" => json!(row
            .try_get::<chrono::NaiveDateTime, _>(index)?
            .format("%Y-%m-%d %H:%M:%S%.f")
            .to_string()),
        "TIMESTAMP" => json!(row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)?
            .to_rfc3339()),
        "JSON" => row.try_get::<Value, _>(index)?,
        _ => match row.try_get_unchecked::<String, _>(index) {
            Ok(text) => Value::String(text),
            Err(_) => {
                let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }
        },
    };
    Ok(value)
}
