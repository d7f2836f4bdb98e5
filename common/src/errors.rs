//! Application error type.
//!
//! Every fallible operation in the workspace returns [`AppResult`]. Errors
//! render into the [`ApiResponse`] envelope when they reach an HTTP handler.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used across all crates.
pub type AppResult<T> = Result<T, AppError>;

/// Unified application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request body or argument failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration value is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The schema file could not be read or parsed.
    #[error("failed to load schema: {0}")]
    SchemaLoad(String),

    /// No intent rule matched the prompt.
    #[error("Unable to parse the query.")]
    UnparseablePrompt,

    /// The translated statement targets a table absent from the loaded schema.
    #[error("table `{0}` is not present in the loaded schema")]
    UnknownTable(String),

    /// Ad hoc SQL contains a forbidden operation.
    #[error("unsafe SQL: {0}")]
    UnsafeSql(String),

    /// Could not open or reach the database.
    #[error("database connection failed: {0}")]
    DatabaseConnection(String),

    /// Statement execution or row decoding failed.
    #[error("{0}")]
    DatabaseQuery(String),

    /// The language model endpoint failed or answered with garbage.
    #[error("language model error: {0}")]
    Llm(String),

    /// The agent loop could not produce an answer.
    #[error("agent error: {0}")]
    Agent(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::SchemaLoad(_) => "SCHEMA_LOAD_ERROR",
            AppError::UnparseablePrompt => "UNPARSEABLE_PROMPT",
            AppError::UnknownTable(_) => "UNKNOWN_TABLE",
            AppError::UnsafeSql(_) => "UNSAFE_SQL",
            AppError::DatabaseConnection(_) => "DATABASE_CONNECTION_ERROR",
            AppError::DatabaseQuery(_) => "DATABASE_QUERY_ERROR",
            AppError::Llm(_) => "LLM_ERROR",
            AppError::Agent(_) => "AGENT_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::UnsafeSql(_) => StatusCode::BAD_REQUEST,
            AppError::UnparseablePrompt | AppError::UnknownTable(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::DatabaseConnection(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Llm(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::SchemaLoad(_)
            | AppError::DatabaseQuery(_)
            | AppError::Agent(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "请求处理失败");
        } else {
            tracing::warn!(code = self.code(), error = %self, "请求被拒绝");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => AppError::DatabaseConnection(e.to_string()),
            other => AppError::DatabaseQuery(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}
