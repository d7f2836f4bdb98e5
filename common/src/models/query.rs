//! SQL query models.
//!
//! Contains the statement handed to the executor and the outcome it returns.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::utils::SqlValidator;

/// One result row: column name to value, in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Request body for executing ad hoc SQL.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct QueryRequest {
    /// SQL statement to execute.
    #[validate(length(min = 1, message = "SQL statement is required"))]
    pub sql: String,
}

/// A SQL statement with `?` placeholders and its bound parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SqlStatement {
    /// Statement text.
    pub sql: String,
    /// Positional parameters, bound in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
}

impl SqlStatement {
    /// Creates a statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Appends a bound parameter.
    pub fn bind(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Whether the statement reads rows rather than modifying data.
    pub fn is_select(&self) -> bool {
        SqlValidator::is_select(&self.sql)
    }
}

impl std::fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)?;
        if !self.params.is_empty() {
            write!(f, " -- params: {:?}", self.params)?;
        }
        Ok(())
    }
}

/// Result of running a statement.
///
/// Serialized untagged: a list of rows, a `{"message", "affected_rows"}`
/// object, or an `{"error"}` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    /// Rows returned by a SELECT.
    Rows(Vec<Row>),
    /// A committed modification.
    Status { message: String, affected_rows: u64 },
    /// Any failure, parse or database, flattened to text.
    Error { error: String },
}

impl QueryOutcome {
    /// Builds the status record for a committed statement.
    pub fn executed(statement: &SqlStatement, affected_rows: u64) -> Self {
        QueryOutcome::Status {
            message: format!("Query executed: {}", statement.sql),
            affected_rows,
        }
    }

    /// Builds an error record.
    pub fn error(error: impl std::fmt::Display) -> Self {
        QueryOutcome::Error {
            error: error.to_string(),
        }
    }

    /// Whether this is an error record.
    pub fn is_error(&self) -> bool {
        matches!(self, QueryOutcome::Error { .. })
    }
}
