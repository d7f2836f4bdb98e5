//! SQL statement validator.
//!
//! Classifies statements and guards ad hoc SQL submitted over the API.

use crate::errors::AppError;

/// Validates SQL statements for security.
pub struct SqlValidator;

/// Operations refused for ad hoc SQL.
const FORBIDDEN_KEYWORDS: [&str; 5] = ["DROP ", "TRUNCATE ", "ALTER ", "GRANT ", "REVOKE "];

impl SqlValidator {
    /// Validates a SQL statement for forbidden operations.
    ///
    /// # Errors
    /// Returns `AppError::UnsafeSql` if the SQL contains forbidden keywords.
    pub fn validate(sql: &str) -> Result<(), AppError> {
        let sql_upper = sql.to_uppercase();
        for keyword in FORBIDDEN_KEYWORDS {
            if sql_upper.contains(keyword) {
                return Err(AppError::UnsafeSql(format!(
                    "forbidden operation: {}",
                    keyword.trim()
                )));
            }
        }
        Ok(())
    }

    /// Checks if the SQL is a SELECT query.
    ///
    /// Leading whitespace is ignored and the keyword is matched case-insensitively.
    pub fn is_select(sql: &str) -> bool {
        sql.trim_start()
            .get(..6)
            .is_some_and(|head| head.eq_ignore_ascii_case("select"))
    }

    /// Checks if the SQL is a modification query (INSERT/UPDATE/DELETE).
    pub fn is_modification(sql: &str) -> bool {
        let sql_upper = sql.trim().to_uppercase();
        sql_upper.starts_with("INSERT")
            || sql_upper.starts_with("UPDATE")
            || sql_upper.starts_with("DELETE")
    }
}
