// sqlx::Error -> AppError with SQLite result-code classification

use netops_core::error::AppError;

/// Convert sqlx::Error to AppError::Database with structured information
pub fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let Some(code) = db_err.code() else {
                return AppError::Database(format!("Database error: {}", db_err.message()));
            };
            let code_str = code.as_ref();

            // SQLite result codes: https://www.sqlite.org/rescode.html
            match code_str {
                "2067" | "1555" => AppError::Database(format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code_str
                )),
                "787" | "3850" => AppError::Database(format!(
                    "Foreign key constraint violation: {} ({})",
                    db_err.message(),
                    code_str
                )),
                "5" | "517" => AppError::Database(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                _ => AppError::Database(format!(
                    "Database error [{}]: {}",
                    code_str,
                    db_err.message()
                )),
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        // Connection, pool, protocol errors
        _ => AppError::Database(err.to_string()),
    }
}

/// Decode a JSON column, reporting the table/column on corruption
pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    raw: &str,
    column: &str,
) -> netops_core::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::Database(format!("corrupt {} column: {}", column, e)))
}
