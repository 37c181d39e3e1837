// sqlx::Error -> SchedulingError

use chansync_core::SchedulingError;

/// Convert sqlx::Error to SchedulingError, keeping the SQLite result code in
/// the message. Lock and pool exhaustion surface as `Unavailable` so callers
/// can tell a busy substrate from a broken one.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> SchedulingError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let Some(code) = db_err.code() else {
                return SchedulingError::Storage(format!("Database error: {}", db_err.message()));
            };

            // SQLite result codes: https://www.sqlite.org/rescode.html
            match code.as_ref() {
                "2067" | "1555" => SchedulingError::Storage(format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code
                )),
                "275" => SchedulingError::Storage(format!(
                    "Check constraint violation: {}",
                    db_err.message()
                )),
                // SQLITE_BUSY / SQLITE_LOCKED
                "5" | "6" | "517" => SchedulingError::Unavailable(format!(
                    "Database locked ({}): {}",
                    code,
                    db_err.message()
                )),
                "13" => SchedulingError::Storage(format!("Database full: {}", db_err.message())),
                other => SchedulingError::Storage(format!(
                    "Database error [{}]: {}",
                    other,
                    db_err.message()
                )),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            SchedulingError::Unavailable(err.to_string())
        }
        sqlx::Error::RowNotFound => SchedulingError::Storage("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            SchedulingError::Storage(format!("Column not found: {}", col))
        }
        _ => SchedulingError::Storage(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_unavailable() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            SchedulingError::Unavailable(_)
        ));
    }

    #[test]
    fn test_row_not_found_is_storage() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            SchedulingError::Storage(_)
        ));
    }
}
