use crate::error::AppError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// Converts Diesel errors into structured [`AppError`] variants.
///
/// PostgreSQL reports the offending table and column alongside constraint
/// violations, so the converter reads them straight from the error info.
pub struct DatabaseErrorConverter;

impl DatabaseErrorConverter {
    /// Converts a Diesel error to an appropriate AppError variant.
    ///
    /// # Arguments
    /// * `error` - The Diesel error to convert
    /// * `operation` - Description of the database operation that failed
    pub fn convert_diesel_error(error: DieselError, operation: &str) -> AppError {
        match error {
            DieselError::DatabaseError(kind, info) => {
                Self::convert_database_error(kind, info, operation)
            }
            DieselError::NotFound => AppError::NotFound {
                entity: "resource".to_string(),
                field: "id".to_string(),
                value: "unknown".to_string(),
            },
            other => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::from(other),
            },
        }
    }

    fn convert_database_error(
        kind: DatabaseErrorKind,
        info: Box<dyn diesel::result::DatabaseErrorInformation + Send + Sync>,
        operation: &str,
    ) -> AppError {
        let message = info.message().to_string();

        match kind {
            DatabaseErrorKind::NotNullViolation | DatabaseErrorKind::CheckViolation => {
                match info.column_name() {
                    Some(column) => AppError::Validation {
                        field: column.to_string(),
                        reason: format!(
                            "Constraint violated on {}: {}",
                            info.table_name().unwrap_or("table"),
                            message
                        ),
                    },
                    None => AppError::Database {
                        operation: operation.to_string(),
                        source: anyhow::Error::msg(message),
                    },
                }
            }
            DatabaseErrorKind::ClosedConnection => AppError::ConnectionPool {
                source: anyhow::Error::msg(message),
            },
            _ => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::msg(format!("Database error: {}", message)),
            },
        }
    }
}
