use crate::error::AppError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// Utility for converting database errors to structured AppError variants.
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
                Self::convert_database_error(kind, info.message(), operation)
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

    fn convert_database_error(kind: DatabaseErrorKind, message: &str, operation: &str) -> AppError {
        match kind {
            DatabaseErrorKind::SerializationFailure => AppError::Conflict {
                message: message.to_string(),
            },
            DatabaseErrorKind::ReadOnlyTransaction => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::msg(format!("Read-only transaction: {}", message)),
            },
            _ => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::msg(format!("Database error: {}", message)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockDatabaseErrorInfo {
        message: String,
    }

    impl diesel::result::DatabaseErrorInformation for MockDatabaseErrorInfo {
        fn message(&self) -> &str {
            &self.message
        }

        fn details(&self) -> Option<&str> {
            None
        }

        fn hint(&self) -> Option<&str> {
            None
        }

        fn table_name(&self) -> Option<&str> {
            None
        }

        fn column_name(&self) -> Option<&str> {
            None
        }

        fn constraint_name(&self) -> Option<&str> {
            None
        }

        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    fn database_error(kind: DatabaseErrorKind, message: &str) -> DieselError {
        DieselError::DatabaseError(
            kind,
            Box::new(MockDatabaseErrorInfo {
                message: message.to_string(),
            }),
        )
    }

    #[test]
    fn test_convert_not_found_error() {
        let result = DatabaseErrorConverter::convert_diesel_error(DieselError::NotFound, "find build");
        assert!(matches!(result, AppError::NotFound { .. }));
    }

    #[test]
    fn test_convert_serialization_failure_to_conflict() {
        let error = database_error(
            DatabaseErrorKind::SerializationFailure,
            "could not serialize access due to concurrent update",
        );
        let result = DatabaseErrorConverter::convert_diesel_error(error, "drop build");

        match result {
            AppError::Conflict { message } => assert!(message.contains("concurrent update")),
            other => panic!("Expected Conflict error, got {:?}", other),
        }
    }

    #[test]
    fn test_convert_other_database_error() {
        let error = database_error(DatabaseErrorKind::UniqueViolation, "duplicate key");
        let result = DatabaseErrorConverter::convert_diesel_error(error, "insert migration");

        match result {
            AppError::Database { operation, .. } => assert_eq!(operation, "insert migration"),
            other => panic!("Expected Database error, got {:?}", other),
        }
    }
}
