use thiserror::Error;

use crate::record::RecordStatus;

/// Errors raised by a history store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite / connection pool error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Filesystem error preparing the database location
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be mapped back to a record
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

/// Rejected state machine transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("record {request_id} is already terminal ({status})")]
    AlreadyTerminal {
        request_id: String,
        status: RecordStatus,
    },
}

/// Fail-open adapter for store results.
///
/// Audit logging must never break the request path it observes, so service
/// operations collapse a store failure into a safe default. The failure is
/// not dropped: it is emitted as a structured `tracing` error event tagged
/// with the operation name.
pub trait FailOpen<T> {
    fn or_fail_open(self, operation: &'static str, fallback: T) -> T;

    fn or_fail_open_with<F>(self, operation: &'static str, fallback: F) -> T
    where
        F: FnOnce() -> T;
}

impl<T> FailOpen<T> for Result<T, StoreError> {
    fn or_fail_open(self, operation: &'static str, fallback: T) -> T {
        self.or_fail_open_with(operation, || fallback)
    }

    fn or_fail_open_with<F>(self, operation: &'static str, fallback: F) -> T
    where
        F: FnOnce() -> T,
    {
        match self {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(
                    operation = operation,
                    error = %e,
                    "History store operation failed, using fallback"
                );
                fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = StoreError::InvalidData("bad status".to_string());
        assert_eq!(error.to_string(), "Invalid stored data: bad status");

        let error = TransitionError::AlreadyTerminal {
            request_id: "req-1".to_string(),
            status: RecordStatus::Success,
        };
        assert_eq!(error.to_string(), "record req-1 is already terminal (success)");
    }

    #[test]
    fn test_fail_open_passes_ok_through() {
        let result: Result<u64, StoreError> = Ok(7);
        assert_eq!(result.or_fail_open("count", 0), 7);
    }

    #[test]
    fn test_fail_open_returns_fallback() {
        let result: Result<Vec<u8>, StoreError> =
            Err(StoreError::InvalidData("boom".to_string()));
        assert!(result.or_fail_open_with("list", Vec::new).is_empty());
    }
}
