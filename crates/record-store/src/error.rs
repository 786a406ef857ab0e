use thiserror::Error;

use crate::store::StoreOperation;

/// Errors that can occur when interacting with the record store.
#[derive(Debug, Error)]
pub enum RecordStoreError {
    /// A uniqueness, foreign key or check constraint rejected the write.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// A stored row could not be mapped back into a record.
    #[error("Invalid record in {table}: {reason}")]
    InvalidRecord { table: &'static str, reason: String },

    /// The store did not answer the operation.
    #[error("Record store unavailable during {operation}")]
    Unavailable { operation: StoreOperation },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl RecordStoreError {
    /// Returns true when the failed call may still have been applied.
    ///
    /// A connection lost after a statement was sent leaves its outcome
    /// unknown. Every other error means the write did not happen.
    pub fn is_indeterminate(&self) -> bool {
        matches!(
            self,
            RecordStoreError::Database(
                sqlx::Error::Io(_) | sqlx::Error::Protocol(_) | sqlx::Error::WorkerCrashed
            )
        )
    }
}

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, RecordStoreError>;
