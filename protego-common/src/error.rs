//! Common error types for Protego

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::SourceType;

/// Common result type for Protego operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Common error types across Protego services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store operation error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by the persistence store
///
/// `DuplicateKey` is the expected outcome of an ingestion race and is counted,
/// not escalated. `Timeout` and `Locked` are retryable by the next run.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A record with the same (source_type, external_id) is already stored
    #[error("Duplicate key: {source_type}/{external_id} already stored")]
    DuplicateKey {
        source_type: SourceType,
        external_id: String,
    },

    /// Analysis output references a record that does not exist
    #[error("Referential error: scraped record {scraped_record_id} does not exist")]
    Referential { scraped_record_id: Uuid },

    /// Store call exceeded the configured timeout
    #[error("Store operation '{operation}' timed out after {}ms", after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Database stayed locked past the configured lock wait
    #[error("Database locked during '{operation}' after {attempts} attempts")]
    Locked {
        operation: &'static str,
        attempts: u32,
    },

    /// Caller passed an argument the store cannot act on
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A stored row could not be decoded
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Underlying database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// True if the failure is transient and the next scheduled run may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Timeout { .. } | StoreError::Locked { .. })
    }

    /// True if the underlying SQLite error is a busy/locked condition
    pub fn is_lock_error(&self) -> bool {
        match self {
            StoreError::Database(db_err) => db_err.to_string().contains("database is locked"),
            _ => false,
        }
    }
}
