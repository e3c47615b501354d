//! Engine error types
//!
//! Every failure surfaced by the engine carries a stable tagged code:
//! - NOT_SUPPORTED: host lacks a required back store capability
//! - UNINITIALIZED: call before open finished
//! - CONSTRAINT_VIOLATION: unique / not-null breach, tx aborted
//! - SYNTAX: builder references unknown table/column, malformed query
//! - NOT_FOUND: named table/column/index does not exist
//! - TRANSACTION: re-exec of a completed transaction
//! - BACKSTORE: underlying store I/O failure
//! - TASK_CANCELLED: task cancelled before it started
//! - DATA: corrupt persisted payload

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Stable error tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotSupported,
    Uninitialized,
    ConstraintViolation,
    Syntax,
    NotFound,
    Transaction,
    BackStore,
    TaskCancelled,
    Data,
}

impl ErrorCode {
    /// Returns the stable string tag for this code
    pub fn tag(&self) -> &'static str {
        match self {
            ErrorCode::NotSupported => "NOT_SUPPORTED",
            ErrorCode::Uninitialized => "UNINITIALIZED",
            ErrorCode::ConstraintViolation => "CONSTRAINT_VIOLATION",
            ErrorCode::Syntax => "SYNTAX",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Transaction => "TRANSACTION",
            ErrorCode::BackStore => "BACKSTORE",
            ErrorCode::TaskCancelled => "TASK_CANCELLED",
            ErrorCode::Data => "DATA",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Engine errors
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Back store capability missing
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Call arrived before open finished
    #[error("Engine not initialized")]
    Uninitialized,

    /// Unique or not-null constraint breached
    #[error("Constraint violation on {table}.{column}: {message}")]
    ConstraintViolation {
        table: String,
        column: String,
        message: String,
    },

    /// Malformed query structure
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// Unknown table referenced by a builder
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Unknown column referenced by a builder
    #[error("Column not found: {table}.{column}")]
    ColumnNotFound { table: String, column: String },

    /// Transaction misuse (re-exec of a completed transaction)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Underlying store failure
    #[error("Back store error: {0}")]
    BackStore(String),

    /// Task cancelled before it started running
    #[error("Task cancelled")]
    TaskCancelled,

    /// Persisted payload failed to deserialize
    #[error("Corrupt data in table '{table}' at row {row_id}: {message}")]
    CorruptData {
        table: String,
        row_id: u64,
        message: String,
    },
}

impl EngineError {
    /// Constraint violation constructor
    pub fn constraint(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        EngineError::ConstraintViolation {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Unknown column constructor
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        EngineError::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Returns the stable tagged code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::NotSupported(_) => ErrorCode::NotSupported,
            EngineError::Uninitialized => ErrorCode::Uninitialized,
            EngineError::ConstraintViolation { .. } => ErrorCode::ConstraintViolation,
            EngineError::Syntax(_) => ErrorCode::Syntax,
            EngineError::TableNotFound(_) | EngineError::ColumnNotFound { .. } => {
                ErrorCode::NotFound
            }
            EngineError::Transaction(_) => ErrorCode::Transaction,
            EngineError::BackStore(_) => ErrorCode::BackStore,
            EngineError::TaskCancelled => ErrorCode::TaskCancelled,
            EngineError::CorruptData { .. } => ErrorCode::Data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_tags_stable() {
        assert_eq!(ErrorCode::ConstraintViolation.tag(), "CONSTRAINT_VIOLATION");
        assert_eq!(ErrorCode::TaskCancelled.tag(), "TASK_CANCELLED");
        assert_eq!(ErrorCode::BackStore.tag(), "BACKSTORE");
    }

    #[test]
    fn test_error_to_code() {
        let err = EngineError::constraint("user", "email", "duplicate key");
        assert_eq!(err.code(), ErrorCode::ConstraintViolation);

        let err = EngineError::TableNotFound("movie".into());
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = EngineError::TaskCancelled;
        assert_eq!(err.code(), ErrorCode::TaskCancelled);
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::constraint("user", "email", "duplicate key");
        let msg = format!("{}", err);
        assert!(msg.contains("user.email"));
        assert!(msg.contains("duplicate key"));
    }
}
