//! Error types for the editor

use tessera_common::{LockError, OperationError, StructuralError, ValidationResult};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),
}

/// Why a transaction did not commit. The committed store is unchanged
/// whenever one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),

    #[error("Transaction aborted: {0}")]
    Aborted(String),
}

impl TransactionError {
    /// Flat list of error messages for reporting
    pub fn errors(&self) -> Vec<String> {
        match self {
            TransactionError::Validation(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }

    /// Turn a failed validation into an error so `?` aborts the transaction
    pub fn check(result: ValidationResult) -> Result<(), TransactionError> {
        if result.valid {
            Ok(())
        } else {
            Err(TransactionError::Validation(result.errors))
        }
    }

    /// Turn a "not found" result into an error so `?` aborts the transaction
    pub fn found<T>(value: Option<T>, id: &str) -> Result<T, TransactionError> {
        value.ok_or_else(|| TransactionError::NotFound(id.to_string()))
    }

    /// Same as [`found`](Self::found) for boolean results
    pub fn ensure(ok: bool, id: &str) -> Result<(), TransactionError> {
        if ok {
            Ok(())
        } else {
            Err(TransactionError::NotFound(id.to_string()))
        }
    }
}
