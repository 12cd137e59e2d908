use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of running the validation contract against a node.
///
/// Validation failures are recoverable and never thrown: callers inspect
/// `valid` and `errors`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Edits that are rejected outright because they would break the tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("Cannot delete root node: {0}")]
    RootDeletion(String),

    #[error("Cannot move root node: {0}")]
    RootMove(String),

    #[error("Cannot change type of node {node_id} from {from} to {to}")]
    TypeChange {
        node_id: String,
        from: String,
        to: String,
    },

    #[error("Moving {node_id} under {parent_id} would create a cycle")]
    Cycle { node_id: String, parent_id: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("Lock acquisition timed out after {timeout_ms}ms (owner: {owner_id}, lock: {lock_id})")]
    Timeout {
        lock_id: String,
        owner_id: String,
        timeout_ms: u64,
    },

    #[error("Lock id mismatch: expected {expected:?}, got {provided}")]
    Mismatch {
        expected: Option<String>,
        provided: String,
    },

    #[error("Lock manager dropped the waiter for {0}")]
    Abandoned(String),
}

/// Malformed operations. These are programmer errors, not user errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("Operation has an empty node id")]
    EmptyNodeId,

    #[error("Move operation for {0} has no parent id")]
    MissingParent(String),

    #[error("{op} operation for {node_id} has no data")]
    MissingData { op: String, node_id: String },

    #[error("Unknown operation type: {0}")]
    UnknownType(String),

    #[error("Failed to decode operation: {0}")]
    Decode(String),
}
