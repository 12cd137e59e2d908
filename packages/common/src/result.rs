use crate::error::{LockError, StructuralError};

/// Result of an edit that may be rejected for structural reasons
pub type StructuralResult<T> = Result<T, StructuralError>;

/// Result of a lock acquisition or release
pub type LockResult<T> = Result<T, LockError>;
