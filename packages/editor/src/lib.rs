//! # Tessera Editor
//!
//! Transactional editing engine for hierarchical documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ EditSession: transaction boundary           │
//! │  - FIFO writer lock (LockManager)           │
//! │  - commit / rollback, guaranteed release    │
//! │  - undo / redo (HistoryManager)             │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ Document: mutations + atomic operations     │
//! │  - CRUD, hierarchy, split/merge, marks      │
//! │  - range edits across text nodes            │
//! │  - raw replay of remote operations          │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ Overlay (staged) → NodeStore (committed)    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Copy-on-write**: mutations only touch the overlay until commit
//! 2. **Every change is an operation**: each write emits an atomic
//!    operation and records its inverse
//! 3. **Single writer**: transactions are serialized in arrival order
//! 4. **All or nothing**: a failed transaction leaves the committed store
//!    untouched
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tessera_editor::{Document, EditSession, NodeUpdate};
//! use tessera_common::Node;
//!
//! let session = EditSession::new(Document::new(Node::new("root", "doc")));
//!
//! let output = session
//!     .transact("alice", |doc| {
//!         let id = doc.create_node(doc.new_node("paragraph"), "root", None, true)?;
//!         Ok(id)
//!     })
//!     .await?;
//!
//! // ship output.batch to other replicas, or undo it
//! session.undo("alice").await?;
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used))]

mod config;
mod document;
mod errors;
mod events;
mod history;
mod lock;
pub mod mutations;
mod overlay;
mod session;
mod store;
mod sync;
mod validation;

pub use config::{
    StoreConfig, DEFAULT_COMPRESSION_WINDOW_MS, DEFAULT_HISTORY_MAX_SIZE, DEFAULT_LOCK_TIMEOUT_MS,
};
pub use document::{Document, JournalEntry};
pub use errors::{EditorError, TransactionError};
pub use events::{Dispatcher, OperationBus, OperationCallback, SubscriptionId};
pub use history::{HistoryEntry, HistoryManager, HistorySource, HistoryValidation};
pub use lock::{LockGuard, LockInfo, LockManager, LockStats, QueuedLock};
pub use mutations::range::RangeMark;
pub use mutations::{normalized_marks, split_marks, ContentRange, MarkStatistics};
pub use overlay::{CommitSummary, Lookup, Overlay};
pub use session::{EditSession, TransactionOutput};
pub use store::NodeStore;
pub use validation::{AcceptAll, SchemaValidator, Validator};

// Re-export common types for convenience
pub use tessera_common::{
    AtomicOperation, LockError, Mark, Node, NodeUpdate, OperationBatch, OperationError,
    OperationType, StructuralError, ValidationResult,
};
