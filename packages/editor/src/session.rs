//! # Edit Session
//!
//! The transaction boundary. Every write to a shared document goes through
//! [`EditSession::transact`]:
//!
//! ```text
//! acquire lock → begin → mutate → end → commit → history → notify → release
//!                          │
//!                     error/panic → rollback → release
//! ```
//!
//! Subscribers are notified after the document mutex is dropped, so a
//! callback may call [`EditSession::read`].
//!
//! The lock is released exactly once on every path, and a transaction that
//! fails leaves the committed store exactly as it was.

use crate::document::{Document, JournalEntry};
use crate::errors::TransactionError;
use crate::events::{Dispatcher, OperationCallback, SubscriptionId};
use crate::history::{HistoryEntry, HistoryManager, HistorySource};
use crate::lock::LockManager;
use crate::overlay::CommitSummary;
use crate::StoreConfig;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tessera_common::{
    AtomicOperation, Clock, IdGenerator, OperationBatch, OperationType, SystemClock,
};

/// What a committed transaction produced
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutput<T> {
    /// Value returned by the transaction body
    pub value: T,

    /// Emitted operations, ready for sync consumers
    pub batch: OperationBatch,

    pub commit: CommitSummary,

    /// Id of the recorded history entry, if one was recorded
    pub history_entry: Option<String>,
}

impl<T> TransactionOutput<T> {
    pub fn operations(&self) -> &[AtomicOperation] {
        &self.batch.operations
    }
}

/// Rolls the document back unless the transaction completed
struct OpenTransaction<'a> {
    doc: &'a mut Document,
    open: bool,
}

impl<'a> OpenTransaction<'a> {
    fn begin(doc: &'a mut Document) -> Self {
        doc.begin();
        Self { doc, open: true }
    }

    /// Drain operations and commit. Nothing staged means nothing committed
    /// and the version stays put. Delivery is left to the returned
    /// dispatcher.
    fn finish(mut self) -> (Vec<AtomicOperation>, Dispatcher, Vec<JournalEntry>, CommitSummary) {
        self.open = false;
        let (operations, dispatcher) = self.doc.end_deferred();
        let journal = self.doc.take_journal();
        let commit = if self.doc.has_pending_changes() {
            self.doc.commit()
        } else {
            CommitSummary {
                version: self.doc.version(),
                ..CommitSummary::default()
            }
        };
        (operations, dispatcher, journal, commit)
    }
}

impl Drop for OpenTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!("[EditSession] Transaction aborted, rolling back");
            self.doc.rollback();
        }
    }
}

#[derive(Debug)]
pub struct EditSession {
    session_id: String,
    document: Mutex<Document>,
    history: Mutex<HistoryManager>,
    locks: LockManager,
    clock: Arc<dyn Clock>,
    ids: IdGenerator,
}

impl EditSession {
    pub fn new(document: Document) -> Self {
        Self::with_config(document, &StoreConfig::default())
    }

    pub fn with_config(document: Document, config: &StoreConfig) -> Self {
        let document = document.with_config(config);
        let session_id = document.session_id().to_string();
        tracing::info!("[EditSession] Opened session {}", session_id);
        Self {
            ids: IdGenerator::from_session(session_id.clone()),
            session_id,
            document: Mutex::new(document),
            history: Mutex::new(HistoryManager::from_config(config)),
            locks: LockManager::from_config(config),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for operation, lock and history timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.document
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .set_clock(clock.clone());
        self.locks = std::mem::take(&mut self.locks).with_clock(clock.clone());
        self.clock = clock;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn document(&self) -> MutexGuard<'_, Document> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn history(&self) -> MutexGuard<'_, HistoryManager> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Read the committed document. Never waits for the writer lock.
    pub fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.document())
    }

    pub fn on_operation(
        &self,
        callback: OperationCallback,
        filter: Option<OperationType>,
    ) -> SubscriptionId {
        self.document().on_operation(callback, filter)
    }

    pub fn off_operation(&self, id: SubscriptionId) -> bool {
        self.document().off_operation(id)
    }

    pub fn can_undo(&self) -> bool {
        self.history().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history().can_redo()
    }

    /// Run `f` as one undoable transaction on behalf of `owner_id`
    pub async fn transact<T, F>(
        &self,
        owner_id: &str,
        f: F,
    ) -> Result<TransactionOutput<T>, TransactionError>
    where
        F: FnOnce(&mut Document) -> Result<T, TransactionError>,
    {
        self.run(owner_id, HistorySource::Edit, None, f).await
    }

    /// Like [`transact`](Self::transact), labelling the history entry
    pub async fn transact_with<T, F>(
        &self,
        owner_id: &str,
        description: impl Into<String>,
        f: F,
    ) -> Result<TransactionOutput<T>, TransactionError>
    where
        F: FnOnce(&mut Document) -> Result<T, TransactionError>,
    {
        self.run(owner_id, HistorySource::Edit, Some(description.into()), f)
            .await
    }

    /// Revert the entry before the history cursor.
    ///
    /// Returns `Ok(None)` when there is nothing to undo.
    pub async fn undo(
        &self,
        owner_id: &str,
    ) -> Result<Option<TransactionOutput<String>>, TransactionError> {
        let output = self
            .run(owner_id, HistorySource::Undo, None, |doc| {
                let Some(entry) = self.history().undo() else {
                    return Ok(None);
                };
                for op in &entry.inverse_operations {
                    if let Err(err) = doc.apply_operation(op) {
                        self.history().cancel_undo();
                        return Err(err.into());
                    }
                }
                tracing::info!("[EditSession] Undid {}", entry.id);
                Ok(Some(entry.id))
            })
            .await?;
        Ok(lift(output))
    }

    /// Reapply the entry after the history cursor.
    ///
    /// Returns `Ok(None)` when there is nothing to redo.
    pub async fn redo(
        &self,
        owner_id: &str,
    ) -> Result<Option<TransactionOutput<String>>, TransactionError> {
        let output = self
            .run(owner_id, HistorySource::Redo, None, |doc| {
                let Some(entry) = self.history().redo() else {
                    return Ok(None);
                };
                for op in &entry.operations {
                    if let Err(err) = doc.apply_operation(op) {
                        self.history().cancel_redo();
                        return Err(err.into());
                    }
                }
                tracing::info!("[EditSession] Redid {}", entry.id);
                Ok(Some(entry.id))
            })
            .await?;
        Ok(lift(output))
    }

    /// Apply a batch received from another replica. Not undoable.
    pub async fn apply_remote(
        &self,
        owner_id: &str,
        batch: &OperationBatch,
    ) -> Result<TransactionOutput<usize>, TransactionError> {
        self.run(owner_id, HistorySource::Remote, None, |doc| {
            Ok(doc.apply_batch(batch)?)
        })
        .await
    }

    async fn run<T, F>(
        &self,
        owner_id: &str,
        source: HistorySource,
        description: Option<String>,
        f: F,
    ) -> Result<TransactionOutput<T>, TransactionError>
    where
        F: FnOnce(&mut Document) -> Result<T, TransactionError>,
    {
        let guard = self.locks.acquire(owner_id).await?;
        let result = self.execute(source, description, f);
        if let Err(err) = guard.release() {
            tracing::warn!("[EditSession] Release after transaction failed: {}", err);
        }
        result
    }

    fn execute<T, F>(
        &self,
        source: HistorySource,
        description: Option<String>,
        f: F,
    ) -> Result<TransactionOutput<T>, TransactionError>
    where
        F: FnOnce(&mut Document) -> Result<T, TransactionError>,
    {
        let mut doc = self.document();
        let mut tx = OpenTransaction::begin(&mut doc);
        let value = match f(tx.doc) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!("[EditSession] Transaction failed: {}", err);
                return Err(err);
            }
        };
        let (operations, dispatcher, journal, commit) = tx.finish();

        let history_entry = if source.is_recorded() && !journal.is_empty() {
            let (forward, mut inverse): (Vec<_>, Vec<_>) =
                journal.into_iter().map(|e| (e.forward, e.inverse)).unzip();
            inverse.reverse();

            let mut entry = HistoryEntry::new(self.ids.next_id(), self.clock.now_millis(), forward, inverse)
                .with_source(source);
            if let Some(description) = description {
                entry = entry.with_description(description);
            }
            let id = entry.id.clone();
            self.history().push(entry).then_some(id)
        } else {
            None
        };

        drop(doc);
        dispatcher.deliver(&operations);

        Ok(TransactionOutput {
            value,
            batch: OperationBatch::new(self.session_id.clone(), commit.version, operations),
            commit,
            history_entry,
        })
    }
}

fn lift(output: TransactionOutput<Option<String>>) -> Option<TransactionOutput<String>> {
    let TransactionOutput {
        value,
        batch,
        commit,
        history_entry,
    } = output;
    value.map(|value| TransactionOutput {
        value,
        batch,
        commit,
        history_entry,
    })
}
