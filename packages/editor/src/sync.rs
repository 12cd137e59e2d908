//! # Operation Replay
//!
//! Applies atomic operations received from another replica (or from the
//! history log) directly to the overlay.
//!
//! Replay is raw: `delete` removes exactly one node and `create`/`update`
//! write the carried snapshot. Structural consequences were already
//! expressed as separate operations by the sender, so nothing cascades here.
//! Replayed operations are emitted like local ones, keeping their original
//! timestamps.

use crate::document::Document;
use tessera_common::{AtomicOperation, OperationBatch, OperationError, OperationType};

impl Document {
    /// Apply one operation. Returns `Ok(false)` when it referenced nodes
    /// that do not exist and was skipped.
    pub fn apply_operation(&mut self, op: &AtomicOperation) -> Result<bool, OperationError> {
        op.validate()?;
        let now = self.now();

        match op.op_type {
            OperationType::Create | OperationType::Update => {
                let data = op.data.as_ref().ok_or_else(|| OperationError::MissingData {
                    op: op.op_type.to_string(),
                    node_id: op.node_id.clone(),
                })?;
                let before = self.get_node(&op.node_id).cloned();
                let node = match &before {
                    Some(existing) => {
                        let mut node = existing.clone();
                        data.apply_to(&mut node);
                        node
                    }
                    None => data.to_node(&op.node_id),
                };
                let inverse = match &before {
                    Some(before) => AtomicOperation::update(before, now),
                    None => AtomicOperation::delete(op.node_id.clone(), node.parent_id.clone(), now),
                };
                self.put(node);
                self.record(op.clone(), inverse);
                Ok(true)
            }
            OperationType::Delete => {
                let Some(before) = self.get_node(&op.node_id).cloned() else {
                    return Ok(false);
                };
                if self.root_id() == Some(op.node_id.as_str()) {
                    tracing::warn!("[Sync] Ignoring delete of root {}", op.node_id);
                    return Ok(false);
                }
                self.mark_deleted(&op.node_id);
                self.record(op.clone(), AtomicOperation::create(&before, now));
                Ok(true)
            }
            OperationType::Move => {
                let parent_id = op
                    .parent_id
                    .as_deref()
                    .ok_or_else(|| OperationError::MissingParent(op.node_id.clone()))?;
                let Some(before) = self.get_node(&op.node_id).cloned() else {
                    return Ok(false);
                };
                let Some((old_parent, old_index, _)) =
                    self.relocate(&op.node_id, parent_id, op.position)
                else {
                    return Ok(false);
                };
                let inverse = match (old_parent, old_index) {
                    (Some(old_parent), Some(old_index)) => {
                        AtomicOperation::move_to(op.node_id.clone(), old_parent, Some(old_index), now)
                    }
                    _ => AtomicOperation::update(&before, now),
                };
                self.record(op.clone(), inverse);
                Ok(true)
            }
        }
    }

    /// Validate every operation, then apply them in order. Returns the
    /// number applied.
    pub fn apply_batch(&mut self, batch: &OperationBatch) -> Result<usize, OperationError> {
        for op in &batch.operations {
            op.validate()?;
        }
        let mut applied = 0;
        for op in &batch.operations {
            if self.apply_operation(op)? {
                applied += 1;
            }
        }
        tracing::debug!(
            "[Sync] Applied {}/{} operations from session {}",
            applied,
            batch.operations.len(),
            batch.session_id
        );
        Ok(applied)
    }
}
