//! # History
//!
//! Bounded undo/redo log over committed transactions.
//!
//! ## Design
//!
//! - Each entry stores the forward operations of one transaction and their
//!   inverses, already in the order they must be applied
//! - The cursor sits between the undoable entries (before it) and the
//!   redoable ones (after it)
//! - A fresh edit discards everything after the cursor
//! - Replays of undo/redo and remote batches are never recorded
//!
//! ```text
//! entries: [e0] [e1] [e2] | [e3] [e4]
//!                         ^ cursor = 3
//!          undo → e2      redo → e3
//! ```

use crate::config::{StoreConfig, DEFAULT_COMPRESSION_WINDOW_MS, DEFAULT_HISTORY_MAX_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tessera_common::{AtomicOperation, OperationType};

/// Where a committed transaction came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistorySource {
    #[default]
    Edit,
    Undo,
    Redo,
    Remote,
}

impl HistorySource {
    /// Only local edits become undoable
    pub fn is_recorded(&self) -> bool {
        matches!(self, HistorySource::Edit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: i64,
    pub operations: Vec<AtomicOperation>,
    /// Applied in order to revert `operations`
    pub inverse_operations: Vec<AtomicOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub source: HistorySource,
}

impl HistoryEntry {
    pub fn new(
        id: impl Into<String>,
        timestamp: i64,
        operations: Vec<AtomicOperation>,
        inverse_operations: Vec<AtomicOperation>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            operations,
            inverse_operations,
            description: None,
            metadata: None,
            source: HistorySource::Edit,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_source(mut self, source: HistorySource) -> Self {
        self.source = source;
        self
    }

    /// The node every operation targets, if there is exactly one
    pub fn touched_node(&self) -> Option<&str> {
        let first = self.operations.first()?.node_id.as_str();
        self.operations
            .iter()
            .chain(&self.inverse_operations)
            .all(|op| op.node_id == first)
            .then_some(first)
    }

    pub fn is_update_only(&self) -> bool {
        !self.operations.is_empty()
            && self
                .operations
                .iter()
                .chain(&self.inverse_operations)
                .all(|op| op.op_type == OperationType::Update)
    }

    pub fn memory_usage(&self) -> usize {
        let ops: usize = self
            .operations
            .iter()
            .chain(&self.inverse_operations)
            .map(AtomicOperation::estimated_size)
            .sum();
        ops + self.id.len() + self.description.as_ref().map_or(0, String::len)
    }

    /// `next` continues this entry's single-node edit run
    fn can_absorb(&self, next: &HistoryEntry, window_ms: i64) -> bool {
        self.is_update_only()
            && next.is_update_only()
            && self.touched_node().is_some()
            && self.touched_node() == next.touched_node()
            && next.timestamp - self.timestamp <= window_ms
    }

    /// Fold `next` into this entry: keep the state before this entry as
    /// the inverse and `next`'s final state as the forward operation
    fn absorb(&mut self, next: HistoryEntry) {
        if let Some(last) = next.operations.last() {
            self.operations = vec![last.clone()];
        }
        if let Some(first_state) = self.inverse_operations.last().cloned() {
            self.inverse_operations = vec![first_state];
        }
        self.timestamp = next.timestamp;
    }
}

/// Result of [`HistoryManager::validate_history`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HistoryManager {
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    max_size: usize,
    compression_window_ms: i64,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_MAX_SIZE)
    }
}

impl HistoryManager {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: 0,
            max_size,
            compression_window_ms: DEFAULT_COMPRESSION_WINDOW_MS,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.history_max_size).with_compression_window(config.compression_window_ms)
    }

    pub fn with_compression_window(mut self, window_ms: i64) -> Self {
        self.compression_window_ms = window_ms;
        self
    }

    /// Record a committed transaction.
    ///
    /// Empty entries and replays are ignored. Returns whether the entry was
    /// stored.
    pub fn push(&mut self, entry: HistoryEntry) -> bool {
        if entry.operations.is_empty() || !entry.source.is_recorded() {
            return false;
        }

        if self.cursor < self.entries.len() {
            tracing::debug!(
                "[History] Discarding {} redo entries",
                self.entries.len() - self.cursor
            );
            self.entries.truncate(self.cursor);
        }
        self.entries.push_back(entry);
        self.cursor = self.entries.len();

        while self.entries.len() > self.max_size {
            self.entries.pop_front();
            self.cursor = self.cursor.saturating_sub(1);
        }
        true
    }

    /// Step back and return the entry to revert
    pub fn undo(&mut self) -> Option<HistoryEntry> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor).cloned()
    }

    /// Step forward and return the entry to reapply
    pub fn redo(&mut self) -> Option<HistoryEntry> {
        let entry = self.entries.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(entry)
    }

    /// Revert the cursor move of an undo whose replay failed
    pub fn cancel_undo(&mut self) {
        self.cursor = (self.cursor + 1).min(self.entries.len());
    }

    /// Revert the cursor move of a redo whose replay failed
    pub fn cancel_redo(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    /// Merge runs of single-node update entries that are close in time.
    ///
    /// Runs never cross the cursor. Returns how many entries were removed.
    pub fn compress_history(&mut self) -> usize {
        let before = self.entries.len();
        let redo = self.entries.split_off(self.cursor);

        let undo = Self::compress_run(std::mem::take(&mut self.entries), self.compression_window_ms);
        let redo = Self::compress_run(redo, self.compression_window_ms);

        self.cursor = undo.len();
        self.entries = undo;
        self.entries.extend(redo);

        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::info!("[History] Compressed {} entries into {}", before, self.entries.len());
        }
        removed
    }

    fn compress_run(entries: VecDeque<HistoryEntry>, window_ms: i64) -> VecDeque<HistoryEntry> {
        let mut out: VecDeque<HistoryEntry> = VecDeque::with_capacity(entries.len());
        for entry in entries {
            let continues_run = out
                .back()
                .map_or(false, |previous| previous.can_absorb(&entry, window_ms));
            match out.back_mut() {
                Some(previous) if continues_run => previous.absorb(entry),
                _ => out.push_back(entry),
            }
        }
        out
    }

    /// Change the bound, dropping the oldest entries if needed. Returns how
    /// many were dropped.
    pub fn resize_history(&mut self, max_size: usize) -> usize {
        self.max_size = max_size;
        let excess = self.entries.len().saturating_sub(max_size);
        self.entries.drain(..excess);
        self.cursor = self.cursor.saturating_sub(excess);
        excess
    }

    /// Estimated bytes held by every stored operation
    pub fn history_memory_usage(&self) -> usize {
        self.entries.iter().map(HistoryEntry::memory_usage).sum()
    }

    pub fn validate_history(&self) -> HistoryValidation {
        let mut errors = Vec::new();

        if self.cursor > self.entries.len() {
            errors.push(format!(
                "Cursor {} is past the end of {} entries",
                self.cursor,
                self.entries.len()
            ));
        }
        if self.entries.len() > self.max_size {
            errors.push(format!(
                "{} entries exceed the maximum of {}",
                self.entries.len(),
                self.max_size
            ));
        }

        let mut previous: Option<i64> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.operations.is_empty() {
                errors.push(format!("Entry {} ({}) has no operations", index, entry.id));
            }
            if entry.operations.len() != entry.inverse_operations.len() {
                errors.push(format!(
                    "Entry {} ({}) has {} operations but {} inverses",
                    index,
                    entry.id,
                    entry.operations.len(),
                    entry.inverse_operations.len()
                ));
            }
            if let Some(previous) = previous {
                if entry.timestamp < previous {
                    errors.push(format!(
                        "Entry {} ({}) is older than the entry before it",
                        index, entry.id
                    ));
                }
            }
            previous = Some(entry.timestamp);
        }

        HistoryValidation {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::Node;

    fn text_entry(id: &str, node: &str, before: &str, after: &str, ts: i64) -> HistoryEntry {
        let old = Node::new(node, "text").with_text(before);
        let new = Node::new(node, "text").with_text(after);
        HistoryEntry::new(
            id,
            ts,
            vec![AtomicOperation::update(&new, ts)],
            vec![AtomicOperation::update(&old, ts)],
        )
    }

    fn texts(ops: &[AtomicOperation]) -> Vec<String> {
        ops.iter()
            .filter_map(|op| op.data.as_ref()?.text.clone())
            .collect()
    }

    #[test]
    fn test_push_ignores_empty_and_replays() {
        let mut history = HistoryManager::default();
        assert!(!history.push(HistoryEntry::new("e", 0, vec![], vec![])));
        assert!(!history.push(text_entry("u", "n", "a", "b", 0).with_source(HistorySource::Undo)));
        assert!(!history.push(text_entry("r", "n", "a", "b", 0).with_source(HistorySource::Remote)));
        assert!(history.is_empty());

        assert!(history.push(text_entry("e1", "n", "a", "b", 0)));
        assert_eq!(history.len(), 1);
        assert_eq!(history.cursor(), 1);
    }

    #[test]
    fn test_eviction_keeps_newest() {
        let mut history = HistoryManager::new(2);
        for i in 0..3 {
            history.push(text_entry(&format!("e{}", i), "n", "a", "b", i));
        }
        let ids: Vec<_> = history.entries().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
        assert_eq!(history.cursor(), 2);
    }

    #[test]
    fn test_undo_redo_cursor() {
        let mut history = HistoryManager::default();
        assert!(history.undo().is_none());
        history.push(text_entry("e1", "n", "a", "b", 0));
        history.push(text_entry("e2", "n", "b", "c", 1));

        assert_eq!(history.undo().unwrap().id, "e2");
        assert_eq!(history.undo().unwrap().id, "e1");
        assert!(history.undo().is_none());
        assert_eq!(history.cursor(), 0);

        assert_eq!(history.redo().unwrap().id, "e1");
        assert!(history.can_redo());
        assert_eq!(history.redo().unwrap().id, "e2");
        assert!(history.redo().is_none());
        assert_eq!(history.cursor(), 2);
    }

    #[test]
    fn test_fresh_edit_discards_redo_branch() {
        let mut history = HistoryManager::default();
        history.push(text_entry("e1", "n", "a", "b", 0));
        history.push(text_entry("e2", "n", "b", "c", 1));
        history.undo();

        history.push(text_entry("e3", "n", "b", "x", 2));
        let ids: Vec<_> = history.entries().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["e1", "e3"]);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_cancel_restores_cursor() {
        let mut history = HistoryManager::default();
        history.push(text_entry("e1", "n", "a", "b", 0));
        history.undo();
        history.cancel_undo();
        assert_eq!(history.cursor(), 1);
        history.undo();
        history.redo();
        history.cancel_redo();
        assert_eq!(history.cursor(), 0);
    }

    #[test]
    fn test_compress_merges_typing_run() {
        let mut history = HistoryManager::default().with_compression_window(1_000);
        history.push(text_entry("e1", "n", "", "H", 0));
        history.push(text_entry("e2", "n", "H", "Hi", 300));
        history.push(text_entry("e3", "n", "Hi", "Hi!", 600));
        history.push(text_entry("e4", "m", "x", "y", 700));
        history.push(text_entry("e5", "m", "y", "z", 5_000));

        assert_eq!(history.compress_history(), 2);
        assert_eq!(history.len(), 3);
        assert_eq!(history.cursor(), 3);

        let merged = history.entries().next().unwrap();
        assert_eq!(texts(&merged.operations), vec!["Hi!"]);
        assert_eq!(texts(&merged.inverse_operations), vec![""]);
        assert!(history.validate_history().is_valid);
    }

    #[test]
    fn test_compress_does_not_cross_cursor() {
        let mut history = HistoryManager::default();
        history.push(text_entry("e1", "n", "a", "b", 0));
        history.push(text_entry("e2", "n", "b", "c", 10));
        history.undo();

        assert_eq!(history.compress_history(), 0);
        assert_eq!(history.len(), 2);
        assert_eq!(history.cursor(), 1);
    }

    #[test]
    fn test_resize_drops_oldest() {
        let mut history = HistoryManager::default();
        for i in 0..5 {
            history.push(text_entry(&format!("e{}", i), "n", "a", "b", i));
        }
        history.undo();

        assert_eq!(history.resize_history(2), 3);
        let ids: Vec<_> = history.entries().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["e3", "e4"]);
        assert_eq!(history.cursor(), 1);
        assert_eq!(history.resize_history(10), 0);
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut history = HistoryManager::default();
        history.push(text_entry("late", "n", "a", "b", 100));
        let mut broken = text_entry("early", "n", "b", "c", 50);
        broken.inverse_operations.clear();
        history.push(broken);

        let report = history.validate_history();
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_memory_usage_grows_with_entries() {
        let mut history = HistoryManager::default();
        assert_eq!(history.history_memory_usage(), 0);
        history.push(text_entry("e1", "n", "a", "b", 0));
        let one = history.history_memory_usage();
        history.push(text_entry("e2", "n", "b", "a much longer text value", 1));
        assert!(one > 0);
        assert!(history.history_memory_usage() > one);
    }
}
