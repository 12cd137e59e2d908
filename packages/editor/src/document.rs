//! # Document Handle
//!
//! The editable view over a [`NodeStore`]: committed base + overlay + the
//! operation bus.
//!
//! ## Lifecycle
//!
//! ```text
//! begin → mutate (overlay) → end → commit | rollback
//!   ↓          ↓               ↓       ↓
//! buffer   ops + inverses   drain    base
//! ```
//!
//! Every write made through the document is staged in the overlay, emitted
//! as an [`AtomicOperation`] and journaled together with its inverse so the
//! transaction can later be undone. The overlay is always active; `begin`
//! only controls whether operations are buffered or delivered immediately.

use crate::config::StoreConfig;
use crate::events::{Dispatcher, OperationBus, OperationCallback, SubscriptionId};
use crate::overlay::{CommitSummary, Lookup, Overlay};
use crate::store::NodeStore;
use crate::validation::{SchemaValidator, Validator};
use std::collections::HashSet;
use std::sync::Arc;
use tessera_common::{
    AtomicOperation, Clock, IdGenerator, Node, NodeUpdate, OperationType, StructuralError,
    StructuralResult, SystemClock, ValidationResult,
};

/// A forward operation paired with the operation that undoes it
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub forward: AtomicOperation,
    pub inverse: AtomicOperation,
}

#[derive(Debug)]
pub struct Document {
    base: NodeStore,
    overlay: Overlay,
    bus: OperationBus,
    journal: Vec<JournalEntry>,
    validator: Arc<dyn Validator>,
    ids: IdGenerator,
    clock: Arc<dyn Clock>,
    validate_by_default: bool,
}

impl Document {
    /// Document whose committed state is a single root node
    pub fn new(root: Node) -> Self {
        Self::from_store(NodeStore::with_root(root))
    }

    pub fn from_store(base: NodeStore) -> Self {
        Self {
            base,
            overlay: Overlay::new(),
            bus: OperationBus::new(),
            journal: Vec::new(),
            validator: Arc::new(SchemaValidator::new()),
            ids: IdGenerator::new(),
            clock: Arc::new(SystemClock),
            validate_by_default: true,
        }
    }

    pub fn with_config(mut self, config: &StoreConfig) -> Self {
        if let Some(session_id) = &config.session_id {
            self.ids = IdGenerator::from_session(session_id.clone());
        }
        self.validate_by_default = config.validate_by_default;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn lookup(&self, id: &str) -> Lookup<'_> {
        self.overlay.resolve(&self.base, id)
    }

    /// Current value of a node, including uncommitted writes
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.lookup(id).node()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get_node(id).is_some()
    }

    pub fn root_id(&self) -> Option<&str> {
        self.overlay.root_id(&self.base)
    }

    pub fn root(&self) -> Option<&Node> {
        self.root_id().and_then(|id| self.get_node(id))
    }

    /// Committed version; only `commit` changes it
    pub fn version(&self) -> u64 {
        self.base.version()
    }

    /// The committed base, unaffected by staged writes
    pub fn committed(&self) -> &NodeStore {
        &self.base
    }

    pub fn session_id(&self) -> &str {
        self.ids.session_id()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.overlay.is_empty()
    }

    /// Full scan over the combined view, orphans included, sorted by id
    pub fn all_nodes(&self) -> Vec<&Node> {
        self.overlay
            .visible_ids(&self.base)
            .iter()
            .filter_map(|id| self.get_node(id))
            .collect()
    }

    /// Nodes other than the root that are not listed by their parent
    pub fn find_orphans(&self) -> Vec<String> {
        let root_id = self.root_id();
        self.all_nodes()
            .into_iter()
            .filter(|node| Some(node.id.as_str()) != root_id)
            .filter(|node| match &node.parent_id {
                None => true,
                Some(parent_id) => self
                    .get_node(parent_id)
                    .map_or(true, |parent| parent.child_index(&node.id).is_none()),
            })
            .map(|node| node.id.clone())
            .collect()
    }

    /// Resolved children of `id` in content order; ids that no longer
    /// resolve are skipped
    pub fn children(&self, id: &str) -> Option<Vec<&Node>> {
        let node = self.get_node(id)?;
        Some(node.content.iter().filter_map(|c| self.get_node(c)).collect())
    }

    pub fn parent(&self, id: &str) -> Option<&Node> {
        let parent_id = self.get_node(id)?.parent_id.as_deref()?;
        self.get_node(parent_id)
    }

    /// Index of `id` inside its parent's content
    pub fn index_in_parent(&self, id: &str) -> Option<usize> {
        self.parent(id)?.child_index(id)
    }

    /// Pre-order ids of the subtree under `id` (excluding `id`)
    pub fn descendants(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<String> = match self.get_node(id) {
            Some(node) => node.content.iter().rev().cloned().collect(),
            None => return out,
        };
        seen.insert(id.to_string());

        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.get_node(&current) {
                stack.extend(node.content.iter().rev().cloned());
                out.push(current);
            }
        }
        out
    }

    /// True when `ancestor` is `id` itself or lies on its parent chain
    pub fn is_ancestor(&self, ancestor: &str, id: &str) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(id.to_string());
        while let Some(cursor) = current {
            if cursor == ancestor {
                return true;
            }
            if !seen.insert(cursor.clone()) {
                return false;
            }
            current = self.get_node(&cursor).and_then(|n| n.parent_id.clone());
        }
        false
    }

    /// Pre-order ids reachable from the root, root first
    pub fn document_order(&self) -> Vec<String> {
        match self.root_id() {
            Some(root_id) => {
                let mut order = vec![root_id.to_string()];
                order.extend(self.descendants(root_id));
                order
            }
            None => Vec::new(),
        }
    }

    /// Text-bearing nodes reachable from the root, in document order
    pub fn text_nodes_in_order(&self) -> Vec<String> {
        self.document_order()
            .into_iter()
            .filter(|id| self.get_node(id).map_or(false, Node::is_text))
            .collect()
    }

    // ---------------------------------------------------------------------
    // Identity
    // ---------------------------------------------------------------------

    pub fn generate_id(&self) -> String {
        self.ids.next_id()
    }

    /// Unstaged node with a fresh id
    pub fn new_node(&self, node_type: impl Into<String>) -> Node {
        Node::new(self.generate_id(), node_type)
    }

    pub fn validate_by_default(&self) -> bool {
        self.validate_by_default
    }

    pub fn validate(&self, node: &Node) -> ValidationResult {
        self.validator.validate(node)
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    pub fn on_operation(
        &mut self,
        callback: OperationCallback,
        filter: Option<OperationType>,
    ) -> SubscriptionId {
        self.bus.on_operation(callback, filter)
    }

    pub fn off_operation(&mut self, id: SubscriptionId) -> bool {
        self.bus.off_operation(id)
    }

    /// Operations buffered in the open collection window
    pub fn pending_operations(&self) -> &[AtomicOperation] {
        self.bus.pending()
    }

    // ---------------------------------------------------------------------
    // Staging primitives
    // ---------------------------------------------------------------------

    /// Stage a node without emitting anything. Bumps the node version.
    pub(crate) fn put(&mut self, mut node: Node) {
        node.version = self.get_node(&node.id).map_or(0, |n| n.version) + 1;
        self.overlay.stage(node);
    }

    pub(crate) fn record(&mut self, forward: AtomicOperation, inverse: AtomicOperation) {
        tracing::debug!(
            "[Document] {} {} (inverse: {})",
            forward.op_type,
            forward.node_id,
            inverse.op_type
        );
        self.journal.push(JournalEntry {
            forward: forward.clone(),
            inverse,
        });
        self.bus.emit(forward);
    }

    /// Stage `node`, emitting `create` or `update` against the combined view
    pub(crate) fn write_node(&mut self, node: Node) {
        let now = self.now();
        let before = self.get_node(&node.id).cloned();
        let id = node.id.clone();
        self.put(node);

        let Some(after) = self.get_node(&id).cloned() else {
            return;
        };
        let (forward, inverse) = match before {
            None => (
                AtomicOperation::create(&after, now),
                AtomicOperation::delete(id, after.parent_id.clone(), now),
            ),
            Some(before) => (
                AtomicOperation::update(&after, now),
                AtomicOperation::update(&before, now),
            ),
        };
        self.record(forward, inverse);
    }

    pub(crate) fn mark_deleted(&mut self, id: &str) {
        self.overlay.mark_deleted(id);
    }

    /// Mark a single node deleted (no cascade, no parent bookkeeping)
    pub(crate) fn remove_node(&mut self, id: &str) -> Option<Node> {
        let before = self.get_node(id).cloned()?;
        let now = self.now();
        self.mark_deleted(id);
        self.record(
            AtomicOperation::delete(id, before.parent_id.clone(), now),
            AtomicOperation::create(&before, now),
        );
        Some(before)
    }

    /// Insert `child_id` into the parent's content (moving it if already
    /// listed) and emit the parent update. `index` defaults to the end.
    pub(crate) fn insert_into_content(
        &mut self,
        parent_id: &str,
        child_id: &str,
        index: Option<usize>,
    ) -> bool {
        let Some(mut parent) = self.get_node(parent_id).cloned() else {
            return false;
        };
        let original = parent.content.clone();
        parent.content.retain(|c| c != child_id);
        let at = index.unwrap_or(parent.content.len()).min(parent.content.len());
        parent.content.insert(at, child_id.to_string());
        if parent.content != original {
            self.write_node(parent);
        }
        true
    }

    /// Drop `child_id` from the parent's content, emitting the parent update
    pub(crate) fn remove_from_content(&mut self, parent_id: &str, child_id: &str) -> bool {
        let Some(mut parent) = self.get_node(parent_id).cloned() else {
            return false;
        };
        let Some(index) = parent.child_index(child_id) else {
            return false;
        };
        parent.content.remove(index);
        self.write_node(parent);
        true
    }

    /// Relocate `id` under `new_parent_id` without emitting anything.
    ///
    /// Returns the old parent, the old index and the final index. The old
    /// parent stops listing the node; `index` defaults to the end.
    pub(crate) fn relocate(
        &mut self,
        id: &str,
        new_parent_id: &str,
        index: Option<usize>,
    ) -> Option<(Option<String>, Option<usize>, usize)> {
        let mut node = self.get_node(id).cloned()?;
        if !self.contains(new_parent_id) {
            return None;
        }

        let old_parent_id = node.parent_id.clone();
        let mut old_index = None;
        if let Some(old_parent_id) = &old_parent_id {
            if let Some(mut old_parent) = self.get_node(old_parent_id).cloned() {
                old_index = old_parent.child_index(id);
                if let Some(i) = old_index {
                    old_parent.content.remove(i);
                    self.put(old_parent);
                }
            }
        }

        let mut new_parent = self.get_node(new_parent_id).cloned()?;
        new_parent.content.retain(|c| c != id);
        let at = index
            .unwrap_or(new_parent.content.len())
            .min(new_parent.content.len());
        new_parent.content.insert(at, id.to_string());
        self.put(new_parent);

        if node.parent_id.as_deref() != Some(new_parent_id) {
            node.parent_id = Some(new_parent_id.to_string());
            self.put(node);
        }
        Some((old_parent_id, old_index, at))
    }

    /// Move an attached node and emit a single `move`
    pub(crate) fn stage_move(&mut self, id: &str, new_parent_id: &str, index: Option<usize>) -> bool {
        let Some(before) = self.get_node(id).cloned() else {
            return false;
        };
        let Some((old_parent, old_index, at)) = self.relocate(id, new_parent_id, index) else {
            return false;
        };

        let now = self.now();
        let forward = AtomicOperation::move_to(id, new_parent_id, Some(at), now);
        let inverse = match old_parent {
            Some(old_parent) if old_index.is_some() => {
                AtomicOperation::move_to(id, old_parent, old_index, now)
            }
            _ => AtomicOperation::update(&before, now),
        };
        self.record(forward, inverse);
        true
    }

    /// True when `id` has a parent that lists it
    pub(crate) fn is_attached(&self, id: &str) -> bool {
        self.index_in_parent(id).is_some()
    }

    // ---------------------------------------------------------------------
    // Basic CRUD
    // ---------------------------------------------------------------------

    /// Write a whole node.
    ///
    /// Emits `create` when the id is new to the combined view, `update`
    /// otherwise. A set `parent_id` also lists the node in that parent's
    /// content; a previous parent stops listing it.
    pub fn set_node(&mut self, node: Node, validate: bool) -> ValidationResult {
        if validate {
            let result = self.validator.validate(&node);
            if !result.valid {
                tracing::debug!("[Document] set_node rejected {}: {:?}", node.id, result.errors);
                return result;
            }
        }

        let id = node.id.clone();
        let old_parent = self.get_node(&id).and_then(|n| n.parent_id.clone());
        let new_parent = node.parent_id.clone();
        self.write_node(node);

        if old_parent != new_parent {
            if let Some(old_parent) = &old_parent {
                self.remove_from_content(old_parent, &id);
            }
        }
        if let Some(parent_id) = &new_parent {
            let listed = self
                .get_node(parent_id)
                .map_or(true, |p| p.child_index(&id).is_some());
            if !listed {
                self.insert_into_content(parent_id, &id, None);
            }
        }
        ValidationResult::ok()
    }

    /// Apply a partial update.
    ///
    /// Returns `Ok(None)` for an unknown id. Updates that would not change
    /// anything are suppressed: nothing is staged or emitted.
    pub fn update_node(
        &mut self,
        id: &str,
        update: NodeUpdate,
        validate: bool,
    ) -> StructuralResult<Option<ValidationResult>> {
        let Some(current) = self.get_node(id).cloned() else {
            return Ok(None);
        };

        if let Some(node_type) = &update.node_type {
            if *node_type != current.node_type {
                tracing::warn!(
                    "[Document] Rejected type change on {}: {} -> {}",
                    id,
                    current.node_type,
                    node_type
                );
                return Err(StructuralError::TypeChange {
                    node_id: id.to_string(),
                    from: current.node_type,
                    to: node_type.clone(),
                });
            }
        }

        if update.is_noop_for(&current) {
            return Ok(Some(ValidationResult::ok()));
        }

        // `content` is an id list, never schema-checked
        if validate && !update.is_content_only() {
            let mut probe = current.clone();
            let schema_fields = NodeUpdate {
                content: None,
                ..update.clone()
            };
            schema_fields.apply_to(&mut probe);
            let result = self.validator.validate(&probe);
            if !result.valid {
                return Ok(Some(result));
            }
        }

        let mut next = current;
        update.apply_to(&mut next);
        self.write_node(next);
        Ok(Some(ValidationResult::ok()))
    }

    /// [`set_node`](Self::set_node) validating per the configured default
    pub fn set_node_default(&mut self, node: Node) -> ValidationResult {
        self.set_node(node, self.validate_by_default)
    }

    /// [`update_node`](Self::update_node) validating per the configured default
    pub fn update_node_default(
        &mut self,
        id: &str,
        update: NodeUpdate,
    ) -> StructuralResult<Option<ValidationResult>> {
        self.update_node(id, update, self.validate_by_default)
    }

    /// Delete a node and its whole subtree.
    ///
    /// Returns `Ok(false)` for an unknown id; deleting the root is rejected
    /// without touching anything.
    pub fn delete_node(&mut self, id: &str) -> StructuralResult<bool> {
        if self.root_id() == Some(id) {
            tracing::warn!("[Document] Refusing to delete root {}", id);
            return Err(StructuralError::RootDeletion(id.to_string()));
        }
        let Some(node) = self.get_node(id).cloned() else {
            return Ok(false);
        };

        if let Some(parent_id) = &node.parent_id {
            self.remove_from_content(parent_id, id);
        }

        // descendants bottom-up: reverse pre-order puts children before parents
        let root_id = self.root_id().map(str::to_string);
        let cascade: Vec<String> = self
            .descendants(id)
            .into_iter()
            .rev()
            .filter(|d| Some(d) != root_id.as_ref())
            .collect();
        for descendant in &cascade {
            self.remove_node(descendant);
        }
        self.remove_node(id);

        tracing::debug!("[Document] Deleted {} with {} descendants", id, cascade.len());
        Ok(true)
    }

    /// Point the root at another existing node (staged until commit)
    pub fn set_root(&mut self, id: &str) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.overlay.stage_root(Some(id.to_string()));
        true
    }

    // ---------------------------------------------------------------------
    // Transaction boundary
    // ---------------------------------------------------------------------

    /// Open an operation collection window
    pub fn begin(&mut self) {
        self.bus.begin();
    }

    /// Close the window and drain its operations
    pub fn end(&mut self) -> Vec<AtomicOperation> {
        self.bus.end()
    }

    /// Close the window without delivering. The returned dispatcher delivers
    /// the operations later, once the caller has let go of the document.
    pub fn end_deferred(&mut self) -> (Vec<AtomicOperation>, Dispatcher) {
        (self.bus.drain(), self.bus.dispatcher())
    }

    /// Forward/inverse pairs recorded since the last commit or rollback
    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    pub fn take_journal(&mut self) -> Vec<JournalEntry> {
        std::mem::take(&mut self.journal)
    }

    /// Merge the overlay into the base
    pub fn commit(&mut self) -> CommitSummary {
        let summary = self.overlay.commit_into(&mut self.base);
        self.journal.clear();
        tracing::info!(
            "[Document] Committed version {} ({} created, {} updated, {} moved, {} deleted)",
            summary.version,
            summary.created,
            summary.updated,
            summary.moved,
            summary.deleted
        );
        summary
    }

    /// Discard the overlay, the buffered operations and the journal
    pub fn rollback(&mut self) {
        tracing::info!(
            "[Document] Rolling back {} staged and {} deleted nodes",
            self.overlay.staged_count(),
            self.overlay.deleted_count()
        );
        self.overlay.clear();
        self.bus.discard();
        self.journal.clear();
    }
}
