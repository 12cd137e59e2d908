//! Hierarchy edits: keep every `content` list and `parentId` in agreement.
//!
//! Moves of attached nodes emit a single `move`. Attaching an orphan emits
//! an `update` of the node and of its new parent. Copies never emit `move`:
//! each copied node is a `create` and the destination gets one `update`.

use crate::document::Document;
use crate::errors::TransactionError;
use std::collections::HashSet;
use tessera_common::{Node, NodeUpdate, StructuralError, StructuralResult};

impl Document {
    /// Stage a new node under `parent_id`, generating an id when the node
    /// has none.
    ///
    /// Returns `Ok(None)` when the parent does not exist.
    pub fn create_node(
        &mut self,
        node: Node,
        parent_id: &str,
        index: Option<usize>,
        validate: bool,
    ) -> Result<Option<String>, TransactionError> {
        self.create_with_children(node, Vec::new(), parent_id, index, validate)
    }

    /// Stage a node together with its direct children. Every node is
    /// validated before anything is written.
    pub fn create_with_children(
        &mut self,
        mut node: Node,
        children: Vec<Node>,
        parent_id: &str,
        index: Option<usize>,
        validate: bool,
    ) -> Result<Option<String>, TransactionError> {
        if !self.contains(parent_id) {
            return Ok(None);
        }
        if node.id.is_empty() {
            node.id = self.generate_id();
        }
        node.parent_id = Some(parent_id.to_string());

        let mut children: Vec<Node> = children
            .into_iter()
            .map(|mut child| {
                if child.id.is_empty() {
                    child.id = self.generate_id();
                }
                child.parent_id = Some(node.id.clone());
                child
            })
            .collect();
        node.content = children.iter().map(|c| c.id.clone()).collect();

        if validate {
            for candidate in std::iter::once(&node).chain(children.iter()) {
                TransactionError::check(self.validate(candidate))?;
            }
        }

        let id = node.id.clone();
        self.write_node(node);
        for child in children.drain(..) {
            self.write_node(child);
        }
        self.insert_into_content(parent_id, &id, index);
        Ok(Some(id))
    }

    /// Attach `child_id` under `parent_id` at `index` (end when `None`),
    /// moving it out of its current parent if needed.
    pub fn add_child(
        &mut self,
        parent_id: &str,
        child_id: &str,
        index: Option<usize>,
    ) -> StructuralResult<bool> {
        self.move_node(child_id, parent_id, index)
    }

    /// Attach several children in order, starting at `index`.
    ///
    /// Returns how many were attached.
    pub fn add_children(
        &mut self,
        parent_id: &str,
        child_ids: &[String],
        index: Option<usize>,
    ) -> StructuralResult<usize> {
        self.move_nodes(child_ids, parent_id, index)
    }

    /// Delete `child_id` and its subtree if `parent_id` lists it
    pub fn remove_child(&mut self, parent_id: &str, child_id: &str) -> StructuralResult<bool> {
        let listed = self
            .get_node(parent_id)
            .map_or(false, |p| p.child_index(child_id).is_some());
        if !listed {
            return Ok(false);
        }
        self.delete_node(child_id)
    }

    /// Unlink a node from its parent, leaving it as an orphan
    pub fn detach_node(&mut self, id: &str) -> StructuralResult<bool> {
        if self.root_id() == Some(id) {
            return Err(StructuralError::RootMove(id.to_string()));
        }
        let Some(node) = self.get_node(id) else {
            return Ok(false);
        };
        let Some(parent_id) = node.parent_id.clone() else {
            return Ok(false);
        };

        self.remove_from_content(&parent_id, id);
        self.update_node(id, NodeUpdate::new().parent(None), false)?;
        tracing::debug!("[Hierarchy] Detached {} from {}", id, parent_id);
        Ok(true)
    }

    /// Reorder a parent's children.
    ///
    /// `order` must be a permutation of the current children. Moves are
    /// emitted in ascending target position, each computed against the
    /// order left by the previous ones, so replaying them in sequence
    /// reproduces `order`. Children already in place emit nothing.
    pub fn reorder_children(&mut self, parent_id: &str, order: &[String]) -> bool {
        let Some(parent) = self.get_node(parent_id) else {
            return false;
        };
        let mut working = parent.content.clone();

        let mut current: Vec<&String> = working.iter().collect();
        let mut requested: Vec<&String> = order.iter().collect();
        current.sort();
        requested.sort();
        if current != requested {
            tracing::debug!("[Hierarchy] Reorder of {} is not a permutation", parent_id);
            return false;
        }

        for (target, id) in order.iter().enumerate() {
            if working[target] == *id {
                continue;
            }
            let Some(from) = working.iter().position(|c| c == id) else {
                continue;
            };
            let moved = working.remove(from);
            working.insert(target, moved);
            self.stage_move(id, parent_id, Some(target));
        }
        true
    }

    /// Move a node under `new_parent_id` at `index` (end when `None`).
    ///
    /// The root cannot move and a node cannot move into its own subtree.
    pub fn move_node(
        &mut self,
        id: &str,
        new_parent_id: &str,
        index: Option<usize>,
    ) -> StructuralResult<bool> {
        if self.root_id() == Some(id) {
            tracing::warn!("[Hierarchy] Refusing to move root {}", id);
            return Err(StructuralError::RootMove(id.to_string()));
        }
        if !self.contains(id) || !self.contains(new_parent_id) {
            return Ok(false);
        }
        if self.is_ancestor(id, new_parent_id) {
            tracing::warn!("[Hierarchy] Moving {} under {} would create a cycle", id, new_parent_id);
            return Err(StructuralError::Cycle {
                node_id: id.to_string(),
                parent_id: new_parent_id.to_string(),
            });
        }

        if self.is_attached(id) {
            if self.lands_in_place(id, new_parent_id, index) {
                return Ok(true);
            }
            return Ok(self.stage_move(id, new_parent_id, index));
        }

        // orphan: point it at the parent, then list it
        self.update_node(id, NodeUpdate::new().parent(Some(new_parent_id.to_string())), false)?;
        Ok(self.insert_into_content(new_parent_id, id, index))
    }

    /// Move several nodes in order under one parent, starting at `index`.
    ///
    /// Returns how many were moved. Stops at the first structural error.
    pub fn move_nodes(
        &mut self,
        ids: &[String],
        new_parent_id: &str,
        index: Option<usize>,
    ) -> StructuralResult<usize> {
        let mut moved = 0;
        for (offset, id) in ids.iter().enumerate() {
            if self.move_node(id, new_parent_id, index.map(|i| i + offset))? {
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Copy a single node (without its children) under `parent_id`.
    ///
    /// Returns the id of the copy.
    pub fn copy_node(&mut self, id: &str, parent_id: &str, index: Option<usize>) -> Option<String> {
        self.copy_subtree(id, parent_id, index, false)
    }

    /// Deep copy of a subtree under `parent_id`. Returns the new root id.
    pub fn clone_node_with_children(
        &mut self,
        id: &str,
        parent_id: &str,
        index: Option<usize>,
    ) -> Option<String> {
        self.copy_subtree(id, parent_id, index, true)
    }

    fn lands_in_place(&self, id: &str, parent_id: &str, index: Option<usize>) -> bool {
        let Some(parent) = self.get_node(parent_id) else {
            return false;
        };
        let Some(current) = parent.child_index(id) else {
            return false;
        };
        let last = parent.content.len() - 1;
        index.unwrap_or(last).min(last) == current
    }

    fn copy_subtree(
        &mut self,
        id: &str,
        parent_id: &str,
        index: Option<usize>,
        deep: bool,
    ) -> Option<String> {
        if !self.contains(id) || !self.contains(parent_id) {
            return None;
        }

        // (source id, copy id, copy's parent)
        let root_copy = self.generate_id();
        let mut stack = vec![(id.to_string(), root_copy.clone(), parent_id.to_string())];
        let mut seen = HashSet::new();
        let mut copies = Vec::new();

        while let Some((source_id, copy_id, copy_parent)) = stack.pop() {
            if !seen.insert(source_id.clone()) {
                continue;
            }
            let Some(source) = self.get_node(&source_id).cloned() else {
                continue;
            };

            let mut copy = Node {
                id: copy_id.clone(),
                parent_id: Some(copy_parent),
                content: Vec::new(),
                version: 0,
                ..source.clone()
            };
            if deep {
                let children: Vec<(String, String)> = source
                    .content
                    .iter()
                    .filter(|c| self.contains(c) && !seen.contains(*c))
                    .map(|c| (c.clone(), self.generate_id()))
                    .collect();
                copy.content = children.iter().map(|(_, new_id)| new_id.clone()).collect();
                for (child_source, child_copy) in children.into_iter().rev() {
                    stack.push((child_source, child_copy, copy_id.clone()));
                }
            }
            copies.push(copy);
        }

        let count = copies.len();
        for copy in copies {
            self.write_node(copy);
        }
        self.insert_into_content(parent_id, &root_copy, index);
        tracing::debug!("[Hierarchy] Copied {} as {} ({} nodes)", id, root_copy, count);
        Some(root_copy)
    }
}
