//! Split and merge of text and block nodes.
//!
//! Splitting text at `p` keeps `text[..p]` in the original node and moves
//! `text[p..]` into a new right sibling. Marks left of `p` stay, marks
//! right of `p` move over shifted by `-p`, marks straddling `p` are split
//! in two. Merging concatenates the text and re-adds the right node's marks
//! shifted by the left length, then deletes the right node.

use super::marks::normalized_marks;
use crate::document::Document;
use tessera_common::{text, Mark, Node, NodeUpdate, StructuralError, StructuralResult};

/// Partition marks at char offset `at` into `(left, right)`; right-hand
/// marks are rebased to start at 0
pub fn split_marks(marks: &[Mark], at: usize) -> (Vec<Mark>, Vec<Mark>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for mark in marks {
        if mark.end <= at {
            left.push(mark.clone());
        } else if mark.start >= at {
            right.push(mark.with_range(mark.start - at, mark.end - at));
        } else {
            left.push(mark.with_range(mark.start, at));
            right.push(mark.with_range(0, mark.end - at));
        }
    }
    (left, right)
}

impl Document {
    /// Split a text node at char `offset`. Returns the new right node's id.
    pub fn split_text_node(&mut self, id: &str, offset: usize) -> Option<String> {
        let node = self.get_node(id)?.clone();
        if !node.is_text() || offset > node.text_len() {
            return None;
        }

        let (head, tail) = text::split_at_char(node.text_str(), offset);
        let (left_marks, right_marks) = split_marks(&node.marks, offset);

        let right = Node {
            id: self.generate_id(),
            text: Some(tail.to_string()),
            content: Vec::new(),
            marks: right_marks,
            version: 0,
            ..node.clone()
        };
        let right_id = right.id.clone();
        let update = NodeUpdate::new().text(head).marks(left_marks);

        self.update_node(id, update, false).ok()?;
        self.write_node(right);
        if let Some(parent_id) = &node.parent_id {
            if let Some(index) = self.get_node(parent_id).and_then(|p| p.child_index(id)) {
                self.insert_into_content(parent_id, &right_id, Some(index + 1));
            }
        }

        tracing::debug!("[SplitMerge] Split {} at {} into {}", id, offset, right_id);
        Some(right_id)
    }

    /// Append `right_id`'s text and marks to `left_id`, then delete `right_id`
    pub fn merge_text_nodes(&mut self, left_id: &str, right_id: &str) -> StructuralResult<bool> {
        if left_id == right_id {
            return Ok(false);
        }
        let (Some(left), Some(right)) = (self.get_node(left_id), self.get_node(right_id)) else {
            return Ok(false);
        };
        if !left.is_text() || !right.is_text() {
            return Ok(false);
        }
        if self.root_id() == Some(right_id) {
            return Err(StructuralError::RootDeletion(right_id.to_string()));
        }

        let shift = left.text_len();
        let merged_text = format!("{}{}", left.text_str(), right.text_str());
        let mut marks = left.marks.clone();
        marks.extend(
            right
                .marks
                .iter()
                .map(|m| m.with_range(m.start + shift, m.end + shift)),
        );
        let marks = normalized_marks(&marks, text::char_len(&merged_text));

        self.update_node(left_id, NodeUpdate::new().text(merged_text).marks(marks), false)?;
        self.delete_node(right_id)?;
        tracing::debug!("[SplitMerge] Merged {} into {}", right_id, left_id);
        Ok(true)
    }

    /// Split a block before child `index`: children from `index` on move
    /// into a new sibling block. Returns the new block's id.
    pub fn split_block_node(&mut self, id: &str, index: usize) -> Option<String> {
        let node = self.get_node(id)?.clone();
        if index > node.content.len() {
            return None;
        }
        let parent_id = node.parent_id.clone()?;
        let position = self.get_node(&parent_id)?.child_index(id)?;

        let sibling = Node {
            id: self.generate_id(),
            text: None,
            content: Vec::new(),
            marks: Vec::new(),
            version: 0,
            ..node.clone()
        };
        let sibling_id = sibling.id.clone();
        self.write_node(sibling);
        self.insert_into_content(&parent_id, &sibling_id, Some(position + 1));

        for child in &node.content[index..] {
            self.stage_move(child, &sibling_id, None);
        }
        tracing::debug!("[SplitMerge] Split block {} at {} into {}", id, index, sibling_id);
        Some(sibling_id)
    }

    /// Move every child of `right_id` to the end of `left_id`, then delete
    /// the emptied `right_id`
    pub fn merge_block_nodes(&mut self, left_id: &str, right_id: &str) -> StructuralResult<bool> {
        if left_id == right_id || !self.contains(left_id) {
            return Ok(false);
        }
        let Some(right) = self.get_node(right_id).cloned() else {
            return Ok(false);
        };
        if self.root_id() == Some(right_id) {
            return Err(StructuralError::RootDeletion(right_id.to_string()));
        }
        if self.is_ancestor(right_id, left_id) {
            return Err(StructuralError::Cycle {
                node_id: right_id.to_string(),
                parent_id: left_id.to_string(),
            });
        }

        for child in &right.content {
            self.stage_move(child, left_id, None);
        }
        self.delete_node(right_id)?;
        tracing::debug!("[SplitMerge] Merged block {} into {}", right_id, left_id);
        Ok(true)
    }

    /// Isolate chars `[start, end)` of a text node in their own node.
    ///
    /// Returns the id of the node holding the range: the original node when
    /// `start == 0`, otherwise the new middle node.
    pub fn split_text_range(&mut self, id: &str, start: usize, end: usize) -> Option<String> {
        let len = self.get_node(id)?.text_len();
        if start > end || end > len {
            return None;
        }
        if end < len {
            self.split_text_node(id, end)?;
        }
        if start > 0 {
            return self.split_text_node(id, start);
        }
        Some(id.to_string())
    }

    /// Merge adjacent text children of `parent_id` that share type and
    /// attributes. Returns the number of merges.
    pub fn auto_merge_text_nodes(&mut self, parent_id: &str) -> StructuralResult<usize> {
        let mut merges = 0;
        let mut i = 0;
        loop {
            let Some(parent) = self.get_node(parent_id) else {
                return Ok(merges);
            };
            if i + 1 >= parent.content.len() {
                return Ok(merges);
            }
            let (left_id, right_id) = (parent.content[i].clone(), parent.content[i + 1].clone());

            let mergeable = match (self.get_node(&left_id), self.get_node(&right_id)) {
                (Some(left), Some(right)) => {
                    left.is_text()
                        && right.is_text()
                        && left.node_type == right.node_type
                        && left.attributes == right.attributes
                }
                _ => false,
            };
            if mergeable && self.merge_text_nodes(&left_id, &right_id)? {
                merges += 1;
            } else {
                i += 1;
            }
        }
    }
}
