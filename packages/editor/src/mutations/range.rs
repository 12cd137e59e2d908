//! # Range Operations
//!
//! Text and mark edits over a [`ContentRange`] that may span several text
//! nodes. A cross-node range is cut into segments following document order
//! (pre-order text nodes from the root):
//!
//! ```text
//! [first partial] [whole] [whole] ... [last partial]
//! ```
//!
//! Same-node ranges are a single partial segment. Offsets count chars.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use tessera_common::{text, Attributes, Mark, Node, NodeUpdate, StructuralResult};

/// A selection from `(start_node_id, start_offset)` to
/// `(end_node_id, end_offset)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRange {
    pub start_node_id: String,
    pub start_offset: usize,
    pub end_node_id: String,
    pub end_offset: usize,
}

impl ContentRange {
    pub fn new(
        start_node_id: impl Into<String>,
        start_offset: usize,
        end_node_id: impl Into<String>,
        end_offset: usize,
    ) -> Self {
        Self {
            start_node_id: start_node_id.into(),
            start_offset,
            end_node_id: end_node_id.into(),
            end_offset,
        }
    }

    /// `[start, end)` inside one node
    pub fn within(node_id: impl Into<String>, start: usize, end: usize) -> Self {
        let node_id = node_id.into();
        Self::new(node_id.clone(), start, node_id, end)
    }

    /// A caret position
    pub fn collapsed(node_id: impl Into<String>, offset: usize) -> Self {
        Self::within(node_id, offset, offset)
    }

    pub fn is_collapsed(&self) -> bool {
        self.is_single_node() && self.start_offset == self.end_offset
    }

    pub fn is_single_node(&self) -> bool {
        self.start_node_id == self.end_node_id
    }
}

/// A mark found by [`Document::marks_in_range`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeMark {
    pub node_id: String,
    pub mark: Mark,
}

/// The part of one text node covered by a range
#[derive(Debug, Clone, PartialEq)]
struct Segment {
    node_id: String,
    start: usize,
    end: usize,
    /// Covered from end to end as a middle node
    whole: bool,
}

/// Position after deleting chars `[start, end)`
fn shift_for_delete(offset: usize, start: usize, end: usize) -> usize {
    if offset <= start {
        offset
    } else if offset >= end {
        offset - (end - start)
    } else {
        start
    }
}

fn marks_after_delete(marks: &[Mark], start: usize, end: usize) -> Vec<Mark> {
    marks
        .iter()
        .map(|m| {
            m.with_range(
                shift_for_delete(m.start, start, end),
                shift_for_delete(m.end, start, end),
            )
        })
        .filter(|m| !m.is_empty())
        .collect()
}

/// Marks grow when text is inserted strictly inside them; a mark ending at
/// the insertion point does not extend
fn marks_after_insert(marks: &[Mark], at: usize, count: usize) -> Vec<Mark> {
    marks
        .iter()
        .map(|m| {
            let start = if m.start >= at { m.start + count } else { m.start };
            let end = if m.end > at { m.end + count } else { m.end };
            m.with_range(start, end.max(start))
        })
        .collect()
}

/// Marks with `[start, end)` cut out of every mark of `mark_type`
fn marks_without(marks: &[Mark], mark_type: &str, start: usize, end: usize) -> Vec<Mark> {
    let mut out = Vec::with_capacity(marks.len());
    for mark in marks {
        if mark.mark_type != mark_type || mark.end <= start || mark.start >= end {
            out.push(mark.clone());
            continue;
        }
        if mark.start < start {
            out.push(mark.with_range(mark.start, start));
        }
        if mark.end > end {
            out.push(mark.with_range(end, mark.end));
        }
    }
    out
}

fn covers(mark: &Mark, start: usize, end: usize) -> bool {
    if start == end {
        mark.start <= start && start < mark.end
    } else {
        mark.start < end && mark.end > start
    }
}

impl Document {
    fn segments(&self, range: &ContentRange) -> Option<Vec<Segment>> {
        let start_len = self.text_node(&range.start_node_id)?.text_len();
        let end_len = self.text_node(&range.end_node_id)?.text_len();
        if range.start_offset > start_len || range.end_offset > end_len {
            return None;
        }

        if range.is_single_node() {
            if range.start_offset > range.end_offset {
                return None;
            }
            return Some(vec![Segment {
                node_id: range.start_node_id.clone(),
                start: range.start_offset,
                end: range.end_offset,
                whole: false,
            }]);
        }

        let order = self.text_nodes_in_order();
        let first = order.iter().position(|id| *id == range.start_node_id)?;
        let last = order.iter().position(|id| *id == range.end_node_id)?;
        if first > last {
            return None;
        }

        let mut segments = vec![Segment {
            node_id: range.start_node_id.clone(),
            start: range.start_offset,
            end: start_len,
            whole: false,
        }];
        for id in &order[first + 1..last] {
            let len = self.get_node(id).map_or(0, Node::text_len);
            segments.push(Segment {
                node_id: id.clone(),
                start: 0,
                end: len,
                whole: true,
            });
        }
        segments.push(Segment {
            node_id: range.end_node_id.clone(),
            start: 0,
            end: range.end_offset,
            whole: false,
        });
        Some(segments)
    }

    fn text_node(&self, id: &str) -> Option<&Node> {
        self.get_node(id).filter(|n| n.is_text())
    }

    /// Remove the chars covered by `range`.
    ///
    /// Middle nodes are deleted outright; the first and last nodes keep
    /// their uncovered text. Returns `Ok(false)` for an invalid range.
    pub fn delete_text(&mut self, range: &ContentRange) -> StructuralResult<bool> {
        let Some(segments) = self.segments(range) else {
            return Ok(false);
        };

        for segment in segments {
            if segment.whole {
                self.delete_node(&segment.node_id)?;
                continue;
            }
            if segment.start == segment.end {
                continue;
            }
            let Some(node) = self.get_node(&segment.node_id) else {
                continue;
            };
            let text = text::splice_chars(node.text_str(), segment.start, segment.end, "");
            let marks = marks_after_delete(&node.marks, segment.start, segment.end);
            self.update_node(
                &segment.node_id,
                NodeUpdate::new().text(text).marks(marks),
                false,
            )?;
        }
        Ok(true)
    }

    /// Insert `content` at a collapsed range. Any other range shape fails.
    pub fn insert_text(&mut self, range: &ContentRange, content: &str) -> bool {
        if !range.is_collapsed() {
            return false;
        }
        let Some(node) = self.text_node(&range.start_node_id) else {
            return false;
        };
        let at = range.start_offset;
        if at > node.text_len() {
            return false;
        }

        let text = text::splice_chars(node.text_str(), at, at, content);
        let marks = marks_after_insert(&node.marks, at, text::char_len(content));
        matches!(
            self.update_node(
                &range.start_node_id,
                NodeUpdate::new().text(text).marks(marks),
                false,
            ),
            Ok(Some(_))
        )
    }

    /// Delete the range, then insert `content` at its start
    pub fn replace_text(&mut self, range: &ContentRange, content: &str) -> StructuralResult<bool> {
        if !self.delete_text(range)? {
            return Ok(false);
        }
        let caret = ContentRange::collapsed(range.start_node_id.clone(), range.start_offset);
        Ok(self.insert_text(&caret, content))
    }

    /// Covered text, segments concatenated without a separator
    pub fn extract_text(&self, range: &ContentRange) -> Option<String> {
        let segments = self.segments(range)?;
        let mut out = String::new();
        for segment in segments {
            if let Some(node) = self.get_node(&segment.node_id) {
                out.push_str(text::slice_chars(node.text_str(), segment.start, segment.end));
            }
        }
        Some(out)
    }

    /// Add a `mark_type` mark over every covered segment, renormalizing
    /// each touched node
    pub fn apply_mark(&mut self, range: &ContentRange, mark_type: &str, attrs: Attributes) -> bool {
        let Some(segments) = self.segments(range) else {
            return false;
        };
        for segment in segments.into_iter().filter(|s| s.start < s.end) {
            let mut mark = Mark::new(mark_type, segment.start, segment.end);
            mark.attrs = attrs.clone();
            self.add_mark(&segment.node_id, mark);
        }
        true
    }

    /// Cut every `mark_type` mark out of the covered segments
    pub fn remove_mark(&mut self, range: &ContentRange, mark_type: &str) -> bool {
        let Some(segments) = self.segments(range) else {
            return false;
        };
        for segment in segments.into_iter().filter(|s| s.start < s.end) {
            let Some(node) = self.get_node(&segment.node_id) else {
                continue;
            };
            let marks = marks_without(&node.marks, mark_type, segment.start, segment.end);
            if let Err(err) = self.update_node(&segment.node_id, NodeUpdate::new().marks(marks), false) {
                tracing::warn!("[Range] remove_mark on {} failed: {}", segment.node_id, err);
                return false;
            }
        }
        true
    }

    /// Marks overlapping the range, in segment order. A collapsed range
    /// reports the marks containing the caret.
    pub fn marks_in_range(&self, range: &ContentRange) -> Option<Vec<RangeMark>> {
        let segments = self.segments(range)?;
        let mut found = Vec::new();
        for segment in &segments {
            let Some(node) = self.get_node(&segment.node_id) else {
                continue;
            };
            found.extend(
                node.marks
                    .iter()
                    .filter(|m| covers(m, segment.start, segment.end))
                    .map(|m| RangeMark {
                        node_id: node.id.clone(),
                        mark: m.clone(),
                    }),
            );
        }
        Some(found)
    }
}
