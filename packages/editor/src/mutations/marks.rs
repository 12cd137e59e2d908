//! Mark normalization.
//!
//! A normalized mark list has every range clamped to `[0, len]`, no empty
//! ranges, and no two marks of the same kind that overlap or touch. It is
//! sorted by start offset.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_common::{Mark, NodeUpdate};

/// Normalize `marks` for a text of `len` chars
pub fn normalized_marks(marks: &[Mark], len: usize) -> Vec<Mark> {
    let mut clamped: Vec<Mark> = marks
        .iter()
        .map(|m| m.with_range(m.start.min(len), m.end.min(len)))
        .filter(|m| !m.is_empty())
        .collect();
    clamped.sort_by_key(|m| (m.start, m.end));

    let mut out: Vec<Mark> = Vec::with_capacity(clamped.len());
    for mark in clamped {
        match out
            .iter_mut()
            .rev()
            .find(|existing| existing.same_kind(&mark) && existing.end >= mark.start)
        {
            Some(existing) => existing.end = existing.end.max(mark.end),
            None => out.push(mark),
        }
    }
    out
}

/// Summary of one node's marks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkStatistics {
    pub total: usize,
    pub empty: usize,
    pub out_of_bounds: usize,
    /// Same-kind pairs that overlap or touch
    pub mergeable: usize,
    pub by_type: BTreeMap<String, usize>,
    /// Chars covered by at least one mark
    pub covered: usize,
}

impl MarkStatistics {
    pub fn is_normalized(&self) -> bool {
        self.empty == 0 && self.out_of_bounds == 0 && self.mergeable == 0
    }
}

impl Document {
    /// Rewrite a node's marks in normalized form. Returns `false` for an
    /// unknown id.
    pub fn normalize_marks(&mut self, id: &str) -> bool {
        let Some(node) = self.get_node(id) else {
            return false;
        };
        let marks = normalized_marks(&node.marks, node.text_len());
        matches!(
            self.update_node(id, NodeUpdate::new().marks(marks), false),
            Ok(Some(_))
        )
    }

    /// Drop zero-length marks. Returns how many were removed.
    pub fn remove_empty_marks(&mut self, id: &str) -> Option<usize> {
        let node = self.get_node(id)?;
        let kept: Vec<Mark> = node.marks.iter().filter(|m| !m.is_empty()).cloned().collect();
        let removed = node.marks.len() - kept.len();
        if removed > 0 {
            self.update_node(id, NodeUpdate::new().marks(kept), false).ok()?;
        }
        Some(removed)
    }

    /// Add a mark and renormalize
    pub fn add_mark(&mut self, id: &str, mark: Mark) -> bool {
        let Some(node) = self.get_node(id) else {
            return false;
        };
        let mut marks = node.marks.clone();
        marks.push(mark);
        let marks = normalized_marks(&marks, node.text_len());
        matches!(
            self.update_node(id, NodeUpdate::new().marks(marks), false),
            Ok(Some(_))
        )
    }

    pub fn get_mark_statistics(&self, id: &str) -> Option<MarkStatistics> {
        let node = self.get_node(id)?;
        let len = node.text_len();
        let mut stats = MarkStatistics {
            total: node.marks.len(),
            ..MarkStatistics::default()
        };

        let mut covered = vec![false; len];
        for (i, mark) in node.marks.iter().enumerate() {
            *stats.by_type.entry(mark.mark_type.clone()).or_default() += 1;
            if mark.is_empty() {
                stats.empty += 1;
            }
            if mark.end > len || mark.start > mark.end {
                stats.out_of_bounds += 1;
            }
            for slot in covered.iter_mut().take(mark.end.min(len)).skip(mark.start) {
                *slot = true;
            }
            stats.mergeable += node.marks[i + 1..]
                .iter()
                .filter(|other| {
                    mark.same_kind(other) && mark.start <= other.end && other.start <= mark.end
                })
                .count();
        }
        stats.covered = covered.into_iter().filter(|c| *c).count();
        Some(stats)
    }
}
