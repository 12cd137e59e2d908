//! # Transactional Overlay
//!
//! Copy-on-write staging layer over the [`NodeStore`]. Reads resolve in a
//! fixed order:
//!
//! ```text
//! staged nodes → deletion set → base → missing
//! ```
//!
//! Every read path in the crate goes through [`Overlay::resolve`].

use crate::store::NodeStore;
use std::collections::{BTreeSet, HashMap, HashSet};
use tessera_common::Node;

/// Where a read was answered from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Staged(&'a Node),
    Deleted,
    Committed(&'a Node),
    Missing,
}

impl<'a> Lookup<'a> {
    pub fn node(self) -> Option<&'a Node> {
        match self {
            Lookup::Staged(node) | Lookup::Committed(node) => Some(node),
            Lookup::Deleted | Lookup::Missing => None,
        }
    }
}

/// Counts of what a commit applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub created: usize,
    pub updated: usize,
    pub moved: usize,
    pub deleted: usize,
    pub version: u64,
}

impl CommitSummary {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.moved + self.deleted
    }
}

/// Staged changes grouped by kind, in commit order
#[derive(Debug, Default)]
struct ChangeSet {
    creates: Vec<String>,
    updates: Vec<String>,
    moves: Vec<String>,
    deletes: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Overlay {
    staged: HashMap<String, Node>,
    deleted: HashSet<String>,
    staged_root: Option<Option<String>>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve<'a>(&'a self, base: &'a NodeStore, id: &str) -> Lookup<'a> {
        if let Some(node) = self.staged.get(id) {
            return Lookup::Staged(node);
        }
        if self.deleted.contains(id) {
            return Lookup::Deleted;
        }
        match base.get(id) {
            Some(node) => Lookup::Committed(node),
            None => Lookup::Missing,
        }
    }

    pub fn root_id<'a>(&'a self, base: &'a NodeStore) -> Option<&'a str> {
        match &self.staged_root {
            Some(root) => root.as_deref(),
            None => base.root_id(),
        }
    }

    /// Every id visible through the combined view, sorted
    pub fn visible_ids(&self, base: &NodeStore) -> Vec<String> {
        let mut ids: BTreeSet<String> = base
            .ids()
            .filter(|id| !self.deleted.contains(*id))
            .cloned()
            .collect();
        ids.extend(self.staged.keys().cloned());
        ids.into_iter().collect()
    }

    pub fn stage(&mut self, node: Node) {
        self.deleted.remove(&node.id);
        self.staged.insert(node.id.clone(), node);
    }

    pub fn mark_deleted(&mut self, id: &str) {
        self.staged.remove(id);
        self.deleted.insert(id.to_string());
    }

    pub fn stage_root(&mut self, root_id: Option<String>) {
        self.staged_root = Some(root_id);
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.deleted.is_empty() && self.staged_root.is_none()
    }

    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn clear(&mut self) {
        self.staged.clear();
        self.deleted.clear();
        self.staged_root = None;
    }

    fn change_set(&self, base: &NodeStore) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let mut staged_ids: Vec<&String> = self.staged.keys().collect();
        staged_ids.sort();

        for id in staged_ids {
            match (base.get(id), self.staged.get(id)) {
                (None, _) => changes.creates.push(id.clone()),
                (Some(old), Some(new)) if old.parent_id != new.parent_id => {
                    changes.moves.push(id.clone())
                }
                _ => changes.updates.push(id.clone()),
            }
        }

        let mut deleted: Vec<&String> = self.deleted.iter().filter(|id| base.contains(id)).collect();
        deleted.sort();
        changes.deletes = deleted.into_iter().cloned().collect();
        changes
    }

    /// Apply staged changes to `base` in create → update → move → delete
    /// order, then clear the overlay and bump the base version.
    pub fn commit_into(&mut self, base: &mut NodeStore) -> CommitSummary {
        let changes = self.change_set(base);
        let mut staged = std::mem::take(&mut self.staged);

        for id in changes
            .creates
            .iter()
            .chain(&changes.updates)
            .chain(&changes.moves)
        {
            if let Some(node) = staged.remove(id) {
                base.insert(node);
            }
        }
        for id in &changes.deletes {
            base.remove(id);
        }
        if let Some(root) = self.staged_root.take() {
            base.set_root(root);
        }

        self.clear();
        CommitSummary {
            created: changes.creates.len(),
            updated: changes.updates.len(),
            moved: changes.moves.len(),
            deleted: changes.deletes.len(),
            version: base.bump_version(),
        }
    }
}
