//! # Node Store
//!
//! The committed, canonical node map. Nothing writes here except
//! [`Overlay::commit_into`](crate::overlay::Overlay::commit_into).

use std::collections::HashMap;
use tessera_common::Node;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeStore {
    nodes: HashMap<String, Node>,
    root_id: Option<String>,
    /// Incremented once per commit
    version: u64,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a committed root node
    pub fn with_root(root: Node) -> Self {
        let mut store = Self::new();
        store.root_id = Some(root.id.clone());
        store.nodes.insert(root.id.clone(), root);
        store
    }

    /// Store seeded from an existing node set (e.g. a loaded snapshot)
    pub fn from_nodes(root_id: impl Into<String>, nodes: impl IntoIterator<Item = Node>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            root_id: Some(root_id.into()),
            version: 0,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn root_id(&self) -> Option<&str> {
        self.root_id.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub(crate) fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Node> {
        self.nodes.remove(id)
    }

    pub(crate) fn set_root(&mut self, root_id: Option<String>) {
        self.root_id = root_id;
    }

    pub(crate) fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}
