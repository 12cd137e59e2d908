//! # Atomic Operations
//!
//! The smallest observable unit of change, and the wire format consumed by
//! CRDT/network sync.
//!
//! ```text
//! { "type": "create" | "update" | "delete" | "move",
//!   "nodeId": "...", "timestamp": 1700000000000,
//!   "parentId"?: "...", "position"?: 0, "data"?: { ... } }
//! ```
//!
//! - `create`/`update` carry a post-mutation snapshot in `data`
//! - `delete` carries only `parentId`
//! - `move` requires `parentId` and may carry `position`
//!
//! Batches travel as `{ "sessionId", "version", "operations": [...] }`.

use crate::error::OperationError;
use crate::node::{Attributes, Mark, Node};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
    Move,
}

impl OperationType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(OperationType::Create),
            "update" => Some(OperationType::Update),
            "delete" => Some(OperationType::Delete),
            "move" => Some(OperationType::Move),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
            OperationType::Move => "move",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-mutation node snapshot carried by `create` and `update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationData {
    #[serde(rename = "type")]
    pub node_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<Vec<Mark>>,
}

impl OperationData {
    /// Rebuild a node from this snapshot
    pub fn to_node(&self, id: &str) -> Node {
        Node {
            id: id.to_string(),
            node_type: self.node_type.clone(),
            text: self.text.clone(),
            content: self.content.clone().unwrap_or_default(),
            parent_id: self.parent_id.clone(),
            attributes: self.attributes.clone().unwrap_or_default(),
            marks: self.marks.clone().unwrap_or_default(),
            version: 0,
        }
    }

    /// Overwrite `node` with every field present in this snapshot
    pub fn apply_to(&self, node: &mut Node) {
        node.node_type = self.node_type.clone();
        if let Some(attributes) = &self.attributes {
            node.attributes = attributes.clone();
        }
        if let Some(text) = &self.text {
            node.text = Some(text.clone());
        }
        if let Some(content) = &self.content {
            node.content = content.clone();
        }
        // Full snapshots always carry `content`; their parentId is authoritative even when absent.
        if self.content.is_some() || self.parent_id.is_some() {
            node.parent_id = self.parent_id.clone();
        }
        if let Some(marks) = &self.marks {
            node.marks = marks.clone();
        }
    }
}

impl From<&Node> for OperationData {
    fn from(node: &Node) -> Self {
        Self {
            node_type: node.node_type.clone(),
            attributes: Some(node.attributes.clone()),
            text: node.text.clone(),
            content: Some(node.content.clone()),
            parent_id: node.parent_id.clone(),
            marks: Some(node.marks.clone()),
        }
    }
}

/// One recorded change. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomicOperation {
    #[serde(rename = "type")]
    pub op_type: OperationType,

    pub node_id: String,

    /// Milliseconds since the Unix epoch (or the store clock's epoch)
    pub timestamp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<OperationData>,
}

impl AtomicOperation {
    pub fn create(node: &Node, timestamp: i64) -> Self {
        Self {
            op_type: OperationType::Create,
            node_id: node.id.clone(),
            timestamp,
            parent_id: node.parent_id.clone(),
            position: None,
            data: Some(OperationData::from(node)),
        }
    }

    pub fn update(node: &Node, timestamp: i64) -> Self {
        Self {
            op_type: OperationType::Update,
            node_id: node.id.clone(),
            timestamp,
            parent_id: node.parent_id.clone(),
            position: None,
            data: Some(OperationData::from(node)),
        }
    }

    pub fn delete(node_id: impl Into<String>, parent_id: Option<String>, timestamp: i64) -> Self {
        Self {
            op_type: OperationType::Delete,
            node_id: node_id.into(),
            timestamp,
            parent_id,
            position: None,
            data: None,
        }
    }

    pub fn move_to(
        node_id: impl Into<String>,
        parent_id: impl Into<String>,
        position: Option<usize>,
        timestamp: i64,
    ) -> Self {
        Self {
            op_type: OperationType::Move,
            node_id: node_id.into(),
            timestamp,
            parent_id: Some(parent_id.into()),
            position,
            data: None,
        }
    }

    /// Structural checks every consumer can rely on
    pub fn validate(&self) -> Result<(), OperationError> {
        if self.node_id.is_empty() {
            return Err(OperationError::EmptyNodeId);
        }
        match self.op_type {
            OperationType::Move if self.parent_id.is_none() => {
                Err(OperationError::MissingParent(self.node_id.clone()))
            }
            OperationType::Create if self.data.is_none() => Err(OperationError::MissingData {
                op: self.op_type.to_string(),
                node_id: self.node_id.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Rough in-memory footprint, used by history memory accounting
    pub fn estimated_size(&self) -> usize {
        serde_json::to_vec(self)
            .map(|bytes| bytes.len())
            .unwrap_or(std::mem::size_of::<Self>())
    }
}

/// A batch of operations as delivered to sync consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationBatch {
    pub session_id: String,
    pub version: u64,
    pub operations: Vec<AtomicOperation>,
}

impl OperationBatch {
    pub fn new(session_id: impl Into<String>, version: u64, operations: Vec<AtomicOperation>) -> Self {
        Self {
            session_id: session_id.into(),
            version,
            operations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn to_json(&self) -> Result<String, OperationError> {
        serde_json::to_string(self).map_err(|e| OperationError::Decode(e.to_string()))
    }

    /// Decode a batch, rejecting unknown operation types and malformed records
    pub fn from_json(json: &str) -> Result<Self, OperationError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| OperationError::Decode(e.to_string()))?;

        let kinds = value
            .get("operations")
            .and_then(serde_json::Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|op| op.get("type").and_then(serde_json::Value::as_str));
        for kind in kinds {
            if OperationType::parse(kind).is_none() {
                return Err(OperationError::UnknownType(kind.to_string()));
            }
        }

        let batch: OperationBatch =
            serde_json::from_value(value).map_err(|e| OperationError::Decode(e.to_string()))?;
        for op in &batch.operations {
            op.validate()?;
        }
        Ok(batch)
    }
}
