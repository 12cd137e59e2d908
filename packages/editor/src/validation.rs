//! Validation contract consumed by the document when `validate = true`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tessera_common::{Node, ValidationResult};

pub trait Validator: Send + Sync + fmt::Debug {
    fn validate(&self, node: &Node) -> ValidationResult;
}

/// Accepts every node
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _node: &Node) -> ValidationResult {
        ValidationResult::ok()
    }
}

/// Schema rules for node shapes.
///
/// With no rules configured only structural checks run (non-empty id and
/// type, marks inside the text bounds).
#[derive(Debug, Default, Clone)]
pub struct SchemaValidator {
    allowed_types: BTreeSet<String>,
    text_types: BTreeSet<String>,
    required_attributes: BTreeMap<String, Vec<String>>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict node types to this set
    pub fn allow_type(mut self, node_type: impl Into<String>) -> Self {
        self.allowed_types.insert(node_type.into());
        self
    }

    /// Types permitted to carry text. When empty, any type may.
    pub fn text_type(mut self, node_type: impl Into<String>) -> Self {
        let node_type = node_type.into();
        self.allowed_types.insert(node_type.clone());
        self.text_types.insert(node_type);
        self
    }

    pub fn require_attribute(mut self, node_type: impl Into<String>, key: impl Into<String>) -> Self {
        self.required_attributes
            .entry(node_type.into())
            .or_default()
            .push(key.into());
        self
    }
}

impl Validator for SchemaValidator {
    fn validate(&self, node: &Node) -> ValidationResult {
        let mut errors = Vec::new();

        if node.id.is_empty() {
            errors.push("Node id must not be empty".to_string());
        }
        if node.node_type.is_empty() {
            errors.push(format!("Node {} has an empty type", node.id));
        }
        if !self.allowed_types.is_empty() && !self.allowed_types.contains(&node.node_type) {
            errors.push(format!("Unknown node type: {}", node.node_type));
        }
        if node.text.is_some()
            && !self.text_types.is_empty()
            && !self.text_types.contains(&node.node_type)
        {
            errors.push(format!("Node type {} cannot hold text", node.node_type));
        }
        if let Some(required) = self.required_attributes.get(&node.node_type) {
            for key in required {
                if !node.attributes.contains_key(key) {
                    errors.push(format!("Missing required attribute {} on {}", key, node.id));
                }
            }
        }

        let len = node.text_len();
        for mark in &node.marks {
            if mark.start > mark.end || mark.end > len {
                errors.push(format!(
                    "Mark {} [{}, {}) out of bounds for text of length {}",
                    mark.mark_type, mark.start, mark.end, len
                ));
            }
        }

        if errors.is_empty() {
            ValidationResult::ok()
        } else {
            ValidationResult::invalid(errors)
        }
    }
}
