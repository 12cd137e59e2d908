//! Document nodes and text marks.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute map shared by nodes and marks. Keys are unique, values arbitrary.
pub type Attributes = BTreeMap<String, Value>;

/// One document element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique id (`sessionId:counter` when generated by the store)
    pub id: String,

    /// Type tag, e.g. `paragraph` or `text`
    #[serde(rename = "type")]
    pub node_type: String,

    /// Text payload for text-bearing nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Ordered child ids
    #[serde(default)]
    pub content: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub attributes: Attributes,

    #[serde(default)]
    pub marks: Vec<Mark>,

    /// Bumped on every staged write of this node
    #[serde(default)]
    pub version: u64,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            text: None,
            content: Vec::new(),
            parent_id: None,
            attributes: Attributes::new(),
            marks: Vec::new(),
            version: 0,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_content<I, S>(mut self, content: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content = content.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_mark(mut self, mark: Mark) -> Self {
        self.marks.push(mark);
        self
    }

    /// Text length in chars; nodes without text have length 0
    pub fn text_len(&self) -> usize {
        self.text.as_deref().map(crate::text::char_len).unwrap_or(0)
    }

    pub fn text_str(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    /// Index of `child_id` in this node's content
    pub fn child_index(&self, child_id: &str) -> Option<usize> {
        self.content.iter().position(|c| c == child_id)
    }
}

/// A typed annotation over `[start, end)` of a node's text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub mark_type: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: Attributes,

    pub start: usize,
    pub end: usize,
}

impl Mark {
    pub fn new(mark_type: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            mark_type: mark_type.into(),
            attrs: Attributes::new(),
            start,
            end,
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Same type and same attributes; such marks are merge candidates
    pub fn same_kind(&self, other: &Mark) -> bool {
        self.mark_type == other.mark_type && self.attrs == other.attrs
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Copy of this mark over a different range
    pub fn with_range(&self, start: usize, end: usize) -> Mark {
        Mark {
            mark_type: self.mark_type.clone(),
            attrs: self.attrs.clone(),
            start,
            end,
        }
    }
}

/// Partial update applied by `update_node`.
///
/// Only the fields that are `Some` are considered; attributes shallow-merge
/// into the existing map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<String>>,

    /// `Some(None)` detaches the node from its parent pointer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<Vec<Mark>>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn content(mut self, content: Vec<String>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes
            .get_or_insert_with(Attributes::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn marks(mut self, marks: Vec<Mark>) -> Self {
        self.marks = Some(marks);
        self
    }

    pub fn node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.node_type.is_none()
            && self.text.is_none()
            && self.content.is_none()
            && self.parent_id.is_none()
            && self.attributes.is_none()
            && self.marks.is_none()
    }

    /// True when every supplied field already equals the node's value
    pub fn is_noop_for(&self, node: &Node) -> bool {
        let same_type = self
            .node_type
            .as_ref()
            .map_or(true, |t| *t == node.node_type);
        let same_text = self
            .text
            .as_ref()
            .map_or(true, |t| node.text.as_deref() == Some(t.as_str()));
        let same_content = self.content.as_ref().map_or(true, |c| *c == node.content);
        let same_parent = self
            .parent_id
            .as_ref()
            .map_or(true, |p| *p == node.parent_id);
        let same_attributes = self.attributes.as_ref().map_or(true, |attrs| {
            attrs
                .iter()
                .all(|(key, value)| node.attributes.get(key) == Some(value))
        });
        let same_marks = self.marks.as_ref().map_or(true, |m| *m == node.marks);

        same_type && same_text && same_content && same_parent && same_attributes && same_marks
    }

    /// Only `content` is supplied; such updates bypass schema validation
    pub fn is_content_only(&self) -> bool {
        self.content.is_some()
            && self.node_type.is_none()
            && self.text.is_none()
            && self.parent_id.is_none()
            && self.attributes.is_none()
            && self.marks.is_none()
    }

    /// Write the supplied fields into `node` (type is never changed here)
    pub fn apply_to(&self, node: &mut Node) {
        if let Some(text) = &self.text {
            node.text = Some(text.clone());
        }
        if let Some(content) = &self.content {
            node.content = content.clone();
        }
        if let Some(parent_id) = &self.parent_id {
            node.parent_id = parent_id.clone();
        }
        if let Some(attributes) = &self.attributes {
            for (key, value) in attributes {
                node.attributes.insert(key.clone(), value.clone());
            }
        }
        if let Some(marks) = &self.marks {
            node.marks = marks.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_serializes_camel_case() {
        let node = Node::new("s:1", "paragraph")
            .with_parent("s:0")
            .with_attribute("align", "left");

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], json!("paragraph"));
        assert_eq!(value["parentId"], json!("s:0"));
        assert_eq!(value["attributes"]["align"], json!("left"));
        assert!(value.get("text").is_none());
    }

    #[test]
    fn test_noop_detection_compares_supplied_fields_only() {
        let node = Node::new("n", "text")
            .with_text("Hello")
            .with_attribute("lang", "en")
            .with_attribute("dir", "ltr");

        assert!(NodeUpdate::new().text("Hello").is_noop_for(&node));
        assert!(NodeUpdate::new().attribute("lang", "en").is_noop_for(&node));
        assert!(!NodeUpdate::new().attribute("lang", "fr").is_noop_for(&node));
        assert!(!NodeUpdate::new().text("Hello!").is_noop_for(&node));
    }

    #[test]
    fn test_attributes_shallow_merge() {
        let mut node = Node::new("n", "text").with_attribute("a", 1).with_attribute("b", 2);
        NodeUpdate::new().attribute("b", 3).attribute("c", 4).apply_to(&mut node);

        assert_eq!(node.attributes.get("a"), Some(&json!(1)));
        assert_eq!(node.attributes.get("b"), Some(&json!(3)));
        assert_eq!(node.attributes.get("c"), Some(&json!(4)));
    }

    #[test]
    fn test_mark_kind_includes_attrs() {
        let a = Mark::new("link", 0, 3).with_attr("href", "a");
        let b = Mark::new("link", 5, 7).with_attr("href", "a");
        let c = Mark::new("link", 0, 3).with_attr("href", "b");

        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&c));
    }
}
