//! Tests for complex mutation sequences
//!
//! These tests cover:
//! - Chains of structural edits inside one transaction
//! - Undo/redo across several transactions
//! - History compression of typing runs
//! - Cascading deletes after moves
//! - Range edits spanning several text nodes

use std::sync::Arc;
use tessera_common::ManualClock;
use tessera_editor::{
    ContentRange, Document, EditSession, Mark, Node, NodeStore, NodeUpdate, TransactionError,
};

fn outline() -> Document {
    let mut doc = Document::new(Node::new("root", "doc"));
    for (section, texts) in [("s1", ["one", "two"]), ("s2", ["three", "four"])] {
        doc.set_node(Node::new(section, "section").with_parent("root"), true);
        for text in texts {
            doc.set_node(
                Node::new(format!("{}-{}", section, text), "text")
                    .with_text(text)
                    .with_parent(section),
                true,
            );
        }
    }
    doc.commit();
    doc
}

fn session() -> EditSession {
    EditSession::new(outline()).with_clock(Arc::new(ManualClock::new(50_000)))
}

fn ids(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn assert_same_tree(left: &NodeStore, right: &NodeStore) {
    assert_eq!(left.len(), right.len());
    for node in left.nodes() {
        let other = right.get(&node.id).unwrap();
        assert_eq!(other.parent_id, node.parent_id, "parent of {}", node.id);
        assert_eq!(other.content, node.content, "content of {}", node.id);
        assert_eq!(other.text, node.text, "text of {}", node.id);
        assert_eq!(other.marks, node.marks, "marks of {}", node.id);
    }
}

#[test]
fn test_move_then_delete_cascades() {
    let mut doc = outline();
    doc.move_node("s2-three", "s1", Some(1)).unwrap();
    doc.delete_node("s1").unwrap();

    assert!(doc.get_node("s2-three").is_none());
    assert!(doc.get_node("s1-one").is_none());
    assert_eq!(doc.get_node("s2").unwrap().content, ids(&["s2-four"]));
    assert!(doc.find_orphans().is_empty());
}

#[test]
fn test_reorder_after_clone() {
    let mut doc = outline();
    doc.begin();
    let copy = doc.clone_node_with_children("s1", "root", None).unwrap();
    assert_eq!(doc.children(&copy).unwrap().len(), 2);

    let order = vec![copy.clone(), "s2".to_string(), "s1".to_string()];
    assert!(doc.reorder_children("root", &order));
    assert_eq!(doc.root().unwrap().content, order);

    let ops = doc.end();
    assert!(!ops.is_empty());
    doc.commit();
    assert_eq!(doc.committed().get("root").unwrap().content, order);
}

#[test]
fn test_split_mark_then_merge() {
    let mut doc = outline();
    doc.update_node("s1-one", NodeUpdate::new().text("Hello World"), true)
        .unwrap();
    assert!(doc.apply_mark(
        &ContentRange::within("s1-one", 3, 8),
        "em",
        Default::default()
    ));

    let right = doc.split_text_node("s1-one", 5).unwrap();
    assert_eq!(doc.get_node("s1-one").unwrap().marks, vec![Mark::new("em", 3, 5)]);
    assert_eq!(doc.get_node(&right).unwrap().marks, vec![Mark::new("em", 0, 3)]);

    doc.merge_text_nodes("s1-one", &right).unwrap();
    let merged = doc.get_node("s1-one").unwrap();
    assert_eq!(merged.text_str(), "Hello World");
    assert_eq!(merged.marks, vec![Mark::new("em", 3, 8)]);
}

#[test]
fn test_cross_node_delete_keeps_edges() {
    let mut doc = outline();
    doc.set_node(
        Node::new("s1-three", "text").with_text("three").with_parent("s1"),
        true,
    );

    let range = ContentRange::new("s1-one", 1, "s1-three", 2);
    assert_eq!(doc.extract_text(&range).as_deref(), Some("netwoth"));
    assert_eq!(doc.delete_text(&range), Ok(true));

    assert_eq!(doc.get_node("s1-one").unwrap().text_str(), "o");
    assert!(doc.get_node("s1-two").is_none());
    assert_eq!(doc.get_node("s1-three").unwrap().text_str(), "ree");
    assert_eq!(doc.get_node("s1").unwrap().content, ids(&["s1-one", "s1-three"]));
}

#[tokio::test(start_paused = true)]
async fn test_undo_all_then_redo_all() -> anyhow::Result<()> {
    let session = session();
    let initial = session.read(|doc| doc.committed().clone());

    session
        .transact("alice", |doc| {
            doc.move_nodes(&ids(&["s2-three", "s2-four"]), "s1", Some(0))?;
            Ok(())
        })
        .await?;
    session
        .transact("alice", |doc| {
            let copy = doc.clone_node_with_children("s1", "s2", None);
            TransactionError::found(copy, "s1")
        })
        .await?;
    session
        .transact("alice", |doc| {
            doc.delete_node("s1")?;
            doc.update_node("s2", NodeUpdate::new().attribute("collapsed", true), true)?;
            Ok(())
        })
        .await?;
    let last = session.read(|doc| doc.committed().clone());
    assert_eq!(session.history().len(), 3);

    while session.undo("alice").await?.is_some() {}
    assert!(!session.can_undo());
    assert_same_tree(&initial, &session.read(|doc| doc.committed().clone()));

    while session.redo("alice").await?.is_some() {}
    assert!(!session.can_redo());
    assert_same_tree(&last, &session.read(|doc| doc.committed().clone()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_typing_run_compresses_into_one_undo() -> anyhow::Result<()> {
    let session = session();
    for (offset, ch) in ["!", "?", "."].into_iter().enumerate() {
        session
            .transact("alice", move |doc| {
                let inserted = doc.insert_text(&ContentRange::collapsed("s1-one", 3 + offset), ch);
                TransactionError::ensure(inserted, "s1-one")
            })
            .await?;
    }
    assert_eq!(
        session.read(|doc| doc.get_node("s1-one").map(|n| n.text_str().to_string())),
        Some("one!?.".to_string())
    );

    assert_eq!(session.history().compress_history(), 2);
    assert_eq!(session.history().len(), 1);

    session.undo("alice").await?;
    assert_eq!(
        session.read(|doc| doc.get_node("s1-one").map(|n| n.text_str().to_string())),
        Some("one".to_string())
    );
    assert!(session.history().validate_history().is_valid);
    Ok(())
}
