//! Integration tests for the editor crate

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tessera_common::ManualClock;
use tessera_editor::{
    AtomicOperation, ContentRange, Document, EditSession, LockError, Mark, Node, NodeUpdate,
    OperationBatch, OperationType, StoreConfig, StructuralError, TransactionError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn seeded_document() -> Document {
    let mut doc = Document::new(Node::new("root", "doc"));
    doc.set_node(Node::new("p1", "paragraph").with_parent("root"), true);
    doc.set_node(
        Node::new("a", "text")
            .with_text("Hello World")
            .with_parent("p1")
            .with_mark(Mark::new("bold", 0, 5)),
        true,
    );
    doc.set_node(Node::new("log", "text").with_text("").with_parent("root"), true);
    doc.commit();
    doc
}

fn session() -> Arc<EditSession> {
    init_tracing();
    let config = StoreConfig {
        session_id: Some("it".to_string()),
        ..StoreConfig::default()
    };
    Arc::new(
        EditSession::with_config(seeded_document(), &config)
            .with_clock(Arc::new(ManualClock::new(10_000))),
    )
}

fn text(session: &EditSession, id: &str) -> Option<String> {
    session.read(|doc| doc.get_node(id).and_then(|n| n.text.clone()))
}

#[test]
fn test_atomicity_without_commit() {
    let mut doc = seeded_document();
    let before = doc.committed().clone();

    doc.begin();
    doc.update_node("a", NodeUpdate::new().text("changed"), true)
        .unwrap();
    doc.split_text_node("a", 3).unwrap();
    doc.clone_node_with_children("p1", "root", None).unwrap();
    doc.delete_node("log").unwrap();
    doc.rollback();

    assert_eq!(*doc.committed(), before);
    assert_eq!(doc.get_node("a").unwrap().text.as_deref(), Some("Hello World"));
}

#[test]
fn test_read_your_writes() {
    let mut doc = seeded_document();
    doc.begin();
    doc.set_node(Node::new("x", "text").with_text("fresh").with_parent("root"), true);

    assert_eq!(doc.get_node("x").unwrap().text.as_deref(), Some("fresh"));
    assert!(doc.committed().get("x").is_none());

    doc.end();
    doc.commit();
    assert!(doc.committed().get("x").is_some());
}

#[test]
fn test_missing_node_update_is_not_found() {
    let mut doc = seeded_document();
    doc.begin();
    let result = doc.update_node("missing-id", NodeUpdate::new().text("x"), true);

    assert_eq!(result, Ok(None));
    assert!(doc.end().is_empty());
    assert!(!doc.has_pending_changes());
}

#[test]
fn test_root_protection() {
    let mut doc = seeded_document();
    let before = doc.committed().clone();

    assert_eq!(
        doc.delete_node("root"),
        Err(StructuralError::RootDeletion("root".into()))
    );
    assert!(!doc.has_pending_changes());
    assert_eq!(*doc.committed(), before);
}

#[test]
fn test_split_merge_round_trip() {
    let mut doc = seeded_document();
    let b = doc.split_text_node("a", 5).unwrap();

    assert_eq!(doc.get_node("a").unwrap().text.as_deref(), Some("Hello"));
    assert_eq!(doc.get_node(&b).unwrap().text.as_deref(), Some(" World"));

    assert_eq!(doc.merge_text_nodes("a", &b), Ok(true));
    assert_eq!(doc.get_node("a").unwrap().text.as_deref(), Some("Hello World"));
    assert!(doc.get_node(&b).is_none());
}

#[test]
fn test_config_from_json() -> anyhow::Result<()> {
    let config = StoreConfig::from_json(
        r#"{"lockTimeoutMs": 50, "historyMaxSize": 3, "validateByDefault": false}"#,
    )?;
    assert_eq!(config.lock_timeout(), Duration::from_millis(50));
    assert_eq!(config.history_max_size, 3);
    assert!(!config.validate_by_default);

    assert!(StoreConfig::from_json("{not json").is_err());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_transaction_commits_and_publishes() -> anyhow::Result<()> {
    let session = session();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    session.on_operation(
        Arc::new(move |op: &AtomicOperation| {
            sink.lock().unwrap().push((op.op_type, op.node_id.clone()))
        }),
        None,
    );

    let output = session
        .transact_with("alice", "insert greeting", |doc| {
            let range = ContentRange::collapsed("a", 11);
            if !doc.insert_text(&range, "!") {
                return Err(TransactionError::NotFound("a".into()));
            }
            Ok(())
        })
        .await?;

    assert_eq!(text(&session, "a").as_deref(), Some("Hello World!"));
    assert_eq!(output.batch.session_id, "it");
    assert_eq!(output.batch.version, output.commit.version);
    assert_eq!(*seen.lock().unwrap(), vec![(OperationType::Update, "a".to_string())]);
    assert!(session.can_undo());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_transaction_reports_errors() -> anyhow::Result<()> {
    let session = session();
    let before = session.read(|doc| doc.committed().clone());

    let err = session
        .transact("alice", |doc| {
            doc.update_node("a", NodeUpdate::new().text("half done"), true)?;
            let result = doc.update_node(
                "a",
                NodeUpdate::new().marks(vec![Mark::new("bold", 0, 999)]),
                true,
            )?;
            TransactionError::check(TransactionError::found(result, "a")?)?;
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TransactionError::Validation(_)));
    assert!(!err.errors().is_empty());
    assert_eq!(session.read(|doc| doc.committed().clone()), before);
    assert!(!session.locks().is_locked());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lock_handoff_between_owners() -> anyhow::Result<()> {
    let session = session();
    let locks = session.clone();

    let t1 = session.locks().acquire_lock("t1").await?;
    let t2 = tokio::spawn(async move { locks.locks().acquire_lock("t2").await });
    tokio::task::yield_now().await;

    assert!(!t2.is_finished());
    assert_eq!(session.locks().queue_length(), 1);

    session.locks().release_lock(Some(&t1))?;
    let t2_lock = t2.await??;
    assert_eq!(session.locks().current_lock().map(|l| l.owner_id), Some("t2".into()));
    session.locks().release_lock(Some(&t2_lock))?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_transactions_run_in_arrival_order() -> anyhow::Result<()> {
    let session = session();
    let held = session.locks().acquire_lock("holder").await?;

    let mut handles = Vec::new();
    for i in 1..=5 {
        let session = session.clone();
        let owner = format!("o{}", i);
        let name = owner.clone();
        handles.push(tokio::spawn(async move {
            session
                .transact(&name, move |doc| {
                    let current = doc.get_node("log").map(|n| n.text_str().to_string());
                    let current = TransactionError::found(current, "log")?;
                    doc.update_node("log", NodeUpdate::new().text(current + &owner), true)?;
                    Ok(())
                })
                .await
        }));
        tokio::task::yield_now().await;
    }
    assert_eq!(session.locks().queue_length(), 5);

    session.locks().release_lock(Some(&held))?;
    for handle in handles {
        handle.await??;
    }

    assert_eq!(text(&session, "log").as_deref(), Some("o1o2o3o4o5"));
    assert_eq!(session.locks().lock_stats().max_queue_length, 5);
    assert!(!session.locks().is_locked());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_waiting_transaction_times_out() -> anyhow::Result<()> {
    let session = session();
    session.locks().set_lock_timeout(Duration::from_millis(100));
    let held = session.locks().acquire_lock("holder").await?;

    let err = session
        .transact("impatient", |doc| {
            doc.update_node("a", NodeUpdate::new().text("never"), true)?;
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TransactionError::Lock(LockError::Timeout { .. })));
    assert_eq!(text(&session, "a").as_deref(), Some("Hello World"));
    session.locks().release_lock(Some(&held))?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_history_round_trip() -> anyhow::Result<()> {
    let session = session();
    session
        .transact("alice", |doc| {
            doc.update_node("a", NodeUpdate::new().attribute("lang", "en"), true)?;
            doc.move_node("log", "p1", Some(0))?;
            doc.delete_text(&ContentRange::within("a", 0, 6))?;
            Ok(())
        })
        .await?;
    let after = session.read(|doc| doc.committed().clone());

    session.undo("alice").await?;
    assert_eq!(text(&session, "a").as_deref(), Some("Hello World"));
    assert_eq!(
        session.read(|doc| doc.get_node("root").unwrap().content.clone()),
        vec!["p1".to_string(), "log".to_string()]
    );

    session.redo("alice").await?;
    let redone = session.read(|doc| doc.committed().clone());
    assert_eq!(redone.len(), after.len());
    for node in after.nodes() {
        let restored = redone.get(&node.id).unwrap();
        assert_eq!(restored.text, node.text);
        assert_eq!(restored.content, node.content);
        assert_eq!(restored.parent_id, node.parent_id);
        assert_eq!(restored.attributes, node.attributes);
        assert_eq!(restored.marks, node.marks);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_batch_replicates_to_peer() -> anyhow::Result<()> {
    let origin = session();
    let replica = session();

    let output = origin
        .transact("alice", |doc| {
            let copy = doc.clone_node_with_children("p1", "root", Some(0));
            let copy = TransactionError::found(copy, "p1")?;
            doc.reorder_children("root", &["p1".to_string(), copy.clone(), "log".to_string()]);
            Ok(copy)
        })
        .await?;

    let wire = output.batch.to_json()?;
    let received = OperationBatch::from_json(&wire)?;
    let applied = replica.apply_remote("sync", &received).await?;

    assert!(applied.value > 0);
    assert!(applied.history_entry.is_none());
    assert!(!replica.can_undo());

    let origin_order = origin.read(|doc| doc.document_order());
    let replica_order = replica.read(|doc| doc.document_order());
    assert_eq!(origin_order, replica_order);
    Ok(())
}
