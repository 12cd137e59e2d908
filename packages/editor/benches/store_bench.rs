use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tessera_editor::{normalized_marks, Document, Mark, Node};

fn wide_tree(sections: usize, per_section: usize) -> Document {
    let mut doc = Document::new(Node::new("root", "doc"));
    for s in 0..sections {
        let section = format!("s{}", s);
        doc.set_node(Node::new(section.clone(), "section").with_parent("root"), false);
        for t in 0..per_section {
            doc.set_node(
                Node::new(format!("{}-t{}", section, t), "text")
                    .with_text("lorem ipsum dolor")
                    .with_parent(section.clone()),
                false,
            );
        }
    }
    doc.commit();
    doc
}

fn normalize_fragmented_marks(c: &mut Criterion) {
    let marks: Vec<Mark> = (0..500)
        .map(|i| {
            let kind = if i % 3 == 0 { "bold" } else { "italic" };
            Mark::new(kind, (i * 7) % 2_000, (i * 7) % 2_000 + 12)
        })
        .collect();

    c.bench_function("normalize_500_marks", |b| {
        b.iter(|| normalized_marks(black_box(&marks), 2_000))
    });
}

fn cascade_delete_section(c: &mut Criterion) {
    c.bench_function("cascade_delete_1000_children", |b| {
        b.iter_batched(
            || wide_tree(2, 1_000),
            |mut doc| {
                doc.begin();
                let deleted = doc.delete_node("s0");
                doc.rollback();
                deleted
            },
            BatchSize::LargeInput,
        )
    });
}

fn commit_many_updates(c: &mut Criterion) {
    c.bench_function("stage_and_commit_200_nodes", |b| {
        b.iter_batched(
            || wide_tree(1, 200),
            |mut doc| {
                doc.begin();
                for t in 0..200 {
                    let id = format!("s0-t{}", t);
                    let _ = doc.insert_text(
                        &tessera_editor::ContentRange::collapsed(id, 0),
                        black_box(">"),
                    );
                }
                doc.end();
                doc.commit()
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    normalize_fragmented_marks,
    cascade_delete_section,
    commit_many_updates
);
criterion_main!(benches);
