use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jsonsync_collab::broadcast::Fanout;
use jsonsync_collab::document::{Document, Update};
use jsonsync_collab::hub::CollabHub;
use jsonsync_collab::path::Path;
use jsonsync_collab::protocol::UpdateMessage;
use jsonsync_collab::registry::RoomRegistry;
use jsonsync_collab::session::{Payload, SessionHandle};
use jsonsync_collab::storage::MemoryStore;
use serde_json::json;
use std::sync::Arc;

fn bench_path_parse(c: &mut Criterion) {
    c.bench_function("path_parse_4_segments", |b| {
        b.iter(|| black_box(Path::parse(black_box("world.characters.12.name")).unwrap()))
    });
}

fn bench_update_decode(c: &mut Criterion) {
    let raw = r#"{"path":"character.items.1","value":{"name":"sword","weight":3}}"#;

    c.bench_function("update_decode", |b| {
        b.iter(|| black_box(UpdateMessage::decode(black_box(raw)).unwrap()))
    });
}

fn bench_document_apply(c: &mut Criterion) {
    let characters: Vec<_> = (0..100)
        .map(|i| json!({"name": format!("c{i}"), "age": i, "items": ["ring", "cloak"]}))
        .collect();
    let mut doc = Document::new(json!({"world": {"characters": characters}}));
    let update = Update::parse("world.characters.57.items.1", json!("sword")).unwrap();

    c.bench_function("document_apply_depth_5", |b| {
        b.iter(|| doc.apply(black_box(&update)).unwrap())
    });
}

fn bench_fanout_100_sessions(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let registry = Arc::new(RoomRegistry::new());
    let fanout = Fanout::new(registry.clone());

    let mut receivers = Vec::new();
    rt.block_on(async {
        for _ in 0..100 {
            let (handle, rx) = SessionHandle::channel(1024);
            registry.join("room", handle).await;
            receivers.push(rx);
        }
    });
    let payload: Payload = Arc::from(r#"{"path":"a.b","value":1}"#);

    c.bench_function("fanout_100_sessions", |b| {
        b.iter(|| {
            rt.block_on(async {
                let report = fanout.broadcast("room", payload.clone()).await;
                black_box(report.delivered);
            });
            for rx in receivers.iter_mut() {
                while rx.try_recv().is_ok() {}
            }
        })
    });
}

fn bench_hub_submit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let hub = CollabHub::new(Arc::new(MemoryStore::new()));
    let room = hub
        .create_document(&json!({"character": {"name": "Aragorn", "age": 87}}))
        .unwrap();
    let raw = r#"{"path":"character.age","value":88}"#;

    c.bench_function("hub_submit_in_memory", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(hub.submit(&room, black_box(raw)).await.unwrap());
            })
        })
    });
}

criterion_group!(
    benches,
    bench_path_parse,
    bench_update_decode,
    bench_document_apply,
    bench_fanout_100_sessions,
    bench_hub_submit,
);
criterion_main!(benches);
