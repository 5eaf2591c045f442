//! Criterion benchmarks for nostr-store core operations.
//!
//! Benchmarks cover:
//! - Tag codec round-trips (serialize_tags / deserialize_tags)
//! - Event writes through the full facade (log + six indices)
//! - Filter queries by kind, author, and tag over a seeded store

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::TempDir;

use nstore::db::event::{Event, Tag};
use nstore::db::filter::{Filter, TagFilter};
use nstore::db::store::EventStore;
use nstore::db::tags::{deserialize_tags, serialize_tags};

fn make_id(value: u64) -> [u8; 32] {
    let mut id = [0u8; 32];
    id[..8].copy_from_slice(&value.to_le_bytes());
    id
}

fn make_event(id: u64, pubkey: u8, kind: u32, created_at: i64) -> Event {
    Event {
        id: make_id(id),
        pubkey: [pubkey; 32],
        sig: [0; 64],
        kind,
        created_at,
        content: "benchmark content with a realistic length for a short note".to_string(),
        tags: vec![
            Tag::new("e", &["aa".repeat(32).as_str()]),
            Tag::new("t", &["nostr"]),
        ],
    }
}

/// Open a store seeded with `count` events across 4 authors and 3 kinds.
fn seeded_store(count: u64) -> (TempDir, EventStore) {
    let dir = TempDir::new().expect("create temp dir");
    let mut store = EventStore::open(dir.path()).expect("open store");
    for i in 0..count {
        let event = make_event(i, (i % 4) as u8, (i % 3) as u32, 1_700_000_000 + i as i64);
        store.write_event(&event).expect("write event");
    }
    (dir, store)
}

fn bench_tag_codec(c: &mut Criterion) {
    let tags = vec![
        Tag::new("e", &["aa".repeat(32).as_str()]),
        Tag::new("p", &["bb".repeat(32).as_str(), "wss://relay.example.com"]),
        Tag::new("t", &["nostr", "benchmarks"]),
    ];
    let encoded = serialize_tags(&tags).unwrap();

    let mut group = c.benchmark_group("tag_codec");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("serialize", |b| {
        b.iter(|| serialize_tags(black_box(&tags)).unwrap())
    });
    group.bench_function("deserialize", |b| {
        b.iter(|| deserialize_tags(black_box(&encoded)).unwrap())
    });
    group.finish();
}

fn bench_write_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");
    group.bench_function("write_event", |b| {
        let dir = TempDir::new().expect("create temp dir");
        let mut store = EventStore::open(dir.path()).expect("open store");
        let mut next_id = 0u64;
        b.iter(|| {
            let event = make_event(next_id, 1, 1, 1_700_000_000 + next_id as i64);
            next_id += 1;
            store.write_event(black_box(&event)).expect("write event");
        });
    });
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let (_dir, store) = seeded_store(5_000);

    let by_kind = Filter {
        kinds: vec![1],
        limit: 100,
        ..Filter::default()
    };
    let by_author = Filter {
        authors: vec![[2u8; 32]],
        kinds: vec![1],
        limit: 100,
        ..Filter::default()
    };
    let by_tag = Filter {
        tags: vec![TagFilter::new(b't', &[b"nostr"])],
        limit: 100,
        ..Filter::default()
    };
    let timeline = Filter {
        limit: 100,
        ..Filter::default()
    };

    let mut group = c.benchmark_group("query");
    group.bench_function("by_kind", |b| {
        b.iter(|| store.query(black_box(&by_kind)).unwrap())
    });
    group.bench_function("by_author_kind", |b| {
        b.iter(|| store.query(black_box(&by_author)).unwrap())
    });
    group.bench_function("by_tag", |b| {
        b.iter(|| store.query(black_box(&by_tag)).unwrap())
    });
    group.bench_function("timeline_scan", |b| {
        b.iter(|| store.query(black_box(&timeline)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_tag_codec, bench_write_event, bench_queries);
criterion_main!(benches);
