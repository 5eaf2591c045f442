//! Integration tests for filter queries.
//!
//! Each test seeds a fresh store through the public API and checks the
//! result offsets, ordering, and limits a relay would rely on.

use tempfile::tempdir;

use nstore::db::event::{Event, Tag};
use nstore::db::filter::{Filter, TagFilter};
use nstore::db::store::EventStore;
use nstore::StoreError;

fn make_id(value: u64) -> [u8; 32] {
    let mut id = [0u8; 32];
    id[..8].copy_from_slice(&value.to_le_bytes());
    id
}

fn make_pubkey(value: u8) -> [u8; 32] {
    [value; 32]
}

fn event(id: u64, pubkey: u8, kind: u32, created_at: i64) -> Event {
    Event {
        id: make_id(id),
        pubkey: make_pubkey(pubkey),
        sig: [0; 64],
        kind,
        created_at,
        content: format!("event {}", id),
        tags: Vec::new(),
    }
}

/// Read the ids of the result entries, in result order.
fn result_ids(store: &EventStore, results: &nstore::db::filter::ResultSet) -> Vec<[u8; 32]> {
    results
        .iter()
        .map(|entry| store.read_event(entry.offset).unwrap().id)
        .collect()
}

#[test]
fn test_kind_filter_sorted_descending() {
    let dir = tempdir().unwrap();
    let mut store = EventStore::open(dir.path()).unwrap();

    store.write_event(&event(1, 2, 1, 1000)).unwrap();
    store.write_event(&event(2, 2, 1, 2000)).unwrap();
    store.write_event(&event(3, 2, 1, 3000)).unwrap();

    let filter = Filter {
        kinds: vec![1],
        limit: 10,
        ..Filter::default()
    };
    let results = store.query(&filter).unwrap();

    assert_eq!(results.len(), 3);
    let created: Vec<i64> = results.iter().map(|e| e.created_at).collect();
    assert_eq!(created, vec![3000, 2000, 1000]);
    assert_eq!(
        result_ids(&store, &results),
        vec![make_id(3), make_id(2), make_id(1)]
    );
}

#[test]
fn test_time_window_returns_exact_matches() {
    let dir = tempdir().unwrap();
    let mut store = EventStore::open(dir.path()).unwrap();

    store.write_event(&event(1, 2, 1, 1000)).unwrap();
    store.write_event(&event(2, 2, 1, 2000)).unwrap();
    store.write_event(&event(3, 2, 1, 3000)).unwrap();

    let filter = Filter {
        since: 1500,
        until: 2500,
        ..Filter::default()
    };
    let results = store.query(&filter).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(result_ids(&store, &results), vec![make_id(2)]);

    // Inclusive bounds.
    let inclusive = Filter {
        since: 2000,
        until: 2000,
        ..Filter::default()
    };
    assert_eq!(store.query(&inclusive).unwrap().len(), 1);
}

#[test]
fn test_tag_filter_matches_then_delete_hides() {
    let dir = tempdir().unwrap();
    let mut store = EventStore::open(dir.path()).unwrap();

    // A realistic 'e' tag: a 64-char hex id, longer than the 32-byte key
    // slot, so it goes through the digest transform.
    let target = "aa".repeat(32);
    let tagged = Event {
        tags: vec![Tag::new("e", &[target.as_str()])],
        ..event(1, 2, 1, 1000)
    };
    store.write_event(&tagged).unwrap();
    store.write_event(&event(2, 2, 1, 2000)).unwrap();

    let filter = Filter {
        tags: vec![TagFilter::new(b'e', &[target.as_bytes()])],
        ..Filter::default()
    };
    let results = store.query(&filter).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(result_ids(&store, &results), vec![make_id(1)]);

    store.delete_event(&make_id(1)).unwrap();
    assert!(store.query(&filter).unwrap().is_empty());
}

#[test]
fn test_short_tag_value_matches() {
    let dir = tempdir().unwrap();
    let mut store = EventStore::open(dir.path()).unwrap();

    let tagged = Event {
        tags: vec![Tag::new("t", &["nostr"])],
        ..event(1, 2, 1, 1000)
    };
    store.write_event(&tagged).unwrap();

    let filter = Filter {
        tags: vec![TagFilter::new(b't', &[b"nostr"])],
        ..Filter::default()
    };
    assert_eq!(store.query(&filter).unwrap().len(), 1);

    let other = Filter {
        tags: vec![TagFilter::new(b't', &[b"other"])],
        ..Filter::default()
    };
    assert!(store.query(&other).unwrap().is_empty());
}

#[test]
fn test_limit_keeps_newest() {
    let dir = tempdir().unwrap();
    let mut store = EventStore::open(dir.path()).unwrap();

    for i in 0..500u64 {
        store.write_event(&event(i, 2, 1, 1000 + i as i64)).unwrap();
    }

    let filter = Filter {
        kinds: vec![1],
        limit: 2,
        ..Filter::default()
    };
    let results = store.query(&filter).unwrap();

    assert_eq!(results.len(), 2);
    let created: Vec<i64> = results.iter().map(|e| e.created_at).collect();
    assert_eq!(created, vec![1499, 1498]);
}

#[test]
fn test_default_limit_is_five_hundred() {
    let dir = tempdir().unwrap();
    let mut store = EventStore::open(dir.path()).unwrap();

    for i in 0..510u64 {
        store.write_event(&event(i, 2, 1, 1000 + i as i64)).unwrap();
    }

    let results = store.query(&Filter::default()).unwrap();
    assert_eq!(results.len(), 500);
    // Newest first: the oldest ten fall off.
    assert_eq!(results.entries()[0].created_at, 1509);
    assert_eq!(results.entries()[499].created_at, 1010);
}

#[test]
fn test_author_filter() {
    let dir = tempdir().unwrap();
    let mut store = EventStore::open(dir.path()).unwrap();

    store.write_event(&event(1, 0xA1, 1, 1000)).unwrap();
    store.write_event(&event(2, 0xA2, 1, 2000)).unwrap();
    store.write_event(&event(3, 0xA1, 2, 3000)).unwrap();

    let filter = Filter {
        authors: vec![make_pubkey(0xA1)],
        ..Filter::default()
    };
    let results = store.query(&filter).unwrap();
    assert_eq!(result_ids(&store, &results), vec![make_id(3), make_id(1)]);
}

#[test]
fn test_author_and_kind_uses_combined_index() {
    let dir = tempdir().unwrap();
    let mut store = EventStore::open(dir.path()).unwrap();

    store.write_event(&event(1, 0xA1, 1, 1000)).unwrap();
    store.write_event(&event(2, 0xA1, 2, 2000)).unwrap();
    store.write_event(&event(3, 0xA2, 1, 3000)).unwrap();

    let filter = Filter {
        authors: vec![make_pubkey(0xA1)],
        kinds: vec![1],
        ..Filter::default()
    };
    let results = store.query(&filter).unwrap();
    assert_eq!(result_ids(&store, &results), vec![make_id(1)]);

    // Both authors, both kinds: everything comes back.
    let wide = Filter {
        authors: vec![make_pubkey(0xA1), make_pubkey(0xA2)],
        kinds: vec![1, 2],
        ..Filter::default()
    };
    assert_eq!(store.query(&wide).unwrap().len(), 3);
}

#[test]
fn test_id_filter_respects_time_bounds() {
    let dir = tempdir().unwrap();
    let mut store = EventStore::open(dir.path()).unwrap();

    store.write_event(&event(1, 2, 1, 1000)).unwrap();

    let inside = Filter {
        ids: vec![make_id(1)],
        since: 500,
        until: 1500,
        ..Filter::default()
    };
    assert_eq!(store.query(&inside).unwrap().len(), 1);

    let outside = Filter {
        ids: vec![make_id(1)],
        since: 2000,
        ..Filter::default()
    };
    assert!(store.query(&outside).unwrap().is_empty());

    // Unknown ids are skipped, not an error.
    let missing = Filter {
        ids: vec![make_id(99)],
        ..Filter::default()
    };
    assert!(store.query(&missing).unwrap().is_empty());
}

#[test]
fn test_post_filter_applies_unchecked_dimensions() {
    let dir = tempdir().unwrap();
    let mut store = EventStore::open(dir.path()).unwrap();

    let tag = Tag::new("t", &["shared"]);
    store
        .write_event(&Event {
            tags: vec![tag.clone()],
            ..event(1, 2, 1, 1000)
        })
        .unwrap();
    store
        .write_event(&Event {
            tags: vec![tag.clone()],
            ..event(2, 2, 7, 2000)
        })
        .unwrap();

    // Tag strategy drives the scan; the kind constraint is enforced by
    // the post-filter.
    let filter = Filter {
        tags: vec![TagFilter::new(b't', &[b"shared"])],
        kinds: vec![1],
        ..Filter::default()
    };
    let results = store.query(&filter).unwrap();
    assert_eq!(result_ids(&store, &results), vec![make_id(1)]);
}

#[test]
fn test_multiple_tag_values_deduplicate() {
    let dir = tempdir().unwrap();
    let mut store = EventStore::open(dir.path()).unwrap();

    store
        .write_event(&Event {
            tags: vec![Tag::new("t", &["alpha", "beta"])],
            ..event(1, 2, 1, 1000)
        })
        .unwrap();

    // Both values hit the same event; it must come back once.
    let filter = Filter {
        tags: vec![TagFilter::new(b't', &["alpha".as_bytes(), "beta".as_bytes()])],
        ..Filter::default()
    };
    assert_eq!(store.query(&filter).unwrap().len(), 1);
}

#[test]
fn test_first_tag_filter_drives_the_scan() {
    let dir = tempdir().unwrap();
    let mut store = EventStore::open(dir.path()).unwrap();

    // Matches the first tag filter but not the second; the tag
    // dimension is not re-checked after the scan, so it is returned.
    store
        .write_event(&Event {
            tags: vec![Tag::new("e", &["target"])],
            ..event(1, 2, 1, 1000)
        })
        .unwrap();

    let filter = Filter {
        tags: vec![
            TagFilter::new(b'e', &[b"target"]),
            TagFilter::new(b'p', &[b"someone"]),
        ],
        ..Filter::default()
    };
    assert_eq!(store.query(&filter).unwrap().len(), 1);
}

#[test]
fn test_deleted_events_hidden_from_every_strategy() {
    let dir = tempdir().unwrap();
    let mut store = EventStore::open(dir.path()).unwrap();

    store.write_event(&event(1, 0xA1, 1, 1000)).unwrap();
    store.write_event(&event(2, 0xA1, 1, 2000)).unwrap();
    store.delete_event(&make_id(1)).unwrap();

    let by_kind = Filter {
        kinds: vec![1],
        ..Filter::default()
    };
    assert_eq!(result_ids(&store, &store.query(&by_kind).unwrap()), vec![make_id(2)]);

    let by_author = Filter {
        authors: vec![make_pubkey(0xA1)],
        ..Filter::default()
    };
    assert_eq!(store.query(&by_author).unwrap().len(), 1);

    let by_id = Filter {
        ids: vec![make_id(1)],
        ..Filter::default()
    };
    assert!(store.query(&by_id).unwrap().is_empty());

    let timeline = Filter::default();
    assert_eq!(store.query(&timeline).unwrap().len(), 1);
}

#[test]
fn test_empty_filter_scans_timeline_newest_first() {
    let dir = tempdir().unwrap();
    let mut store = EventStore::open(dir.path()).unwrap();

    store.write_event(&event(1, 2, 1, 3000)).unwrap();
    store.write_event(&event(2, 2, 2, 1000)).unwrap();
    store.write_event(&event(3, 2, 3, 2000)).unwrap();

    let results = store.query(&Filter::default()).unwrap();
    let created: Vec<i64> = results.iter().map(|e| e.created_at).collect();
    assert_eq!(created, vec![3000, 2000, 1000]);
}

#[test]
fn test_invalid_filter_rejected() {
    let dir = tempdir().unwrap();
    let store = EventStore::open(dir.path()).unwrap();

    let filter = Filter {
        since: 2000,
        until: 1000,
        ..Filter::default()
    };
    assert!(matches!(
        store.query(&filter),
        Err(StoreError::InvalidEvent(_))
    ));
}
