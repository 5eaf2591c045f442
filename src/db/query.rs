//! Query planning and execution.
//!
//! Strategy selection is a fixed priority ladder, not cost-based: id
//! lookups are the most selective, tag filters next, then the combined
//! pubkey+kind index, pubkey alone, kind alone, and finally a timeline
//! scan. Determinism is the point; there are no runtime statistics.
//!
//! Execution drives the chosen index with the filter's time bounds and
//! remaining limit, then post-filters the dimensions the index did not
//! cover (deleted records, time bounds, ids/authors/kinds). Tags are
//! never re-checked on the post-filter path: the tag strategy already
//! constrained them, and deserializing tags per candidate would dominate
//! the query cost.

use std::collections::HashSet;

use crate::db::events::EventsLog;
use crate::db::filter::{Filter, ResultSet};
use crate::db::index::{kind_key, pubkey_kind_key, tag_key_from_slot};
use crate::db::store::Indices;
use crate::{Result, StoreError};

/// The access path chosen for a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Point lookups in the unique id index.
    ById,
    /// Chain scans in the tag index, one per (name, value) pair.
    ByTag,
    /// Chain scans in the combined pubkey+kind index.
    ByPubkeyKind,
    /// Chain scans in the pubkey index.
    ByPubkey,
    /// Chain scans in the kind index.
    ByKind,
    /// Scan of the global timeline chain.
    TimelineScan,
}

/// Pick the access path for `filter`. First match wins.
pub fn select_strategy(filter: &Filter) -> Strategy {
    if !filter.ids.is_empty() {
        Strategy::ById
    } else if !filter.tags.is_empty() {
        Strategy::ByTag
    } else if !filter.authors.is_empty() && !filter.kinds.is_empty() {
        Strategy::ByPubkeyKind
    } else if !filter.authors.is_empty() {
        Strategy::ByPubkey
    } else if !filter.kinds.is_empty() {
        Strategy::ByKind
    } else {
        Strategy::TimelineScan
    }
}

/// Validate `filter`, run it against the indices, and leave `result`
/// sorted newest-first and truncated to the limit.
pub(crate) fn execute(
    log: &EventsLog,
    indices: &Indices,
    filter: &Filter,
    result: &mut ResultSet,
) -> Result<()> {
    filter.validate()?;

    let limit = filter.effective_limit() as usize;
    let strategy = select_strategy(filter);

    match strategy {
        Strategy::ById => {
            for id in &filter.ids {
                match indices.id.lookup(id) {
                    Ok(offset) => {
                        let record = log.record(offset)?;
                        if !record.is_deleted() && filter.time_contains(record.created_at) {
                            result.add(offset, record.created_at);
                        }
                    }
                    Err(StoreError::NotFound) => continue,
                    Err(e) => return Err(e),
                }
            }
        }
        Strategy::ByTag => {
            'tags: for tag in &filter.tags {
                for value in &tag.values {
                    let key = tag_key_from_slot(tag.name, value);
                    for entry in indices.tag.iter(&key, filter.since, filter.until)? {
                        if result.len() >= limit {
                            break 'tags;
                        }
                        let entry = entry?;
                        result.add(entry.event_offset, entry.created_at);
                    }
                }
            }
        }
        Strategy::ByPubkeyKind => {
            'pairs: for author in &filter.authors {
                for &kind in &filter.kinds {
                    let key = pubkey_kind_key(author, kind);
                    for entry in indices.pubkey_kind.iter(&key, filter.since, filter.until)? {
                        if result.len() >= limit {
                            break 'pairs;
                        }
                        let entry = entry?;
                        result.add(entry.event_offset, entry.created_at);
                    }
                }
            }
        }
        Strategy::ByPubkey => {
            'authors: for author in &filter.authors {
                for entry in indices.pubkey.iter(author, filter.since, filter.until)? {
                    if result.len() >= limit {
                        break 'authors;
                    }
                    let entry = entry?;
                    result.add(entry.event_offset, entry.created_at);
                }
            }
        }
        Strategy::ByKind => {
            'kinds: for &kind in &filter.kinds {
                let key = kind_key(kind);
                for entry in indices.kind.iter(&key, filter.since, filter.until)? {
                    if result.len() >= limit {
                        break 'kinds;
                    }
                    let entry = entry?;
                    result.add(entry.event_offset, entry.created_at);
                }
            }
        }
        Strategy::TimelineScan => {
            for entry in indices.timeline.iter_all(filter.since, filter.until)? {
                if result.len() >= limit {
                    break;
                }
                let entry = entry?;
                result.add(entry.event_offset, entry.created_at);
            }
        }
    }

    post_filter(log, filter, strategy, result)?;
    result.sort();
    result.apply_limit(filter.effective_limit());
    Ok(())
}

/// Drop collected entries whose record is deleted, outside the time
/// bounds, or fails a filter dimension the chosen index did not cover.
fn post_filter(
    log: &EventsLog,
    filter: &Filter,
    strategy: Strategy,
    result: &mut ResultSet,
) -> Result<()> {
    let check_ids = !filter.ids.is_empty() && strategy != Strategy::ById;
    let check_authors = !filter.authors.is_empty()
        && !matches!(strategy, Strategy::ByPubkey | Strategy::ByPubkeyKind);
    let check_kinds =
        !filter.kinds.is_empty() && !matches!(strategy, Strategy::ByKind | Strategy::ByPubkeyKind);

    let mut dropped: HashSet<u64> = HashSet::new();
    for entry in result.iter() {
        let record = log.record(entry.offset)?;
        let keep = !record.is_deleted()
            && filter.time_contains(record.created_at)
            && (!check_ids || filter.ids.contains(&record.id))
            && (!check_authors || filter.authors.contains(&record.pubkey))
            && (!check_kinds || filter.kinds.contains(&record.kind));
        if !keep {
            dropped.insert(entry.offset);
        }
    }
    result.retain(|entry| !dropped.contains(&entry.offset));
    Ok(())
}
