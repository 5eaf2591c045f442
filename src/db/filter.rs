//! NIP-01 filters and query results.
//!
//! A [`Filter`] is the validated, in-memory form of a subscription filter:
//! every field optional, zero meaning "unconstrained". A [`ResultSet`]
//! collects `(event_offset, created_at)` pairs during execution,
//! deduplicates by offset, sorts newest-first, and truncates to the limit.

use serde::Serialize;

use crate::db::constants::*;
use crate::db::index::tag_value_slot;
use crate::{Result, StoreError};

/// One tag constraint: a single-letter name and the values to match.
///
/// Values are stored pre-normalized into the index's fixed 32-byte slot;
/// use [`TagFilter::value`] to build one from raw bytes.
#[derive(Debug, Clone, Serialize)]
pub struct TagFilter {
    /// ASCII letter naming the tag (`b'e'`, `b'p'`, ...).
    pub name: u8,
    /// Normalized 32-byte value slots, up to 256.
    pub values: Vec<[u8; TAG_VALUE_SLOT]>,
}

impl TagFilter {
    /// Build a tag filter from raw value bytes, applying the same
    /// normalization the tag index uses on insert.
    pub fn new<V: AsRef<[u8]>>(name: u8, raw_values: &[V]) -> Self {
        TagFilter {
            name,
            values: raw_values
                .iter()
                .map(|v| tag_value_slot(v.as_ref()))
                .collect(),
        }
    }

    /// Normalize one raw value into the 32-byte slot form.
    pub fn value(raw: &[u8]) -> [u8; TAG_VALUE_SLOT] {
        tag_value_slot(raw)
    }
}

/// A NIP-01 subscription filter. Empty collections and zero bounds mean
/// "unconstrained"; `limit` 0 means "use the default" (500).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Filter {
    /// Exact event ids, up to 256.
    pub ids: Vec<[u8; 32]>,
    /// Author pubkeys, up to 256.
    pub authors: Vec<[u8; 32]>,
    /// Event kinds, up to 64.
    pub kinds: Vec<u32>,
    /// Tag constraints, up to 26 (one per ASCII letter).
    pub tags: Vec<TagFilter>,
    /// Inclusive lower bound on `created_at` (0 = open).
    pub since: i64,
    /// Inclusive upper bound on `created_at` (0 = open).
    pub until: i64,
    /// Maximum results (0 = default).
    pub limit: u32,
}

impl Filter {
    /// Check the filter's counts and time bounds.
    pub fn validate(&self) -> Result<()> {
        if self.ids.len() > FILTER_MAX_IDS {
            return Err(StoreError::InvalidEvent(format!(
                "filter has {} ids, limit {}",
                self.ids.len(),
                FILTER_MAX_IDS
            )));
        }
        if self.authors.len() > FILTER_MAX_AUTHORS {
            return Err(StoreError::InvalidEvent(format!(
                "filter has {} authors, limit {}",
                self.authors.len(),
                FILTER_MAX_AUTHORS
            )));
        }
        if self.kinds.len() > FILTER_MAX_KINDS {
            return Err(StoreError::InvalidEvent(format!(
                "filter has {} kinds, limit {}",
                self.kinds.len(),
                FILTER_MAX_KINDS
            )));
        }
        if self.tags.len() > FILTER_MAX_TAGS {
            return Err(StoreError::InvalidEvent(format!(
                "filter has {} tag filters, limit {}",
                self.tags.len(),
                FILTER_MAX_TAGS
            )));
        }
        for tag in &self.tags {
            if !tag.name.is_ascii_alphabetic() {
                return Err(StoreError::InvalidEvent(format!(
                    "tag filter name {:#04x} is not an ASCII letter",
                    tag.name
                )));
            }
            if tag.values.len() > FILTER_MAX_TAG_VALUES {
                return Err(StoreError::InvalidEvent(format!(
                    "tag filter '{}' has {} values, limit {}",
                    tag.name as char,
                    tag.values.len(),
                    FILTER_MAX_TAG_VALUES
                )));
            }
        }
        if self.since != 0 && self.until != 0 && self.since > self.until {
            return Err(StoreError::InvalidEvent(format!(
                "since {} is after until {}",
                self.since, self.until
            )));
        }
        Ok(())
    }

    /// True when no field constrains anything.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
            && self.authors.is_empty()
            && self.kinds.is_empty()
            && self.tags.is_empty()
            && self.since == 0
            && self.until == 0
    }

    /// The limit to apply, with 0 mapped to the default.
    pub fn effective_limit(&self) -> u32 {
        if self.limit == 0 {
            DEFAULT_QUERY_LIMIT
        } else {
            self.limit
        }
    }

    /// True when `created_at` falls within the filter's bounds.
    pub fn time_contains(&self, created_at: i64) -> bool {
        (self.since == 0 || created_at >= self.since)
            && (self.until == 0 || created_at <= self.until)
    }
}

/// One collected query hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResultEntry {
    /// Offset of the event record in the events file.
    pub offset: u64,
    /// The event's creation timestamp.
    pub created_at: i64,
}

/// Collected query results: deduplicated on add, sorted newest-first.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSet {
    entries: Vec<ResultEntry>,
}

impl Default for ResultSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultSet {
    /// Create an empty result set.
    pub fn new() -> Self {
        ResultSet {
            entries: Vec::with_capacity(RESULT_INITIAL_CAPACITY),
        }
    }

    /// Add one hit unless its offset is already present. Returns whether
    /// the entry was added. The linear scan is fine: the set is bounded
    /// by the query limit.
    pub fn add(&mut self, offset: u64, created_at: i64) -> bool {
        if self.entries.iter().any(|e| e.offset == offset) {
            return false;
        }
        self.entries.push(ResultEntry { offset, created_at });
        true
    }

    /// Sort by `created_at` descending. Stable, so equal timestamps keep
    /// their collection order.
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    /// Truncate to at most `limit` entries (0 = no limit).
    pub fn apply_limit(&mut self, limit: u32) {
        if limit != 0 && self.entries.len() > limit as usize {
            self.entries.truncate(limit as usize);
        }
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain<F: FnMut(&ResultEntry) -> bool>(&mut self, keep: F) {
        self.entries.retain(keep);
    }

    /// Number of collected entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing matched.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The collected entries, in current order.
    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    /// Iterate the collected entries.
    pub fn iter(&self) -> std::slice::Iter<'_, ResultEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a ResultEntry;
    type IntoIter = std::slice::Iter<'a, ResultEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
