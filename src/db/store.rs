//! The store facade.
//!
//! [`EventStore`] owns one data directory: the events log plus the six
//! index files. It is the only writer; an advisory lock on the events
//! file keeps a second process out, and the `&mut self` write methods
//! keep a second writer out within the process.

use std::fs;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;

use crate::db::constants::*;
use crate::db::event::Event;
use crate::db::events::EventsLog;
use crate::db::filter::{Filter, ResultSet};
use crate::db::index::{kind_key, pubkey_kind_key, tag_key, HashIndex, IndexSpec};
use crate::db::query;
use crate::db::tags;
use crate::{Result, StoreError};

/// The six secondary indices, opened together.
pub(crate) struct Indices {
    pub(crate) id: HashIndex,
    pub(crate) pubkey: HashIndex,
    pub(crate) kind: HashIndex,
    pub(crate) pubkey_kind: HashIndex,
    pub(crate) tag: HashIndex,
    pub(crate) timeline: HashIndex,
}

impl Indices {
    pub(crate) fn open(dir: &Path) -> Result<Self> {
        Ok(Indices {
            id: HashIndex::open_or_create(&dir.join(IDX_ID_FILE), IndexSpec::ID)?,
            pubkey: HashIndex::open_or_create(&dir.join(IDX_PUBKEY_FILE), IndexSpec::PUBKEY)?,
            kind: HashIndex::open_or_create(&dir.join(IDX_KIND_FILE), IndexSpec::KIND)?,
            pubkey_kind: HashIndex::open_or_create(
                &dir.join(IDX_PUBKEY_KIND_FILE),
                IndexSpec::PUBKEY_KIND,
            )?,
            tag: HashIndex::open_or_create(&dir.join(IDX_TAG_FILE), IndexSpec::TAG)?,
            timeline: HashIndex::open_or_create(
                &dir.join(IDX_TIMELINE_FILE),
                IndexSpec::TIMELINE,
            )?,
        })
    }

    fn sync_all(&self, asynchronous: bool) -> Result<()> {
        self.id.sync(asynchronous)?;
        self.pubkey.sync(asynchronous)?;
        self.kind.sync(asynchronous)?;
        self.pubkey_kind.sync(asynchronous)?;
        self.tag.sync(asynchronous)?;
        self.timeline.sync(asynchronous)
    }
}

/// Counters surfaced by [`EventStore::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Live events written (duplicates excluded, deletions included).
    pub event_count: u64,
    /// Events soft-deleted since the store was created.
    pub deleted_count: u64,
    /// Size of the events file in bytes.
    pub events_file_size: u64,
    /// Entries in the id index.
    pub id_index_entries: u64,
    /// Entries in the pubkey index.
    pub pubkey_index_entries: u64,
    /// Entries in the kind index.
    pub kind_index_entries: u64,
    /// Entries in the pubkey+kind index.
    pub pubkey_kind_index_entries: u64,
    /// Entries in the tag index.
    pub tag_index_entries: u64,
    /// Entries in the timeline index.
    pub timeline_index_entries: u64,
}

/// An open event store: the events log and its six indices.
///
/// Writes go through `&mut self`; queries borrow `&self`. One instance
/// owns the data directory exclusively until dropped.
pub struct EventStore {
    events: EventsLog,
    indices: Indices,
    data_dir: PathBuf,
}

impl EventStore {
    /// Open the store in `data_dir`, creating the directory and any
    /// missing files. Validates every file header and takes an exclusive
    /// advisory lock on the events file.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)
            .map_err(|e| StoreError::FileCreate(format!("{}: {}", dir.display(), e)))?;

        let events = EventsLog::open_or_create(&dir.join(EVENTS_FILE))?;
        events.file().try_lock_exclusive().map_err(|e| {
            StoreError::FileOpen(format!(
                "{}: locked by another process ({})",
                dir.display(),
                e
            ))
        })?;

        let indices = Indices::open(dir)?;

        Ok(EventStore {
            events,
            indices,
            data_dir: dir.to_path_buf(),
        })
    }

    /// The directory this store owns.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Persist one event and index it.
    ///
    /// An event whose id is already present fails with
    /// [`StoreError::Duplicate`] and leaves the store unchanged. A
    /// failure in a non-id index leaves the record durable and readable
    /// through the indices populated so far; the store is not
    /// transactional across indices.
    pub fn write_event(&mut self, event: &Event) -> Result<()> {
        event.validate()?;
        let tag_bytes = tags::serialize_tags(&event.tags)?;

        let offset = self.events.append(event, &tag_bytes)?;

        match self.indices.id.insert(&event.id, offset, event.created_at) {
            Ok(()) => {}
            Err(StoreError::Duplicate) => {
                self.events.rollback_append(offset)?;
                return Err(StoreError::Duplicate);
            }
            Err(e) => return Err(e),
        }

        self.indices
            .pubkey
            .insert(&event.pubkey, offset, event.created_at)?;
        self.indices
            .kind
            .insert(&kind_key(event.kind), offset, event.created_at)?;
        self.indices.pubkey_kind.insert(
            &pubkey_kind_key(&event.pubkey, event.kind),
            offset,
            event.created_at,
        )?;

        // Only single-letter tags are indexable, one entry per value.
        for tag in &event.tags {
            if tag.name.len() != 1 {
                continue;
            }
            let name = tag.name.as_bytes()[0];
            for value in &tag.values {
                self.indices
                    .tag
                    .insert(&tag_key(name, value.as_bytes()), offset, event.created_at)?;
            }
        }

        self.indices.timeline.insert(&[], offset, event.created_at)?;

        self.events.sync(true)?;
        Ok(())
    }

    /// Fetch a live event by id.
    pub fn get_event_by_id(&self, id: &[u8; 32]) -> Result<Event> {
        let offset = self.indices.id.lookup(id)?;
        let record = self.events.record(offset)?;
        if record.is_deleted() {
            return Err(StoreError::NotFound);
        }
        self.events.read_event(offset)
    }

    /// Soft-delete the event with `id`.
    ///
    /// Sets the record's DELETED flag and tombstones the id-index entry.
    /// The other indices keep their entries; queries suppress the record
    /// in their post-filter step.
    pub fn delete_event(&mut self, id: &[u8; 32]) -> Result<()> {
        let offset = self.indices.id.lookup(id)?;
        self.events.mark_deleted(offset)?;
        self.indices.id.mark_tombstone(id, offset)?;
        Ok(())
    }

    /// Run a filter and return the matching offsets, newest first.
    pub fn query(&self, filter: &Filter) -> Result<ResultSet> {
        let mut result = ResultSet::new();
        query::execute(&self.events, &self.indices, filter, &mut result)?;
        Ok(result)
    }

    /// Deserialize the event record behind a query result offset.
    pub fn read_event(&self, offset: u64) -> Result<Event> {
        self.events.read_event(offset)
    }

    /// Current counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            event_count: self.events.event_count(),
            deleted_count: self.events.deleted_count(),
            events_file_size: self.events.file_len(),
            id_index_entries: self.indices.id.entry_count(),
            pubkey_index_entries: self.indices.pubkey.entry_count(),
            kind_index_entries: self.indices.kind.entry_count(),
            pubkey_kind_index_entries: self.indices.pubkey_kind.entry_count(),
            tag_index_entries: self.indices.tag.entry_count(),
            timeline_index_entries: self.indices.timeline.entry_count(),
        }
    }

    /// Synchronously flush every file and close the store.
    pub fn close(self) -> Result<()> {
        self.events.sync(false)?;
        self.indices.sync_all(false)
        // Dropping releases the mappings and the advisory lock.
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        // Best-effort flush; close() is the checked path.
        let _ = self.events.sync(false);
        let _ = self.indices.sync_all(false);
    }
}
