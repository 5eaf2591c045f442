//! The append-only events log.
//!
//! One file holds every event: a 64-byte [`EventsHeader`] at offset 0
//! followed by 8-byte-aligned records. Each record is a 48-byte header
//! (total length, flags, id, created_at), a 104-byte body (pubkey, sig,
//! kind, content length), the content padded to 8 bytes, and the
//! serialized tags padded to 8 bytes.
//!
//! Records are immutable once written except for the DELETED flag, which
//! [`EventsLog::mark_deleted`] sets exactly once. The write cursor only
//! moves forward; deleted records keep their bytes until an offline
//! rebuild.

use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::db::constants::*;
use crate::db::event::Event;
use crate::db::paged::PagedFile;
use crate::db::tags;
use crate::{Result, StoreError};

/// Parsed events file header (64 bytes at offset 0).
///
/// Magic and version live in the first 12 bytes and are validated by the
/// paged layer before this is parsed.
#[derive(Debug, Clone, Serialize)]
pub struct EventsHeader {
    /// Header flags. Currently unused, always 0.
    pub flags: u32,
    /// Number of live writes (duplicates and rollbacks excluded).
    pub event_count: u64,
    /// Absolute offset of the next record. Starts at 64.
    pub next_write_offset: u64,
    /// Number of soft-deleted events.
    pub deleted_count: u64,
    /// File size recorded at the last header store.
    pub file_size: u64,
}

impl EventsHeader {
    /// Parse the header from the first 64 bytes of the file.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < EVENTS_HEADER_SIZE {
            return None;
        }
        Some(EventsHeader {
            flags: LittleEndian::read_u32(&data[EH_FLAGS..]),
            event_count: LittleEndian::read_u64(&data[EH_EVENT_COUNT..]),
            next_write_offset: LittleEndian::read_u64(&data[EH_NEXT_WRITE_OFFSET..]),
            deleted_count: LittleEndian::read_u64(&data[EH_DELETED_COUNT..]),
            file_size: LittleEndian::read_u64(&data[EH_FILE_SIZE..]),
        })
    }

    /// Write the mutable header fields back into the mapped bytes.
    /// Magic and version are stamped once at file creation.
    pub fn store(&self, data: &mut [u8]) {
        LittleEndian::write_u32(&mut data[EH_FLAGS..], self.flags);
        LittleEndian::write_u64(&mut data[EH_EVENT_COUNT..], self.event_count);
        LittleEndian::write_u64(&mut data[EH_NEXT_WRITE_OFFSET..], self.next_write_offset);
        LittleEndian::write_u64(&mut data[EH_DELETED_COUNT..], self.deleted_count);
        LittleEndian::write_u64(&mut data[EH_FILE_SIZE..], self.file_size);
    }
}

/// The fixed fields of one on-disk record (header + body, no payload).
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    /// Total record size including padding.
    pub total_length: u32,
    /// Record flags (bit 0 = deleted).
    pub flags: u32,
    /// Event id.
    pub id: [u8; 32],
    /// Creation timestamp.
    pub created_at: i64,
    /// Author public key.
    pub pubkey: [u8; 32],
    /// Event kind.
    pub kind: u32,
    /// Content length in bytes, before padding.
    pub content_length: u32,
}

impl EventRecord {
    /// True once the event has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.flags & REC_FLAG_DELETED != 0
    }
}

/// The events log: a paged file plus its parsed header.
pub struct EventsLog {
    paged: PagedFile,
    header: EventsHeader,
}

impl EventsLog {
    /// Open or create the events file.
    pub fn open_or_create(path: &Path) -> Result<Self> {
        let (mut paged, created) =
            PagedFile::open_or_create(path, EVENTS_MAGIC, EVENTS_INITIAL_SIZE)?;

        let header = if created {
            let header = EventsHeader {
                flags: 0,
                event_count: 0,
                next_write_offset: EVENTS_HEADER_SIZE as u64,
                deleted_count: 0,
                file_size: paged.len(),
            };
            header.store(paged.slice_mut(0, EVENTS_HEADER_SIZE)?);
            header
        } else {
            let header = EventsHeader::parse(paged.slice(0, EVENTS_HEADER_SIZE)?)
                .ok_or_else(|| StoreError::IndexCorrupt("events header truncated".to_string()))?;
            if header.next_write_offset < EVENTS_HEADER_SIZE as u64
                || header.next_write_offset > paged.len()
            {
                return Err(StoreError::IndexCorrupt(format!(
                    "events write cursor {} outside file of {} bytes",
                    header.next_write_offset,
                    paged.len()
                )));
            }
            header
        };

        Ok(EventsLog { paged, header })
    }

    /// Number of live writes.
    pub fn event_count(&self) -> u64 {
        self.header.event_count
    }

    /// Number of soft-deleted events.
    pub fn deleted_count(&self) -> u64 {
        self.header.deleted_count
    }

    /// Current write cursor.
    pub fn next_write_offset(&self) -> u64 {
        self.header.next_write_offset
    }

    /// Current file size in bytes.
    pub fn file_len(&self) -> u64 {
        self.paged.len()
    }

    /// The underlying file handle (advisory locking).
    pub fn file(&self) -> &std::fs::File {
        self.paged.file()
    }

    fn store_header(&mut self) -> Result<()> {
        self.header.file_size = self.paged.len();
        let header = self.header.clone();
        header.store(self.paged.slice_mut(0, EVENTS_HEADER_SIZE)?);
        Ok(())
    }

    /// Append one record and return its offset.
    ///
    /// `tag_bytes` is the already-serialized tag section
    /// ([`tags::serialize_tags`]); the caller validates the event first.
    pub fn append(&mut self, event: &Event, tag_bytes: &[u8]) -> Result<u64> {
        let content = event.content.as_bytes();
        let tags_start = align_up_8(REC_CONTENT + content.len());
        let total = align_up_8(tags_start + tag_bytes.len());

        let offset = self.header.next_write_offset;
        let end = offset
            .checked_add(total as u64)
            .ok_or_else(|| StoreError::Full("events file offset overflow".to_string()))?;
        self.paged.ensure_capacity(end)?;

        let record = self.paged.slice_mut(offset, total)?;
        record.fill(0);
        LittleEndian::write_u32(&mut record[REC_TOTAL_LENGTH..], total as u32);
        record[REC_ID..REC_ID + 32].copy_from_slice(&event.id);
        LittleEndian::write_i64(&mut record[REC_CREATED_AT..], event.created_at);
        record[REC_PUBKEY..REC_PUBKEY + 32].copy_from_slice(&event.pubkey);
        record[REC_SIG..REC_SIG + 64].copy_from_slice(&event.sig);
        LittleEndian::write_u32(&mut record[REC_KIND..], event.kind);
        LittleEndian::write_u32(&mut record[REC_CONTENT_LENGTH..], content.len() as u32);
        record[REC_CONTENT..REC_CONTENT + content.len()].copy_from_slice(content);
        record[tags_start..tags_start + tag_bytes.len()].copy_from_slice(tag_bytes);

        self.header.event_count += 1;
        self.header.next_write_offset = end;
        self.store_header()?;
        Ok(offset)
    }

    /// Undo the most recent [`append`](Self::append), restoring the write
    /// cursor and event count. Used when the id index rejects a duplicate;
    /// the record bytes are reclaimed by the next write.
    pub fn rollback_append(&mut self, offset: u64) -> Result<()> {
        debug_assert!(offset < self.header.next_write_offset);
        self.header.event_count -= 1;
        self.header.next_write_offset = offset;
        self.store_header()
    }

    /// Read the fixed fields of the record at `offset`.
    pub fn record(&self, offset: u64) -> Result<EventRecord> {
        if offset < EVENTS_HEADER_SIZE as u64
            || offset + (REC_HEADER_SIZE + REC_BODY_SIZE) as u64 > self.header.next_write_offset
        {
            return Err(StoreError::IndexCorrupt(format!(
                "record offset {} outside written region [{}, {})",
                offset, EVENTS_HEADER_SIZE, self.header.next_write_offset
            )));
        }

        let fixed = self.paged.slice(offset, REC_HEADER_SIZE + REC_BODY_SIZE)?;
        let total_length = LittleEndian::read_u32(&fixed[REC_TOTAL_LENGTH..]);

        if (total_length as usize) < REC_HEADER_SIZE + REC_BODY_SIZE
            || offset + total_length as u64 > self.header.next_write_offset
        {
            return Err(StoreError::IndexCorrupt(format!(
                "record at {} claims {} bytes past write cursor {}",
                offset, total_length, self.header.next_write_offset
            )));
        }

        let mut id = [0u8; 32];
        id.copy_from_slice(&fixed[REC_ID..REC_ID + 32]);
        let mut pubkey = [0u8; 32];
        pubkey.copy_from_slice(&fixed[REC_PUBKEY..REC_PUBKEY + 32]);

        Ok(EventRecord {
            total_length,
            flags: LittleEndian::read_u32(&fixed[REC_FLAGS..]),
            id,
            created_at: LittleEndian::read_i64(&fixed[REC_CREATED_AT..]),
            pubkey,
            kind: LittleEndian::read_u32(&fixed[REC_KIND..]),
            content_length: LittleEndian::read_u32(&fixed[REC_CONTENT_LENGTH..]),
        })
    }

    /// Deserialize the full event at `offset`.
    ///
    /// Does not check the DELETED flag; callers decide whether a deleted
    /// record is visible.
    pub fn read_event(&self, offset: u64) -> Result<Event> {
        let record = self.record(offset)?;
        let total = record.total_length as usize;
        let content_length = record.content_length as usize;

        if content_length > MAX_CONTENT_LEN || REC_CONTENT + content_length > total {
            return Err(StoreError::InvalidEvent(format!(
                "record at {} has content length {} inconsistent with record of {} bytes",
                offset, content_length, total
            )));
        }

        let bytes = self.paged.slice(offset, total)?;
        let content = std::str::from_utf8(&bytes[REC_CONTENT..REC_CONTENT + content_length])
            .map_err(|_| {
                StoreError::InvalidEvent(format!("record at {} content is not UTF-8", offset))
            })?
            .to_string();

        let tags_start = align_up_8(REC_CONTENT + content_length);
        if tags_start + 2 > total {
            return Err(StoreError::InvalidEvent(format!(
                "record at {} has no room for a tag section",
                offset
            )));
        }
        let tags = tags::deserialize_tags(&bytes[tags_start..total])?;

        let mut sig = [0u8; 64];
        sig.copy_from_slice(&bytes[REC_SIG..REC_SIG + 64]);

        Ok(Event {
            id: record.id,
            pubkey: record.pubkey,
            sig,
            kind: record.kind,
            created_at: record.created_at,
            content,
            tags,
        })
    }

    /// Set the DELETED flag on the record at `offset` and count it.
    pub fn mark_deleted(&mut self, offset: u64) -> Result<()> {
        let record = self.record(offset)?;
        let flags = record.flags | REC_FLAG_DELETED;
        let bytes = self.paged.slice_mut(offset + REC_FLAGS as u64, 4)?;
        LittleEndian::write_u32(bytes, flags);
        self.header.deleted_count += 1;
        self.store_header()
    }

    /// Flush the events file.
    pub fn sync(&self, asynchronous: bool) -> Result<()> {
        self.paged.sync(asynchronous)
    }
}
