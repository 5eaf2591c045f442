//! Secondary hash indices.
//!
//! Every index is the same structure in its own file: a 64-byte
//! [`IndexHeader`], a fixed table of `bucket_count` u64 bucket slots, and
//! an append-only pool of fixed-size entries. A bucket slot holds the
//! absolute file offset of its chain head (0 = empty); each entry links to
//! the next via `next_entry_offset` (0 terminates). Insertion prepends, so
//! chains run newest-first when events arrive in roughly monotonic
//! `created_at` order.
//!
//! The six concrete indices differ only in magic, key size, uniqueness,
//! and bucket count ([`IndexSpec`]). The timeline index is the degenerate
//! case: a single bucket and an empty key, giving one global chain in
//! reverse insertion order.
//!
//! Pool entries are never freed. Deletion tombstones an entry
//! ([`HashIndex::mark_tombstone`]); traversal skips tombstones.

use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::db::constants::*;
use crate::db::hash::{fnv1a_256, fnv1a_64};
use crate::db::paged::PagedFile;
use crate::{Result, StoreError};

/// Static shape of one index: its file magic, key layout, and sizing.
#[derive(Debug, Clone, Copy)]
pub struct IndexSpec {
    /// Short name used in error messages.
    pub name: &'static str,
    /// File magic.
    pub magic: &'static [u8; 8],
    /// Key size in bytes (0 for the timeline index).
    pub key_size: usize,
    /// Whether a key may appear at most once (id index only).
    pub unique: bool,
    /// Bucket count, a power of two.
    pub bucket_count: u64,
}

impl IndexSpec {
    /// Unique id index.
    pub const ID: Self = Self {
        name: "id",
        magic: IDX_ID_MAGIC,
        key_size: KEY_SIZE_ID,
        unique: true,
        bucket_count: DEFAULT_BUCKET_COUNT,
    };
    /// Author pubkey index.
    pub const PUBKEY: Self = Self {
        name: "pubkey",
        magic: IDX_PUBKEY_MAGIC,
        key_size: KEY_SIZE_PUBKEY,
        unique: false,
        bucket_count: DEFAULT_BUCKET_COUNT,
    };
    /// Kind index.
    pub const KIND: Self = Self {
        name: "kind",
        magic: IDX_KIND_MAGIC,
        key_size: KEY_SIZE_KIND,
        unique: false,
        bucket_count: DEFAULT_BUCKET_COUNT,
    };
    /// Combined pubkey+kind index.
    pub const PUBKEY_KIND: Self = Self {
        name: "pubkey_kind",
        magic: IDX_PUBKEY_KIND_MAGIC,
        key_size: KEY_SIZE_PUBKEY_KIND,
        unique: false,
        bucket_count: DEFAULT_BUCKET_COUNT,
    };
    /// Tag index (name byte + value slot).
    pub const TAG: Self = Self {
        name: "tag",
        magic: IDX_TAG_MAGIC,
        key_size: KEY_SIZE_TAG,
        unique: false,
        bucket_count: DEFAULT_BUCKET_COUNT,
    };
    /// Timeline index: one global chain in reverse insertion order.
    pub const TIMELINE: Self = Self {
        name: "timeline",
        magic: IDX_TIMELINE_MAGIC,
        key_size: 0,
        unique: false,
        bucket_count: TIMELINE_BUCKET_COUNT,
    };

    /// Key bytes padded to 8-byte alignment within an entry.
    pub const fn key_cap(&self) -> usize {
        align_up_8(self.key_size)
    }

    /// Total size of one pool entry.
    pub const fn entry_size(&self) -> usize {
        self.key_cap() + ENTRY_TAIL_SIZE
    }

    /// Absolute offset of the first pool byte (past header and buckets).
    pub const fn pool_base(&self) -> u64 {
        INDEX_HEADER_SIZE as u64 + self.bucket_count * BUCKET_SLOT_SIZE as u64
    }
}

/// Parsed index file header (64 bytes at offset 0).
#[derive(Debug, Clone, Serialize)]
pub struct IndexHeader {
    /// Header flags. Currently unused, always 0.
    pub flags: u32,
    /// Bucket count the file was created with.
    pub bucket_count: u64,
    /// Total pool entries ever inserted (tombstones included).
    pub entry_count: u64,
    /// Absolute offset of the next free pool byte.
    pub pool_next_offset: u64,
    /// Current pool capacity (the file size).
    pub pool_size: u64,
}

impl IndexHeader {
    /// Parse the header from the first 64 bytes of the file.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < INDEX_HEADER_SIZE {
            return None;
        }
        Some(IndexHeader {
            flags: LittleEndian::read_u32(&data[IH_FLAGS..]),
            bucket_count: LittleEndian::read_u64(&data[IH_BUCKET_COUNT..]),
            entry_count: LittleEndian::read_u64(&data[IH_ENTRY_COUNT..]),
            pool_next_offset: LittleEndian::read_u64(&data[IH_POOL_NEXT_OFFSET..]),
            pool_size: LittleEndian::read_u64(&data[IH_POOL_SIZE..]),
        })
    }

    /// Write the mutable header fields back into the mapped bytes.
    pub fn store(&self, data: &mut [u8]) {
        LittleEndian::write_u32(&mut data[IH_FLAGS..], self.flags);
        LittleEndian::write_u64(&mut data[IH_BUCKET_COUNT..], self.bucket_count);
        LittleEndian::write_u64(&mut data[IH_ENTRY_COUNT..], self.entry_count);
        LittleEndian::write_u64(&mut data[IH_POOL_NEXT_OFFSET..], self.pool_next_offset);
        LittleEndian::write_u64(&mut data[IH_POOL_SIZE..], self.pool_size);
    }
}

/// One live index entry yielded during iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Offset of the referenced record in the events file.
    pub event_offset: u64,
    /// The record's creation timestamp, denormalized into the entry.
    pub created_at: i64,
}

/// One open hash index file.
pub struct HashIndex {
    paged: PagedFile,
    header: IndexHeader,
    spec: IndexSpec,
}

impl HashIndex {
    /// Open or create the index file described by `spec`.
    pub fn open_or_create(path: &Path, spec: IndexSpec) -> Result<Self> {
        let initial_size = spec.pool_base() + INDEX_POOL_INITIAL;
        let (mut paged, created) = PagedFile::open_or_create(path, spec.magic, initial_size)?;

        let header = if created {
            let header = IndexHeader {
                flags: 0,
                bucket_count: spec.bucket_count,
                entry_count: 0,
                pool_next_offset: spec.pool_base(),
                pool_size: paged.len(),
            };
            header.store(paged.slice_mut(0, INDEX_HEADER_SIZE)?);
            header
        } else {
            let header = IndexHeader::parse(paged.slice(0, INDEX_HEADER_SIZE)?).ok_or_else(
                || StoreError::IndexCorrupt(format!("{} index header truncated", spec.name)),
            )?;
            if header.bucket_count != spec.bucket_count {
                return Err(StoreError::IndexCorrupt(format!(
                    "{} index has {} buckets, expected {}",
                    spec.name, header.bucket_count, spec.bucket_count
                )));
            }
            if header.pool_next_offset < spec.pool_base() || header.pool_next_offset > paged.len()
            {
                return Err(StoreError::IndexCorrupt(format!(
                    "{} index pool cursor {} outside file of {} bytes",
                    spec.name,
                    header.pool_next_offset,
                    paged.len()
                )));
            }
            header
        };

        Ok(HashIndex {
            paged,
            header,
            spec,
        })
    }

    /// Total entries ever inserted (tombstones included).
    pub fn entry_count(&self) -> u64 {
        self.header.entry_count
    }

    /// The index's static shape.
    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    fn store_header(&mut self) -> Result<()> {
        self.header.pool_size = self.paged.len();
        let header = self.header.clone();
        header.store(self.paged.slice_mut(0, INDEX_HEADER_SIZE)?);
        Ok(())
    }

    fn bucket_slot_offset(&self, key: &[u8]) -> u64 {
        let bucket = fnv1a_64(key) & (self.spec.bucket_count - 1);
        INDEX_HEADER_SIZE as u64 + bucket * BUCKET_SLOT_SIZE as u64
    }

    fn read_slot(&self, slot_offset: u64) -> Result<u64> {
        Ok(LittleEndian::read_u64(
            self.paged.slice(slot_offset, BUCKET_SLOT_SIZE)?,
        ))
    }

    /// Validate a chain offset before dereferencing it.
    fn check_entry_offset(&self, offset: u64) -> Result<()> {
        let entry_size = self.spec.entry_size() as u64;
        let base = self.spec.pool_base();
        let in_pool = offset >= base
            && offset + entry_size <= self.header.pool_next_offset
            && (offset - base) % entry_size == 0;
        if !in_pool {
            return Err(StoreError::IndexCorrupt(format!(
                "{} index chain offset {} outside pool [{}, {})",
                self.spec.name, offset, base, self.header.pool_next_offset
            )));
        }
        Ok(())
    }

    fn entry_fields(&self, offset: u64) -> Result<(u64, i64, u64, u32)> {
        let tail = self
            .paged
            .slice(offset + self.spec.key_cap() as u64, ENTRY_TAIL_SIZE)?;
        Ok((
            LittleEndian::read_u64(&tail[ET_EVENT_OFFSET..]),
            LittleEndian::read_i64(&tail[ET_CREATED_AT..]),
            LittleEndian::read_u64(&tail[ET_NEXT..]),
            LittleEndian::read_u32(&tail[ET_FLAGS..]),
        ))
    }

    fn entry_key(&self, offset: u64) -> Result<&[u8]> {
        self.paged.slice(offset, self.spec.key_size)
    }

    /// Insert an entry for `key`, prepending it to the key's chain.
    ///
    /// On a unique index an already-present key (ignoring tombstones)
    /// fails with [`StoreError::Duplicate`].
    pub fn insert(&mut self, key: &[u8], event_offset: u64, created_at: i64) -> Result<()> {
        debug_assert_eq!(key.len(), self.spec.key_size);

        let slot_offset = self.bucket_slot_offset(key);
        let head = self.read_slot(slot_offset)?;

        if self.spec.unique {
            let mut current = head;
            while current != 0 {
                self.check_entry_offset(current)?;
                let (_, _, next, flags) = self.entry_fields(current)?;
                if flags & ENTRY_FLAG_TOMBSTONE == 0 && self.entry_key(current)? == key {
                    return Err(StoreError::Duplicate);
                }
                current = next;
            }
        }

        let entry_size = self.spec.entry_size();
        let new_offset = self.header.pool_next_offset;
        self.paged.ensure_capacity(new_offset + entry_size as u64)?;

        let key_cap = self.spec.key_cap();
        let entry = self.paged.slice_mut(new_offset, entry_size)?;
        entry.fill(0);
        entry[..key.len()].copy_from_slice(key);
        let tail = &mut entry[key_cap..];
        LittleEndian::write_u64(&mut tail[ET_EVENT_OFFSET..], event_offset);
        LittleEndian::write_i64(&mut tail[ET_CREATED_AT..], created_at);
        LittleEndian::write_u64(&mut tail[ET_NEXT..], head);

        LittleEndian::write_u64(
            self.paged.slice_mut(slot_offset, BUCKET_SLOT_SIZE)?,
            new_offset,
        );

        self.header.pool_next_offset = new_offset + entry_size as u64;
        self.header.entry_count += 1;
        self.store_header()
    }

    /// Look up the first live entry for `key` (unique indices).
    pub fn lookup(&self, key: &[u8]) -> Result<u64> {
        debug_assert_eq!(key.len(), self.spec.key_size);

        let mut current = self.read_slot(self.bucket_slot_offset(key))?;
        while current != 0 {
            self.check_entry_offset(current)?;
            let (event_offset, _, next, flags) = self.entry_fields(current)?;
            if flags & ENTRY_FLAG_TOMBSTONE == 0 && self.entry_key(current)? == key {
                return Ok(event_offset);
            }
            current = next;
        }
        Err(StoreError::NotFound)
    }

    /// Tombstone the entry matching `key` and `event_offset`.
    pub fn mark_tombstone(&mut self, key: &[u8], event_offset: u64) -> Result<()> {
        debug_assert_eq!(key.len(), self.spec.key_size);

        let mut current = self.read_slot(self.bucket_slot_offset(key))?;
        while current != 0 {
            self.check_entry_offset(current)?;
            let (offset, _, next, flags) = self.entry_fields(current)?;
            if flags & ENTRY_FLAG_TOMBSTONE == 0
                && offset == event_offset
                && self.entry_key(current)? == key
            {
                let flags_offset = current + self.spec.key_cap() as u64 + ET_FLAGS as u64;
                LittleEndian::write_u32(
                    self.paged.slice_mut(flags_offset, 4)?,
                    flags | ENTRY_FLAG_TOMBSTONE,
                );
                return Ok(());
            }
            current = next;
        }
        Err(StoreError::NotFound)
    }

    /// Iterate the live entries for `key` within `[since, until]`
    /// (0 = open bound). The caller pulls until it has enough.
    pub fn iter(&self, key: &[u8], since: i64, until: i64) -> Result<ChainIter<'_>> {
        debug_assert_eq!(key.len(), self.spec.key_size);

        let head = self.read_slot(self.bucket_slot_offset(key))?;
        Ok(ChainIter {
            index: self,
            current: head,
            key: Some(key.to_vec()),
            since,
            until,
        })
    }

    /// Iterate the timeline's single chain, newest insertion first.
    pub fn iter_all(&self, since: i64, until: i64) -> Result<ChainIter<'_>> {
        let head = self.read_slot(INDEX_HEADER_SIZE as u64)?;
        Ok(ChainIter {
            index: self,
            current: head,
            key: None,
            since,
            until,
        })
    }

    /// Flush the index file.
    pub fn sync(&self, asynchronous: bool) -> Result<()> {
        self.paged.sync(asynchronous)
    }
}

/// Pull-based chain traversal: yields live, time-bounded entries until the
/// chain ends or the caller stops pulling.
pub struct ChainIter<'a> {
    index: &'a HashIndex,
    current: u64,
    key: Option<Vec<u8>>,
    since: i64,
    until: i64,
}

impl Iterator for ChainIter<'_> {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current != 0 {
            if let Err(e) = self.index.check_entry_offset(self.current) {
                self.current = 0;
                return Some(Err(e));
            }
            let offset = self.current;
            let (event_offset, created_at, next, flags) = match self.index.entry_fields(offset) {
                Ok(fields) => fields,
                Err(e) => {
                    self.current = 0;
                    return Some(Err(e));
                }
            };
            self.current = next;

            if flags & ENTRY_FLAG_TOMBSTONE != 0 {
                continue;
            }
            if let Some(key) = &self.key {
                match self.index.entry_key(offset) {
                    Ok(entry_key) if entry_key == key.as_slice() => {}
                    Ok(_) => continue,
                    Err(e) => {
                        self.current = 0;
                        return Some(Err(e));
                    }
                }
            }
            if self.since != 0 && created_at < self.since {
                continue;
            }
            if self.until != 0 && created_at > self.until {
                continue;
            }
            return Some(Ok(IndexEntry {
                event_offset,
                created_at,
            }));
        }
        None
    }
}

// ── Key construction ────────────────────────────────────────────────

/// Key bytes for the kind index.
pub fn kind_key(kind: u32) -> [u8; KEY_SIZE_KIND] {
    kind.to_le_bytes()
}

/// Key bytes for the combined pubkey+kind index.
pub fn pubkey_kind_key(pubkey: &[u8; 32], kind: u32) -> [u8; KEY_SIZE_PUBKEY_KIND] {
    let mut key = [0u8; KEY_SIZE_PUBKEY_KIND];
    key[..32].copy_from_slice(pubkey);
    key[32..].copy_from_slice(&kind.to_le_bytes());
    key
}

/// Normalize a raw tag value into the fixed 32-byte key slot: short
/// values are zero-padded, longer values are replaced by their FNV-1a
/// 256-bit digest. Lookup applies the same transform.
pub fn tag_value_slot(raw: &[u8]) -> [u8; TAG_VALUE_SLOT] {
    if raw.len() <= TAG_VALUE_SLOT {
        let mut slot = [0u8; TAG_VALUE_SLOT];
        slot[..raw.len()].copy_from_slice(raw);
        slot
    } else {
        fnv1a_256(raw)
    }
}

/// Key bytes for the tag index: the name byte followed by the value slot.
pub fn tag_key(name: u8, raw_value: &[u8]) -> [u8; KEY_SIZE_TAG] {
    tag_key_from_slot(name, &tag_value_slot(raw_value))
}

/// Tag-index key from an already-normalized value slot.
pub fn tag_key_from_slot(name: u8, slot: &[u8; TAG_VALUE_SLOT]) -> [u8; KEY_SIZE_TAG] {
    let mut key = [0u8; KEY_SIZE_TAG];
    key[0] = name;
    key[1..].copy_from_slice(slot);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(spec: IndexSpec) -> (tempfile::TempDir, HashIndex) {
        let dir = tempdir().unwrap();
        let index = HashIndex::open_or_create(&dir.path().join("idx.dat"), spec).unwrap();
        (dir, index)
    }

    #[test]
    fn test_entry_sizes() {
        assert_eq!(IndexSpec::ID.entry_size(), 64);
        assert_eq!(IndexSpec::PUBKEY.entry_size(), 64);
        assert_eq!(IndexSpec::KIND.entry_size(), 40);
        assert_eq!(IndexSpec::PUBKEY_KIND.entry_size(), 72);
        assert_eq!(IndexSpec::TAG.entry_size(), 72);
        assert_eq!(IndexSpec::TIMELINE.entry_size(), 32);
    }

    #[test]
    fn test_unique_insert_lookup_duplicate() {
        let (_dir, mut index) = open(IndexSpec::ID);
        let key = [0xAA; 32];

        index.insert(&key, 1000, 111).unwrap();
        assert_eq!(index.lookup(&key).unwrap(), 1000);
        assert_eq!(index.entry_count(), 1);

        assert!(matches!(
            index.insert(&key, 2000, 222),
            Err(StoreError::Duplicate)
        ));
        assert_eq!(index.entry_count(), 1);

        assert!(matches!(index.lookup(&[0xBB; 32]), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_tombstone_then_reinsert() {
        let (_dir, mut index) = open(IndexSpec::ID);
        let key = [0x01; 32];

        index.insert(&key, 64, 100).unwrap();
        index.mark_tombstone(&key, 64).unwrap();
        assert!(matches!(index.lookup(&key), Err(StoreError::NotFound)));

        // Second tombstone of the same entry has nothing to hit.
        assert!(matches!(
            index.mark_tombstone(&key, 64),
            Err(StoreError::NotFound)
        ));

        // The duplicate scan ignores tombstones, so the id can come back.
        index.insert(&key, 128, 200).unwrap();
        assert_eq!(index.lookup(&key).unwrap(), 128);
    }

    #[test]
    fn test_chain_is_newest_first() {
        let (_dir, mut index) = open(IndexSpec::PUBKEY);
        let key = [0x42; 32];
        for i in 0..4 {
            index.insert(&key, 64 + i * 64, 1000 + i as i64).unwrap();
        }

        let entries: Vec<IndexEntry> = index
            .iter(&[0x42; 32], 0, 0)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let created: Vec<i64> = entries.iter().map(|e| e.created_at).collect();
        assert_eq!(created, vec![1003, 1002, 1001, 1000]);
    }

    #[test]
    fn test_iter_time_bounds() {
        let (_dir, mut index) = open(IndexSpec::KIND);
        let key = kind_key(1);
        for i in 0..5 {
            index.insert(&key, 64 + i * 64, (i as i64 + 1) * 1000).unwrap();
        }

        let bounded: Vec<i64> = index
            .iter(&key, 1500, 3500)
            .unwrap()
            .map(|e| e.unwrap().created_at)
            .collect();
        assert_eq!(bounded, vec![3000, 2000]);

        // since only
        let since: Vec<i64> = index
            .iter(&key, 4000, 0)
            .unwrap()
            .map(|e| e.unwrap().created_at)
            .collect();
        assert_eq!(since, vec![5000, 4000]);

        // until only
        let until: Vec<i64> = index
            .iter(&key, 0, 1000)
            .unwrap()
            .map(|e| e.unwrap().created_at)
            .collect();
        assert_eq!(until, vec![1000]);
    }

    #[test]
    fn test_keys_in_same_index_are_isolated() {
        let (_dir, mut index) = open(IndexSpec::KIND);
        index.insert(&kind_key(1), 64, 100).unwrap();
        index.insert(&kind_key(2), 128, 200).unwrap();
        index.insert(&kind_key(1), 192, 300).unwrap();

        let kind1: Vec<u64> = index
            .iter(&kind_key(1), 0, 0)
            .unwrap()
            .map(|e| e.unwrap().event_offset)
            .collect();
        assert_eq!(kind1, vec![192, 64]);

        let kind3: Vec<u64> = index
            .iter(&kind_key(3), 0, 0)
            .unwrap()
            .map(|e| e.unwrap().event_offset)
            .collect();
        assert!(kind3.is_empty());
    }

    #[test]
    fn test_timeline_single_chain() {
        let (_dir, mut index) = open(IndexSpec::TIMELINE);
        for i in 0..3 {
            index.insert(&[], 64 + i * 64, 1000 + i as i64).unwrap();
        }

        let offsets: Vec<u64> = index
            .iter_all(0, 0)
            .unwrap()
            .map(|e| e.unwrap().event_offset)
            .collect();
        assert_eq!(offsets, vec![192, 128, 64]);
    }

    #[test]
    fn test_pool_growth() {
        let (_dir, mut index) = open(IndexSpec::KIND);
        let key = kind_key(7);

        // 40-byte entries against 64 KiB of initial pool headroom: this
        // forces at least one growth cycle.
        let count = 3000u64;
        for i in 0..count {
            index.insert(&key, 64 + i * 64, i as i64).unwrap();
        }
        assert_eq!(index.entry_count(), count);

        let walked = index.iter(&key, 0, 0).unwrap().count();
        assert_eq!(walked as u64, count);
    }

    #[test]
    fn test_reopen_preserves_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("idx.dat");
        {
            let mut index = HashIndex::open_or_create(&path, IndexSpec::ID).unwrap();
            index.insert(&[0x11; 32], 64, 100).unwrap();
            index.sync(false).unwrap();
        }

        let index = HashIndex::open_or_create(&path, IndexSpec::ID).unwrap();
        assert_eq!(index.entry_count(), 1);
        assert_eq!(index.lookup(&[0x11; 32]).unwrap(), 64);
    }

    #[test]
    fn test_corrupt_chain_offset_detected() {
        let (_dir, mut index) = open(IndexSpec::ID);
        let key = [0x01; 32];
        index.insert(&key, 64, 100).unwrap();

        // Point the bucket slot into the middle of nowhere.
        let slot_offset = index.bucket_slot_offset(&key);
        LittleEndian::write_u64(
            index.paged.slice_mut(slot_offset, 8).unwrap(),
            index.spec.pool_base() + 1,
        );

        assert!(matches!(
            index.lookup(&key),
            Err(StoreError::IndexCorrupt(_))
        ));
    }

    #[test]
    fn test_tag_value_slot_transform() {
        // Short values are zero-padded in place.
        let short = tag_value_slot(b"abc");
        assert_eq!(&short[..3], b"abc");
        assert!(short[3..].iter().all(|&b| b == 0));

        // A 32-byte value is used verbatim.
        let exact = tag_value_slot(&[0xAA; 32]);
        assert_eq!(exact, [0xAA; 32]);

        // Longer values are digested, and the digest differs from the
        // truncated prefix.
        let long = [0xAA; 33];
        let slot = tag_value_slot(&long);
        assert_ne!(slot, [0xAA; 32]);
        assert_eq!(slot, tag_value_slot(&long));
    }

    #[test]
    fn test_tag_key_layout() {
        let key = tag_key(b'e', &[0xAB; 32]);
        assert_eq!(key[0], b'e');
        assert_eq!(&key[1..], &[0xAB; 32]);
    }
}
