//! On-disk layout constants and limits.
//!
//! Every file starts with a 64-byte header whose first 12 bytes are common
//! to all formats: an 8-byte ASCII magic and a little-endian `u32` version.
//! All multi-byte integers in every file are little-endian.

// ── Format version and file names ───────────────────────────────────

/// On-disk format version. A mismatch on open is a hard error.
pub const FORMAT_VERSION: u32 = 1;

/// Events log file name within the data directory.
pub const EVENTS_FILE: &str = "events.dat";
/// Id index file name (unique).
pub const IDX_ID_FILE: &str = "idx_id.dat";
/// Pubkey index file name.
pub const IDX_PUBKEY_FILE: &str = "idx_pubkey.dat";
/// Kind index file name.
pub const IDX_KIND_FILE: &str = "idx_kind.dat";
/// Combined pubkey+kind index file name.
pub const IDX_PUBKEY_KIND_FILE: &str = "idx_pubkey_kind.dat";
/// Tag index file name.
pub const IDX_TAG_FILE: &str = "idx_tag.dat";
/// Timeline index file name.
pub const IDX_TIMELINE_FILE: &str = "idx_timeline.dat";

// ── Magic strings (8 bytes each, ASCII) ─────────────────────────────

/// Events log magic.
pub const EVENTS_MAGIC: &[u8; 8] = b"NOSTRDB1";
/// Id index magic.
pub const IDX_ID_MAGIC: &[u8; 8] = b"NIDXID01";
/// Pubkey index magic.
pub const IDX_PUBKEY_MAGIC: &[u8; 8] = b"NIDXPK01";
/// Kind index magic.
pub const IDX_KIND_MAGIC: &[u8; 8] = b"NIDXKD01";
/// Pubkey+kind index magic.
pub const IDX_PUBKEY_KIND_MAGIC: &[u8; 8] = b"NIDXPP01";
/// Tag index magic.
pub const IDX_TAG_MAGIC: &[u8; 8] = b"NIDXTG01";
/// Timeline index magic.
pub const IDX_TIMELINE_MAGIC: &[u8; 8] = b"NIDXTL01";

// ── Events file header (64 bytes at offset 0) ───────────────────────

/// Size of the events file header in bytes.
pub const EVENTS_HEADER_SIZE: usize = 64;
/// Offset of the magic bytes. 8 bytes.
pub const EH_MAGIC: usize = 0;
/// Offset of the format version. 4 bytes.
pub const EH_VERSION: usize = 8;
/// Offset of the header flags. 4 bytes.
pub const EH_FLAGS: usize = 12;
/// Offset of the live event count. 8 bytes.
pub const EH_EVENT_COUNT: usize = 16;
/// Offset of the next write cursor. 8 bytes.
pub const EH_NEXT_WRITE_OFFSET: usize = 24;
/// Offset of the deleted event count. 8 bytes.
pub const EH_DELETED_COUNT: usize = 32;
/// Offset of the recorded file size. 8 bytes.
pub const EH_FILE_SIZE: usize = 40;
// Bytes 48..64 are reserved.

// ── Event record layout (8-byte aligned) ────────────────────────────

/// Size of the per-record header in bytes.
pub const REC_HEADER_SIZE: usize = 48;
/// Offset of the record's total length (including padding). 4 bytes.
pub const REC_TOTAL_LENGTH: usize = 0;
/// Offset of the record flags (bit 0 = deleted). 4 bytes.
pub const REC_FLAGS: usize = 4;
/// Offset of the event id. 32 bytes.
pub const REC_ID: usize = 8;
/// Offset of the creation timestamp (signed seconds). 8 bytes.
pub const REC_CREATED_AT: usize = 40;

/// Size of the fixed record body in bytes.
pub const REC_BODY_SIZE: usize = 104;
/// Offset of the author pubkey. 32 bytes.
pub const REC_PUBKEY: usize = 48;
/// Offset of the signature. 64 bytes.
pub const REC_SIG: usize = 80;
/// Offset of the event kind. 4 bytes.
pub const REC_KIND: usize = 144;
/// Offset of the content length. 4 bytes.
pub const REC_CONTENT_LENGTH: usize = 148;
/// Offset of the content bytes. Content is zero-padded to 8 bytes;
/// the serialized tags follow at the next 8-byte boundary.
pub const REC_CONTENT: usize = 152;

/// Record flag: the event has been soft-deleted.
pub const REC_FLAG_DELETED: u32 = 0x1;

// ── Index file header (64 bytes at offset 0) ────────────────────────

/// Size of an index file header in bytes.
pub const INDEX_HEADER_SIZE: usize = 64;
/// Offset of the magic bytes. 8 bytes.
pub const IH_MAGIC: usize = 0;
/// Offset of the format version. 4 bytes.
pub const IH_VERSION: usize = 8;
/// Offset of the header flags. 4 bytes.
pub const IH_FLAGS: usize = 12;
/// Offset of the bucket count (power of two). 8 bytes.
pub const IH_BUCKET_COUNT: usize = 16;
/// Offset of the total entry count. 8 bytes.
pub const IH_ENTRY_COUNT: usize = 24;
/// Offset of the pool allocation cursor (absolute file offset). 8 bytes.
pub const IH_POOL_NEXT_OFFSET: usize = 32;
/// Offset of the pool capacity (current file size). 8 bytes.
pub const IH_POOL_SIZE: usize = 40;
// Bytes 48..64 are reserved.

/// Size of one bucket slot (a u64 entry offset, 0 = empty).
pub const BUCKET_SLOT_SIZE: usize = 8;

// ── Pool entries ────────────────────────────────────────────────────
//
// A pool entry is the key (zero-padded to 8-byte alignment) followed by
// a fixed 32-byte tail: event_offset u64, created_at i64,
// next_entry_offset u64, flags u32, 4 pad bytes. Bucket slots and
// next_entry_offset hold absolute file offsets; 0 terminates a chain
// (offset 0 is the header, never an entry).

/// Size of the fixed tail of every pool entry.
pub const ENTRY_TAIL_SIZE: usize = 32;
/// Offset of the referenced event within the tail. 8 bytes.
pub const ET_EVENT_OFFSET: usize = 0;
/// Offset of the entry's created_at within the tail. 8 bytes.
pub const ET_CREATED_AT: usize = 8;
/// Offset of the next-entry chain link within the tail. 8 bytes.
pub const ET_NEXT: usize = 16;
/// Offset of the entry flags within the tail. 4 bytes.
pub const ET_FLAGS: usize = 24;

/// Entry flag: the entry is a tombstone.
pub const ENTRY_FLAG_TOMBSTONE: u32 = 0x1;

// ── Index keys ──────────────────────────────────────────────────────

/// Key size of the id index (unique).
pub const KEY_SIZE_ID: usize = 32;
/// Key size of the pubkey index.
pub const KEY_SIZE_PUBKEY: usize = 32;
/// Key size of the kind index (little-endian u32).
pub const KEY_SIZE_KIND: usize = 4;
/// Key size of the combined pubkey+kind index.
pub const KEY_SIZE_PUBKEY_KIND: usize = 36;
/// Key size of the tag index (1 name byte + 32-byte value slot).
pub const KEY_SIZE_TAG: usize = 33;
/// Size of the fixed tag-value slot within a tag key. Raw values longer
/// than this are replaced by their FNV-1a 256-bit digest.
pub const TAG_VALUE_SLOT: usize = 32;

// ── Sizing defaults ─────────────────────────────────────────────────

/// Bucket count for every keyed index.
pub const DEFAULT_BUCKET_COUNT: u64 = 1 << 16;
/// Bucket count for the timeline index (one global chain).
pub const TIMELINE_BUCKET_COUNT: u64 = 1;
/// Initial size of the events file.
pub const EVENTS_INITIAL_SIZE: u64 = 1024 * 1024;
/// Initial pool headroom of a new index file, past header and buckets.
pub const INDEX_POOL_INITIAL: u64 = 64 * 1024;
/// File growth granularity.
pub const GROW_ALIGN: u64 = 4096;

// ── Event limits ────────────────────────────────────────────────────

/// Maximum number of tags per event.
pub const MAX_TAG_COUNT: usize = 2048;
/// Maximum number of values per tag.
pub const MAX_TAG_VALUES: usize = 16;
/// Maximum tag name length in bytes.
pub const MAX_TAG_NAME_LEN: usize = 31;
/// Maximum tag value length in bytes.
pub const MAX_TAG_VALUE_LEN: usize = 511;
/// Maximum content length in bytes (2^20).
pub const MAX_CONTENT_LEN: usize = 1 << 20;

// ── Filter limits ───────────────────────────────────────────────────

/// Maximum id values per filter.
pub const FILTER_MAX_IDS: usize = 256;
/// Maximum author pubkeys per filter.
pub const FILTER_MAX_AUTHORS: usize = 256;
/// Maximum kinds per filter.
pub const FILTER_MAX_KINDS: usize = 64;
/// Maximum tag filters per filter (one per ASCII letter).
pub const FILTER_MAX_TAGS: usize = 26;
/// Maximum values per tag filter.
pub const FILTER_MAX_TAG_VALUES: usize = 256;
/// Result limit applied when the filter asks for 0.
pub const DEFAULT_QUERY_LIMIT: u32 = 500;
/// Initial result set capacity.
pub const RESULT_INITIAL_CAPACITY: usize = 100;

/// Round `n` up to the next multiple of 8.
#[inline]
pub const fn align_up_8(n: usize) -> usize {
    (n + 7) & !7
}
