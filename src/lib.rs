//! Embedded event store for Nostr relays.
//!
//! The `nostr-store` crate (library name `nstore`) persists signed Nostr
//! events in a single memory-mapped, append-only events file, maintains six
//! secondary hash indices beside it, and answers NIP-01 filter queries by
//! picking the cheapest index for each filter.
//!
//! # Quick example
//!
//! ```no_run
//! use nstore::db::event::Event;
//! use nstore::db::filter::Filter;
//! use nstore::db::store::EventStore;
//!
//! let mut store = EventStore::open("/var/lib/relay/data").unwrap();
//!
//! let event = Event {
//!     id: [0x01; 32],
//!     pubkey: [0x02; 32],
//!     sig: [0; 64],
//!     kind: 1,
//!     created_at: 1704067200,
//!     content: "Hello, Nostr!".to_string(),
//!     tags: Vec::new(),
//! };
//! store.write_event(&event).unwrap();
//!
//! let filter = Filter {
//!     kinds: vec![1],
//!     limit: 10,
//!     ..Filter::default()
//! };
//! let results = store.query(&filter).unwrap();
//! println!("{} matching events", results.len());
//! ```
//!
//! # Key entry points
//!
//! | Type / Function | Purpose |
//! |-----------------|---------|
//! | [`EventStore`](db::store::EventStore) | Open a data directory, write/read/delete/query events |
//! | [`Event`](db::event::Event) | In-memory event value type |
//! | [`Filter`](db::filter::Filter) | NIP-01 subscription filter |
//! | [`ResultSet`](db::filter::ResultSet) | Sorted, limited query results |
//! | [`StoreStats`](db::store::StoreStats) | Event and per-index entry counts |
//!
//! # Module overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`db::store`] | The owning store facade (open, write, get, delete, query, stats) |
//! | [`db::events`] | Events log: file header, record layout, append and soft delete |
//! | [`db::index`] | Generic hash index with bucket table and chained entry pool |
//! | [`db::query`] | Strategy selection and filter execution |
//! | [`db::filter`] | Filter validation and result collection |
//! | [`db::tags`] | Variable-length tag codec |
//! | [`db::paged`] | Growable memory-mapped file with typed header |
//! | [`db::hash`] | FNV-1a hashing (bucket selection, long tag values) |
//! | [`db::constants`] | On-disk layout constants and limits |
//!
//! # Ownership and concurrency
//!
//! One [`EventStore`](db::store::EventStore) owns its data directory
//! exclusively; an advisory lock on the events file rejects a second opener.
//! Writes take `&mut self` and queries take `&self`, so a single store is
//! single-writer by construction. Wrap it in a mutex to share it between
//! threads.
//!
//! # Durability
//!
//! Writes land in a shared memory mapping and are flushed asynchronously
//! after each write; [`close`](db::store::EventStore::close) performs a
//! synchronous flush of every file. There is no write-ahead log: crash
//! guarantees are whatever the OS gives mmap plus msync.

pub mod db;
pub mod util;

use thiserror::Error;

/// Errors returned by `nstore` operations.
///
/// One flat taxonomy for the whole store; errors propagate to the caller
/// unchanged and the core never logs or retries.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An existing file could not be opened (or locked).
    #[error("cannot open file: {0}")]
    FileOpen(String),

    /// A new file or directory could not be created.
    #[error("cannot create file: {0}")]
    FileCreate(String),

    /// Mapping or flushing a file failed.
    #[error("mmap failed: {0}")]
    MmapFailed(String),

    /// A file's magic bytes did not match the expected format.
    #[error("invalid magic: {0}")]
    InvalidMagic(String),

    /// A file carries an unsupported format version.
    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// The underlying file could not grow to fit the write.
    #[error("store is full: {0}")]
    Full(String),

    /// No live entry exists for the requested key.
    #[error("not found")]
    NotFound,

    /// An event with the same id is already stored.
    #[error("duplicate event id")]
    Duplicate,

    /// A malformed event, filter, or on-disk record.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// An integrity violation discovered during index traversal.
    /// Aborts the current operation; never self-healing.
    #[error("index corrupt: {0}")]
    IndexCorrupt(String),

    /// Querying file metadata failed.
    #[error("fstat failed: {0}")]
    FstatFailed(String),

    /// Resizing a file failed.
    #[error("ftruncate failed: {0}")]
    FtruncateFailed(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StoreError>;
