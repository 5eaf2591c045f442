//! In-memory event and tag value types.
//!
//! These are the structures the storage core accepts and returns. The JSON
//! layer and signature verification run upstream; the store trusts its
//! inputs structurally but still enforces the size bounds here before
//! anything touches the file.

use serde::{Serialize, Serializer};

use crate::db::constants::*;
use crate::{Result, StoreError};

/// Serializes a 64-byte array, since serde's built-in array impls stop at 32.
fn serialize_sig<S: Serializer>(sig: &[u8; 64], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    use serde::ser::SerializeTuple;
    let mut tup = serializer.serialize_tuple(sig.len())?;
    for byte in sig {
        tup.serialize_element(byte)?;
    }
    tup.end()
}

/// A single event tag: a short name plus an ordered list of values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tag {
    /// Tag name, 1..=31 bytes (e.g. `"e"`, `"p"`, `"t"`).
    pub name: String,
    /// Tag values, up to 16, each up to 511 bytes.
    pub values: Vec<String>,
}

impl Tag {
    /// Build a tag from a name and values.
    pub fn new(name: &str, values: &[&str]) -> Self {
        Tag {
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// A signed Nostr event as the store sees it.
///
/// `id`, `pubkey`, and `sig` are the raw bytes of the NIP-01 fields;
/// hex decoding happens upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Event id (SHA-256 of the serialized event, per NIP-01).
    pub id: [u8; 32],
    /// Author public key.
    pub pubkey: [u8; 32],
    /// Schnorr signature over the id.
    #[serde(serialize_with = "serialize_sig")]
    pub sig: [u8; 64],
    /// Event kind.
    pub kind: u32,
    /// Creation timestamp, signed seconds since the epoch.
    pub created_at: i64,
    /// UTF-8 content, at most 2^20 bytes.
    pub content: String,
    /// Ordered tag list, at most 2048 entries.
    pub tags: Vec<Tag>,
}

impl Default for Event {
    fn default() -> Self {
        Event {
            id: [0; 32],
            pubkey: [0; 32],
            sig: [0; 64],
            kind: 0,
            created_at: 0,
            content: String::new(),
            tags: Vec::new(),
        }
    }
}

impl Event {
    /// Check the structural bounds a storable event must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.content.len() > MAX_CONTENT_LEN {
            return Err(StoreError::InvalidEvent(format!(
                "content is {} bytes, limit {}",
                self.content.len(),
                MAX_CONTENT_LEN
            )));
        }
        if self.tags.len() > MAX_TAG_COUNT {
            return Err(StoreError::InvalidEvent(format!(
                "{} tags, limit {}",
                self.tags.len(),
                MAX_TAG_COUNT
            )));
        }
        for tag in &self.tags {
            if tag.name.is_empty() || tag.name.len() > MAX_TAG_NAME_LEN {
                return Err(StoreError::InvalidEvent(format!(
                    "tag name {:?} is {} bytes, must be 1..={}",
                    tag.name,
                    tag.name.len(),
                    MAX_TAG_NAME_LEN
                )));
            }
            if tag.values.len() > MAX_TAG_VALUES {
                return Err(StoreError::InvalidEvent(format!(
                    "tag {:?} has {} values, limit {}",
                    tag.name,
                    tag.values.len(),
                    MAX_TAG_VALUES
                )));
            }
            for value in &tag.values {
                if value.len() > MAX_TAG_VALUE_LEN {
                    return Err(StoreError::InvalidEvent(format!(
                        "tag {:?} value is {} bytes, limit {}",
                        tag.name,
                        value.len(),
                        MAX_TAG_VALUE_LEN
                    )));
                }
            }
        }
        Ok(())
    }
}
