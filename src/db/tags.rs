//! Variable-length tag codec.
//!
//! Tags are stored after the event content as a compact little-endian
//! stream:
//!
//! ```text
//! tag_count: u16
//! for each tag:
//!     value_count: u8
//!     name_len: u8
//!     name_bytes[name_len]
//!     for each value:
//!         value_len: u16
//!         value_bytes[value_len]
//! ```
//!
//! Round-trip is byte-exact for inputs that respect the per-field limits.
//! Deserialization enforces the event caps (tag count, value count, name
//! and value lengths), so a corrupt or foreign record is rejected rather
//! than read out of bounds.

use byteorder::{ByteOrder, LittleEndian};

use crate::db::constants::*;
use crate::db::event::Tag;
use crate::{Result, StoreError};

/// Serialize `tags` into a fresh buffer. Always at least 2 bytes.
pub fn serialize_tags(tags: &[Tag]) -> Result<Vec<u8>> {
    if tags.len() > MAX_TAG_COUNT {
        return Err(StoreError::InvalidEvent(format!(
            "{} tags, limit {}",
            tags.len(),
            MAX_TAG_COUNT
        )));
    }

    let mut buf = Vec::with_capacity(2 + tags.len() * 16);
    buf.extend_from_slice(&(tags.len() as u16).to_le_bytes());

    for tag in tags {
        if tag.values.len() > u8::MAX as usize {
            return Err(StoreError::InvalidEvent(format!(
                "tag {:?} has {} values",
                tag.name,
                tag.values.len()
            )));
        }
        if tag.name.len() > u8::MAX as usize {
            return Err(StoreError::InvalidEvent(format!(
                "tag name is {} bytes",
                tag.name.len()
            )));
        }
        buf.push(tag.values.len() as u8);
        buf.push(tag.name.len() as u8);
        buf.extend_from_slice(tag.name.as_bytes());
        for value in &tag.values {
            if value.len() > u16::MAX as usize {
                return Err(StoreError::InvalidEvent(format!(
                    "tag value is {} bytes",
                    value.len()
                )));
            }
            buf.extend_from_slice(&(value.len() as u16).to_le_bytes());
            buf.extend_from_slice(value.as_bytes());
        }
    }

    Ok(buf)
}

/// Deserialize a tag stream. Trailing bytes past the last value (record
/// padding) are ignored.
pub fn deserialize_tags(data: &[u8]) -> Result<Vec<Tag>> {
    let mut pos = 0usize;

    let tag_count = read_u16(data, &mut pos)? as usize;
    if tag_count > MAX_TAG_COUNT {
        return Err(StoreError::InvalidEvent(format!(
            "tag count {} exceeds limit {}",
            tag_count, MAX_TAG_COUNT
        )));
    }

    let mut tags = Vec::with_capacity(tag_count);
    for _ in 0..tag_count {
        let value_count = read_u8(data, &mut pos)? as usize;
        if value_count > MAX_TAG_VALUES {
            return Err(StoreError::InvalidEvent(format!(
                "value count {} exceeds limit {}",
                value_count, MAX_TAG_VALUES
            )));
        }

        let name_len = read_u8(data, &mut pos)? as usize;
        if name_len == 0 || name_len > MAX_TAG_NAME_LEN {
            return Err(StoreError::InvalidEvent(format!(
                "tag name length {} outside 1..={}",
                name_len, MAX_TAG_NAME_LEN
            )));
        }
        let name = read_str(data, &mut pos, name_len)?;

        let mut values = Vec::with_capacity(value_count);
        for _ in 0..value_count {
            let value_len = read_u16(data, &mut pos)? as usize;
            if value_len > MAX_TAG_VALUE_LEN {
                return Err(StoreError::InvalidEvent(format!(
                    "tag value length {} exceeds limit {}",
                    value_len, MAX_TAG_VALUE_LEN
                )));
            }
            values.push(read_str(data, &mut pos, value_len)?);
        }

        tags.push(Tag { name, values });
    }

    Ok(tags)
}

fn read_u8(data: &[u8], pos: &mut usize) -> Result<u8> {
    let byte = *data
        .get(*pos)
        .ok_or_else(|| StoreError::InvalidEvent("truncated tag data".to_string()))?;
    *pos += 1;
    Ok(byte)
}

fn read_u16(data: &[u8], pos: &mut usize) -> Result<u16> {
    let end = *pos + 2;
    if end > data.len() {
        return Err(StoreError::InvalidEvent("truncated tag data".to_string()));
    }
    let value = LittleEndian::read_u16(&data[*pos..end]);
    *pos = end;
    Ok(value)
}

fn read_str(data: &[u8], pos: &mut usize, len: usize) -> Result<String> {
    let end = *pos + len;
    if end > data.len() {
        return Err(StoreError::InvalidEvent("truncated tag data".to_string()));
    }
    let s = std::str::from_utf8(&data[*pos..end])
        .map_err(|_| StoreError::InvalidEvent("tag bytes are not UTF-8".to_string()))?
        .to_string();
    *pos = end;
    Ok(s)
}
