//! The immutable unit of data exchanged between every layer of the engine.

use crate::encoding::{CodecError, Decode, Encode};

/// A single key's state at a point in time: either a value, or a tombstone
/// marking the key deleted.
///
/// Records are immutable once constructed; a later write for the same key
/// produces a new `Record` with a greater `timestamp`, which supersedes this
/// one regardless of either record's tombstone flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The key. Never empty.
    pub key: Vec<u8>,
    /// The value, or `None` if this record is a tombstone.
    pub value: Option<Vec<u8>>,
    /// `true` if this record marks `key` deleted at `timestamp`.
    pub tombstone: bool,
    /// Wall-clock milliseconds at creation. Never rewritten.
    pub timestamp: i64,
}

impl Record {
    /// Construct a live (non-tombstone) record.
    pub fn put(key: Vec<u8>, value: Vec<u8>, timestamp: i64) -> Self {
        Self {
            key,
            value: Some(value),
            tombstone: false,
            timestamp,
        }
    }

    /// Construct a tombstone record.
    pub fn delete(key: Vec<u8>, timestamp: i64) -> Self {
        Self {
            key,
            value: None,
            tombstone: true,
            timestamp,
        }
    }

    /// `true` if this record carries a visible value (not a tombstone).
    pub fn is_live(&self) -> bool {
        !self.tombstone
    }
}

// Record encoding: key-length (u32 BE), key bytes, value-length
// (u32 BE; 0 if absent or empty), value bytes, tombstone byte (0/1),
// timestamp (i64 BE). An absent value and an empty value share the same
// `val_len == 0` encoding; the tombstone byte is the sole discriminator.
impl Encode for Record {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        self.key.encode_to(buf)?;
        match &self.value {
            Some(v) => v.encode_to(buf)?,
            None => Vec::<u8>::new().encode_to(buf)?,
        }
        self.tombstone.encode_to(buf)?;
        self.timestamp.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for Record {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        let mut offset = 0;

        let (key, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;

        let (value_bytes, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;

        let (tombstone, n) = bool::decode_from(&buf[offset..])?;
        offset += n;

        let (timestamp, n) = i64::decode_from(&buf[offset..])?;
        offset += n;

        let value = if tombstone {
            None
        } else if value_bytes.is_empty() {
            Some(Vec::new())
        } else {
            Some(value_bytes)
        };

        Ok((
            Record {
                key,
                value,
                tombstone,
                timestamp,
            },
            offset,
        ))
    }
}
