//! Binary index records mapping a cache key to stored content.
//!
//! An index record is written as a 4-byte little-endian header length
//! followed by a bincode-encoded [`IndexRecord`]. The record carries magic
//! bytes and a format version for validation, the full key (index file names
//! are key digests, so the key is checked on read), and the integrity hash
//! and size of the content it points to.

use std::path::Path;

use duet_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Magic bytes identifying a duet index record.
pub const INDEX_MAGIC: [u8; 4] = *b"DUET";

/// Current index format version. Increment on breaking changes to the record.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Metadata stored for one cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Magic bytes: must be `b"DUET"`.
    pub magic: [u8; 4],

    /// Index format version.
    pub format_version: u32,

    /// The cache key this record belongs to.
    pub key: String,

    /// Content hash of the payload; also its address in the content directory.
    pub integrity: ContentHash,

    /// Payload size in bytes.
    pub size: u64,
}

impl IndexRecord {
    /// Creates a record for `key` pointing at a payload.
    pub fn new(key: &str, integrity: ContentHash, size: u64) -> Self {
        Self {
            magic: INDEX_MAGIC,
            format_version: INDEX_FORMAT_VERSION,
            key: key.to_string(),
            integrity,
            size,
        }
    }

    /// Encodes the record with its length prefix.
    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        let header_bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        Ok(output)
    }

    /// Decodes and validates a record read from `path`.
    pub fn decode(path: &Path, raw: &[u8]) -> Result<Self, CacheError> {
        let invalid = |reason: &str| CacheError::InvalidHeader {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if raw.len() < 4 {
            return Err(invalid("truncated length prefix"));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&raw[..4]);
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        if raw.len() < 4 + header_len {
            return Err(invalid("truncated record"));
        }

        let (record, _): (IndexRecord, usize) =
            bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
                .map_err(|e| CacheError::Serialization {
                    reason: e.to_string(),
                })?;

        if record.magic != INDEX_MAGIC {
            return Err(invalid("missing magic bytes"));
        }
        if record.format_version != INDEX_FORMAT_VERSION {
            return Err(invalid(&format!(
                "format version {} (expected {INDEX_FORMAT_VERSION})",
                record.format_version
            )));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn path() -> PathBuf {
        PathBuf::from("index/aa/bb")
    }

    #[test]
    fn encode_decode() {
        let record = IndexRecord::new("v1|3|abc|dl", ContentHash::from_bytes(b"abc"), 3);
        let raw = record.encode().unwrap();
        let back = IndexRecord::decode(&path(), &raw).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn truncated_prefix_rejected() {
        let err = IndexRecord::decode(&path(), b"AB").unwrap_err();
        assert!(matches!(err, CacheError::InvalidHeader { .. }));
    }

    #[test]
    fn truncated_record_rejected() {
        let record = IndexRecord::new("k", ContentHash::from_bytes(b"x"), 1);
        let raw = record.encode().unwrap();
        let err = IndexRecord::decode(&path(), &raw[..raw.len() - 2]).unwrap_err();
        assert!(matches!(err, CacheError::InvalidHeader { .. }));
    }

    #[test]
    fn wrong_magic_rejected() {
        let mut record = IndexRecord::new("k", ContentHash::from_bytes(b"x"), 1);
        record.magic = *b"BAAD";
        let raw = record.encode().unwrap();
        let err = IndexRecord::decode(&path(), &raw).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn wrong_version_rejected() {
        let mut record = IndexRecord::new("k", ContentHash::from_bytes(b"x"), 1);
        record.format_version = 999;
        let raw = record.encode().unwrap();
        let err = IndexRecord::decode(&path(), &raw).unwrap_err();
        assert!(err.to_string().contains("999"));
    }

    #[test]
    fn garbage_rejected() {
        let mut raw = 8u32.to_le_bytes().to_vec();
        raw.extend_from_slice(&[0xff; 8]);
        assert!(IndexRecord::decode(&path(), &raw).is_err());
    }
}
