//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur during cache operations.
///
/// Lookups are fail-safe: corruption found while validating an index record
/// is turned into a cache miss by [`DiskStore::get`](crate::DiskStore::get).
/// A payload whose hash no longer matches is only detected when it is read,
/// as [`CacheError::ChecksumMismatch`] from [`CacheStore::read`](crate::CacheStore::read).
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An index record has an invalid or missing header.
    #[error("invalid index record in {path}: {reason}")]
    InvalidHeader {
        /// The index record path.
        path: PathBuf,
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the computed checksum of the payload.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The content file path.
        path: PathBuf,
        /// The expected checksum from the index record.
        expected: String,
        /// The actual checksum computed from the payload.
        actual: String,
    },

    /// The index record at a key's location belongs to a different key.
    #[error("index record {path} holds key '{found}'")]
    KeyMismatch {
        /// The index record path.
        path: PathBuf,
        /// The key stored in the record.
        found: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = CacheError::Io {
            path: PathBuf::from("/tmp/cache/index/ab/cdef"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        };
        let msg = err.to_string();
        assert!(msg.contains("cache I/O error"));
        assert!(msg.contains("index/ab/cdef"));
    }

    #[test]
    fn invalid_header_display() {
        let err = CacheError::InvalidHeader {
            path: PathBuf::from("bad"),
            reason: "missing magic bytes".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("invalid index record"));
        assert!(msg.contains("missing magic bytes"));
    }

    #[test]
    fn checksum_mismatch_display() {
        let err = CacheError::ChecksumMismatch {
            path: PathBuf::from("content"),
            expected: "aabb".to_string(),
            actual: "ccdd".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("checksum mismatch"));
        assert!(msg.contains("aabb"));
        assert!(msg.contains("ccdd"));
    }

    #[test]
    fn key_mismatch_display() {
        let err = CacheError::KeyMismatch {
            path: PathBuf::from("index/00/11"),
            found: "v1|3|abc|dl".to_string(),
        };
        assert!(err.to_string().contains("v1|3|abc|dl"));
    }

    #[test]
    fn serialization_error_display() {
        let err = CacheError::Serialization {
            reason: "invalid bincode data".to_string(),
        };
        assert!(err.to_string().contains("invalid bincode data"));
    }
}
