//! Content-addressed artifact storage.
//!
//! [`DiskStore`] keeps two directories under its root:
//!
//! * `content/<hh>/<hash>`: raw payloads named by their XXH3-128 hash, so
//!   identical payloads stored under several keys share one file;
//! * `index/<hh>/<sha256(key)>`: an [`IndexRecord`] per key pointing at a
//!   payload.
//!
//! Every file is written to a unique temporary name and renamed into place,
//! which makes concurrent puts of the same key idempotent.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use duet_common::{CodeDigest, ContentHash};
use tracing::debug;

use crate::error::CacheError;
use crate::index::IndexRecord;

const CONTENT_DIR: &str = "content";
const INDEX_DIR: &str = "index";

/// A stored artifact located by its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The key the artifact was stored under.
    pub key: String,
    /// Location of the payload on disk.
    pub stored_path: PathBuf,
    /// Integrity hash of the payload.
    pub integrity: ContentHash,
    /// Payload size in bytes.
    pub size: u64,
}

/// A key/value store for processed bundle artifacts.
///
/// Keys are opaque ASCII strings derived from content, so an existing key is
/// never rewritten with different content.
pub trait CacheStore: Send + Sync {
    /// Looks up `key` without reading its payload. Returns `Ok(None)` on a
    /// miss, including when the stored entry turns out to be corrupt.
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores `content` under `key` and returns the new entry.
    fn put(&self, key: &str, content: &[u8]) -> Result<CacheEntry, CacheError>;

    /// Reads the payload of an entry, checking it against the entry's
    /// integrity hash.
    fn read(&self, entry: &CacheEntry) -> Result<Vec<u8>, CacheError> {
        let payload =
            std::fs::read(&entry.stored_path).map_err(|e| CacheError::io(&entry.stored_path, e))?;
        let actual = ContentHash::from_bytes(&payload);
        if actual != entry.integrity {
            return Err(CacheError::ChecksumMismatch {
                path: entry.stored_path.clone(),
                expected: entry.integrity.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(payload)
    }
}

/// Entry counts and sizes reported by [`DiskStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of index records.
    pub entries: usize,
    /// Number of distinct payload files.
    pub content_files: usize,
    /// Total payload size in bytes.
    pub bytes: u64,
}

/// A [`CacheStore`] persisted in a directory.
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Creates a store rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path of the index record for `key`.
    pub fn index_path(&self, key: &str) -> PathBuf {
        let digest = CodeDigest::of(key.as_bytes());
        let name = digest.as_str();
        self.root.join(INDEX_DIR).join(&name[..2]).join(&name[2..])
    }

    /// Returns the path of the payload with the given integrity hash.
    pub fn content_path(&self, integrity: &ContentHash) -> PathBuf {
        let name = integrity.to_string();
        self.root.join(CONTENT_DIR).join(&name[..2]).join(&name[2..])
    }

    /// Removes the index record of `key`. Returns `true` if one existed.
    ///
    /// The payload is left in place; other keys may share it.
    pub fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.index_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Deletes every index record and payload.
    pub fn clear(&self) -> Result<(), CacheError> {
        for dir in [INDEX_DIR, CONTENT_DIR] {
            let path = self.root.join(dir);
            match std::fs::remove_dir_all(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(path, e)),
            }
        }
        Ok(())
    }

    /// Counts index records and payloads.
    pub fn stats(&self) -> Result<StoreStats, CacheError> {
        let mut stats = StoreStats::default();
        for file in files_in(&self.root.join(INDEX_DIR))? {
            if !is_temporary(&file) {
                stats.entries += 1;
            }
        }
        for file in files_in(&self.root.join(CONTENT_DIR))? {
            if is_temporary(&file) {
                continue;
            }
            let meta = std::fs::metadata(&file).map_err(|e| CacheError::io(&file, e))?;
            stats.content_files += 1;
            stats.bytes += meta.len();
        }
        Ok(stats)
    }

    fn lookup(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let index_path = self.index_path(key);
        let raw = match std::fs::read(&index_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(index_path, e)),
        };

        let record = IndexRecord::decode(&index_path, &raw)?;
        if record.key != key {
            return Err(CacheError::KeyMismatch {
                path: index_path,
                found: record.key,
            });
        }

        let stored_path = self.content_path(&record.integrity);
        let meta = match std::fs::metadata(&stored_path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(stored_path, e)),
        };
        if meta.len() != record.size {
            debug!(
                "Payload {} has {} bytes, index says {}",
                stored_path.display(),
                meta.len(),
                record.size
            );
            return Ok(None);
        }

        Ok(Some(CacheEntry {
            key: record.key,
            stored_path,
            integrity: record.integrity,
            size: record.size,
        }))
    }
}

impl CacheStore for DiskStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        match self.lookup(key) {
            Ok(entry) => Ok(entry),
            Err(
                err @ (CacheError::InvalidHeader { .. }
                | CacheError::KeyMismatch { .. }
                | CacheError::Serialization { .. }),
            ) => {
                debug!("Treating corrupt cache entry as a miss: {err}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn put(&self, key: &str, content: &[u8]) -> Result<CacheEntry, CacheError> {
        let integrity = ContentHash::from_bytes(content);
        let stored_path = self.content_path(&integrity);
        write_atomic(&stored_path, content)?;

        let record = IndexRecord::new(key, integrity, content.len() as u64);
        write_atomic(&self.index_path(key), &record.encode()?)?;

        Ok(CacheEntry {
            key: key.to_string(),
            stored_path,
            integrity,
            size: record.size,
        })
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

const TEMP_MARKER: &str = ".tmp-";

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dir.join(format!(
        "{file_name}{TEMP_MARKER}{}-{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    std::fs::write(&temp, data).map_err(|e| CacheError::io(&temp, e))?;
    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(CacheError::io(path, e));
    }
    Ok(())
}

fn is_temporary(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().contains(TEMP_MARKER))
}

/// Lists files one directory level below `dir` (the fan-out buckets).
fn files_in(dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let mut files = Vec::new();
    let buckets = match std::fs::read_dir(dir) {
        Ok(buckets) => buckets,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(CacheError::io(dir, e)),
    };
    for bucket in buckets {
        let bucket = bucket.map_err(|e| CacheError::io(dir, e))?.path();
        if !bucket.is_dir() {
            continue;
        }
        let entries = std::fs::read_dir(&bucket).map_err(|e| CacheError::io(&bucket, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&bucket, e))?;
            files.push(entry.path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, DiskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn put_then_get_roundtrip() {
        let (_dir, store) = make_store();
        let entry = store.put("v1|5|abc|dl", b"hello").unwrap();
        assert_eq!(entry.size, 5);

        let found = store.get("v1|5|abc|dl").unwrap().unwrap();
        assert_eq!(found, entry);
        assert_eq!(store.read(&found).unwrap(), b"hello");
    }

    #[test]
    fn get_missing_returns_none() {
        let (_dir, store) = make_store();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn put_is_idempotent() {
        let (_dir, store) = make_store();
        let a = store.put("k", b"same").unwrap();
        let b = store.put("k", b"same").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.stats().unwrap().entries, 1);
    }

    #[test]
    fn identical_payloads_share_content() {
        let (_dir, store) = make_store();
        let a = store.put("k1", b"payload").unwrap();
        let b = store.put("k2", b"payload").unwrap();
        assert_eq!(a.stored_path, b.stored_path);

        let stats = store.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.content_files, 1);
        assert_eq!(stats.bytes, 7);
    }

    #[test]
    fn corrupt_index_is_a_miss() {
        let (_dir, store) = make_store();
        store.put("k", b"data").unwrap();
        std::fs::write(store.index_path("k"), b"garbage data").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn resized_content_is_a_miss() {
        let (_dir, store) = make_store();
        let entry = store.put("k", b"data").unwrap();
        std::fs::write(&entry.stored_path, b"tampered").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn damaged_content_fails_to_read() {
        let (_dir, store) = make_store();
        let entry = store.put("k", b"data").unwrap();
        std::fs::write(&entry.stored_path, b"dada").unwrap();

        let found = store.get("k").unwrap().unwrap();
        let err = store.read(&found).unwrap_err();
        assert!(matches!(err, CacheError::ChecksumMismatch { .. }));
    }

    #[test]
    fn missing_content_is_a_miss() {
        let (_dir, store) = make_store();
        let entry = store.put("k", b"data").unwrap();
        std::fs::remove_file(&entry.stored_path).unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn foreign_record_is_a_miss() {
        let (_dir, store) = make_store();
        store.put("other", b"data").unwrap();
        let target = store.index_path("k");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::copy(store.index_path("other"), &target).unwrap();
        assert!(store.get("k").unwrap().is_none());
        assert!(store.get("other").unwrap().is_some());
    }

    #[test]
    fn remove_and_clear() {
        let (_dir, store) = make_store();
        store.put("a", b"1").unwrap();
        store.put("b", b"2").unwrap();

        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert!(store.get("a").unwrap().is_none());
        assert!(store.get("b").unwrap().is_some());

        store.clear().unwrap();
        assert!(store.get("b").unwrap().is_none());
        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn stats_on_empty_store() {
        let (_dir, store) = make_store();
        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn paths_fan_out() {
        let (dir, store) = make_store();
        let path = store.index_path("key");
        assert!(path.starts_with(dir.path().join("index")));
        let bucket = path.parent().unwrap().file_name().unwrap();
        assert_eq!(bucket.len(), 2);
    }

    #[test]
    fn concurrent_puts_of_same_key() {
        let (_dir, store) = make_store();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| store.put("shared", b"same content").unwrap());
            }
        });
        let entry = store.get("shared").unwrap().unwrap();
        assert_eq!(store.read(&entry).unwrap(), b"same content");
    }
}
