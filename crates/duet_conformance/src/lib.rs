//! Conformance test helpers for the duet bundle post-processor.
//!
//! Provides a throwaway build output directory with a disk cache, and a
//! cache store wrapper that counts traffic, so scenarios can assert both on
//! the files produced and on whether they came from the cache.

#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use duet_bundle::{BundleError, BundleFile, BundleManifest, BundleProcessor, ProcessorOptions};
use duet_cache::{CacheEntry, CacheError, CacheStore, DiskStore};
use tempfile::TempDir;

/// Tool version used for every key derived in the scenarios.
pub const TOOL_VERSION: &str = "v1";

/// A [`DiskStore`] that records the keys written to it.
///
/// Every transformed bundle persists its artifacts, so a run with zero puts
/// was served entirely from the cache.
pub struct RecordingStore {
    inner: DiskStore,
    gets: AtomicUsize,
    puts: Mutex<Vec<String>>,
}

impl RecordingStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: &Path) -> Self {
        Self {
            inner: DiskStore::new(root),
            gets: AtomicUsize::new(0),
            puts: Mutex::new(Vec::new()),
        }
    }

    /// The underlying disk store.
    pub fn disk(&self) -> &DiskStore {
        &self.inner
    }

    /// Keys written so far, in write order per worker.
    pub fn put_keys(&self) -> Vec<String> {
        self.puts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Number of puts so far.
    pub fn put_count(&self) -> usize {
        self.put_keys().len()
    }

    /// Number of lookups so far.
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Forgets the recorded traffic.
    pub fn reset(&self) {
        self.gets.store(0, Ordering::SeqCst);
        if let Ok(mut puts) = self.puts.lock() {
            puts.clear();
        }
    }
}

impl CacheStore for RecordingStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn put(&self, key: &str, content: &[u8]) -> Result<CacheEntry, CacheError> {
        if let Ok(mut puts) = self.puts.lock() {
            puts.push(key.to_string());
        }
        self.inner.put(key, content)
    }
}

/// A build output directory and an artifact cache in a temporary directory.
pub struct Workspace {
    _dir: TempDir,
    /// Directory the bundles are emitted into.
    pub output: PathBuf,
    /// The cache shared by every run in this workspace.
    pub store: Arc<RecordingStore>,
}

impl Workspace {
    /// Creates an empty workspace.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let output = dir.path().join("dist");
        std::fs::create_dir_all(&output).expect("create output dir");
        let store = Arc::new(RecordingStore::new(&dir.path().join("cache")));
        Self {
            _dir: dir,
            output,
            store,
        }
    }

    /// Writes an emitted bundle and returns its record. The identifier is the
    /// name up to the first `-`.
    pub fn emit(&self, path: &str, content: &str) -> BundleFile {
        let full = self.output.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("create bundle dir");
        }
        std::fs::write(&full, content).expect("write bundle");
        let name = path.rsplit('/').next().unwrap_or(path);
        let identifier = name.split(['-', '.']).next().unwrap_or_default();
        BundleFile::new(identifier, path)
    }

    /// Reads an output file.
    pub fn read(&self, path: &str) -> String {
        std::fs::read_to_string(self.output.join(path)).expect("read output")
    }

    /// Whether an output file exists.
    pub fn exists(&self, path: &str) -> bool {
        self.output.join(path).exists()
    }

    /// Options for this workspace: no optimization, no maps, two workers.
    pub fn options(&self) -> ProcessorOptions {
        let mut options = ProcessorOptions::new(&self.output);
        options.optimize = false;
        options.workers = 2;
        options.tool_version = TOOL_VERSION.to_string();
        options
    }

    /// Processes `files` with the workspace cache.
    pub fn process(
        &self,
        options: ProcessorOptions,
        files: &[BundleFile],
    ) -> Result<BundleManifest, BundleError> {
        let store: Arc<dyn CacheStore> = self.store.clone();
        BundleProcessor::new(options, Some(store)).process_bundles(files)
    }

    /// Processes `files` without a cache.
    pub fn process_uncached(
        &self,
        options: ProcessorOptions,
        files: &[BundleFile],
    ) -> Result<BundleManifest, BundleError> {
        BundleProcessor::new(options, None).process_bundles(files)
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}
