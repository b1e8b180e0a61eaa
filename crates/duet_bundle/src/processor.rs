//! Orchestration of one processing call: classification, cache probing and
//! the worker pool.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use duet_cache::{build_keys, CacheEntry, CacheKeySet, CacheStore, KeyFlags, Slot};
use duet_transform::{transform, ProcessingAction};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::classify::{classify, ScriptKind};
use crate::error::BundleError;
use crate::files::{BundleFile, BundleManifest};
use crate::options::ProcessorOptions;

/// One bundle to be served from the cache or transformed.
///
/// Holds paths only; the bundle is read by the worker that handles it.
#[derive(Debug)]
struct Job {
    /// The bundle path relative to the output path, for error reporting.
    file: PathBuf,
    input: PathBuf,
    source_path: PathBuf,
    downlevel_path: PathBuf,
    optimize_only: bool,
    ignore_original: bool,
    is_runtime_chunk: bool,
    /// The input is removed once its outputs are in place.
    consumes_input: bool,
}

impl Job {
    /// Where the artifact of `slot` is written.
    fn destination(&self, slot: Slot) -> PathBuf {
        match slot {
            Slot::OriginalCode => self.source_path.clone(),
            Slot::OriginalMap => map_path(&self.source_path),
            Slot::DownlevelCode => self.downlevel_path.clone(),
            Slot::DownlevelMap => map_path(&self.downlevel_path),
        }
    }

    /// Removes the input and its map.
    fn consume_input(&self) -> Result<(), BundleError> {
        if !self.consumes_input {
            return Ok(());
        }
        let map = map_path(&self.input);
        match std::fs::remove_file(&map) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(BundleError::io(&map, e)),
            _ => {}
        }
        std::fs::remove_file(&self.input).map_err(|e| BundleError::io(&self.input, e))
    }
}

/// Path of the map that accompanies `path`.
fn map_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".map");
    PathBuf::from(s)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), BundleError> {
    std::fs::write(path, bytes).map_err(|e| BundleError::io(path, e))
}

/// Processes the bundles emitted by one build.
///
/// The cache store is optional; without one every bundle is transformed.
pub struct BundleProcessor {
    options: ProcessorOptions,
    store: Option<Arc<dyn CacheStore>>,
}

impl BundleProcessor {
    /// Creates a processor.
    pub fn new(options: ProcessorOptions, store: Option<Arc<dyn CacheStore>>) -> Self {
        Self { options, store }
    }

    /// Returns the options of this processor.
    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// Processes `files` and returns the module, no-module and passthrough
    /// lists.
    ///
    /// Outputs are written next to the inputs under the output path. The
    /// first failing bundle stops dispatch of further work and its error is
    /// returned; bundles already in flight may still complete.
    pub fn process_bundles(&self, files: &[BundleFile]) -> Result<BundleManifest, BundleError> {
        let mut manifest = BundleManifest::default();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut jobs = Vec::new();

        for file in files {
            if !file.is_script() || self.is_script_entry(file) {
                manifest.passthrough_files.push(file.clone());
                continue;
            }
            if !seen.insert(file.path.as_str()) {
                continue;
            }

            let kind = classify(file, &self.options.naming);
            if kind.is_module() {
                manifest.module_files.push(file.clone());
            }
            if kind == ScriptKind::ModernPolyfills && !self.options.optimize {
                continue;
            }

            let (job, no_module) = self.prepare(file, kind);
            if let Some(no_module) = no_module {
                manifest.no_module_files.push(no_module);
            }
            jobs.push(job);
        }

        info!("Generating downlevel bundles for {} scripts", jobs.len());
        if !jobs.is_empty() {
            let hits = AtomicUsize::new(0);
            self.run_pool(&jobs, &hits)?;
            debug!(
                "Cache: {} bundles restored, {} processed",
                hits.load(Ordering::Relaxed),
                jobs.len() - hits.load(Ordering::Relaxed)
            );
        }
        info!("Downlevel bundle generation complete");

        Ok(manifest)
    }

    fn is_script_entry(&self, file: &BundleFile) -> bool {
        !file.identifier.is_empty() && self.options.script_entry_points.contains(&file.identifier)
    }

    /// Decides where the outputs of `file` go. Also returns the record of
    /// the downlevel output, if one is produced.
    fn prepare(&self, file: &BundleFile, kind: ScriptKind) -> (Job, Option<BundleFile>) {
        let options = &self.options;
        let naming = &options.naming;
        let input = options.output_path.join(&file.path);

        let consumes_input = kind == ScriptKind::LegacyPolyfills;
        let (source_path, downlevel_path, downlevel_file) = if consumes_input {
            // Only the downlevel output survives, under the name without the
            // modern marker.
            let stripped = naming.strip_modern_marker(&file.path);
            let path = options.output_path.join(&stripped);
            (path.clone(), path, stripped)
        } else {
            let renamed = naming.downlevel_name(&file.path);
            (input.clone(), options.output_path.join(&renamed), renamed)
        };

        let optimize_only = kind == ScriptKind::ModernPolyfills;
        let no_module = (!optimize_only).then(|| BundleFile {
            path: downlevel_file,
            ..file.clone()
        });
        let job = Job {
            file: PathBuf::from(&file.path),
            input,
            source_path,
            downlevel_path,
            optimize_only,
            ignore_original: consumes_input,
            is_runtime_chunk: kind == ScriptKind::Runtime,
            consumes_input,
        };
        (job, no_module)
    }

    fn keys(&self, job: &Job, code: &str) -> CacheKeySet {
        let options = &self.options;
        build_keys(
            code,
            &options.tool_version,
            KeyFlags {
                optimize: options.optimize,
                optimize_only: job.optimize_only,
                ignore_original: job.ignore_original,
                generate_source_maps: options.source_maps.scripts,
                vendor_source_maps: options.source_maps.vendor,
            },
        )
    }

    /// The bundle's own map, when maps are requested and one exists.
    fn read_input_map(&self, job: &Job) -> Option<String> {
        if !self.options.source_maps.scripts {
            return None;
        }
        let path = map_path(&job.input);
        match std::fs::read_to_string(&path) {
            Ok(map) => Some(map),
            Err(e) => {
                debug!("No source map for {}: {}", job.file.display(), e);
                None
            }
        }
    }

    /// Handles `jobs` on a pool of `workers` threads that lives for this
    /// call only.
    fn run_pool(&self, jobs: &[Job], hits: &AtomicUsize) -> Result<(), BundleError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers.max(1))
            .thread_name(|i| format!("duet-worker-{i}"))
            .build()
            .map_err(|e| BundleError::Pool {
                reason: e.to_string(),
            })?;
        pool.install(|| jobs.par_iter().try_for_each(|job| self.run(job, hits)))
    }

    /// Restores one bundle from the cache, or transforms it, writes its
    /// outputs and caches them. A partial hit is treated as a miss.
    fn run(&self, job: &Job, hits: &AtomicUsize) -> Result<(), BundleError> {
        let code =
            std::fs::read_to_string(&job.input).map_err(|e| BundleError::io(&job.input, e))?;
        let keys = self.keys(job, &code);

        if let Some(store) = self.store.as_deref() {
            if let Some(entries) = probe(store, &keys) {
                if restore(store, job, entries)? {
                    hits.fetch_add(1, Ordering::Relaxed);
                    return job.consume_input();
                }
            }
        }

        debug!("Processing {}", job.file.display());
        let options = &self.options;
        let action = ProcessingAction {
            source_path: job.source_path.clone(),
            downlevel_path: job.downlevel_path.clone(),
            source_map: self.read_input_map(job),
            code,
            optimize: options.optimize,
            optimize_only: job.optimize_only,
            generate_source_maps: options.source_maps.scripts,
            hidden_source_maps: options.source_maps.hidden,
            vendor_source_maps: options.source_maps.vendor,
            is_runtime_chunk: job.is_runtime_chunk,
            ignore_original: job.ignore_original,
        };
        let output =
            transform(&action, &options.naming).map_err(|source| BundleError::Transform {
                file: job.file.clone(),
                source,
            })?;
        drop(action);

        let mut artifacts: Vec<(Slot, &[u8])> = Vec::with_capacity(4);
        if let Some(downlevel) = &output.downlevel {
            artifacts.push((Slot::DownlevelCode, downlevel.code.as_bytes()));
            if let Some(map) = &downlevel.source_map {
                artifacts.push((Slot::DownlevelMap, map.as_bytes()));
            }
        }
        if let Some(original) = &output.original {
            artifacts.push((Slot::OriginalCode, original.code.as_bytes()));
            if let Some(map) = &original.source_map {
                artifacts.push((Slot::OriginalMap, map.as_bytes()));
            }
        }

        for &(slot, bytes) in &artifacts {
            write_file(&job.destination(slot), bytes)?;
        }
        job.consume_input()?;

        if let Some(store) = self.store.as_deref() {
            for &(slot, bytes) in &artifacts {
                let Some(key) = keys.get(slot) else {
                    continue;
                };
                if let Err(e) = store.put(key, bytes) {
                    warn!("Failed to cache {:?} of {}: {}", slot, job.file.display(), e);
                }
            }
        }
        Ok(())
    }
}

/// Looks up every required key. Returns the entries only when all of them
/// are present; lookup failures count as misses.
fn probe(store: &dyn CacheStore, keys: &CacheKeySet) -> Option<Vec<(Slot, CacheEntry)>> {
    if keys.is_empty() {
        return None;
    }
    let mut entries = Vec::with_capacity(4);
    for (slot, key) in keys.required() {
        match store.get(key) {
            Ok(Some(entry)) => entries.push((slot, entry)),
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache lookup failed for {}: {}", key, e);
                return None;
            }
        }
    }
    Some(entries)
}

/// Copies cached artifacts to their destinations. Returns `false` without
/// writing anything if a payload cannot be read.
fn restore(
    store: &dyn CacheStore,
    job: &Job,
    entries: Vec<(Slot, CacheEntry)>,
) -> Result<bool, BundleError> {
    let mut payloads = Vec::with_capacity(entries.len());
    for (slot, entry) in entries {
        match store.read(&entry) {
            Ok(bytes) => payloads.push((slot, bytes)),
            Err(e) => {
                warn!("Cache read failed for {}: {}", entry.key, e);
                return Ok(false);
            }
        }
    }
    for (slot, bytes) in &payloads {
        write_file(&job.destination(*slot), bytes)?;
    }
    debug!("Restored {} from cache", job.file.display());
    Ok(true)
}
