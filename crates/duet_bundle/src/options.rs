//! Processor options.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use duet_common::TargetNaming;

/// Source map options for script bundles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceMapOptions {
    /// Produce maps for script outputs.
    pub scripts: bool,
    /// Produce maps without referencing them from the code.
    pub hidden: bool,
    /// Vendor sources are included in the input maps.
    pub vendor: bool,
}

/// Options shared by every bundle of one processing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorOptions {
    /// Minify outputs.
    pub optimize: bool,
    /// Source map generation.
    pub source_maps: SourceMapOptions,
    /// Directory the emitted files live in.
    pub output_path: PathBuf,
    /// Chunk identifiers of global scripts that are passed through.
    pub script_entry_points: Vec<String>,
    /// Size of the transform worker pool.
    pub workers: usize,
    /// Version string that prefixes every cache key.
    pub tool_version: String,
    /// Modern and legacy file name tags.
    pub naming: TargetNaming,
}

impl ProcessorOptions {
    /// Options for `output_path` with optimization on, no maps, and one
    /// worker per available core.
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            optimize: true,
            source_maps: SourceMapOptions::default(),
            output_path: output_path.into(),
            script_entry_points: Vec::new(),
            workers: default_workers(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            naming: TargetNaming::default(),
        }
    }
}

/// The available parallelism, or 1 when it cannot be determined.
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}
