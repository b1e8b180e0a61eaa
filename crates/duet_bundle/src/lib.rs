//! Differential post-processing of the bundles emitted by a build.
//!
//! [`BundleProcessor`] classifies the emitted scripts, serves unchanged
//! bundles from the artifact cache, and transforms the rest on a bounded
//! worker pool, producing the module and no-module file lists.

#![warn(missing_docs)]

pub mod classify;
pub mod error;
pub mod files;
pub mod options;
pub mod processor;

pub use classify::{classify, ScriptKind};
pub use error::BundleError;
pub use files::{BundleFile, BundleManifest};
pub use options::{ProcessorOptions, SourceMapOptions};
pub use processor::BundleProcessor;
