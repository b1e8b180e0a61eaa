//! Error types for bundle processing.

use std::path::PathBuf;

use duet_transform::TransformError;

/// Errors that abort a [`process_bundles`](crate::BundleProcessor::process_bundles) call.
///
/// Cache failures never surface here; they are logged and treated as misses
/// or skipped writes.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// A bundle could not be transformed.
    #[error("failed to process {file}: {source}")]
    Transform {
        /// The bundle, relative to the output path.
        file: PathBuf,
        /// The underlying transform failure.
        source: TransformError,
    },

    /// An input or output file could not be read, written or removed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The worker pool could not be created.
    #[error("failed to start worker pool: {reason}")]
    Pool {
        /// Description of the failure.
        reason: String,
    },
}

impl BundleError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
