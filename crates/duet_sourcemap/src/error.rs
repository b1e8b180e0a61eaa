//! Error types for source map parsing.

/// Errors raised while reading a source map.
#[derive(Debug, thiserror::Error)]
pub enum SourceMapError {
    /// The map is not valid JSON or has the wrong shape.
    #[error("malformed source map JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The map declares a version other than 3.
    #[error("unsupported source map version {0}")]
    UnsupportedVersion(u32),

    /// The map is an index map with `sections`.
    #[error("indexed source maps are not supported")]
    IndexMap,

    /// The `mappings` field could not be decoded.
    #[error("invalid mappings on generated line {line}: {reason}")]
    InvalidMappings {
        /// 0-based generated line of the offending segment.
        line: u32,
        /// What was wrong with the segment.
        reason: String,
    },
}
