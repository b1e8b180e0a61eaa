//! Revision 3 source maps: decoding, building, lookup and composition.

#![warn(missing_docs)]

pub mod compose;
pub mod error;
pub mod map;
pub mod vlq;

pub use compose::{compose, ComposeStats, ComposeStrategy, LARGE_BUNDLE_THRESHOLD};
pub use error::SourceMapError;
pub use map::{OriginalLocation, Resolved, Segment, SourceMap, SourceMapBuilder};
