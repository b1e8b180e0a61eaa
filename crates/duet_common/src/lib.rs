//! Shared foundational types used across the duet bundle post-processor.
//!
//! This crate provides content hashing for cache addressing and the naming
//! conventions that tie a modern bundle to its downlevel twin.

#![warn(missing_docs)]

pub mod hash;
pub mod naming;

pub use hash::{CodeDigest, ContentHash};
pub use naming::{NamingError, TargetNaming};
