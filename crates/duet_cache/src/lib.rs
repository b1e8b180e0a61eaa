//! Content-addressed cache for processed bundle artifacts.
//!
//! This crate derives deterministic cache keys from bundle code and stores
//! the processed artifacts under them, so rebuilding an unchanged bundle can
//! copy its results instead of transforming it again.

#![warn(missing_docs)]

pub mod error;
pub mod index;
pub mod keys;
pub mod store;

pub use error::CacheError;
pub use keys::{build_keys, CacheKeySet, KeyFlags, Slot};
pub use store::{CacheEntry, CacheStore, DiskStore, StoreStats};
