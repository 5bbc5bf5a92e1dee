//! Generic in-memory caching layer for remote query results.
//!
//! This module provides a resource-agnostic cache that:
//! - Stores the last successful result per query key
//! - Tracks freshness (invalidation and stale time)
//! - De-duplicates concurrent fetches of the same key
//! - Discards results of fetches superseded by an invalidation
//! - Notifies observers when a fetch completes

mod layer;
mod storage;
mod traits;

pub use layer::ResourceCache;
pub use traits::{CacheRead, Cacheable, QueryKey};
