//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};

use crate::query::FetchStatus;

/// Trait for entities that can be cached.
pub trait Cacheable: Clone + Send + Sync + 'static {
  /// Unique identifier for this entity (e.g., the row id)
  fn cache_key(&self) -> &str;

  /// Entity type name for logging (e.g., "category", "package")
  fn entity_type() -> &'static str;
}

/// Identifies one cached query result.
pub trait QueryKey {
  /// Stable, fixed-length key used for lookup
  fn cache_hash(&self) -> String;

  /// Human-readable form for logs
  fn description(&self) -> String;
}

/// Snapshot of one cached query, taken at read time.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
  /// Last successfully fetched result, if any
  pub data: Option<Vec<T>>,
  /// False when the data is missing, invalidated or older than the stale time
  pub fresh: bool,
  /// State of the most recent fetch
  pub status: FetchStatus,
  /// When `data` was fetched
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T: Cacheable> CacheRead<T> {
  pub(crate) fn empty() -> Self {
    Self {
      data: None,
      fresh: false,
      status: FetchStatus::Idle,
      cached_at: None,
    }
  }

  /// Cached items, or an empty slice while nothing has been fetched.
  pub fn items(&self) -> &[T] {
    self.data.as_deref().unwrap_or_default()
  }

  pub fn has_data(&self) -> bool {
    self.data.is_some()
  }

  pub fn is_loading(&self) -> bool {
    self.status.is_loading()
  }

  pub fn is_error(&self) -> bool {
    self.status.is_error()
  }

  /// Look up a cached entity by its key.
  pub fn find(&self, key: &str) -> Option<&T> {
    self.items().iter().find(|item| item.cache_key() == key)
  }
}
