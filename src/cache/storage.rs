//! Per-key cache entry: last good value, freshness and fetch bookkeeping.

use chrono::{DateTime, Duration, Utc};
use std::any::Any;
use std::sync::Arc;
use tracing::warn;

use super::traits::{CacheRead, Cacheable};
use crate::error::RemoteError;
use crate::query::FetchStatus;

/// Type-erased `Vec<T>` for some `T: Cacheable`.
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

/// One cached query result.
///
/// `generation` increases on every invalidation. A fetch records the
/// generation it started under and its result is accepted only if that
/// generation is still current.
pub(crate) struct CacheEntry {
  value: Option<ErasedValue>,
  cached_at: Option<DateTime<Utc>>,
  invalidated: bool,
  generation: u64,
  status: FetchStatus,
}

impl CacheEntry {
  pub fn new() -> Self {
    Self {
      value: None,
      cached_at: None,
      invalidated: false,
      generation: 0,
      status: FetchStatus::Idle,
    }
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn is_stale(&self, stale_time: Duration) -> bool {
    match (self.value.is_some(), self.cached_at) {
      (true, Some(cached_at)) => self.invalidated || Utc::now() - cached_at > stale_time,
      _ => true,
    }
  }

  /// Mark stale and start a new generation; returns the new generation.
  pub fn invalidate(&mut self) -> u64 {
    self.invalidated = true;
    self.generation += 1;
    self.generation
  }

  pub fn begin_fetch(&mut self) {
    self.status = FetchStatus::Loading;
  }

  /// Record a fetch result. Returns `false` (and changes nothing) when the
  /// fetch belongs to a superseded generation.
  pub fn complete(&mut self, generation: u64, result: Result<ErasedValue, RemoteError>) -> bool {
    if generation != self.generation {
      return false;
    }

    match result {
      Ok(value) => {
        self.value = Some(value);
        self.cached_at = Some(Utc::now());
        self.invalidated = false;
        self.status = FetchStatus::Ready;
      }
      Err(err) => {
        // Keep the previous value readable; `invalidated` stays as it was so
        // the next read retries.
        self.status = FetchStatus::Failed(err);
      }
    }
    true
  }

  /// Typed snapshot of this entry.
  pub fn snapshot<T: Cacheable>(&self, stale_time: Duration) -> CacheRead<T> {
    let data = self.value.as_ref().and_then(|value| {
      let typed = value.downcast_ref::<Vec<T>>();
      if typed.is_none() {
        warn!(
          entity_type = T::entity_type(),
          "cached value has a different type than requested"
        );
      }
      typed.cloned()
    });

    CacheRead {
      fresh: data.is_some() && !self.is_stale(stale_time),
      data,
      status: self.status.clone(),
      cached_at: self.cached_at,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, PartialEq)]
  struct Item(String);

  impl Cacheable for Item {
    fn cache_key(&self) -> &str {
      &self.0
    }

    fn entity_type() -> &'static str {
      "item"
    }
  }

  fn value(items: &[&str]) -> ErasedValue {
    Arc::new(items.iter().map(|s| Item(s.to_string())).collect::<Vec<_>>())
  }

  #[test]
  fn test_new_entry_is_stale() {
    let entry = CacheEntry::new();
    assert!(entry.is_stale(Duration::minutes(5)));
    let read = entry.snapshot::<Item>(Duration::minutes(5));
    assert!(!read.fresh);
    assert!(read.data.is_none());
    assert_eq!(read.status, FetchStatus::Idle);
  }

  #[test]
  fn test_completed_entry_is_fresh() {
    let mut entry = CacheEntry::new();
    assert!(entry.complete(0, Ok(value(&["a"]))));
    let read = entry.snapshot::<Item>(Duration::minutes(5));
    assert!(read.fresh);
    assert_eq!(read.items(), &[Item("a".into())]);
  }

  #[test]
  fn test_zero_stale_time() {
    let mut entry = CacheEntry::new();
    entry.complete(0, Ok(value(&["a"])));
    assert!(entry.is_stale(Duration::milliseconds(-1)));
  }

  #[test]
  fn test_superseded_generation_is_discarded() {
    let mut entry = CacheEntry::new();
    entry.complete(0, Ok(value(&["old"])));
    let generation = entry.invalidate();
    assert_eq!(generation, 1);

    assert!(!entry.complete(0, Ok(value(&["late"]))));
    assert!(entry.is_stale(Duration::minutes(5)));

    assert!(entry.complete(1, Ok(value(&["new"]))));
    let read = entry.snapshot::<Item>(Duration::minutes(5));
    assert_eq!(read.items(), &[Item("new".into())]);
    assert!(read.fresh);
  }

  #[test]
  fn test_failure_keeps_previous_value_and_stale_flag() {
    let mut entry = CacheEntry::new();
    entry.complete(0, Ok(value(&["kept"])));
    let generation = entry.invalidate();
    entry.complete(generation, Err(RemoteError::transport("offline")));

    let read = entry.snapshot::<Item>(Duration::minutes(5));
    assert_eq!(read.items(), &[Item("kept".into())]);
    assert!(!read.fresh);
    assert!(read.is_error());
  }

  #[test]
  fn test_wrong_type_reads_as_empty() {
    let mut entry = CacheEntry::new();
    entry.complete(0, Ok(Arc::new(vec![1u32, 2, 3])));
    assert!(entry.snapshot::<Item>(Duration::minutes(5)).data.is_none());
  }
}
