//! Query state and observation, inspired by TanStack Query.
//!
//! A [`QueryObserver`] is attached to one cache key. It is woken whenever a
//! fetch for that key completes and can take a [`CacheRead`] snapshot at any
//! time.
//!
//! # Example
//!
//! ```ignore
//! let mut observer = catalog.packages().subscribe();
//!
//! while observer.changed().await {
//!     let listing = observer.current();
//!     match &listing.status {
//!         FetchStatus::Loading => render_spinner(),
//!         FetchStatus::Failed(e) => render_error(e, listing.items()),
//!         _ => render_rows(listing.items()),
//!     }
//! }
//! ```

use std::marker::PhantomData;
use tokio::sync::watch;

use crate::cache::{CacheRead, Cacheable, ResourceCache};
use crate::error::RemoteError;

/// The state of the most recent fetch for a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
  /// No fetch has been started
  Idle,
  /// A fetch is in flight
  Loading,
  /// The last fetch succeeded
  Ready,
  /// The last fetch failed; any previous data is still readable
  Failed(RemoteError),
}

impl FetchStatus {
  pub fn is_loading(&self) -> bool {
    matches!(self, FetchStatus::Loading)
  }

  pub fn is_ready(&self) -> bool {
    matches!(self, FetchStatus::Ready)
  }

  pub fn is_error(&self) -> bool {
    matches!(self, FetchStatus::Failed(_))
  }

  pub fn error(&self) -> Option<&RemoteError> {
    match self {
      FetchStatus::Failed(e) => Some(e),
      _ => None,
    }
  }
}

/// Subscription to one cache key.
///
/// Notifications carry no payload; call [`QueryObserver::current`] to see
/// what changed. Dropping the observer does not cancel in-flight fetches.
pub struct QueryObserver<T> {
  cache: ResourceCache,
  key: String,
  rx: watch::Receiver<u64>,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Cacheable> QueryObserver<T> {
  pub(crate) fn new(cache: ResourceCache, key: String, rx: watch::Receiver<u64>) -> Self {
    Self {
      cache,
      key,
      rx,
      _marker: PhantomData,
    }
  }

  /// Wait for the next completed fetch.
  ///
  /// Returns `false` once the cache has been torn down.
  pub async fn changed(&mut self) -> bool {
    self.rx.changed().await.is_ok()
  }

  /// Whether a fetch completed since the last call to `changed` or `current`.
  pub fn has_changed(&self) -> bool {
    self.rx.has_changed().unwrap_or(false)
  }

  /// Snapshot of the key's current state.
  pub fn current(&mut self) -> CacheRead<T> {
    let _ = self.rx.borrow_and_update();
    self.cache.snapshot(&self.key)
  }
}

impl<T> std::fmt::Debug for QueryObserver<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryObserver")
      .field("key", &self.key)
      .finish_non_exhaustive()
  }
}
