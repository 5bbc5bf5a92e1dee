//! Cache layer that orchestrates caching logic with network fetching.

use chrono::Duration;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::storage::{CacheEntry, ErasedValue};
use super::traits::{CacheRead, Cacheable, QueryKey};
use crate::error::RemoteError;
use crate::query::QueryObserver;

/// Produces a fresh result for one key.
type ErasedFetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<ErasedValue, RemoteError>> + Send + Sync>;

/// Background fetch that any number of readers can await.
type SharedFetch = Shared<BoxFuture<'static, ()>>;

struct InFlight {
  generation: u64,
  task: SharedFetch,
}

struct Slot {
  /// Unique per slot, so fetches started before a teardown never match a
  /// slot recreated afterwards.
  epoch: u64,
  description: String,
  entry: CacheEntry,
  fetcher: Option<ErasedFetcher>,
  in_flight: Option<InFlight>,
  changed: watch::Sender<u64>,
}

impl Slot {
  fn new(epoch: u64, description: String) -> Self {
    let (changed, _) = watch::channel(0);
    Self {
      epoch,
      description,
      entry: CacheEntry::new(),
      fetcher: None,
      in_flight: None,
      changed,
    }
  }

  /// Whether a fetch for the current generation is already running.
  fn fetching_current(&self) -> bool {
    self
      .in_flight
      .as_ref()
      .is_some_and(|f| f.generation == self.entry.generation())
  }
}

struct Inner {
  slots: Mutex<HashMap<String, Slot>>,
  next_epoch: AtomicU64,
  stale_time: Duration,
}

impl Inner {
  fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
    self.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn new_slot(&self, description: String) -> Slot {
    Slot::new(self.next_epoch.fetch_add(1, Ordering::Relaxed), description)
  }

  /// Completion handler for background fetches; the only writer of values.
  fn complete(
    &self,
    key: &str,
    epoch: u64,
    generation: u64,
    result: Result<ErasedValue, RemoteError>,
  ) {
    let mut slots = self.lock();
    let Some(slot) = slots.get_mut(key).filter(|slot| slot.epoch == epoch) else {
      debug!(key, "fetch finished after cache teardown");
      return;
    };

    if slot
      .in_flight
      .as_ref()
      .is_some_and(|f| f.generation == generation)
    {
      slot.in_flight = None;
    }

    let failed = result.as_ref().err().map(ToString::to_string);
    if slot.entry.complete(generation, result) {
      match failed {
        Some(error) => warn!(query = %slot.description, %error, "fetch failed"),
        None => debug!(query = %slot.description, generation, "fetch stored"),
      }
      slot.changed.send_modify(|version| *version += 1);
    } else {
      debug!(
        query = %slot.description,
        generation,
        current = slot.entry.generation(),
        "discarding result of superseded fetch"
      );
    }
  }
}

/// In-memory resource cache.
///
/// Each query key maps to the last successful result, a freshness flag, the
/// state of the latest fetch and a set of observers. Reads never block on
/// the network: a missing or stale entry starts a background fetch and the
/// read returns whatever is cached. At most one fetch per key and
/// generation is in flight.
///
/// Fetches run as tokio tasks, so reads and invalidations must happen inside
/// a runtime. Cloning shares the same cache.
#[derive(Clone)]
pub struct ResourceCache {
  inner: Arc<Inner>,
}

impl ResourceCache {
  /// Create an empty cache with the default stale time of five minutes.
  pub fn new() -> Self {
    Self::with_stale_time(Duration::minutes(5))
  }

  pub fn with_stale_time(stale_time: Duration) -> Self {
    Self {
      inner: Arc::new(Inner {
        slots: Mutex::new(HashMap::new()),
        next_epoch: AtomicU64::new(0),
        stale_time,
      }),
    }
  }

  pub fn stale_time(&self) -> Duration {
    self.inner.stale_time
  }

  /// Read a cached list, starting a background fetch if it is missing or stale.
  ///
  /// The first `fetcher` given for a key is kept and reused by
  /// [`ResourceCache::invalidate`].
  pub fn read<K, T, F, Fut>(&self, key: &K, fetcher: F) -> CacheRead<T>
  where
    K: QueryKey,
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>, RemoteError>> + Send + 'static,
  {
    let hash = key.cache_hash();
    let mut slots = self.inner.lock();
    let slot = slots
      .entry(hash.clone())
      .or_insert_with(|| self.inner.new_slot(key.description()));

    if slot.fetcher.is_none() {
      slot.fetcher = Some(erase::<T, F, Fut>(fetcher));
    }

    if slot.entry.is_stale(self.inner.stale_time) && !slot.fetching_current() {
      self.start_fetch(&hash, slot);
    }

    slot.entry.snapshot(self.inner.stale_time)
  }

  /// Like [`ResourceCache::read`], but wait for the outstanding fetch (and any
  /// refetch started by an invalidation meanwhile) before taking the snapshot.
  ///
  /// A failed fetch is not retried here; the snapshot reports the failure.
  pub async fn settle<K, T, F, Fut>(&self, key: &K, fetcher: F) -> CacheRead<T>
  where
    K: QueryKey,
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>, RemoteError>> + Send + 'static,
  {
    let first = self.read(key, fetcher);
    let hash = key.cache_hash();

    let mut waited = false;
    while let Some(task) = self.pending(&hash) {
      task.await;
      waited = true;
    }

    if waited {
      self.snapshot(&hash)
    } else {
      first
    }
  }

  /// Mark a key stale and refetch it in the background.
  ///
  /// Observers are notified when the refetch completes. Any fetch that was
  /// already in flight is superseded: its result is dropped.
  pub fn invalidate<K: QueryKey>(&self, key: &K) {
    let hash = key.cache_hash();
    let mut slots = self.inner.lock();
    let Some(slot) = slots.get_mut(&hash) else {
      debug!(query = %key.description(), "invalidate: nothing cached");
      return;
    };

    let generation = slot.entry.invalidate();
    debug!(query = %slot.description, generation, "invalidated");

    if slot.fetcher.is_some() {
      self.start_fetch(&hash, slot);
    }
  }

  /// Attach an observer to a key, whether or not it has been read yet.
  ///
  /// Until some read registers a fetcher, invalidating the key refetches
  /// nothing and the observer stays silent. Prefer
  /// [`ResourceCache::subscribe_with`] when the fetcher is at hand.
  pub fn subscribe<K: QueryKey, T: Cacheable>(&self, key: &K) -> QueryObserver<T> {
    self.attach(key, None)
  }

  /// Attach an observer and register `fetcher` for the key without fetching,
  /// so a later invalidation refetches and notifies even if nothing has read
  /// the key yet.
  pub fn subscribe_with<K, T, F, Fut>(&self, key: &K, fetcher: F) -> QueryObserver<T>
  where
    K: QueryKey,
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>, RemoteError>> + Send + 'static,
  {
    self.attach(key, Some(erase::<T, F, Fut>(fetcher)))
  }

  fn attach<K: QueryKey, T: Cacheable>(
    &self,
    key: &K,
    fetcher: Option<ErasedFetcher>,
  ) -> QueryObserver<T> {
    let hash = key.cache_hash();
    let mut slots = self.inner.lock();
    let slot = slots
      .entry(hash.clone())
      .or_insert_with(|| self.inner.new_slot(key.description()));
    if slot.fetcher.is_none() {
      slot.fetcher = fetcher;
    }
    let rx = slot.changed.subscribe();
    drop(slots);

    QueryObserver::new(self.clone(), hash, rx)
  }

  /// Snapshot by hashed key without triggering a fetch.
  pub(crate) fn snapshot<T: Cacheable>(&self, hash: &str) -> CacheRead<T> {
    self
      .inner
      .lock()
      .get(hash)
      .map(|slot| slot.entry.snapshot(self.inner.stale_time))
      .unwrap_or_else(CacheRead::empty)
  }

  /// Snapshot of a key without triggering a fetch.
  pub fn peek<K: QueryKey, T: Cacheable>(&self, key: &K) -> CacheRead<T> {
    self.snapshot(&key.cache_hash())
  }

  /// Whether a fetch for the key's current generation is running.
  pub fn is_fetching<K: QueryKey>(&self, key: &K) -> bool {
    self
      .inner
      .lock()
      .get(&key.cache_hash())
      .is_some_and(Slot::fetching_current)
  }

  /// Drop every entry. Observers see the cache as torn down and fetches
  /// still in flight finish without storing anything.
  pub fn clear(&self) {
    let dropped = {
      let mut slots = self.inner.lock();
      let count = slots.len();
      slots.clear();
      count
    };
    debug!(entries = dropped, "cache cleared");
  }

  pub fn len(&self) -> usize {
    self.inner.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn pending(&self, hash: &str) -> Option<SharedFetch> {
    self
      .inner
      .lock()
      .get(hash)
      .and_then(|slot| slot.in_flight.as_ref().map(|f| f.task.clone()))
  }

  /// Spawn a fetch for the slot's current generation. Caller holds the lock.
  fn start_fetch(&self, hash: &str, slot: &mut Slot) {
    let Some(fetcher) = slot.fetcher.clone() else {
      return;
    };

    let epoch = slot.epoch;
    let generation = slot.entry.generation();
    let inner = Arc::clone(&self.inner);
    let key = hash.to_string();
    let fetch = fetcher();

    let task = async move {
      let result = fetch.await;
      inner.complete(&key, epoch, generation, result);
    }
    .boxed()
    .shared();

    debug!(query = %slot.description, generation, "fetch started");
    slot.entry.begin_fetch();
    slot.in_flight = Some(InFlight {
      generation,
      task: task.clone(),
    });
    tokio::spawn(task);
  }
}

impl Default for ResourceCache {
  fn default() -> Self {
    Self::new()
  }
}

fn erase<T, F, Fut>(fetcher: F) -> ErasedFetcher
where
  T: Cacheable,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Vec<T>, RemoteError>> + Send + 'static,
{
  Arc::new(move || {
    let fut = fetcher();
    async move { fut.await.map(|items| Arc::new(items) as ErasedValue) }.boxed()
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::FetchStatus;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tokio::sync::oneshot;

  #[derive(Debug, Clone, PartialEq)]
  struct Item(u32);

  impl Cacheable for Item {
    fn cache_key(&self) -> &str {
      "item"
    }

    fn entity_type() -> &'static str {
      "item"
    }
  }

  struct Key(&'static str);

  impl QueryKey for Key {
    fn cache_hash(&self) -> String {
      self.0.to_string()
    }

    fn description(&self) -> String {
      self.0.to_string()
    }
  }

  /// Fetcher returning the call number, counting calls.
  fn counting(
    calls: Arc<AtomicUsize>,
  ) -> impl Fn() -> BoxFuture<'static, Result<Vec<Item>, RemoteError>> + Send + Sync {
    move || {
      let n = calls.fetch_add(1, Ordering::SeqCst) as u32 + 1;
      async move { Ok(vec![Item(n)]) }.boxed()
    }
  }

  #[tokio::test]
  async fn test_read_miss_fetches_once_then_hits() {
    let cache = ResourceCache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache.settle(&Key("k"), counting(calls.clone())).await;
    assert_eq!(first.items(), &[Item(1)]);
    assert!(first.fresh);

    let second = cache.read(&Key("k"), counting(calls.clone()));
    assert_eq!(second.items(), &[Item(1)]);
    assert!(second.fresh);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_concurrent_reads_share_one_fetch() {
    let cache = ResourceCache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel::<()>();
    let rx = Arc::new(Mutex::new(Some(rx)));

    let fetcher = {
      let calls = calls.clone();
      move || {
        calls.fetch_add(1, Ordering::SeqCst);
        let rx = rx.lock().unwrap().take();
        async move {
          if let Some(rx) = rx {
            let _ = rx.await;
          }
          Ok::<_, RemoteError>(vec![Item(7)])
        }
      }
    };

    let a = cache.read(&Key("k"), fetcher.clone());
    let b = cache.read(&Key("k"), fetcher.clone());
    assert!(a.is_loading());
    assert!(b.is_loading());
    assert!(cache.is_fetching(&Key("k")));

    tx.send(()).unwrap();
    let settled = cache.settle(&Key("k"), fetcher).await;
    assert_eq!(settled.items(), &[Item(7)]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_invalidation_refetch_wins_over_older_fetch() {
    let cache = ResourceCache::new();
    let (old_tx, old_rx) = oneshot::channel::<()>();
    let gates = Arc::new(Mutex::new(vec![old_rx]));
    let calls = Arc::new(AtomicUsize::new(0));

    // First call blocks until released and returns 1; later calls return 2 at once.
    let fetcher = {
      let gates = gates.clone();
      let calls = calls.clone();
      move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) as u32 + 1;
        let gate = gates.lock().unwrap().pop();
        async move {
          if let Some(gate) = gate {
            let _ = gate.await;
          }
          Ok::<_, RemoteError>(vec![Item(n)])
        }
      }
    };

    cache.read(&Key("k"), fetcher.clone());
    cache.invalidate(&Key("k"));
    let settled = cache.settle(&Key("k"), fetcher).await;
    assert_eq!(settled.items(), &[Item(2)]);

    // Releasing the older fetch must not clobber the newer value.
    old_tx.send(()).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let read: CacheRead<Item> = cache.peek(&Key("k"));
    assert_eq!(read.items(), &[Item(2)]);
    assert!(read.fresh);
  }

  #[tokio::test]
  async fn test_failed_refetch_keeps_old_value() {
    let cache = ResourceCache::new();
    let fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let fetcher = {
      let fail = fail.clone();
      move || {
        let fail = fail.load(Ordering::SeqCst);
        async move {
          if fail {
            Err(RemoteError::transport("offline"))
          } else {
            Ok(vec![Item(1)])
          }
        }
      }
    };

    cache.settle(&Key("k"), fetcher.clone()).await;
    fail.store(true, Ordering::SeqCst);

    let mut observer = cache.subscribe::<_, Item>(&Key("k"));
    cache.invalidate(&Key("k"));
    assert!(observer.changed().await);

    let read = observer.current();
    assert_eq!(read.items(), &[Item(1)]);
    assert!(!read.fresh);
    assert!(matches!(read.status, FetchStatus::Failed(_)));

    // The next read retries because the entry is still stale.
    fail.store(false, Ordering::SeqCst);
    let read = cache.settle(&Key("k"), fetcher).await;
    assert!(read.fresh);
    assert!(read.status.is_ready());
  }

  #[tokio::test]
  async fn test_subscribers_notified_on_refetch() {
    let cache = ResourceCache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    cache.settle(&Key("k"), counting(calls.clone())).await;

    let mut first = cache.subscribe::<_, Item>(&Key("k"));
    let mut second = cache.subscribe::<_, Item>(&Key("k"));
    cache.invalidate(&Key("k"));

    assert!(first.changed().await);
    assert!(second.changed().await);
    assert_eq!(first.current().items(), &[Item(2)]);
    assert_eq!(second.current().items(), &[Item(2)]);
  }

  #[tokio::test]
  async fn test_invalidate_unknown_key_is_noop() {
    let cache = ResourceCache::new();
    cache.invalidate(&Key("missing"));
    assert!(cache.is_empty());
  }

  #[tokio::test]
  async fn test_stale_time_triggers_refetch() {
    let cache = ResourceCache::with_stale_time(Duration::zero());
    let calls = Arc::new(AtomicUsize::new(0));

    cache.settle(&Key("k"), counting(calls.clone())).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let read = cache.settle(&Key("k"), counting(calls.clone())).await;

    assert_eq!(read.items(), &[Item(2)]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_invalidate_after_subscribe_with_fetches_and_notifies() {
    let cache = ResourceCache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut observer = cache.subscribe_with(&Key("k"), counting(calls.clone()));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    cache.invalidate(&Key("k"));
    assert!(observer.changed().await);
    assert_eq!(observer.current().items(), &[Item(1)]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fetch_started_before_clear_is_not_stored() {
    let cache = ResourceCache::new();
    let (tx, rx) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(rx)));
    let calls = Arc::new(AtomicUsize::new(0));

    // First call waits for the gate and returns 1; later calls return 2 at once.
    let fetcher = {
      let gate = gate.clone();
      let calls = calls.clone();
      move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) as u32 + 1;
        let gate = gate.lock().unwrap().take();
        async move {
          if let Some(gate) = gate {
            let _ = gate.await;
          }
          Ok::<_, RemoteError>(vec![Item(n)])
        }
      }
    };

    cache.read(&Key("k"), fetcher.clone());
    let old = cache.pending("k").unwrap();
    cache.clear();

    // Held open so the second fetch is still running when the first ends.
    let (hold_tx, hold_rx) = oneshot::channel::<()>();
    let slow = {
      let calls = calls.clone();
      let hold = Arc::new(Mutex::new(Some(hold_rx)));
      move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) as u32 + 1;
        let hold = hold.lock().unwrap().take();
        async move {
          if let Some(hold) = hold {
            let _ = hold.await;
          }
          Ok::<_, RemoteError>(vec![Item(n)])
        }
      }
    };
    cache.read(&Key("k"), slow.clone());

    tx.send(()).unwrap();
    old.await;

    let read: CacheRead<Item> = cache.peek(&Key("k"));
    assert!(!read.has_data());
    assert!(cache.is_fetching(&Key("k")));

    hold_tx.send(()).unwrap();
    let settled = cache.settle(&Key("k"), slow).await;
    assert_eq!(settled.items(), &[Item(2)]);
  }

  #[tokio::test]
  async fn test_clear_ends_subscriptions() {
    let cache = ResourceCache::new();
    let mut observer = cache.subscribe::<_, Item>(&Key("k"));
    cache.clear();
    assert!(!observer.changed().await);
  }
}
