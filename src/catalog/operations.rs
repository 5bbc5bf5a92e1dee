//! List, create, update and delete for any [`Resource`].
//!
//! One generic component covers categories, services and packages. Each
//! mutation runs validate → remote call → invalidate → notify, and reports
//! exactly one notification per attempt. The cache is only touched after
//! the store accepted the write.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::keys::ResourceQueryKey;
use super::resource::{Resource, ResourceMessages};
use crate::cache::{CacheRead, ResourceCache};
use crate::error::{OperationError, RemoteError};
use crate::notify::NotificationSink;
use crate::query::QueryObserver;
use crate::remote::RemoteClient;

/// Snapshot returned by [`ResourceOperations::list`].
pub type Listing<T> = CacheRead<T>;

/// Progress of the most recent mutation on one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationState {
  #[default]
  Idle,
  Validating,
  ValidationFailed,
  /// Waiting on the store
  Submitting,
  /// The store rejected the write, or its reply could not be decoded
  RemoteFailed,
  Succeeded,
}

impl MutationState {
  pub fn is_pending(&self) -> bool {
    matches!(self, MutationState::Validating | MutationState::Submitting)
  }

  pub fn is_failed(&self) -> bool {
    matches!(self, MutationState::ValidationFailed | MutationState::RemoteFailed)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
  Create,
  Update,
  Delete,
}

impl Action {
  fn verb(self) -> &'static str {
    match self {
      Action::Create => "create",
      Action::Update => "update",
      Action::Delete => "delete",
    }
  }

  fn success(self, messages: &ResourceMessages) -> &'static str {
    match self {
      Action::Create => messages.created,
      Action::Update => messages.updated,
      Action::Delete => messages.deleted,
    }
  }

  fn failure(self, messages: &ResourceMessages) -> &'static str {
    match self {
      Action::Create => messages.create_failed,
      Action::Update => messages.update_failed,
      Action::Delete => messages.delete_failed,
    }
  }
}

/// User-facing text for a failed mutation.
fn failure_message(action: Action, messages: &ResourceMessages, err: &OperationError) -> String {
  match err {
    OperationError::Remote(remote) if remote.duplicate => messages.duplicate.to_string(),
    other => format!("{}: {}", action.failure(messages), other),
  }
}

/// Data access for one resource.
///
/// Cloning shares the remote client, cache, sink and mutation state.
pub struct ResourceOperations<R: Resource> {
  remote: Arc<dyn RemoteClient>,
  cache: ResourceCache,
  sink: Arc<dyn NotificationSink>,
  /// Other list keys invalidated alongside this resource's own
  dependents: Vec<ResourceQueryKey>,
  state: Arc<watch::Sender<MutationState>>,
  _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> Clone for ResourceOperations<R> {
  fn clone(&self) -> Self {
    Self {
      remote: Arc::clone(&self.remote),
      cache: self.cache.clone(),
      sink: Arc::clone(&self.sink),
      dependents: self.dependents.clone(),
      state: Arc::clone(&self.state),
      _resource: PhantomData,
    }
  }
}

impl<R: Resource> ResourceOperations<R> {
  pub fn new(
    remote: Arc<dyn RemoteClient>,
    cache: ResourceCache,
    sink: Arc<dyn NotificationSink>,
  ) -> Self {
    let (state, _) = watch::channel(MutationState::Idle);
    Self {
      remote,
      cache,
      sink,
      dependents: Vec::new(),
      state: Arc::new(state),
      _resource: PhantomData,
    }
  }

  /// Also invalidate `key` after every successful mutation.
  pub fn with_dependent(mut self, key: ResourceQueryKey) -> Self {
    self.dependents.push(key);
    self
  }

  pub fn query_key(&self) -> ResourceQueryKey {
    R::query_key()
  }

  // ==========================================================================
  // Reads
  // ==========================================================================

  /// Cached listing; starts a background fetch when missing or stale.
  ///
  /// Fetch failures show up as the listing's status, never as an `Err`.
  pub fn list(&self) -> Listing<R::Entity> {
    self.cache.read(&R::query_key(), self.fetcher())
  }

  /// Listing after any outstanding fetch has finished.
  pub async fn list_settled(&self) -> Listing<R::Entity> {
    self.cache.settle(&R::query_key(), self.fetcher()).await
  }

  /// Observe the listing. Mutations notify the observer once their refetch
  /// completes, even if the listing has not been read yet.
  pub fn subscribe(&self) -> QueryObserver<R::Entity> {
    self.cache.subscribe_with(&R::query_key(), self.fetcher())
  }

  /// Cached entity by id, without fetching.
  pub fn cached(&self, id: &str) -> Option<R::Entity> {
    let listing: Listing<R::Entity> = self.cache.peek(&R::query_key());
    listing.find(id).cloned()
  }

  fn fetcher(
    &self,
  ) -> impl Fn() -> BoxFuture<'static, Result<Vec<R::Entity>, RemoteError>> + Send + Sync + 'static {
    let remote = Arc::clone(&self.remote);
    move || {
      let remote = Arc::clone(&remote);
      async move {
        let rows = remote.select(R::TABLE, &R::select_query()).await?;
        let entities = rows
          .into_iter()
          .map(R::decode)
          .collect::<Result<Vec<_>, _>>()?;
        debug!(resource = R::TABLE, count = entities.len(), "fetched listing");
        Ok::<_, RemoteError>(entities)
      }
      .boxed()
    }
  }

  // ==========================================================================
  // Mutations
  // ==========================================================================

  pub fn mutation_state(&self) -> MutationState {
    *self.state.borrow()
  }

  pub fn watch_mutations(&self) -> watch::Receiver<MutationState> {
    self.state.subscribe()
  }

  /// Validate and insert; returns the entity as stored.
  pub async fn create(&self, input: &R::Input) -> Result<R::Entity, OperationError> {
    let valid = self.validate(Action::Create, input)?;
    let row = R::to_row(&valid);
    let projection = R::projection();

    self
      .submit(Action::Create, async {
        let stored = self.remote.insert(R::TABLE, row, &projection).await?;
        Ok::<_, OperationError>(R::decode(stored)?)
      })
      .await
  }

  /// Validate and replace the editable fields of `id`.
  pub async fn update(&self, id: &str, input: &R::Input) -> Result<R::Entity, OperationError> {
    let valid = self.validate(Action::Update, input)?;
    let row = R::to_row(&valid);
    let projection = R::projection();

    self
      .submit(Action::Update, async {
        let stored = self.remote.update(R::TABLE, id, row, &projection).await?;
        Ok::<_, OperationError>(R::decode(stored)?)
      })
      .await
  }

  /// Delete `id`; nothing is validated first.
  pub async fn delete(&self, id: &str) -> Result<(), OperationError> {
    self
      .submit(Action::Delete, async {
        self.remote.delete(R::TABLE, id).await?;
        Ok::<_, OperationError>(())
      })
      .await
  }

  fn validate(&self, action: Action, input: &R::Input) -> Result<R::Valid, OperationError> {
    self.set_state(MutationState::Validating);
    R::validate(input).map_err(|err| {
      warn!(resource = R::TABLE, action = action.verb(), field = err.field, "validation failed");
      self.set_state(MutationState::ValidationFailed);
      let err = OperationError::from(err);
      self.sink.notify_failure(&failure_message(action, R::messages(), &err));
      err
    })
  }

  async fn submit<T, Fut>(&self, action: Action, call: Fut) -> Result<T, OperationError>
  where
    Fut: Future<Output = Result<T, OperationError>>,
  {
    self.set_state(MutationState::Submitting);
    let result = call.await;
    let messages = R::messages();

    match result {
      Ok(value) => {
        info!(resource = R::TABLE, action = action.verb(), "mutation succeeded");
        self.invalidate();
        self.set_state(MutationState::Succeeded);
        self.sink.notify_success(action.success(messages));
        Ok(value)
      }
      Err(err) => {
        warn!(resource = R::TABLE, action = action.verb(), error = %err, "mutation failed");
        // The store accepted the write even though its reply was unusable.
        if matches!(err, OperationError::Decode(_)) {
          self.invalidate();
        }
        self.set_state(MutationState::RemoteFailed);
        self.sink.notify_failure(&failure_message(action, messages, &err));
        Err(err)
      }
    }
  }

  fn invalidate(&self) {
    self.cache.invalidate(&R::query_key());
    for key in &self.dependents {
      self.cache.invalidate(key);
    }
  }

  fn set_state(&self, state: MutationState) {
    self.state.send_replace(state);
  }
}
