//! Configurable retry with exponential backoff around a [`RemoteClient`].

use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::{Projection, RemoteClient, Row, SelectQuery};
use crate::error::RemoteError;

/// Retry policy for remote calls.
///
/// The default makes a single attempt. Only transient failures (transport
/// errors, timeouts, 408/429/5xx) are retried, and writes are retried only
/// when `retry_mutations` is set since a lost response may hide a write that
/// already happened.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub initial_backoff_ms: u64,
  pub max_backoff_ms: u64,
  pub retry_mutations: bool,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 1,
      initial_backoff_ms: 200,
      max_backoff_ms: 5_000,
      retry_mutations: false,
    }
  }
}

impl RetryPolicy {
  pub fn none() -> Self {
    Self::default()
  }

  pub fn is_enabled(&self) -> bool {
    self.max_attempts > 1
  }

  /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    let ms = self
      .initial_backoff_ms
      .saturating_mul(factor)
      .min(self.max_backoff_ms);
    Duration::from_millis(ms)
  }

  /// Run `call` until it succeeds, fails permanently, or attempts run out.
  pub async fn run<T, F, Fut>(&self, operation: &str, mutation: bool, mut call: F) -> Result<T, RemoteError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
  {
    let max_attempts = if mutation && !self.retry_mutations {
      1
    } else {
      self.max_attempts.max(1)
    };

    let mut attempt = 1;
    loop {
      match call().await {
        Ok(value) => return Ok(value),
        Err(err) if attempt < max_attempts && err.is_transient() => {
          let delay = self.backoff(attempt);
          warn!(
            operation,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "remote call failed, retrying"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(err) => return Err(err),
      }
    }
  }
}

/// Remote client that applies a [`RetryPolicy`] to every call.
pub struct Retrying<C> {
  inner: C,
  policy: RetryPolicy,
}

impl<C: RemoteClient> Retrying<C> {
  pub fn new(inner: C, policy: RetryPolicy) -> Self {
    Self { inner, policy }
  }
}

#[async_trait]
impl<C: RemoteClient> RemoteClient for Retrying<C> {
  async fn select(&self, resource: &str, query: &SelectQuery) -> Result<Vec<Row>, RemoteError> {
    self
      .policy
      .run("select", false, || self.inner.select(resource, query))
      .await
  }

  async fn insert(
    &self,
    resource: &str,
    row: Row,
    returning: &Projection,
  ) -> Result<Row, RemoteError> {
    self
      .policy
      .run("insert", true, || self.inner.insert(resource, row.clone(), returning))
      .await
  }

  async fn update(
    &self,
    resource: &str,
    id: &str,
    row: Row,
    returning: &Projection,
  ) -> Result<Row, RemoteError> {
    self
      .policy
      .run("update", true, || {
        self.inner.update(resource, id, row.clone(), returning)
      })
      .await
  }

  async fn delete(&self, resource: &str, id: &str) -> Result<(), RemoteError> {
    self
      .policy
      .run("delete", true, || self.inner.delete(resource, id))
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::remote::MemoryStore;

  fn fast(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
      max_attempts,
      initial_backoff_ms: 1,
      max_backoff_ms: 2,
      retry_mutations: false,
    }
  }

  fn query() -> SelectQuery {
    SelectQuery {
      projection: Projection::ALL,
      order_by: "created_at",
      ascending: false,
    }
  }

  #[test]
  fn test_backoff_is_capped() {
    let policy = RetryPolicy {
      max_attempts: 10,
      initial_backoff_ms: 100,
      max_backoff_ms: 500,
      retry_mutations: false,
    };
    assert_eq!(policy.backoff(1), Duration::from_millis(100));
    assert_eq!(policy.backoff(2), Duration::from_millis(200));
    assert_eq!(policy.backoff(3), Duration::from_millis(400));
    assert_eq!(policy.backoff(4), Duration::from_millis(500));
    assert_eq!(policy.backoff(40), Duration::from_millis(500));
  }

  #[test]
  fn test_default_is_single_attempt() {
    assert!(!RetryPolicy::default().is_enabled());
  }

  #[tokio::test]
  async fn test_transient_select_is_retried() {
    let store = MemoryStore::new();
    store.fail_next(RemoteError::transport("connection reset"));
    let client = Retrying::new(store.clone(), fast(3));

    assert!(client.select("servicios", &query()).await.is_ok());
    assert_eq!(store.calls().select, 2);
  }

  #[tokio::test]
  async fn test_permanent_error_is_not_retried() {
    let store = MemoryStore::new();
    store.fail_next(RemoteError::from_store("permission denied", Some("42501".into()), Some(403)));
    let client = Retrying::new(store.clone(), fast(3));

    assert!(client.select("servicios", &query()).await.is_err());
    assert_eq!(store.calls().select, 1);
  }

  #[tokio::test]
  async fn test_mutations_not_retried_by_default() {
    let store = MemoryStore::new();
    store.fail_next(RemoteError::transport("connection reset"));
    let client = Retrying::new(store.clone(), fast(3));

    assert!(client.insert("servicios", Row::new(), &Projection::ALL).await.is_err());
    assert_eq!(store.calls().insert, 1);
  }
}
