//! Remote table store access.
//!
//! The store is reached by resource (table) name through [`RemoteClient`].
//! Rows travel as untyped JSON objects; mapping them onto typed entities is
//! the caller's job and happens in `catalog::rows`.

mod client;
mod memory;
mod retry;

pub use client::RestClient;
pub use memory::{CallCounts, MemoryStore};
pub use retry::{RetryPolicy, Retrying};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::RemoteError;

/// One row as returned by the store.
pub type Row = Map<String, Value>;

/// Embedded resource expanded into each row under `alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
  /// Key the expanded object is stored under in the row
  pub alias: &'static str,
  /// Resource the related row lives in
  pub resource: &'static str,
  /// Column in the outer row that references the related row's `id`
  pub foreign_key: &'static str,
  pub columns: &'static [&'static str],
}

/// Which columns (and expansions) a request returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
  /// Empty means every column
  pub columns: &'static [&'static str],
  pub joins: &'static [Join],
}

impl Projection {
  pub const ALL: Projection = Projection {
    columns: &[],
    joins: &[],
  };

  /// Render as a PostgREST `select` parameter, e.g. `*,categoria:categorias(id,nombre)`.
  pub fn to_select_param(&self) -> String {
    let mut parts: Vec<String> = if self.columns.is_empty() {
      vec!["*".to_string()]
    } else {
      self.columns.iter().map(|c| c.to_string()).collect()
    };

    for join in self.joins {
      parts.push(format!(
        "{}:{}({})",
        join.alias,
        join.resource,
        join.columns.join(",")
      ));
    }

    parts.join(",")
  }
}

/// Full-collection read with server-side ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
  pub projection: Projection,
  pub order_by: &'static str,
  pub ascending: bool,
}

impl SelectQuery {
  /// Render as a PostgREST `order` parameter.
  pub fn to_order_param(&self) -> String {
    let direction = if self.ascending { "asc" } else { "desc" };
    format!("{}.{}", self.order_by, direction)
  }
}

/// Capability to read and write rows of named resources.
///
/// Implementations enforce access control server-side and report any
/// rejection as a [`RemoteError`].
#[async_trait]
pub trait RemoteClient: Send + Sync {
  async fn select(&self, resource: &str, query: &SelectQuery) -> Result<Vec<Row>, RemoteError>;

  /// Insert one row; the store assigns identity and timestamps.
  async fn insert(
    &self,
    resource: &str,
    row: Row,
    returning: &Projection,
  ) -> Result<Row, RemoteError>;

  /// Replace the editable fields of the row with the given `id`.
  async fn update(
    &self,
    resource: &str,
    id: &str,
    row: Row,
    returning: &Projection,
  ) -> Result<Row, RemoteError>;

  /// Delete the row with the given `id`; an unknown `id` is an error.
  async fn delete(&self, resource: &str, id: &str) -> Result<(), RemoteError>;
}

#[async_trait]
impl<C: RemoteClient + ?Sized> RemoteClient for std::sync::Arc<C> {
  async fn select(&self, resource: &str, query: &SelectQuery) -> Result<Vec<Row>, RemoteError> {
    (**self).select(resource, query).await
  }

  async fn insert(
    &self,
    resource: &str,
    row: Row,
    returning: &Projection,
  ) -> Result<Row, RemoteError> {
    (**self).insert(resource, row, returning).await
  }

  async fn update(
    &self,
    resource: &str,
    id: &str,
    row: Row,
    returning: &Projection,
  ) -> Result<Row, RemoteError> {
    (**self).update(resource, id, row, returning).await
  }

  async fn delete(&self, resource: &str, id: &str) -> Result<(), RemoteError> {
    (**self).delete(resource, id).await
  }
}

/// Error the store reports when a single-row request matched nothing.
pub(crate) fn no_rows(resource: &str, id: &str) -> RemoteError {
  RemoteError::from_store(
    format!("no {} row with id {}", resource, id),
    Some("PGRST116".to_string()),
    Some(406),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  const CATEGORY_JOIN: &[Join] = &[Join {
    alias: "categoria",
    resource: "categorias",
    foreign_key: "categoria_id",
    columns: &["id", "nombre"],
  }];

  #[test]
  fn test_select_param_all_columns() {
    assert_eq!(Projection::ALL.to_select_param(), "*");
  }

  #[test]
  fn test_select_param_with_join() {
    let projection = Projection {
      columns: &[],
      joins: CATEGORY_JOIN,
    };
    assert_eq!(
      projection.to_select_param(),
      "*,categoria:categorias(id,nombre)"
    );
  }

  #[test]
  fn test_select_param_explicit_columns() {
    let projection = Projection {
      columns: &["id", "nombre"],
      joins: &[],
    };
    assert_eq!(projection.to_select_param(), "id,nombre");
  }

  #[test]
  fn test_order_param() {
    let query = SelectQuery {
      projection: Projection::ALL,
      order_by: "created_at",
      ascending: false,
    };
    assert_eq!(query.to_order_param(), "created_at.desc");
  }
}
