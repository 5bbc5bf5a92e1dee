//! Caching implementations for catalog types.

use sha2::{Digest, Sha256};

use super::types::{Category, Package, Service};
use crate::cache::{Cacheable, QueryKey};
use crate::remote::SelectQuery;

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for Category {
  fn cache_key(&self) -> &str {
    &self.id
  }

  fn entity_type() -> &'static str {
    "category"
  }
}

impl Cacheable for Service {
  fn cache_key(&self) -> &str {
    &self.id
  }

  fn entity_type() -> &'static str {
    "service"
  }
}

impl Cacheable for Package {
  fn cache_key(&self) -> &str {
    &self.id
  }

  fn entity_type() -> &'static str {
    "package"
  }
}

// ============================================================================
// Query key types
// ============================================================================

/// Cache key for the full, ordered listing of one resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceQueryKey {
  pub resource: &'static str,
  pub query: SelectQuery,
}

impl ResourceQueryKey {
  pub fn new(resource: &'static str, query: SelectQuery) -> Self {
    Self { resource, query }
  }

  fn canonical(&self) -> String {
    format!(
      "{}:select={}:order={}",
      self.resource,
      self.query.projection.to_select_param(),
      self.query.to_order_param()
    )
  }
}

impl QueryKey for ResourceQueryKey {
  fn cache_hash(&self) -> String {
    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(self.canonical().as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    let direction = if self.query.ascending { "asc" } else { "desc" };
    if self.query.projection.joins.is_empty() {
      format!("{} by {} {}", self.resource, self.query.order_by, direction)
    } else {
      let joins: Vec<&str> = self.query.projection.joins.iter().map(|j| j.alias).collect();
      format!(
        "{} by {} {} with {}",
        self.resource,
        self.query.order_by,
        direction,
        joins.join(", ")
      )
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::remote::Projection;

  fn key(order_by: &'static str, ascending: bool) -> ResourceQueryKey {
    ResourceQueryKey::new(
      "servicios",
      SelectQuery {
        projection: Projection::ALL,
        order_by,
        ascending,
      },
    )
  }

  #[test]
  fn test_hash_is_stable_and_fixed_length() {
    let a = key("created_at", false).cache_hash();
    let b = key("created_at", false).cache_hash();
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
  }

  #[test]
  fn test_ordering_is_part_of_the_key() {
    assert_ne!(
      key("created_at", false).cache_hash(),
      key("created_at", true).cache_hash()
    );
    assert_ne!(
      key("created_at", false).cache_hash(),
      key("nombre", false).cache_hash()
    );
  }

  #[test]
  fn test_description() {
    assert_eq!(key("nombre", true).description(), "servicios by nombre asc");
  }
}
