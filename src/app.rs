//! Composition root: one cache, one remote client, three resources.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::SessionHandle;
use crate::cache::ResourceCache;
use crate::catalog::{
  CatalogSummary, CategoryOperations, PackageOperations, PackageResource, Resource,
  ServiceOperations,
};
use crate::config::{CacheConfig, Config};
use crate::error::ConfigError;
use crate::notify::NotificationSink;
use crate::remote::{RemoteClient, RestClient, Retrying};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogOptions {
  pub stale_time: Duration,
  /// Category mutations also invalidate the package listing, so embedded
  /// category names refresh without a manual refetch
  pub cascade_category_changes: bool,
}

impl Default for CatalogOptions {
  fn default() -> Self {
    Self::from(&CacheConfig::default())
  }
}

impl From<&CacheConfig> for CatalogOptions {
  fn from(config: &CacheConfig) -> Self {
    Self {
      stale_time: config.stale_time(),
      cascade_category_changes: config.cascade_category_changes,
    }
  }
}

/// The catalog's data-access layer for one session.
///
/// Owns the cache for its whole lifetime; [`Catalog::shutdown`] tears it
/// down. Operation handles share that cache, so a list read through one
/// clone sees invalidations made through another.
pub struct Catalog {
  cache: ResourceCache,
  categories: CategoryOperations,
  services: ServiceOperations,
  packages: PackageOperations,
}

impl Catalog {
  pub fn new(
    remote: Arc<dyn RemoteClient>,
    sink: Arc<dyn NotificationSink>,
    options: CatalogOptions,
  ) -> Self {
    let cache = ResourceCache::with_stale_time(options.stale_time);

    let mut categories =
      CategoryOperations::new(Arc::clone(&remote), cache.clone(), Arc::clone(&sink));
    if options.cascade_category_changes {
      debug!("category changes also invalidate packages");
      categories = categories.with_dependent(PackageResource::query_key());
    }
    let services = ServiceOperations::new(Arc::clone(&remote), cache.clone(), Arc::clone(&sink));
    let packages = PackageOperations::new(remote, cache.clone(), sink);

    Self {
      cache,
      categories,
      services,
      packages,
    }
  }

  /// Build against the HTTP store described by `config`.
  pub fn from_config(
    config: &Config,
    api_key: String,
    session: SessionHandle,
    sink: Arc<dyn NotificationSink>,
  ) -> Result<Self, ConfigError> {
    let client = RestClient::new(&config.remote, api_key, session)?;
    let remote: Arc<dyn RemoteClient> = if config.retry.is_enabled() {
      Arc::new(Retrying::new(client, config.retry.clone()))
    } else {
      Arc::new(client)
    };

    info!(url = %config.remote.url, "catalog connected");
    Ok(Self::new(remote, sink, CatalogOptions::from(&config.cache)))
  }

  pub fn categories(&self) -> &CategoryOperations {
    &self.categories
  }

  pub fn services(&self) -> &ServiceOperations {
    &self.services
  }

  pub fn packages(&self) -> &PackageOperations {
    &self.packages
  }

  pub fn cache(&self) -> &ResourceCache {
    &self.cache
  }

  /// Dashboard counts, waiting for all three listings.
  pub async fn summary(&self) -> CatalogSummary {
    let (categories, services, packages) = tokio::join!(
      self.categories.list_settled(),
      self.services.list_settled(),
      self.packages.list_settled(),
    );
    CatalogSummary::from_listings(categories.items(), services.items(), packages.items())
  }

  /// Drop every cached listing and end all subscriptions.
  pub fn shutdown(self) {
    debug!(entries = self.cache.len(), "catalog shutting down");
    self.cache.clear();
  }
}
