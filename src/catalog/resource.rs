//! Per-resource descriptors consumed by the generic operations.

use super::keys::ResourceQueryKey;
use super::rows::{self, CATEGORIES, PACKAGES, SERVICES};
use super::types::{Category, CategoryInput, Package, PackageInput, Service, ServiceInput};
use super::validation::{self, ValidCategory, ValidPackage, ValidService};
use crate::cache::Cacheable;
use crate::error::{DecodeError, ValidationError};
use crate::remote::{Join, Projection, Row, SelectQuery};

/// User-facing texts for one resource's mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceMessages {
  pub created: &'static str,
  pub updated: &'static str,
  pub deleted: &'static str,
  pub create_failed: &'static str,
  pub update_failed: &'static str,
  pub delete_failed: &'static str,
  /// Shown instead of the store's text on a uniqueness violation
  pub duplicate: &'static str,
}

/// Everything the generic operations need to know about one resource.
pub trait Resource: Send + Sync + 'static {
  type Entity: Cacheable + std::fmt::Debug;
  type Input: Send + Sync;
  type Valid: Send + Sync;

  /// Remote table name
  const TABLE: &'static str;

  /// Canonical list query: ordering and joins.
  fn select_query() -> SelectQuery;

  fn validate(input: &Self::Input) -> Result<Self::Valid, ValidationError>;

  fn to_row(valid: &Self::Valid) -> Row;

  fn decode(row: Row) -> Result<Self::Entity, DecodeError>;

  fn messages() -> &'static ResourceMessages;

  /// Cache key of the canonical list.
  fn query_key() -> ResourceQueryKey {
    ResourceQueryKey::new(Self::TABLE, Self::select_query())
  }

  /// Columns returned by inserts and updates; matches the list projection so
  /// created entities carry the same expansions as listed ones.
  fn projection() -> Projection {
    Self::select_query().projection
  }
}

// ============================================================================
// Categories
// ============================================================================

pub struct CategoryResource;

static CATEGORY_MESSAGES: ResourceMessages = ResourceMessages {
  created: "Categoría creada correctamente",
  updated: "Categoría actualizada correctamente",
  deleted: "Categoría eliminada correctamente",
  create_failed: "Error al crear categoría",
  update_failed: "Error al actualizar categoría",
  delete_failed: "Error al eliminar categoría",
  duplicate: "Esta categoría ya existe",
};

impl Resource for CategoryResource {
  type Entity = Category;
  type Input = CategoryInput;
  type Valid = ValidCategory;

  const TABLE: &'static str = CATEGORIES;

  fn select_query() -> SelectQuery {
    SelectQuery {
      projection: Projection::ALL,
      order_by: "nombre",
      ascending: true,
    }
  }

  fn validate(input: &CategoryInput) -> Result<ValidCategory, ValidationError> {
    validation::validate_category(input)
  }

  fn to_row(valid: &ValidCategory) -> Row {
    rows::category_row(valid)
  }

  fn decode(row: Row) -> Result<Category, DecodeError> {
    rows::decode_category(row)
  }

  fn messages() -> &'static ResourceMessages {
    &CATEGORY_MESSAGES
  }
}

// ============================================================================
// Services
// ============================================================================

pub struct ServiceResource;

static SERVICE_MESSAGES: ResourceMessages = ResourceMessages {
  created: "Servicio creado correctamente",
  updated: "Servicio actualizado correctamente",
  deleted: "Servicio eliminado correctamente",
  create_failed: "Error al crear servicio",
  update_failed: "Error al actualizar servicio",
  delete_failed: "Error al eliminar servicio",
  duplicate: "Este servicio ya existe",
};

impl Resource for ServiceResource {
  type Entity = Service;
  type Input = ServiceInput;
  type Valid = ValidService;

  const TABLE: &'static str = SERVICES;

  fn select_query() -> SelectQuery {
    SelectQuery {
      projection: Projection::ALL,
      order_by: "created_at",
      ascending: false,
    }
  }

  fn validate(input: &ServiceInput) -> Result<ValidService, ValidationError> {
    validation::validate_service(input)
  }

  fn to_row(valid: &ValidService) -> Row {
    rows::service_row(valid)
  }

  fn decode(row: Row) -> Result<Service, DecodeError> {
    rows::decode_service(row)
  }

  fn messages() -> &'static ResourceMessages {
    &SERVICE_MESSAGES
  }
}

// ============================================================================
// Packages
// ============================================================================

pub struct PackageResource;

/// `categoria:categorias(id,nombre)`
pub const CATEGORY_JOIN: Join = Join {
  alias: "categoria",
  resource: CATEGORIES,
  foreign_key: "categoria_id",
  columns: &["id", "nombre"],
};

static PACKAGE_MESSAGES: ResourceMessages = ResourceMessages {
  created: "Paquete creado correctamente",
  updated: "Paquete actualizado correctamente",
  deleted: "Paquete eliminado correctamente",
  create_failed: "Error al crear paquete",
  update_failed: "Error al actualizar paquete",
  delete_failed: "Error al eliminar paquete",
  duplicate: "Este paquete ya existe",
};

impl Resource for PackageResource {
  type Entity = Package;
  type Input = PackageInput;
  type Valid = ValidPackage;

  const TABLE: &'static str = PACKAGES;

  fn select_query() -> SelectQuery {
    SelectQuery {
      projection: Projection {
        columns: &[],
        joins: &[CATEGORY_JOIN],
      },
      order_by: "created_at",
      ascending: false,
    }
  }

  fn validate(input: &PackageInput) -> Result<ValidPackage, ValidationError> {
    validation::validate_package(input)
  }

  fn to_row(valid: &ValidPackage) -> Row {
    rows::package_row(valid)
  }

  fn decode(row: Row) -> Result<Package, DecodeError> {
    rows::decode_package(row)
  }

  fn messages() -> &'static ResourceMessages {
    &PACKAGE_MESSAGES
  }
}
