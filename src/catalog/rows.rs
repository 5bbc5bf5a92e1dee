//! Serde types matching the store's rows, and the typed decode step.
//!
//! Rows come back from the store as untyped JSON. Each row is deserialized
//! into an `Api*` type and then checked before it becomes a domain entity;
//! anything that does not fit is a [`DecodeError`], never a silent cast.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::types::{Category, CategoryRef, Package, Service};
use super::validation::{ValidCategory, ValidPackage, ValidService};
use crate::error::DecodeError;
use crate::remote::Row;

pub const CATEGORIES: &str = "categorias";
pub const SERVICES: &str = "servicios";
pub const PACKAGES: &str = "paquetes";

/// Deserialize a raw row into an API type.
pub fn decode_row<T: DeserializeOwned>(resource: &'static str, row: Row) -> Result<T, DecodeError> {
  serde_json::from_value(Value::Object(row)).map_err(|e| DecodeError::new(resource, e.to_string()))
}

fn require_id(resource: &'static str, id: String) -> Result<String, DecodeError> {
  if id.trim().is_empty() {
    return Err(DecodeError::new(resource, "empty id"));
  }
  Ok(id)
}

fn into_object(value: Value) -> Row {
  match value {
    Value::Object(row) => row,
    _ => Row::new(),
  }
}

// ============================================================================
// Categories
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCategoria {
  pub id: String,
  pub nombre: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl ApiCategoria {
  pub fn into_domain(self) -> Result<Category, DecodeError> {
    Ok(Category {
      id: require_id(CATEGORIES, self.id)?,
      name: self.nombre,
      created_at: self.created_at,
      updated_at: self.updated_at,
    })
  }
}

pub fn decode_category(row: Row) -> Result<Category, DecodeError> {
  decode_row::<ApiCategoria>(CATEGORIES, row)?.into_domain()
}

pub fn category_row(valid: &ValidCategory) -> Row {
  into_object(json!({ "nombre": valid.name }))
}

// ============================================================================
// Services
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiServicio {
  pub id: String,
  pub nombre: String,
  #[serde(default)]
  pub descripcion: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl ApiServicio {
  pub fn into_domain(self) -> Result<Service, DecodeError> {
    Ok(Service {
      id: require_id(SERVICES, self.id)?,
      name: self.nombre,
      description: self.descripcion,
      created_at: self.created_at,
      updated_at: self.updated_at,
    })
  }
}

pub fn decode_service(row: Row) -> Result<Service, DecodeError> {
  decode_row::<ApiServicio>(SERVICES, row)?.into_domain()
}

pub fn service_row(valid: &ValidService) -> Row {
  into_object(json!({
    "nombre": valid.name,
    "descripcion": valid.description,
  }))
}

// ============================================================================
// Packages
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCategoriaRef {
  pub id: String,
  pub nombre: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiPaquete {
  pub id: String,
  pub nombre: String,
  #[serde(default)]
  pub categoria_id: Option<String>,
  pub precio: f64,
  /// `text[]` column; null when never set
  #[serde(default)]
  pub incluye: Option<Vec<String>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  /// Join expansion, absent when the request did not ask for it
  #[serde(default)]
  pub categoria: Option<ApiCategoriaRef>,
}

impl ApiPaquete {
  pub fn into_domain(self) -> Result<Package, DecodeError> {
    if !self.precio.is_finite() || self.precio < 0.0 {
      return Err(DecodeError::new(
        PACKAGES,
        format!("invalid price {}", self.precio),
      ));
    }

    let category = self.categoria.map(|c| CategoryRef {
      id: c.id,
      name: c.nombre,
    });
    if let (Some(expanded), Some(fk)) = (&category, &self.categoria_id) {
      if &expanded.id != fk {
        return Err(DecodeError::new(
          PACKAGES,
          format!("expanded category {} does not match categoria_id {}", expanded.id, fk),
        ));
      }
    }

    Ok(Package {
      id: require_id(PACKAGES, self.id)?,
      name: self.nombre,
      category_id: self.categoria_id,
      price: self.precio,
      items: self.incluye.unwrap_or_default(),
      created_at: self.created_at,
      updated_at: self.updated_at,
      category,
    })
  }
}

pub fn decode_package(row: Row) -> Result<Package, DecodeError> {
  decode_row::<ApiPaquete>(PACKAGES, row)?.into_domain()
}

pub fn package_row(valid: &ValidPackage) -> Row {
  into_object(json!({
    "nombre": valid.name,
    "categoria_id": valid.category_id,
    "precio": valid.price,
    "incluye": valid.items,
  }))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(value: Value) -> Row {
    into_object(value)
  }

  #[test]
  fn test_decode_category() {
    let category = decode_category(row(json!({
      "id": "2b1c1f0e-4a7e-4c8e-9a55-1d7f0c3b9a10",
      "nombre": "Laboratorio",
      "created_at": "2024-05-01T12:00:00.123456+00:00",
      "updated_at": "2024-05-01T12:00:00+00:00",
    })))
    .unwrap();
    assert_eq!(category.name, "Laboratorio");
  }

  #[test]
  fn test_decode_package_with_join() {
    let package = decode_package(row(json!({
      "id": "p1",
      "nombre": "Chequeo Básico",
      "categoria_id": "c1",
      "precio": 850,
      "incluye": ["Hemograma"],
      "created_at": "2024-05-01T12:00:00Z",
      "updated_at": "2024-05-01T12:00:00Z",
      "categoria": {"id": "c1", "nombre": "Laboratorio"},
    })))
    .unwrap();
    assert_eq!(package.price, 850.0);
    assert_eq!(package.category_name(), Some("Laboratorio"));
    assert_eq!(package.items, vec!["Hemograma"]);
  }

  #[test]
  fn test_decode_uncategorized_package() {
    let package = decode_package(row(json!({
      "id": "p1",
      "nombre": "Suelto",
      "categoria_id": null,
      "precio": 0,
      "incluye": null,
      "created_at": "2024-05-01T12:00:00Z",
      "updated_at": "2024-05-01T12:00:00Z",
      "categoria": null,
    })))
    .unwrap();
    assert!(package.category.is_none());
    assert!(package.items.is_empty());
  }

  #[test]
  fn test_decode_rejects_wrong_shape() {
    let err = decode_package(row(json!({
      "id": "p1",
      "nombre": "Chequeo",
      "precio": "caro",
      "created_at": "2024-05-01T12:00:00Z",
      "updated_at": "2024-05-01T12:00:00Z",
    })))
    .unwrap_err();
    assert_eq!(err.resource, PACKAGES);

    assert!(decode_category(row(json!({"id": "c1"}))).is_err());
    assert!(decode_category(row(json!({
      "id": " ",
      "nombre": "x",
      "created_at": "2024-05-01T12:00:00Z",
      "updated_at": "2024-05-01T12:00:00Z",
    })))
    .is_err());
  }

  #[test]
  fn test_decode_rejects_mismatched_join() {
    let err = decode_package(row(json!({
      "id": "p1",
      "nombre": "Chequeo",
      "categoria_id": "c1",
      "precio": 1,
      "created_at": "2024-05-01T12:00:00Z",
      "updated_at": "2024-05-01T12:00:00Z",
      "categoria": {"id": "c2", "nombre": "Otra"},
    })))
    .unwrap_err();
    assert!(err.reason.contains("does not match"));
  }

  #[test]
  fn test_service_row_sends_null_description() {
    let encoded = service_row(&ValidService {
      name: "Hemograma".into(),
      description: None,
    });
    assert_eq!(encoded["descripcion"], Value::Null);
  }
}
