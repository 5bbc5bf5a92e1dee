//! Field rules applied to form input before anything is sent to the store.
//!
//! Every function here is pure: no I/O, no clock, no allocation beyond the
//! trimmed copies it returns.

use uuid::Uuid;

use super::types::{CategoryInput, PackageInput, ServiceInput};
use crate::error::ValidationError;

pub const MAX_NAME_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 1000;
pub const MAX_PRICE: f64 = 999_999.0;
pub const MAX_ITEMS: usize = 50;
pub const MAX_ITEM_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCategory {
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidService {
  pub name: String,
  /// `None` when the trimmed description is empty
  pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidPackage {
  pub name: String,
  /// Hyphenated lowercase UUID
  pub category_id: Option<String>,
  pub price: f64,
  pub items: Vec<String>,
}

pub fn validate_category(input: &CategoryInput) -> Result<ValidCategory, ValidationError> {
  Ok(ValidCategory {
    name: validate_name("nombre", &input.name)?,
  })
}

pub fn validate_service(input: &ServiceInput) -> Result<ValidService, ValidationError> {
  let name = validate_name("nombre", &input.name)?;
  let description = validate_max_chars("descripcion", &input.description, MAX_DESCRIPTION_CHARS)?;

  Ok(ValidService {
    name,
    description: (!description.is_empty()).then_some(description),
  })
}

pub fn validate_package(input: &PackageInput) -> Result<ValidPackage, ValidationError> {
  let name = validate_name("nombre", &input.name)?;
  let category_id = input
    .category_id
    .as_deref()
    .map(|id| validate_identity("categoria_id", id))
    .transpose()?;
  let price = validate_price("precio", input.price)?;
  let items = validate_items("incluye", &input.items)?;

  Ok(ValidPackage {
    name,
    category_id,
    price,
    items,
  })
}

/// Trim and require between 1 and `MAX_NAME_CHARS` characters.
pub fn validate_name(field: &'static str, value: &str) -> Result<String, ValidationError> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(ValidationError::new(field, "value cannot be empty"));
  }
  validate_max_chars(field, trimmed, MAX_NAME_CHARS)
}

/// Trim and bound by character count (not bytes).
pub fn validate_max_chars(
  field: &'static str,
  value: &str,
  max: usize,
) -> Result<String, ValidationError> {
  let trimmed = value.trim();
  let count = trimmed.chars().count();
  if count > max {
    return Err(ValidationError::new(
      field,
      format!("must be at most {} characters, got {}", max, count),
    ));
  }
  Ok(trimmed.to_string())
}

/// Accept any UUID spelling and normalize it to the hyphenated lowercase form.
pub fn validate_identity(field: &'static str, value: &str) -> Result<String, ValidationError> {
  Uuid::parse_str(value.trim())
    .map(|id| id.hyphenated().to_string())
    .map_err(|e| ValidationError::new(field, format!("not a valid identifier: {}", e)))
}

pub fn validate_price(field: &'static str, value: f64) -> Result<f64, ValidationError> {
  if !value.is_finite() || !(0.0..=MAX_PRICE).contains(&value) {
    return Err(ValidationError::new(
      field,
      format!("must be between 0 and {}", MAX_PRICE),
    ));
  }
  Ok(value)
}

pub fn validate_items(field: &'static str, items: &[String]) -> Result<Vec<String>, ValidationError> {
  if items.len() > MAX_ITEMS {
    return Err(ValidationError::new(
      field,
      format!("at most {} items allowed, got {}", MAX_ITEMS, items.len()),
    ));
  }

  items
    .iter()
    .enumerate()
    .map(|(index, item)| {
      let trimmed = item.trim();
      if trimmed.is_empty() {
        return Err(ValidationError::new(
          field,
          format!("item {} cannot be empty", index + 1),
        ));
      }
      let count = trimmed.chars().count();
      if count > MAX_ITEM_CHARS {
        return Err(ValidationError::new(
          field,
          format!(
            "item {} must be at most {} characters, got {}",
            index + 1,
            MAX_ITEM_CHARS,
            count
          ),
        ));
      }
      Ok(trimmed.to_string())
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn package(price: f64, items: Vec<String>) -> PackageInput {
    PackageInput {
      name: "Chequeo Básico".into(),
      category_id: None,
      price,
      items,
    }
  }

  #[test]
  fn test_category_name_is_trimmed() {
    let valid = validate_category(&CategoryInput::new("  Laboratorio  ")).unwrap();
    assert_eq!(valid.name, "Laboratorio");
  }

  #[test]
  fn test_category_name_bounds() {
    assert!(validate_category(&CategoryInput::new("a")).is_ok());
    assert!(validate_category(&CategoryInput::new("a".repeat(200))).is_ok());
    assert!(validate_category(&CategoryInput::new("a".repeat(201))).is_err());
    assert!(validate_category(&CategoryInput::new("   ")).is_err());
    assert!(validate_category(&CategoryInput::new("")).is_err());
  }

  #[test]
  fn test_name_counts_characters_not_bytes() {
    // 200 two-byte characters
    let name = "é".repeat(200);
    assert!(validate_category(&CategoryInput::new(name)).is_ok());
  }

  #[test]
  fn test_name_padding_does_not_count() {
    let name = format!("   {}   ", "x".repeat(200));
    assert_eq!(validate_category(&CategoryInput::new(name)).unwrap().name.len(), 200);
  }

  #[test]
  fn test_service_description() {
    let valid = validate_service(&ServiceInput {
      name: "Hemograma".into(),
      description: "   ".into(),
    })
    .unwrap();
    assert_eq!(valid.description, None);

    let valid = validate_service(&ServiceInput {
      name: "Hemograma".into(),
      description: " Biometría hemática completa ".into(),
    })
    .unwrap();
    assert_eq!(valid.description.as_deref(), Some("Biometría hemática completa"));

    let err = validate_service(&ServiceInput {
      name: "Hemograma".into(),
      description: "x".repeat(1001),
    })
    .unwrap_err();
    assert_eq!(err.field, "descripcion");
    assert!(validate_service(&ServiceInput {
      name: "Hemograma".into(),
      description: "x".repeat(1000),
    })
    .is_ok());
  }

  #[test]
  fn test_price_bounds() {
    assert!(validate_package(&package(0.0, vec![])).is_ok());
    assert!(validate_package(&package(999_999.0, vec![])).is_ok());
    assert!(validate_package(&package(850.0, vec![])).is_ok());
    assert!(validate_package(&package(-0.01, vec![])).is_err());
    assert!(validate_package(&package(1_000_000.0, vec![])).is_err());
    assert!(validate_package(&package(f64::NAN, vec![])).is_err());
    assert!(validate_package(&package(f64::INFINITY, vec![])).is_err());
  }

  #[test]
  fn test_item_count_bounds() {
    let fifty: Vec<String> = (0..50).map(|i| format!("Estudio {}", i)).collect();
    assert_eq!(validate_package(&package(1.0, fifty)).unwrap().items.len(), 50);

    let fifty_one: Vec<String> = (0..51).map(|i| format!("Estudio {}", i)).collect();
    let err = validate_package(&package(1.0, fifty_one)).unwrap_err();
    assert_eq!(err.field, "incluye");
  }

  #[test]
  fn test_item_length_bounds() {
    assert!(validate_package(&package(1.0, vec!["x".repeat(200)])).is_ok());
    assert!(validate_package(&package(1.0, vec!["x".repeat(201)])).is_err());
    assert!(validate_package(&package(1.0, vec!["  ".into()])).is_err());
  }

  #[test]
  fn test_items_are_trimmed_in_order() {
    let valid = validate_package(&package(1.0, vec![" Hemograma ".into(), "Glucosa".into()])).unwrap();
    assert_eq!(valid.items, vec!["Hemograma", "Glucosa"]);
  }

  #[test]
  fn test_category_reference() {
    let mut input = package(1.0, vec![]);
    input.category_id = Some("not-a-uuid".into());
    let err = validate_package(&input).unwrap_err();
    assert_eq!(err.field, "categoria_id");

    input.category_id = Some("6F9619FF-8B86-D011-B42D-00C04FC964FF".into());
    let valid = validate_package(&input).unwrap();
    assert_eq!(
      valid.category_id.as_deref(),
      Some("6f9619ff-8b86-d011-b42d-00c04fc964ff")
    );

    input.category_id = None;
    assert_eq!(validate_package(&input).unwrap().category_id, None);
  }
}
