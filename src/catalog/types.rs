use chrono::{DateTime, Utc};
use serde::Serialize;

/// Package category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
  pub id: String,
  pub name: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Laboratory service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
  pub id: String,
  pub name: String,
  pub description: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Category as expanded into a package row at read time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRef {
  pub id: String,
  pub name: String,
}

/// Bundle of included items sold at a fixed price
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Package {
  pub id: String,
  pub name: String,
  pub category_id: Option<String>,
  /// Price in MXN
  pub price: f64,
  /// Included item labels, in display order
  pub items: Vec<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  /// Joined category, present when `category_id` is set and resolvable
  pub category: Option<CategoryRef>,
}

impl Package {
  pub fn category_name(&self) -> Option<&str> {
    self.category.as_ref().map(|c| c.name.as_str())
  }
}

// ============================================================================
// Form inputs (unvalidated)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryInput {
  pub name: String,
}

impl CategoryInput {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceInput {
  pub name: String,
  pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageInput {
  pub name: String,
  pub category_id: Option<String>,
  pub price: f64,
  pub items: Vec<String>,
}
