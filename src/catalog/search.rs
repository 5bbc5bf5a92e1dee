//! Client-side filtering and display helpers over cached listings.

use serde::Serialize;

use super::types::{Category, Package, Service};

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
  haystack.to_lowercase().contains(needle_lower)
}

/// Packages whose name or category name contains `term`, ignoring case.
///
/// An empty term matches everything.
pub fn filter_packages<'a>(packages: &'a [Package], term: &str) -> Vec<&'a Package> {
  let term = term.trim().to_lowercase();
  packages
    .iter()
    .filter(|p| {
      contains_ci(&p.name, &term) || p.category_name().is_some_and(|c| contains_ci(c, &term))
    })
    .collect()
}

/// Services whose name or description contains `term`, ignoring case.
pub fn filter_services<'a>(services: &'a [Service], term: &str) -> Vec<&'a Service> {
  let term = term.trim().to_lowercase();
  services
    .iter()
    .filter(|s| {
      contains_ci(&s.name, &term)
        || s.description.as_deref().is_some_and(|d| contains_ci(d, &term))
    })
    .collect()
}

pub fn filter_by_name<'a>(categories: &'a [Category], term: &str) -> Vec<&'a Category> {
  let term = term.trim().to_lowercase();
  categories
    .iter()
    .filter(|c| contains_ci(&c.name, &term))
    .collect()
}

/// Format an MXN amount the way es-MX renders currency, e.g. `$1,234.50`.
pub fn format_price(price: f64) -> String {
  let fixed = format!("{:.2}", price.abs());
  let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

  let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
  for (i, digit) in whole.chars().enumerate() {
    if i > 0 && (whole.len() - i) % 3 == 0 {
      grouped.push(',');
    }
    grouped.push(digit);
  }

  let sign = if price < 0.0 && fixed != "0.00" { "-" } else { "" };
  format!("{}${}.{}", sign, grouped, cents)
}

/// Counts shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
  pub categories: usize,
  pub services: usize,
  pub packages: usize,
  pub uncategorized_packages: usize,
}

impl CatalogSummary {
  pub fn from_listings(categories: &[Category], services: &[Service], packages: &[Package]) -> Self {
    Self {
      categories: categories.len(),
      services: services.len(),
      packages: packages.len(),
      uncategorized_packages: packages.iter().filter(|p| p.category_id.is_none()).count(),
    }
  }
}
