//! In-process table store.
//!
//! Behaves like the remote store for the purposes of the catalog: it assigns
//! ids and timestamps, enforces unique and foreign-key constraints,
//! expands joins and orders results. Tests also use it to count calls and to
//! inject failures.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use super::{no_rows, Projection, RemoteClient, Row, SelectQuery};
use crate::error::RemoteError;

/// Number of calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
  pub select: usize,
  pub insert: usize,
  pub update: usize,
  pub delete: usize,
}

impl CallCounts {
  pub fn total(&self) -> usize {
    self.select + self.insert + self.update + self.delete
  }
}

#[derive(Debug, Clone)]
struct ForeignKey {
  table: String,
  column: String,
  references: String,
}

#[derive(Default)]
struct MemoryState {
  tables: HashMap<String, Vec<Row>>,
  unique: Vec<(String, String)>,
  foreign_keys: Vec<ForeignKey>,
  calls: CallCounts,
  failures: VecDeque<RemoteError>,
  latency: Option<Duration>,
  write_latency: Option<Duration>,
}

/// Shared, cloneable in-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
  state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Store preloaded with the catalog's tables and constraints.
  pub fn catalog() -> Self {
    Self::new()
      .with_unique("categorias", "nombre")
      .with_foreign_key("paquetes", "categoria_id", "categorias")
  }

  pub fn with_unique(self, table: &str, column: &str) -> Self {
    self
      .lock()
      .unique
      .push((table.to_string(), column.to_string()));
    self
  }

  pub fn with_foreign_key(self, table: &str, column: &str, references: &str) -> Self {
    self.lock().foreign_keys.push(ForeignKey {
      table: table.to_string(),
      column: column.to_string(),
      references: references.to_string(),
    });
    self
  }

  /// Delay every `select` by `latency` after reading the table.
  pub fn with_latency(self, latency: Duration) -> Self {
    self.lock().latency = Some(latency);
    self
  }

  /// Delay every insert, update and delete by `latency` before it runs.
  pub fn with_write_latency(self, latency: Duration) -> Self {
    self.lock().write_latency = Some(latency);
    self
  }

  async fn write_delay(&self) {
    let latency = self.lock().write_latency;
    if let Some(latency) = latency {
      tokio::time::sleep(latency).await;
    }
  }

  /// Make the next call (of any kind) fail with `error`.
  pub fn fail_next(&self, error: RemoteError) {
    self.lock().failures.push_back(error);
  }

  pub fn calls(&self) -> CallCounts {
    self.lock().calls
  }

  /// Current rows of `table`, in insertion order.
  pub fn rows(&self, table: &str) -> Vec<Row> {
    self.lock().tables.get(table).cloned().unwrap_or_default()
  }

  fn lock(&self) -> MutexGuard<'_, MemoryState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl MemoryState {
  fn take_failure(&mut self) -> Result<(), RemoteError> {
    match self.failures.pop_front() {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }

  fn check_unique(&self, table: &str, row: &Row, skip_id: Option<&str>) -> Result<(), RemoteError> {
    let existing = self.tables.get(table).map(Vec::as_slice).unwrap_or_default();
    for (_, column) in self.unique.iter().filter(|(t, _)| t == table) {
      let Some(value) = row.get(column).filter(|v| !v.is_null()) else {
        continue;
      };
      let clash = existing
        .iter()
        .filter(|other| skip_id.map_or(true, |id| other.get("id").and_then(Value::as_str) != Some(id)))
        .any(|other| other.get(column) == Some(value));
      if clash {
        return Err(RemoteError::from_store(
          format!(
            "duplicate key value violates unique constraint \"{}_{}_key\"",
            table, column
          ),
          Some("23505".to_string()),
          Some(409),
        ));
      }
    }
    Ok(())
  }

  fn check_foreign_keys(&self, table: &str, row: &Row) -> Result<(), RemoteError> {
    for fk in self.foreign_keys.iter().filter(|fk| fk.table == table) {
      let Some(target) = row.get(&fk.column).and_then(Value::as_str) else {
        continue;
      };
      if self.find(&fk.references, target).is_none() {
        return Err(RemoteError::from_store(
          format!(
            "insert or update on table \"{}\" violates foreign key constraint \"{}_{}_fkey\"",
            table, table, fk.column
          ),
          Some("23503".to_string()),
          Some(409),
        ));
      }
    }
    Ok(())
  }

  fn find(&self, table: &str, id: &str) -> Option<&Row> {
    self
      .tables
      .get(table)?
      .iter()
      .find(|row| row.get("id").and_then(Value::as_str) == Some(id))
  }

  /// Apply column projection and join expansion to a stored row.
  fn project(&self, row: &Row, projection: &Projection) -> Row {
    let mut out = if projection.columns.is_empty() {
      row.clone()
    } else {
      projection
        .columns
        .iter()
        .filter_map(|c| row.get(*c).map(|v| (c.to_string(), v.clone())))
        .collect()
    };

    for join in projection.joins {
      let related = row
        .get(join.foreign_key)
        .and_then(Value::as_str)
        .and_then(|id| self.find(join.resource, id))
        .map(|related| {
          let picked: Row = join
            .columns
            .iter()
            .filter_map(|c| related.get(*c).map(|v| (c.to_string(), v.clone())))
            .collect();
          Value::Object(picked)
        })
        .unwrap_or(Value::Null);
      out.insert(join.alias.to_string(), related);
    }

    out
  }
}

/// Order JSON scalars the way the store orders its column types.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
  match (a, b) {
    (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
    (Some(Value::Number(a)), Some(Value::Number(b))) => a
      .as_f64()
      .partial_cmp(&b.as_f64())
      .unwrap_or(Ordering::Equal),
    (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
    (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
    (None | Some(Value::Null), _) => Ordering::Greater,
    (_, None | Some(Value::Null)) => Ordering::Less,
    _ => Ordering::Equal,
  }
}

fn timestamp() -> Value {
  Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false))
}

#[async_trait]
impl RemoteClient for MemoryStore {
  async fn select(&self, resource: &str, query: &SelectQuery) -> Result<Vec<Row>, RemoteError> {
    let (rows, latency) = {
      let mut state = self.lock();
      state.calls.select += 1;
      state.take_failure()?;

      let mut rows: Vec<Row> = state.tables.get(resource).cloned().unwrap_or_default();
      // Stable sort keeps insertion order among equal keys.
      rows.sort_by(|a, b| {
        let ordering = compare_values(a.get(query.order_by), b.get(query.order_by));
        if query.ascending {
          ordering
        } else {
          ordering.reverse()
        }
      });
      let rows: Vec<Row> = rows
        .iter()
        .map(|row| state.project(row, &query.projection))
        .collect();
      (rows, state.latency)
    };

    if let Some(latency) = latency {
      tokio::time::sleep(latency).await;
    }
    Ok(rows)
  }

  async fn insert(
    &self,
    resource: &str,
    mut row: Row,
    returning: &Projection,
  ) -> Result<Row, RemoteError> {
    self.write_delay().await;
    let mut state = self.lock();
    state.calls.insert += 1;
    state.take_failure()?;

    state.check_unique(resource, &row, None)?;
    state.check_foreign_keys(resource, &row)?;

    let now = timestamp();
    row.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
    row.insert("created_at".into(), now.clone());
    row.insert("updated_at".into(), now);

    let projected = state.project(&row, returning);
    state.tables.entry(resource.to_string()).or_default().push(row);
    Ok(projected)
  }

  async fn update(
    &self,
    resource: &str,
    id: &str,
    row: Row,
    returning: &Projection,
  ) -> Result<Row, RemoteError> {
    self.write_delay().await;
    let mut state = self.lock();
    state.calls.update += 1;
    state.take_failure()?;

    if state.find(resource, id).is_none() {
      return Err(no_rows(resource, id));
    }
    state.check_unique(resource, &row, Some(id))?;
    state.check_foreign_keys(resource, &row)?;

    let updated = {
      let stored = state
        .tables
        .get_mut(resource)
        .and_then(|rows| {
          rows
            .iter_mut()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
        })
        .ok_or_else(|| no_rows(resource, id))?;
      for (column, value) in row {
        if column != "id" && column != "created_at" {
          stored.insert(column, value);
        }
      }
      stored.insert("updated_at".into(), timestamp());
      stored.clone()
    };

    Ok(state.project(&updated, returning))
  }

  async fn delete(&self, resource: &str, id: &str) -> Result<(), RemoteError> {
    self.write_delay().await;
    let mut state = self.lock();
    state.calls.delete += 1;
    state.take_failure()?;

    let rows = state
      .tables
      .get_mut(resource)
      .ok_or_else(|| no_rows(resource, id))?;
    let before = rows.len();
    rows.retain(|r| r.get("id").and_then(Value::as_str) != Some(id));
    if rows.len() == before {
      return Err(no_rows(resource, id));
    }

    // ON DELETE SET NULL for rows referencing the deleted one
    let referencing: Vec<ForeignKey> = state
      .foreign_keys
      .iter()
      .filter(|fk| fk.references == resource)
      .cloned()
      .collect();
    for fk in referencing {
      if let Some(rows) = state.tables.get_mut(&fk.table) {
        for r in rows
          .iter_mut()
          .filter(|r| r.get(&fk.column).and_then(Value::as_str) == Some(id))
        {
          r.insert(fk.column.clone(), Value::Null);
        }
      }
    }
    Ok(())
  }
}
