//! Embedded backend that stores records as JSON documents in SQLite.
//!
//! It behaves like the hosted table API for our purposes: ids and timestamps
//! are assigned here, list queries honor equality filters and ordering, and
//! updates merge the changed fields into the stored row.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::{RemoteCollection, RemoteError};
use crate::sync::{Entity, EntityId, ListQuery};

/// SQLite-based stand-in for the remote collection service.
pub struct SqliteBackend {
  conn: Mutex<Connection>,
}

/// Schema for record storage.
const RECORD_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection);
"#;

impl SqliteBackend {
  /// Open or create a database file.
  pub fn open(path: &Path) -> Result<Self, RemoteError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    Self::with_connection(conn)
  }

  /// Private in-memory database.
  pub fn in_memory() -> Result<Self, RemoteError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, RemoteError> {
    conn.execute_batch(RECORD_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn conn(&self) -> MutexGuard<'_, Connection> {
    // A poisoned lock only means another caller panicked mid-statement;
    // SQLite itself keeps the file consistent.
    self.conn.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn fetch_row(
    conn: &Connection,
    collection: &str,
    id: &str,
  ) -> Result<Option<Map<String, Value>>, RemoteError> {
    let data: Option<String> = conn
      .query_row(
        "SELECT data FROM records WHERE collection = ? AND id = ?",
        params![collection, id],
        |row| row.get(0),
      )
      .optional()?;

    match data {
      Some(text) => match serde_json::from_str(&text)? {
        Value::Object(map) => Ok(Some(map)),
        _ => Ok(None),
      },
      None => Ok(None),
    }
  }
}

/// Timestamps in a fixed-width RFC 3339 form so they order lexically.
fn now_timestamp() -> String {
  Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn json_path(column: &str) -> String {
  format!("$.{}", column)
}

fn into_object(value: Value) -> Result<Map<String, Value>, RemoteError> {
  match value {
    Value::Object(map) => Ok(map),
    other => Err(RemoteError::Codec(serde::de::Error::custom(format!(
      "expected a JSON object, got {}",
      other
    )))),
  }
}

#[async_trait]
impl<E: Entity> RemoteCollection<E> for SqliteBackend {
  async fn list(&self, query: &ListQuery) -> Result<Vec<E>, RemoteError> {
    let collection = E::kind().table();
    let conn = self.conn();

    let mut sql = String::from("SELECT data FROM records WHERE collection = ?");
    let mut args: Vec<String> = vec![collection.to_string()];

    for filter in &query.filters {
      sql.push_str(" AND json_extract(data, ?) = ?");
      args.push(json_path(&filter.column));
      args.push(filter.value.clone());
    }

    // Timestamps arrive with anywhere from 0 to 9 fraction digits, so compare
    // them as instants first. julianday() is NULL for anything that is not a
    // date, which leaves plain text to the second key. rowid breaks ties
    // between rows written within the same microsecond.
    let direction = if query.order.ascending { "ASC" } else { "DESC" };
    sql.push_str(&format!(
      " ORDER BY julianday(json_extract(data, ?)) {dir} NULLS LAST, \
       json_extract(data, ?) {dir} NULLS LAST, rowid {dir}",
      dir = direction
    ));
    let order_path = json_path(query.order.column);
    args.push(order_path.clone());
    args.push(order_path);

    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<String> = stmt
      .query_map(rusqlite::params_from_iter(args.iter()), |row| row.get(0))?
      .collect::<Result<_, _>>()?;

    let records = rows
      .iter()
      .map(|text| serde_json::from_str::<E>(text))
      .collect::<Result<Vec<_>, _>>()?;

    debug!(collection, count = records.len(), "listed local records");
    Ok(records)
  }

  async fn insert(&self, record: Value) -> Result<E, RemoteError> {
    let collection = E::kind().table();
    let mut row = into_object(record)?;

    let id = Uuid::new_v4().to_string();
    let now = now_timestamp();
    row.insert("id".to_string(), Value::String(id.clone()));
    row.insert("created_at".to_string(), Value::String(now.clone()));
    row.insert("updated_at".to_string(), Value::String(now));

    let row = Value::Object(row);
    // Validate before persisting so a malformed draft leaves no row behind
    let entity: E = serde_json::from_value(row.clone())?;

    self.conn().execute(
      "INSERT INTO records (collection, id, data) VALUES (?, ?, ?)",
      params![collection, id, row.to_string()],
    )?;

    Ok(entity)
  }

  async fn update(&self, id: &EntityId, patch: Value) -> Result<E, RemoteError> {
    let collection = E::kind().table();
    let patch = into_object(patch)?;
    let conn = self.conn();

    let mut row =
      Self::fetch_row(&conn, collection, id.as_str())?.ok_or_else(|| RemoteError::NotFound {
        table: collection,
        id: id.to_string(),
      })?;

    for (key, value) in patch {
      if matches!(key.as_str(), "id" | "created_at") {
        continue;
      }
      row.insert(key, value);
    }
    row.insert("updated_at".to_string(), Value::String(now_timestamp()));

    let row = Value::Object(row);
    let entity: E = serde_json::from_value(row.clone())?;

    conn.execute(
      "UPDATE records SET data = ? WHERE collection = ? AND id = ?",
      params![row.to_string(), collection, id.as_str()],
    )?;

    Ok(entity)
  }

  async fn delete(&self, id: &EntityId) -> Result<(), RemoteError> {
    self.conn().execute(
      "DELETE FROM records WHERE collection = ? AND id = ?",
      params![E::kind().table(), id.as_str()],
    )?;
    Ok(())
  }
}
