//! Remote collaborators the sync layer talks to.
//!
//! The traits here are the seams between the sync core and whatever actually
//! persists records:
//! - [`RemoteCollection`] lists, inserts, updates and deletes records of one kind
//! - [`ObjectStore`] accepts uploaded blobs and hands back public references
//! - [`FunctionInvoker`] calls named serverless functions
//! - [`PrincipalSource`] reports who the current session belongs to
//!
//! [`RestBackend`] implements all of them against the hosted backend;
//! [`SqliteBackend`] and [`LocalObjectStore`] cover local mode and tests.

mod files;
mod rest;
mod sqlite;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::sync::{Entity, EntityId, ListQuery, Principal};

pub use files::LocalObjectStore;
pub use rest::RestBackend;
pub use sqlite::SqliteBackend;

/// Failure of a call to a remote collaborator.
///
/// The sync layer treats every variant the same way; the distinction only
/// matters for logs.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("server responded {status}: {body}")]
  Status { status: u16, body: String },

  #[error("failed to encode or decode record: {0}")]
  Codec(#[from] serde_json::Error),

  #[error("local database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("invalid url: {0}")]
  Url(#[from] url::ParseError),

  #[error("no {table} record with id {id}")]
  NotFound { table: &'static str, id: String },

  #[error("server returned no record")]
  EmptyResponse,

  #[error("{0}")]
  Unsupported(&'static str),
}

/// Per-kind access to the authoritative store.
#[async_trait]
pub trait RemoteCollection<E: Entity>: Send + Sync {
  /// Full ordered list matching the query.
  async fn list(&self, query: &ListQuery) -> Result<Vec<E>, RemoteError>;

  /// Insert a record and return the persisted row with id and timestamps.
  async fn insert(&self, record: Value) -> Result<E, RemoteError>;

  /// Apply the changed fields to the row with `id` and return the persisted row.
  async fn update(&self, id: &EntityId, patch: Value) -> Result<E, RemoteError>;

  /// Remove the row with `id`. Removing a missing row is not an error.
  async fn delete(&self, id: &EntityId) -> Result<(), RemoteError>;
}

/// Blob storage used for avatars.
#[async_trait]
pub trait ObjectStore: Send + Sync {
  /// Store `bytes` at `path` inside `bucket`, replacing any existing object.
  async fn upload(
    &self,
    bucket: &str,
    path: &str,
    bytes: Vec<u8>,
    content_type: &str,
  ) -> Result<(), RemoteError>;

  /// Publicly resolvable reference to an object.
  fn public_url(&self, bucket: &str, path: &str) -> Result<Url, RemoteError>;
}

/// Serverless function calls. The function bodies are opaque to this crate.
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
  async fn invoke(&self, name: &str, body: Value) -> Result<Value, RemoteError>;
}

/// Source of the current principal. `None` means nobody is signed in.
#[async_trait]
pub trait PrincipalSource: Send + Sync {
  async fn current_principal(&self) -> Result<Option<Principal>, RemoteError>;
}

/// Principal fixed at construction, used in local mode.
pub struct StaticPrincipal(pub Option<Principal>);

#[async_trait]
impl PrincipalSource for StaticPrincipal {
  async fn current_principal(&self) -> Result<Option<Principal>, RemoteError> {
    Ok(self.0.clone())
  }
}

/// Function invoker for setups without serverless functions.
pub struct NoFunctions;

#[async_trait]
impl FunctionInvoker for NoFunctions {
  async fn invoke(&self, _name: &str, _body: Value) -> Result<Value, RemoteError> {
    Err(RemoteError::Unsupported(
      "serverless functions are not available in local mode",
    ))
  }
}
