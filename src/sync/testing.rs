//! Remote doubles shared by the sync and dashboard tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use super::{Entity, EntityId, ListQuery};
use crate::backend::{RemoteCollection, RemoteError, SqliteBackend};

/// Fresh in-memory database playing the remote service.
pub fn local_remote<E: Entity>() -> Arc<dyn RemoteCollection<E>> {
  Arc::new(SqliteBackend::in_memory().expect("in-memory sqlite"))
}

fn refused() -> RemoteError {
  RemoteError::Status {
    status: 503,
    body: "service unavailable".to_string(),
  }
}

/// Delegates to an inner remote, or fails every call while switched on.
/// Counts the calls that reached it either way.
pub struct FlakyRemote<E: Entity> {
  inner: Arc<dyn RemoteCollection<E>>,
  failing: AtomicBool,
  calls: AtomicUsize,
}

impl<E: Entity> FlakyRemote<E> {
  pub fn new(inner: Arc<dyn RemoteCollection<E>>) -> Self {
    Self {
      inner,
      failing: AtomicBool::new(false),
      calls: AtomicUsize::new(0),
    }
  }

  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  fn enter(&self) -> Result<(), RemoteError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.failing.load(Ordering::SeqCst) {
      return Err(refused());
    }
    Ok(())
  }
}

#[async_trait]
impl<E: Entity> RemoteCollection<E> for FlakyRemote<E> {
  async fn list(&self, query: &ListQuery) -> Result<Vec<E>, RemoteError> {
    self.enter()?;
    self.inner.list(query).await
  }

  async fn insert(&self, record: Value) -> Result<E, RemoteError> {
    self.enter()?;
    self.inner.insert(record).await
  }

  async fn update(&self, id: &EntityId, patch: Value) -> Result<E, RemoteError> {
    self.enter()?;
    self.inner.update(id, patch).await
  }

  async fn delete(&self, id: &EntityId) -> Result<(), RemoteError> {
    self.enter()?;
    self.inner.delete(id).await
  }
}

/// Drops every list filter, like a service with row security switched off.
pub struct UnscopedRemote<E: Entity> {
  inner: Arc<dyn RemoteCollection<E>>,
}

impl<E: Entity> UnscopedRemote<E> {
  pub fn new(inner: Arc<dyn RemoteCollection<E>>) -> Self {
    Self { inner }
  }
}

#[async_trait]
impl<E: Entity> RemoteCollection<E> for UnscopedRemote<E> {
  async fn list(&self, query: &ListQuery) -> Result<Vec<E>, RemoteError> {
    let everything = ListQuery {
      filters: Vec::new(),
      order: query.order.clone(),
    };
    self.inner.list(&everything).await
  }

  async fn insert(&self, record: Value) -> Result<E, RemoteError> {
    self.inner.insert(record).await
  }

  async fn update(&self, id: &EntityId, patch: Value) -> Result<E, RemoteError> {
    self.inner.update(id, patch).await
  }

  async fn delete(&self, id: &EntityId) -> Result<(), RemoteError> {
    self.inner.delete(id).await
  }
}

/// Holds every call until the gate is open. Starts closed.
pub struct GatedRemote<E: Entity> {
  inner: Arc<dyn RemoteCollection<E>>,
  gate: watch::Sender<bool>,
  lists: AtomicUsize,
}

impl<E: Entity> GatedRemote<E> {
  pub fn new(inner: Arc<dyn RemoteCollection<E>>) -> Self {
    Self {
      inner,
      gate: watch::Sender::new(false),
      lists: AtomicUsize::new(0),
    }
  }

  pub fn release(&self) {
    self.gate.send_replace(true);
  }

  pub fn hold(&self) {
    self.gate.send_replace(false);
  }

  /// Number of list calls issued so far, including ones still held.
  pub fn list_calls(&self) -> usize {
    self.lists.load(Ordering::SeqCst)
  }

  async fn pass(&self) {
    let mut open = self.gate.subscribe();
    // The sender lives as long as self, so this only ends when the gate opens
    let _ = open.wait_for(|open| *open).await;
  }
}

#[async_trait]
impl<E: Entity> RemoteCollection<E> for GatedRemote<E> {
  async fn list(&self, query: &ListQuery) -> Result<Vec<E>, RemoteError> {
    self.lists.fetch_add(1, Ordering::SeqCst);
    self.pass().await;
    self.inner.list(query).await
  }

  async fn insert(&self, record: Value) -> Result<E, RemoteError> {
    self.pass().await;
    self.inner.insert(record).await
  }

  async fn update(&self, id: &EntityId, patch: Value) -> Result<E, RemoteError> {
    self.pass().await;
    self.inner.update(id, patch).await
  }

  async fn delete(&self, id: &EntityId) -> Result<(), RemoteError> {
    self.pass().await;
    self.inner.delete(id).await
  }
}
