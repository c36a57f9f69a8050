//! Sync controller: one in-memory cache per entity kind, reconciled with the
//! remote collection only after the remote side confirms a change.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::error::{Operation, SyncError};
use super::session::SessionListener;
use super::traits::{Entity, EntityId, EntityKind, Filter, ListQuery, PrincipalId, OWNER_COLUMN};
use crate::backend::{RemoteCollection, RemoteError};

struct CacheState<E> {
  records: Vec<E>,
  loading: bool,
  principal: Option<PrincipalId>,
  /// Extra equality constraints, e.g. the selected conversation.
  scope: Vec<Filter>,
  /// Bumped whenever the cache is discarded; responses from an older
  /// generation are not applied.
  generation: u64,
}

impl<E> CacheState<E> {
  fn reset(&mut self) {
    self.records.clear();
    self.loading = true;
    self.generation += 1;
  }
}

/// Cache plus remote operations for one entity kind.
///
/// Cloning yields another handle to the same cache. Every mutation waits for
/// the remote service to confirm before touching the cache, and a failed
/// operation leaves the cache exactly as it was.
pub struct SyncController<E: Entity> {
  remote: Arc<dyn RemoteCollection<E>>,
  state: Arc<Mutex<CacheState<E>>>,
}

impl<E: Entity> Clone for SyncController<E> {
  fn clone(&self) -> Self {
    Self {
      remote: Arc::clone(&self.remote),
      state: Arc::clone(&self.state),
    }
  }
}

impl<E: Entity> SyncController<E> {
  /// Empty cache, reporting as loading until the session resolves.
  pub fn new(remote: Arc<dyn RemoteCollection<E>>) -> Self {
    Self {
      remote,
      state: Arc::new(Mutex::new(CacheState {
        records: Vec::new(),
        loading: true,
        principal: None,
        scope: Vec::new(),
        generation: 0,
      })),
    }
  }

  fn state(&self) -> MutexGuard<'_, CacheState<E>> {
    // Nothing panics while holding the lock, but never let poisoning turn a
    // read into a failure
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Discard the cache and take ownership for `principal`. Does not load.
  pub fn attach(&self, principal: PrincipalId) {
    let mut state = self.state();
    state.reset();
    state.principal = Some(principal);
  }

  /// Discard the cache and forget the principal.
  pub fn detach(&self) {
    let mut state = self.state();
    state.reset();
    state.principal = None;
    debug!(kind = %E::kind(), "cache cleared");
  }

  /// Nothing to load: leave the cache empty and stop reporting as loading.
  pub fn settle(&self) {
    let mut state = self.state();
    if state.principal.is_none() {
      state.records.clear();
    }
    state.loading = false;
  }

  /// Replace the scope constraints, discarding the cache. Does not load.
  pub fn rescope(&self, scope: Vec<Filter>) {
    let mut state = self.state();
    state.reset();
    state.scope = scope;
  }

  /// Fetch the full collection for the bound principal and replace the cache.
  ///
  /// On failure the previous contents stay in place. Either way the loading
  /// flag clears. Returns how many records were cached; rows owned by anyone
  /// else are dropped even if the service sent them.
  pub async fn load(&self) -> Result<usize, SyncError> {
    let (scoped, generation) = {
      let state = self.state();
      let scoped = state.principal.clone().map(|principal| {
        let query = ListQuery::owned_by::<E>(&principal, &state.scope);
        (principal, query)
      });
      (scoped, state.generation)
    };
    let Some((principal, query)) = scoped else {
      self.settle();
      return Ok(0);
    };

    let result = self.remote.list(&query).await;

    let mut state = self.state();
    if state.generation != generation {
      debug!(kind = %E::kind(), "dropping load for a discarded cache");
      return result
        .map(|records| records.len())
        .map_err(|source| SyncError::Load {
          kind: E::kind(),
          source,
        });
    }

    state.loading = false;
    match result {
      Ok(records) => {
        state.records = dedup_by_id(keep_owned(records, &principal));
        let count = state.records.len();
        debug!(kind = %E::kind(), count, "cache loaded");
        Ok(count)
      }
      Err(source) => {
        warn!(kind = %E::kind(), error = %source, "load failed, keeping previous cache");
        Err(SyncError::Load {
          kind: E::kind(),
          source,
        })
      }
    }
  }

  /// User-initiated reload.
  pub async fn refetch(&self) -> Result<usize, SyncError> {
    self.load().await
  }

  /// Insert a record built from `draft` for the bound principal and put the
  /// confirmed row at the front of the cache.
  pub async fn create(&self, draft: &E::Draft) -> Result<E, SyncError> {
    let (record, principal, generation) = {
      let state = self.state();
      let principal = state.principal.clone().ok_or(SyncError::Unbound)?;
      let record = stamp(draft, &principal, &state.scope)
        .map_err(SyncError::mutation(Operation::Create, E::kind()))?;
      (record, principal, state.generation)
    };

    let created = self
      .remote
      .insert(record)
      .await
      .map_err(|e| self.failed(Operation::Create, e))?;

    if created.owner_id() != &principal {
      warn!(
        kind = %E::kind(),
        id = %created.id(),
        owner = %created.owner_id(),
        "created record belongs to another principal, not cached"
      );
      return Ok(created);
    }

    let mut state = self.state();
    if state.generation == generation {
      let id = created.id().clone();
      state.records.retain(|r| r.id() != &id);
      state.records.insert(0, created.clone());
      debug!(kind = %E::kind(), %id, "created");
    } else {
      debug!(kind = %E::kind(), "created record belongs to a discarded cache");
    }

    Ok(created)
  }

  /// Send the changed fields for `id` and swap the confirmed row in place.
  pub async fn update(&self, id: &EntityId, patch: &E::Patch) -> Result<E, SyncError> {
    let generation = self.bound_generation()?;
    let patch =
      encode(patch).map_err(SyncError::mutation(Operation::Update, E::kind()))?;

    let updated = self
      .remote
      .update(id, patch)
      .await
      .map_err(|e| self.failed(Operation::Update, e))?;

    let mut state = self.state();
    if state.generation == generation {
      // An id we don't hold is already consistent; nothing to replace
      if let Some(slot) = state.records.iter_mut().find(|r| r.id() == id) {
        *slot = updated.clone();
      }
    }

    Ok(updated)
  }

  /// Delete `id` remotely and drop it from the cache.
  pub async fn delete(&self, id: &EntityId) -> Result<(), SyncError> {
    let generation = self.bound_generation()?;

    self
      .remote
      .delete(id)
      .await
      .map_err(|e| self.failed(Operation::Delete, e))?;

    let mut state = self.state();
    if state.generation == generation {
      state.records.retain(|r| r.id() != id);
    }

    Ok(())
  }

  fn bound_generation(&self) -> Result<u64, SyncError> {
    let state = self.state();
    match state.principal {
      Some(_) => Ok(state.generation),
      None => Err(SyncError::Unbound),
    }
  }

  fn failed(&self, op: Operation, source: RemoteError) -> SyncError {
    warn!(kind = %E::kind(), %op, error = %source, "operation failed, cache untouched");
    SyncError::Mutation {
      op,
      kind: E::kind(),
      source,
    }
  }

  /// Cloned records in cache order.
  pub fn snapshot(&self) -> Vec<E> {
    self.state().records.clone()
  }

  /// Run `f` over the cached records without cloning them.
  pub fn with_records<R>(&self, f: impl FnOnce(&[E]) -> R) -> R {
    f(&self.state().records)
  }

  pub fn get(&self, id: &EntityId) -> Option<E> {
    self.state().records.iter().find(|r| r.id() == id).cloned()
  }

  pub fn first(&self) -> Option<E> {
    self.state().records.first().cloned()
  }

  pub fn len(&self) -> usize {
    self.state().records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.state().records.is_empty()
  }

  pub fn is_loading(&self) -> bool {
    self.state().loading
  }

  pub fn principal(&self) -> Option<PrincipalId> {
    self.state().principal.clone()
  }
}

#[async_trait]
impl<E: Entity> SessionListener for SyncController<E> {
  fn kind(&self) -> EntityKind {
    E::kind()
  }

  fn unbind(&self) {
    self.detach();
  }

  fn settle(&self) {
    SyncController::settle(self);
  }

  async fn bind(&self, principal: &PrincipalId) -> Result<usize, SyncError> {
    self.attach(principal.clone());
    self.load().await
  }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, RemoteError> {
  Ok(serde_json::to_value(value)?)
}

/// Caller fields plus owner and scope columns, ready for insert.
fn stamp<D: Serialize>(
  draft: &D,
  owner: &PrincipalId,
  scope: &[Filter],
) -> Result<Value, RemoteError> {
  let mut record = match encode(draft)? {
    Value::Object(map) => map,
    other => {
      return Err(RemoteError::Codec(serde::ser::Error::custom(format!(
        "draft must serialize to an object, got {}",
        other
      ))))
    }
  };

  record.insert(
    OWNER_COLUMN.to_string(),
    Value::String(owner.as_str().to_string()),
  );
  for filter in scope {
    record.insert(filter.column.clone(), Value::String(filter.value.clone()));
  }

  Ok(Value::Object(record))
}

/// Keep only rows owned by `principal`.
fn keep_owned<E: Entity>(records: Vec<E>, principal: &PrincipalId) -> Vec<E> {
  let total = records.len();
  let owned: Vec<E> = records
    .into_iter()
    .filter(|r| r.owner_id() == principal)
    .collect();
  if owned.len() < total {
    warn!(
      kind = %E::kind(),
      dropped = total - owned.len(),
      "service returned records of another principal"
    );
  }
  owned
}

fn dedup_by_id<E: Entity>(records: Vec<E>) -> Vec<E> {
  let mut seen = HashSet::with_capacity(records.len());
  records
    .into_iter()
    .filter(|r| seen.insert(r.id().clone()))
    .collect()
}
