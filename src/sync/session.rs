//! Session binding: ties every cache's lifecycle to the current principal.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::info;

use super::error::SyncError;
use super::traits::{EntityKind, PrincipalId};

/// The authenticated identity owning a session's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
  pub id: PrincipalId,
  pub email: Option<String>,
  pub display_name: Option<String>,
}

impl Principal {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: PrincipalId::new(id),
      email: None,
      display_name: None,
    }
  }

  /// Name for greetings: display name, else the local part of the email.
  pub fn short_name(&self) -> &str {
    if let Some(name) = self.display_name.as_deref().filter(|n| !n.is_empty()) {
      return name;
    }
    match self.email.as_deref() {
      Some(email) => email.split('@').next().unwrap_or(email),
      None => self.id.as_str(),
    }
  }
}

/// Something whose state belongs to a principal and must follow session changes.
#[async_trait]
pub trait SessionListener: Send + Sync {
  fn kind(&self) -> EntityKind;

  /// Drop everything synchronously; the listener is ready to be bound again.
  fn unbind(&self);

  /// The session resolved with nobody signed in: stop reporting as loading.
  fn settle(&self);

  /// Take ownership for `principal` and populate. Returns the loaded count.
  async fn bind(&self, principal: &PrincipalId) -> Result<usize, SyncError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
  Unbound,
  Bound(Principal),
}

/// Load outcomes of one bind, one entry per listener.
#[derive(Debug, Default)]
pub struct BindReport {
  pub loads: Vec<(EntityKind, Result<usize, SyncError>)>,
}

impl BindReport {
  pub fn failures(&self) -> impl Iterator<Item = (EntityKind, &SyncError)> {
    self
      .loads
      .iter()
      .filter_map(|(kind, result)| result.as_ref().err().map(|e| (*kind, e)))
  }
}

/// Two-state machine (unbound / bound to a principal) driving the listeners.
pub struct SessionBinding {
  state: SessionState,
  listeners: Vec<Arc<dyn SessionListener>>,
}

impl Default for SessionBinding {
  fn default() -> Self {
    Self::new()
  }
}

impl SessionBinding {
  pub fn new() -> Self {
    Self {
      state: SessionState::Unbound,
      listeners: Vec::new(),
    }
  }

  pub fn register(&mut self, listener: Arc<dyn SessionListener>) {
    self.listeners.push(listener);
  }

  pub fn principal(&self) -> Option<&Principal> {
    match &self.state {
      SessionState::Bound(p) => Some(p),
      SessionState::Unbound => None,
    }
  }

  /// Apply a principal notification.
  ///
  /// Every listener is unbound before any new load starts, so no cache ever
  /// holds the previous principal's records once a different one is bound.
  pub async fn set_principal(&mut self, next: Option<Principal>) -> BindReport {
    let was_unbound = matches!(self.state, SessionState::Unbound);
    let same_principal = match (&self.state, &next) {
      (SessionState::Bound(current), Some(principal)) => current.id == principal.id,
      _ => false,
    };

    match next {
      None if was_unbound => {
        for listener in &self.listeners {
          listener.settle();
        }
        BindReport::default()
      }
      Some(principal) if same_principal => {
        // Same identity re-announced (e.g. token refresh): keep the caches
        self.state = SessionState::Bound(principal);
        BindReport::default()
      }
      None => {
        info!("session unbound");
        self.unbind_all();
        self.state = SessionState::Unbound;
        BindReport::default()
      }
      Some(principal) => {
        info!(principal = %principal.id, "session bound");
        self.unbind_all();
        self.state = SessionState::Bound(principal.clone());

        let loads = join_all(self.listeners.iter().map(|listener| {
          let listener = Arc::clone(listener);
          let id = principal.id.clone();
          async move { (listener.kind(), listener.bind(&id).await) }
        }))
        .await;

        BindReport { loads }
      }
    }
  }

  fn unbind_all(&self) {
    for listener in &self.listeners {
      listener.unbind();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  /// Records the calls it receives, in order.
  #[derive(Default)]
  struct Probe {
    calls: Mutex<Vec<String>>,
  }

  impl Probe {
    fn calls(&self) -> Vec<String> {
      self.calls.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl SessionListener for Probe {
    fn kind(&self) -> EntityKind {
      EntityKind::Task
    }

    fn unbind(&self) {
      self.calls.lock().unwrap().push("unbind".to_string());
    }

    fn settle(&self) {
      self.calls.lock().unwrap().push("settle".to_string());
    }

    async fn bind(&self, principal: &PrincipalId) -> Result<usize, SyncError> {
      self
        .calls
        .lock()
        .unwrap()
        .push(format!("bind:{}", principal));
      Ok(0)
    }
  }

  fn binding_with_probe() -> (SessionBinding, Arc<Probe>) {
    let probe = Arc::new(Probe::default());
    let mut binding = SessionBinding::new();
    binding.register(probe.clone());
    (binding, probe)
  }

  #[tokio::test]
  async fn test_initial_resolve_without_principal_settles() {
    let (mut binding, probe) = binding_with_probe();
    binding.set_principal(None).await;
    assert_eq!(probe.calls(), vec!["settle"]);
    assert_eq!(binding.state, SessionState::Unbound);
  }

  #[tokio::test]
  async fn test_principal_change_unbinds_before_binding() {
    let (mut binding, probe) = binding_with_probe();
    binding.set_principal(Some(Principal::new("a"))).await;
    binding.set_principal(Some(Principal::new("b"))).await;

    assert_eq!(
      probe.calls(),
      vec!["unbind", "bind:a", "unbind", "bind:b"]
    );
    assert_eq!(binding.principal().unwrap().id.as_str(), "b");
  }

  #[tokio::test]
  async fn test_same_principal_is_noop() {
    let (mut binding, probe) = binding_with_probe();
    binding.set_principal(Some(Principal::new("a"))).await;

    let mut refreshed = Principal::new("a");
    refreshed.email = Some("a@example.com".to_string());
    let report = binding.set_principal(Some(refreshed)).await;

    assert!(report.loads.is_empty());
    assert_eq!(probe.calls(), vec!["unbind", "bind:a"]);
    assert_eq!(
      binding.principal().unwrap().email.as_deref(),
      Some("a@example.com")
    );
  }

  #[tokio::test]
  async fn test_unbind() {
    let (mut binding, probe) = binding_with_probe();
    binding.set_principal(Some(Principal::new("a"))).await;
    binding.set_principal(None).await;

    assert_eq!(probe.calls(), vec!["unbind", "bind:a", "unbind"]);
    assert!(binding.principal().is_none());
  }

  #[test]
  fn test_short_name() {
    let mut principal = Principal::new("u-1");
    assert_eq!(principal.short_name(), "u-1");
    principal.email = Some("ada@example.com".to_string());
    assert_eq!(principal.short_name(), "ada");
    principal.display_name = Some("Ada L".to_string());
    assert_eq!(principal.short_name(), "Ada L");
  }
}
