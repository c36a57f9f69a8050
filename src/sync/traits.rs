//! Core traits and types for the sync layer.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// Server-assigned record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for EntityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Identity of the authenticated principal that owns a session's records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for PrincipalId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// The categories of record that get their own cache and controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
  Task,
  Conversation,
  Message,
  Profile,
}

impl EntityKind {
  /// Remote table holding this kind.
  pub fn table(&self) -> &'static str {
    match self {
      EntityKind::Task => "tasks",
      EntityKind::Conversation => "conversations",
      EntityKind::Message => "messages",
      EntityKind::Profile => "profiles",
    }
  }

  /// Lowercase noun used in notices and logs.
  pub fn label(&self) -> &'static str {
    match self {
      EntityKind::Task => "task",
      EntityKind::Conversation => "conversation",
      EntityKind::Message => "message",
      EntityKind::Profile => "profile",
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// Column holding the owning principal on every table.
pub const OWNER_COLUMN: &str = "user_id";

/// Trait for records mirrored by a sync controller.
///
/// `Draft` is what a caller supplies on create (no id, owner or timestamps);
/// `Patch` carries only the fields an update changes.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  type Draft: Serialize + Send + Sync;
  type Patch: Serialize + Send + Sync;

  fn id(&self) -> &EntityId;

  fn owner_id(&self) -> &PrincipalId;

  fn kind() -> EntityKind;

  /// Ordering used for a full load.
  fn default_order() -> OrderBy;
}

/// Sort column and direction for a list query. Nulls always sort last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
  pub column: &'static str,
  pub ascending: bool,
}

impl OrderBy {
  pub const fn desc(column: &'static str) -> Self {
    Self {
      column,
      ascending: false,
    }
  }

  pub const fn asc(column: &'static str) -> Self {
    Self {
      column,
      ascending: true,
    }
  }
}

/// Equality constraint on a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
  pub column: String,
  pub value: String,
}

impl Filter {
  pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
    Self {
      column: column.into(),
      value: value.into(),
    }
  }
}

/// A filtered, ordered list request against one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
  pub filters: Vec<Filter>,
  pub order: OrderBy,
}

impl ListQuery {
  /// Everything of kind `E` owned by `owner`, extra scope constraints appended.
  pub fn owned_by<E: Entity>(owner: &PrincipalId, scope: &[Filter]) -> Self {
    let mut filters = vec![Filter::eq(OWNER_COLUMN, owner.as_str())];
    filters.extend(scope.iter().cloned());
    Self {
      filters,
      order: E::default_order(),
    }
  }
}
