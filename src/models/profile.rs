use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::{Entity, EntityId, EntityKind, OrderBy, PrincipalId};

/// Per-principal profile row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
  pub id: EntityId,
  #[serde(rename = "user_id")]
  pub owner_id: PrincipalId,
  pub full_name: Option<String>,
  pub avatar_url: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileDraft {
  pub full_name: Option<String>,
  pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilePatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub full_name: Option<Option<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub avatar_url: Option<Option<String>>,
}

impl Entity for Profile {
  type Draft = ProfileDraft;
  type Patch = ProfilePatch;

  fn id(&self) -> &EntityId {
    &self.id
  }

  fn owner_id(&self) -> &PrincipalId {
    &self.owner_id
  }

  fn kind() -> EntityKind {
    EntityKind::Profile
  }

  fn default_order() -> OrderBy {
    OrderBy::desc("created_at")
  }
}
