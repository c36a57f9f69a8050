use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::sync::{Entity, EntityId, EntityKind, OrderBy, PrincipalId};

/// Chat platforms a conversation can come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
  Whatsapp,
  Telegram,
  Messenger,
  Discord,
  Slack,
}

impl Platform {
  pub fn as_str(&self) -> &'static str {
    match self {
      Platform::Whatsapp => "whatsapp",
      Platform::Telegram => "telegram",
      Platform::Messenger => "messenger",
      Platform::Discord => "discord",
      Platform::Slack => "slack",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Platform::Whatsapp => "WhatsApp",
      Platform::Telegram => "Telegram",
      Platform::Messenger => "Messenger",
      Platform::Discord => "Discord",
      Platform::Slack => "Slack",
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

impl FromStr for Platform {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "whatsapp" => Ok(Platform::Whatsapp),
      "telegram" => Ok(Platform::Telegram),
      "messenger" => Ok(Platform::Messenger),
      "discord" => Ok(Platform::Discord),
      "slack" => Ok(Platform::Slack),
      other => Err(format!("unknown platform '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
  pub id: EntityId,
  #[serde(rename = "user_id")]
  pub owner_id: PrincipalId,
  pub contact_name: String,
  pub platform: Platform,
  pub last_message: Option<String>,
  pub last_message_time: Option<DateTime<Utc>>,
  #[serde(default)]
  pub unread_count: u32,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationDraft {
  pub contact_name: String,
  pub platform: Platform,
  pub last_message: Option<String>,
  pub last_message_time: Option<DateTime<Utc>>,
  pub unread_count: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub contact_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_message: Option<Option<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_message_time: Option<Option<DateTime<Utc>>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub unread_count: Option<u32>,
}

impl ConversationPatch {
  pub fn mark_read() -> Self {
    Self {
      unread_count: Some(0),
      ..Default::default()
    }
  }
}

impl Entity for Conversation {
  type Draft = ConversationDraft;
  type Patch = ConversationPatch;

  fn id(&self) -> &EntityId {
    &self.id
  }

  fn owner_id(&self) -> &PrincipalId {
    &self.owner_id
  }

  fn kind() -> EntityKind {
    EntityKind::Conversation
  }

  fn default_order() -> OrderBy {
    OrderBy::desc("last_message_time")
  }
}

/// A single message inside a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  pub id: EntityId,
  #[serde(rename = "user_id")]
  pub owner_id: PrincipalId,
  pub conversation_id: EntityId,
  pub content: String,
  pub is_own: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Message fields; the conversation comes from the controller's selection.
#[derive(Debug, Clone, Serialize)]
pub struct MessageDraft {
  pub content: String,
  pub is_own: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MessagePatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
}

impl Entity for Message {
  type Draft = MessageDraft;
  type Patch = MessagePatch;

  fn id(&self) -> &EntityId {
    &self.id
  }

  fn owner_id(&self) -> &PrincipalId {
    &self.owner_id
  }

  fn kind() -> EntityKind {
    EntityKind::Message
  }

  // Newest first, so a sent message lands where a reload would put it
  fn default_order() -> OrderBy {
    OrderBy::desc("created_at")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_platform_wire_names() {
    assert_eq!(
      serde_json::to_value(Platform::Whatsapp).unwrap(),
      json!("whatsapp")
    );
    assert_eq!("Slack".parse::<Platform>(), Ok(Platform::Slack));
    assert_eq!(Platform::Whatsapp.to_string(), "WhatsApp");
  }

  #[test]
  fn test_conversation_defaults_unread() {
    let row = json!({
      "id": "c-1",
      "user_id": "u-1",
      "contact_name": "Grace",
      "platform": "telegram",
      "last_message": null,
      "last_message_time": null,
      "created_at": "2024-05-01T10:00:00Z",
      "updated_at": "2024-05-01T10:00:00Z"
    });
    let conversation: Conversation = serde_json::from_value(row).unwrap();
    assert_eq!(conversation.unread_count, 0);
    assert_eq!(conversation.platform, Platform::Telegram);
  }
}
