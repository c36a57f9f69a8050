//! Conversation views and the message controller scoped to one conversation.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::backend::RemoteCollection;
use crate::models::{Conversation, Message, MessageDraft, MessagePatch, Platform};
use crate::sync::{
  EntityId, EntityKind, Filter, PrincipalId, SessionListener, SyncController, SyncError,
};

const CONVERSATION_COLUMN: &str = "conversation_id";

/// Platform and search constraints over the conversation list.
#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
  pub search: String,
  pub platform: Option<Platform>,
}

impl ConversationFilter {
  pub fn matches(&self, conversation: &Conversation) -> bool {
    if self.platform.is_some_and(|p| p != conversation.platform) {
      return false;
    }

    let needle = self.search.trim().to_lowercase();
    needle.is_empty()
      || conversation.contact_name.to_lowercase().contains(&needle)
      || conversation
        .last_message
        .as_deref()
        .is_some_and(|m| m.to_lowercase().contains(&needle))
  }

  pub fn apply<'a>(&self, conversations: &'a [Conversation]) -> Vec<&'a Conversation> {
    conversations.iter().filter(|c| self.matches(c)).collect()
  }
}

/// Unread messages across all conversations.
pub fn unread_total(conversations: &[Conversation]) -> u32 {
  conversations.iter().map(|c| c.unread_count).sum()
}

/// Message cache for the selected conversation.
///
/// Switching conversations discards the cache and loads the new one from
/// scratch; a response that arrives for the previous selection is dropped.
#[derive(Clone)]
pub struct MessageController {
  inner: SyncController<Message>,
  selected: Arc<Mutex<Option<EntityId>>>,
}

impl MessageController {
  pub fn new(remote: Arc<dyn RemoteCollection<Message>>) -> Self {
    Self {
      inner: SyncController::new(remote),
      selected: Arc::new(Mutex::new(None)),
    }
  }

  fn selection(&self) -> MutexGuard<'_, Option<EntityId>> {
    self.selected.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn selected(&self) -> Option<EntityId> {
    self.selection().clone()
  }

  /// Change the selected conversation. Selecting the current one does nothing.
  pub async fn select_conversation(
    &self,
    conversation: Option<EntityId>,
  ) -> Result<usize, SyncError> {
    {
      let mut selected = self.selection();
      if *selected == conversation {
        return Ok(self.inner.len());
      }
      *selected = conversation.clone();
    }

    match conversation {
      Some(id) => {
        debug!(conversation = %id, "switching conversation");
        self
          .inner
          .rescope(vec![Filter::eq(CONVERSATION_COLUMN, id.as_str())]);
        self.inner.load().await
      }
      None => {
        self.inner.rescope(Vec::new());
        self.inner.settle();
        Ok(0)
      }
    }
  }

  /// Send a message into the selected conversation.
  pub async fn send(&self, draft: &MessageDraft) -> Result<Message, SyncError> {
    if self.selected().is_none() {
      return Err(SyncError::NoConversation);
    }
    self.inner.create(draft).await
  }

  pub async fn edit(&self, id: &EntityId, patch: &MessagePatch) -> Result<Message, SyncError> {
    self.inner.update(id, patch).await
  }

  pub async fn delete(&self, id: &EntityId) -> Result<(), SyncError> {
    self.inner.delete(id).await
  }

  pub async fn refetch(&self) -> Result<usize, SyncError> {
    if self.selected().is_none() {
      return Ok(0);
    }
    self.inner.refetch().await
  }

  pub fn messages(&self) -> Vec<Message> {
    self.inner.snapshot()
  }

  pub fn is_loading(&self) -> bool {
    self.inner.is_loading()
  }
}

#[async_trait]
impl SessionListener for MessageController {
  fn kind(&self) -> EntityKind {
    EntityKind::Message
  }

  fn unbind(&self) {
    *self.selection() = None;
    self.inner.rescope(Vec::new());
    self.inner.detach();
  }

  fn settle(&self) {
    self.inner.settle();
  }

  async fn bind(&self, principal: &PrincipalId) -> Result<usize, SyncError> {
    self.inner.attach(principal.clone());
    if self.selected().is_none() {
      // Nothing selected means nothing to show yet
      self.inner.settle();
      return Ok(0);
    }
    self.inner.load().await
  }
}
