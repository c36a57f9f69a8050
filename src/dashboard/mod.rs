//! Per-session workspace: one controller per entity kind, all bound to the
//! same session.

mod conversations;
mod profile;
mod suggestions;
mod tasks;

use std::sync::Arc;
use tracing::debug;

use crate::backend::{FunctionInvoker, ObjectStore, RemoteCollection};
use crate::models::{Conversation, ConversationPatch, Message, MessageDraft, Profile, Task};
use crate::sync::{
  BindReport, EntityId, EntityKind, Principal, SessionBinding, SyncController, SyncError,
};

pub use conversations::{unread_total, ConversationFilter, MessageController};
pub use profile::{AvatarPolicy, AvatarUpload, ProfileController, DEFAULT_MAX_AVATAR_BYTES};
pub use suggestions::SuggestionService;
pub use tasks::{StatusTab, TaskFilter, TaskStats};

/// Remote collaborators for every controller in a workspace.
pub struct Remotes {
  pub tasks: Arc<dyn RemoteCollection<Task>>,
  pub conversations: Arc<dyn RemoteCollection<Conversation>>,
  pub messages: Arc<dyn RemoteCollection<Message>>,
  pub profiles: Arc<dyn RemoteCollection<Profile>>,
  pub files: Arc<dyn ObjectStore>,
  pub functions: Arc<dyn FunctionInvoker>,
}

impl Remotes {
  /// All four collections served by one backend.
  pub fn shared<B>(
    backend: Arc<B>,
    files: Arc<dyn ObjectStore>,
    functions: Arc<dyn FunctionInvoker>,
  ) -> Self
  where
    B: RemoteCollection<Task>
      + RemoteCollection<Conversation>
      + RemoteCollection<Message>
      + RemoteCollection<Profile>
      + 'static,
  {
    Self {
      tasks: backend.clone(),
      conversations: backend.clone(),
      messages: backend.clone(),
      profiles: backend,
      files,
      functions,
    }
  }
}

/// A conversation whose messages are loaded. Clearing its unread count is a
/// separate update and may have failed on its own.
#[derive(Debug)]
pub struct Opened {
  pub loaded: usize,
  pub mark_read: Result<(), SyncError>,
}

/// A message the service confirmed, plus how refreshing the conversation
/// preview went.
#[derive(Debug)]
pub struct Sent {
  pub message: Message,
  pub preview: Result<(), SyncError>,
}

pub struct Workspace {
  session: SessionBinding,
  pub tasks: SyncController<Task>,
  pub conversations: SyncController<Conversation>,
  pub messages: MessageController,
  pub profile: ProfileController,
  pub suggestions: SuggestionService,
}

impl Workspace {
  pub fn new(remotes: Remotes, avatars: AvatarPolicy) -> Self {
    let tasks = SyncController::new(remotes.tasks);
    let conversations = SyncController::new(remotes.conversations);
    let messages = MessageController::new(remotes.messages);
    let profile = ProfileController::new(remotes.profiles, remotes.files, avatars);

    let mut session = SessionBinding::new();
    session.register(Arc::new(tasks.clone()));
    session.register(Arc::new(conversations.clone()));
    session.register(Arc::new(messages.clone()));
    session.register(Arc::new(profile.clone()));

    Self {
      session,
      tasks,
      conversations,
      messages,
      profile,
      suggestions: SuggestionService::new(remotes.functions),
    }
  }

  pub async fn set_principal(&mut self, principal: Option<Principal>) -> BindReport {
    self.session.set_principal(principal).await
  }

  pub fn principal(&self) -> Option<&Principal> {
    self.session.principal()
  }

  /// Reload one kind, e.g. after its load failed while binding.
  pub async fn refetch(&self, kind: EntityKind) -> Result<usize, SyncError> {
    match kind {
      EntityKind::Task => self.tasks.refetch().await,
      EntityKind::Conversation => self.conversations.refetch().await,
      EntityKind::Message => self.messages.refetch().await,
      EntityKind::Profile => self.profile.refetch().await,
    }
  }

  /// Select a conversation for the message view and clear its unread badge.
  ///
  /// Fails only if the messages could not be loaded.
  pub async fn open_conversation(&self, id: &EntityId) -> Result<Opened, SyncError> {
    let loaded = self.messages.select_conversation(Some(id.clone())).await?;

    let unread = self.conversations.get(id).is_some_and(|c| c.unread_count > 0);
    let mark_read = if unread {
      debug!(conversation = %id, "marking conversation read");
      self
        .conversations
        .update(id, &ConversationPatch::mark_read())
        .await
        .map(|_| ())
    } else {
      Ok(())
    };

    Ok(Opened { loaded, mark_read })
  }

  /// Send into the open conversation and refresh its preview.
  ///
  /// Once the message is confirmed this succeeds; a failed preview update is
  /// returned alongside it.
  pub async fn send_message(&self, draft: &MessageDraft) -> Result<Sent, SyncError> {
    let message = self.messages.send(draft).await?;

    let preview = ConversationPatch {
      last_message: Some(Some(message.content.clone())),
      last_message_time: Some(Some(message.created_at)),
      ..Default::default()
    };
    let preview = self
      .conversations
      .update(&message.conversation_id, &preview)
      .await
      .map(|_| ());

    Ok(Sent { message, preview })
  }

  pub fn task_stats(&self) -> TaskStats {
    self.tasks.with_records(TaskStats::from_tasks)
  }

  pub fn filtered_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
    self
      .tasks
      .with_records(|tasks| filter.apply(tasks).into_iter().cloned().collect())
  }

  pub fn filtered_conversations(&self, filter: &ConversationFilter) -> Vec<Conversation> {
    self
      .conversations
      .with_records(|list| filter.apply(list).into_iter().cloned().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::{LocalObjectStore, NoFunctions, SqliteBackend};
  use crate::models::{ConversationDraft, Platform, TaskDraft, TaskPatch, TaskStatus};
  use crate::sync::testing::FlakyRemote;
  use crate::sync::Operation;

  fn remotes(files: &std::path::Path) -> (Remotes, Arc<SqliteBackend>) {
    let backend = Arc::new(SqliteBackend::in_memory().unwrap());
    let remotes = Remotes::shared(
      backend.clone(),
      Arc::new(LocalObjectStore::new(files)),
      Arc::new(NoFunctions),
    );
    (remotes, backend)
  }

  fn workspace(files: &std::path::Path) -> Workspace {
    Workspace::new(remotes(files).0, AvatarPolicy::default())
  }

  /// Workspace whose conversation table can be switched to failing.
  fn flaky_conversations(
    files: &std::path::Path,
  ) -> (Workspace, Arc<FlakyRemote<Conversation>>) {
    let (mut remotes, backend) = remotes(files);
    let flaky = Arc::new(FlakyRemote::<Conversation>::new(backend));
    let conversations: Arc<dyn RemoteCollection<Conversation>> = flaky.clone();
    remotes.conversations = conversations;
    (Workspace::new(remotes, AvatarPolicy::default()), flaky)
  }

  fn grace(unread: u32) -> ConversationDraft {
    ConversationDraft {
      contact_name: "Grace".to_string(),
      platform: Platform::Telegram,
      last_message: Some("ping".to_string()),
      last_message_time: None,
      unread_count: unread,
    }
  }

  #[tokio::test]
  async fn test_task_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = workspace(dir.path());
    assert!(ws.tasks.is_loading());

    let report = ws.set_principal(Some(Principal::new("u-1"))).await;
    assert_eq!(report.failures().count(), 0);
    assert!(!ws.tasks.is_loading());
    assert!(ws.tasks.is_empty());

    let task = ws
      .tasks
      .create(&TaskDraft {
        title: "Buy milk".to_string(),
        ..Default::default()
      })
      .await
      .unwrap();
    assert_eq!(ws.tasks.len(), 1);
    assert_eq!(ws.tasks.first().unwrap().title, "Buy milk");
    assert_eq!(task.status, TaskStatus::Todo);

    ws.tasks
      .update(&task.id, &TaskPatch::completion(true))
      .await
      .unwrap();
    assert_eq!(ws.tasks.get(&task.id).unwrap().status, TaskStatus::Completed);
    assert_eq!(ws.task_stats().completed, 1);

    ws.tasks.delete(&task.id).await.unwrap();
    assert!(ws.tasks.is_empty());
    assert_eq!(ws.task_stats(), TaskStats::default());
  }

  #[tokio::test]
  async fn test_switching_principal_isolates_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = workspace(dir.path());

    ws.set_principal(Some(Principal::new("u-1"))).await;
    ws.tasks
      .create(&TaskDraft {
        title: "mine".to_string(),
        ..Default::default()
      })
      .await
      .unwrap();

    ws.set_principal(Some(Principal::new("u-2"))).await;
    assert!(ws.tasks.is_empty());
    assert_eq!(ws.principal().map(|p| p.id.as_str()), Some("u-2"));

    ws.set_principal(None).await;
    assert!(ws.principal().is_none());
    assert!(ws.tasks.is_empty());
    assert!(ws.tasks.is_loading());

    ws.set_principal(Some(Principal::new("u-1"))).await;
    let titles: Vec<_> = ws.tasks.snapshot().into_iter().map(|t| t.title).collect();
    assert_eq!(titles, vec!["mine"]);
  }

  #[tokio::test]
  async fn test_open_and_reply_updates_conversation() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = workspace(dir.path());
    ws.set_principal(Some(Principal::new("u-1"))).await;

    let conversation = ws.conversations.create(&grace(4)).await.unwrap();

    let opened = ws.open_conversation(&conversation.id).await.unwrap();
    assert_eq!(opened.loaded, 0);
    assert!(opened.mark_read.is_ok());
    let sent = ws
      .send_message(&MessageDraft {
        content: "pong".to_string(),
        is_own: true,
      })
      .await
      .unwrap();
    assert!(sent.preview.is_ok());

    let updated = ws.conversations.get(&conversation.id).unwrap();
    assert_eq!(updated.unread_count, 0);
    assert_eq!(updated.last_message.as_deref(), Some("pong"));
    assert!(updated.last_message_time.is_some());
    assert_eq!(ws.messages.messages().len(), 1);
    assert_eq!(ws.messages.selected(), Some(conversation.id.clone()));
  }

  #[tokio::test]
  async fn test_unbound_mutation_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let ws = workspace(dir.path());

    let result = ws
      .tasks
      .create(&TaskDraft {
        title: "orphan".to_string(),
        ..Default::default()
      })
      .await;
    assert!(matches!(result, Err(SyncError::Unbound)));
    assert!(ws.tasks.is_empty());
  }

  #[tokio::test]
  async fn test_filtered_tasks_keep_cache_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = workspace(dir.path());
    ws.set_principal(Some(Principal::new("u-1"))).await;

    for title in ["Buy milk", "Call mum", "Buy stamps"] {
      ws.tasks
        .create(&TaskDraft {
          title: title.to_string(),
          ..Default::default()
        })
        .await
        .unwrap();
    }

    let filter = TaskFilter {
      search: "buy".to_string(),
      tab: StatusTab::All,
    };
    let titles: Vec<_> = ws
      .filtered_tasks(&filter)
      .into_iter()
      .map(|t| t.title)
      .collect();
    assert_eq!(titles, vec!["Buy stamps", "Buy milk"]);
  }

  #[tokio::test]
  async fn test_sent_message_survives_failed_preview_update() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ws, flaky) = flaky_conversations(dir.path());
    ws.set_principal(Some(Principal::new("u-1"))).await;
    let conversation = ws.conversations.create(&grace(2)).await.unwrap();

    flaky.set_failing(true);
    let opened = ws.open_conversation(&conversation.id).await.unwrap();
    assert!(matches!(
      opened.mark_read,
      Err(SyncError::Mutation {
        op: Operation::Update,
        ..
      })
    ));

    let calls = flaky.calls();
    let sent = ws
      .send_message(&MessageDraft {
        content: "pong".to_string(),
        is_own: true,
      })
      .await
      .unwrap();

    assert_eq!(flaky.calls(), calls + 1);
    assert!(sent.preview.is_err());
    assert_eq!(sent.message.content, "pong");
    assert_eq!(ws.messages.messages(), vec![sent.message.clone()]);

    let cached = ws.conversations.get(&conversation.id).unwrap();
    assert_eq!(cached.unread_count, 2);
    assert_eq!(cached.last_message.as_deref(), Some("ping"));

    // Stored exactly once
    assert_eq!(ws.refetch(EntityKind::Message).await.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_refetch_recovers_failed_bind_load() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ws, flaky) = flaky_conversations(dir.path());
    ws.set_principal(Some(Principal::new("u-1"))).await;
    ws.conversations.create(&grace(0)).await.unwrap();

    ws.set_principal(None).await;
    flaky.set_failing(true);
    let report = ws.set_principal(Some(Principal::new("u-1"))).await;
    let failed: Vec<_> = report.failures().map(|(kind, _)| kind).collect();
    assert_eq!(failed, vec![EntityKind::Conversation]);
    assert!(ws.conversations.is_empty());

    flaky.set_failing(false);
    assert_eq!(ws.refetch(EntityKind::Conversation).await.unwrap(), 1);
    assert_eq!(ws.conversations.first().unwrap().contact_name, "Grace");
    assert_eq!(ws.refetch(EntityKind::Profile).await.unwrap(), 0);
    assert!(ws.profile.profile().is_none());
  }
}
