use chrono::{DateTime, NaiveDate, Utc};
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::{
  LocalObjectStore, NoFunctions, PrincipalSource, RestBackend, SqliteBackend, StaticPrincipal,
};
use crate::cli::{
  Command, ConversationCommand, MessageCommand, ProfileCommand, TaskCommand, TaskFields,
};
use crate::config::Config;
use crate::dashboard::{
  unread_total, AvatarUpload, ConversationFilter, Remotes, StatusTab, TaskFilter, Workspace,
};
use crate::models::{
  ConversationDraft, MessageDraft, MessagePatch, Platform, ProfileDraft, ProfilePatch, Task,
  TaskDraft, TaskPatch, TaskStatus,
};
use crate::notify::{self, Action, ConsoleNotifier, Notice, Notifier};
use crate::sync::{
  Entity, EntityId, EntityKind, Operation, Principal, PrincipalId, SyncController, SyncError,
};

/// Marker for a failure the user has already been told about.
#[derive(Debug)]
struct Reported;

/// Application shell: owns the workspace for one session and runs commands
/// against it.
pub struct App {
  workspace: Workspace,
  principals: Arc<dyn PrincipalSource>,
  notifier: Arc<dyn Notifier>,
}

impl App {
  pub fn new(config: &Config, local: bool) -> Result<Self> {
    let avatars = config.uploads.avatar_policy();

    let (remotes, principals): (Remotes, Arc<dyn PrincipalSource>) = if local {
      let settings = config.local();
      let database = settings.database_path();
      let backend = SqliteBackend::open(&database)
        .map_err(|e| eyre!("Failed to open local database {}: {}", database.display(), e))?;
      info!(database = %database.display(), "using local backend");

      let principal = Principal {
        id: PrincipalId::new(settings.principal_id.clone()),
        email: settings.email.clone(),
        display_name: None,
      };
      let remotes = Remotes::shared(
        Arc::new(backend),
        Arc::new(LocalObjectStore::new(settings.files_root())),
        Arc::new(NoFunctions),
      );
      let principals: Arc<dyn PrincipalSource> = Arc::new(StaticPrincipal(Some(principal)));
      (remotes, principals)
    } else {
      let backend = Arc::new(RestBackend::new(config)?);
      info!(url = %config.backend.url, "using hosted backend");
      let remotes = Remotes::shared(backend.clone(), backend.clone(), backend.clone());
      let principals: Arc<dyn PrincipalSource> = backend;
      (remotes, principals)
    };

    Ok(Self {
      workspace: Workspace::new(remotes, avatars),
      principals,
      notifier: Arc::new(ConsoleNotifier),
    })
  }

  /// Resolve the session, bind the workspace to it and run one command.
  ///
  /// Returns false when the command failed; the user has been notified.
  pub async fn run(&mut self, command: Command) -> Result<bool> {
    let principal = self
      .principals
      .current_principal()
      .await
      .map_err(|e| eyre!("Failed to resolve the current session: {}", e))?;

    let Some(principal) = principal else {
      self.workspace.set_principal(None).await;
      return Err(eyre!("Not signed in. Set TASKHUB_ACCESS_TOKEN or use --local."));
    };

    let report = self.workspace.set_principal(Some(principal)).await;
    let failed: Vec<EntityKind> = report.failures().map(|(kind, _)| kind).collect();
    for kind in failed {
      // One retry before telling the user
      if let Err(error) = self.workspace.refetch(kind).await {
        warn!(%kind, error = %error, "initial load failed");
        self.notifier.notify(Action::Load(kind).failure(&error));
      }
    }

    Ok(self.dispatch(command).await.is_ok())
  }

  async fn dispatch(&self, command: Command) -> Result<(), Reported> {
    match command {
      Command::Tasks(cmd) => self.tasks(cmd).await,
      Command::Conversations(cmd) => self.conversations(cmd).await,
      Command::Messages(cmd) => self.messages(cmd).await,
      Command::Profile(cmd) => self.profile(cmd).await,
      Command::Suggest { context } => {
        let outcome = self.workspace.suggestions.suggest(&context.join(" ")).await;
        for suggestion in self.checked(Action::Suggest, outcome)? {
          println!("- {}", suggestion);
        }
        Ok(())
      }
    }
  }

  /// Report an outcome and keep only its value.
  fn checked<T>(&self, action: Action, outcome: Result<T, SyncError>) -> Result<T, Reported> {
    notify::report(self.notifier.as_ref(), action, &outcome);
    outcome.map_err(|_| Reported)
  }

  /// Report a conversation update that failed after the command itself went
  /// through. The command still counts as a success.
  fn followup(&self, outcome: Result<(), SyncError>) {
    if outcome.is_err() {
      let action = Action::Mutate(Operation::Update, EntityKind::Conversation);
      notify::report(self.notifier.as_ref(), action, &outcome);
    }
  }

  fn fail(&self, message: impl Into<String>) -> Reported {
    self.notifier.notify(Notice::error(message));
    Reported
  }

  fn resolve<E: Entity>(
    &self,
    controller: &SyncController<E>,
    raw: &str,
  ) -> Result<EntityId, Reported> {
    resolve_id(controller, raw).map_err(|message| self.fail(message))
  }

  async fn tasks(&self, cmd: TaskCommand) -> Result<(), Reported> {
    let tasks = &self.workspace.tasks;
    let mutate = |op| Action::Mutate(op, EntityKind::Task);

    match cmd {
      TaskCommand::List { search, status } => {
        let filter = TaskFilter {
          search,
          tab: status.map(StatusTab::Only).unwrap_or_default(),
        };
        for task in self.workspace.filtered_tasks(&filter) {
          println!("{}", task_line(&task));
        }
      }
      TaskCommand::Add { title, fields } => {
        let draft = TaskDraft {
          title,
          description: fields.description,
          priority: fields.priority.unwrap_or_default(),
          status: fields.status.unwrap_or_default(),
          due_date: fields.due.map(start_of_day),
        };
        let task = self.checked(mutate(Operation::Create), tasks.create(&draft).await)?;
        println!("{}", task_line(&task));
      }
      TaskCommand::Update { id, title, fields } => {
        let id = self.resolve(tasks, &id)?;
        let patch = task_patch(title, fields);
        if patch.is_empty() {
          return Err(self.fail("Nothing to update"));
        }
        let task = self.checked(mutate(Operation::Update), tasks.update(&id, &patch).await)?;
        println!("{}", task_line(&task));
      }
      TaskCommand::Done { id } => {
        let id = self.resolve(tasks, &id)?;
        let outcome = tasks.update(&id, &TaskPatch::completion(true)).await;
        self.checked(mutate(Operation::Update), outcome)?;
      }
      TaskCommand::Reopen { id } => {
        let id = self.resolve(tasks, &id)?;
        let outcome = tasks.update(&id, &TaskPatch::completion(false)).await;
        self.checked(mutate(Operation::Update), outcome)?;
      }
      TaskCommand::Rm { id } => {
        let id = self.resolve(tasks, &id)?;
        self.checked(mutate(Operation::Delete), tasks.delete(&id).await)?;
      }
      TaskCommand::Stats => {
        let stats = self.workspace.task_stats();
        println!("Total:         {}", stats.total);
        println!("Completed:     {}", stats.completed);
        println!("In progress:   {}", stats.in_progress);
        println!("High priority: {}", stats.high_priority);
      }
    }

    Ok(())
  }

  async fn conversations(&self, cmd: ConversationCommand) -> Result<(), Reported> {
    let conversations = &self.workspace.conversations;
    let mutate = |op| Action::Mutate(op, EntityKind::Conversation);

    match cmd {
      ConversationCommand::List { search, platform } => {
        let filter = ConversationFilter { search, platform };
        let list = self.workspace.filtered_conversations(&filter);
        for conversation in &list {
          let unread = if conversation.unread_count > 0 {
            format!(" ({} unread)", conversation.unread_count)
          } else {
            String::new()
          };
          println!(
            "{}  {:<9} {}{}  {}",
            short_id(&conversation.id),
            conversation.platform.label(),
            conversation.contact_name,
            unread,
            conversation.last_message.as_deref().unwrap_or("")
          );
        }
        println!("{} unread", unread_total(&list));
      }
      ConversationCommand::Add { contact, platform } => {
        let draft = new_conversation(contact, platform);
        let conversation =
          self.checked(mutate(Operation::Create), conversations.create(&draft).await)?;
        println!("{}  {}", short_id(&conversation.id), conversation.contact_name);
      }
      ConversationCommand::Rm { id } => {
        let id = self.resolve(conversations, &id)?;
        self.checked(mutate(Operation::Delete), conversations.delete(&id).await)?;
      }
    }

    Ok(())
  }

  async fn messages(&self, cmd: MessageCommand) -> Result<(), Reported> {
    let mutate = |op| Action::Mutate(op, EntityKind::Message);

    let conversation = match &cmd {
      MessageCommand::List { conversation }
      | MessageCommand::Send { conversation, .. }
      | MessageCommand::Edit { conversation, .. }
      | MessageCommand::Rm { conversation, .. } => {
        self.resolve(&self.workspace.conversations, conversation)?
      }
    };
    let opened = self.workspace.open_conversation(&conversation).await;
    let opened = self.checked(Action::Load(EntityKind::Message), opened)?;
    self.followup(opened.mark_read);

    match cmd {
      MessageCommand::List { .. } => {
        if opened.loaded == 0 {
          println!("No messages yet.");
        }
        // Newest first in the cache; print oldest first like a chat log
        for message in self.workspace.messages.messages().iter().rev() {
          let who = if message.is_own { "me" } else { "them" };
          println!(
            "{}  {} {:>4}: {}",
            short_id(&message.id),
            message.created_at.format("%Y-%m-%d %H:%M"),
            who,
            message.content
          );
        }
      }
      MessageCommand::Send { text, .. } => {
        let draft = MessageDraft {
          content: text.join(" "),
          is_own: true,
        };
        let outcome = self.workspace.send_message(&draft).await;
        let sent = self.checked(mutate(Operation::Create), outcome)?;
        self.followup(sent.preview);
      }
      MessageCommand::Edit { id, text, .. } => {
        let messages = &self.workspace.messages;
        let id = resolve_in(&messages.messages(), EntityKind::Message, &id)
          .map_err(|message| self.fail(message))?;
        let patch = MessagePatch {
          content: Some(text.join(" ")),
        };
        self.checked(mutate(Operation::Update), messages.edit(&id, &patch).await)?;
      }
      MessageCommand::Rm { id, .. } => {
        let messages = &self.workspace.messages;
        let id = resolve_in(&messages.messages(), EntityKind::Message, &id)
          .map_err(|message| self.fail(message))?;
        self.checked(mutate(Operation::Delete), messages.delete(&id).await)?;
      }
    }

    Ok(())
  }

  async fn profile(&self, cmd: ProfileCommand) -> Result<(), Reported> {
    let profile = &self.workspace.profile;

    match cmd {
      ProfileCommand::Show => {
        let principal = self.workspace.principal();
        let email = principal.and_then(|p| p.email.as_deref()).unwrap_or("-");
        let fallback = principal.map(|p| p.short_name()).unwrap_or("-");
        match profile.profile() {
          Some(p) => {
            println!("Name:   {}", p.full_name.as_deref().unwrap_or(fallback));
            println!("Email:  {}", email);
            println!("Avatar: {}", p.avatar_url.as_deref().unwrap_or("-"));
          }
          None => println!("No profile yet. Set a name with `taskhub profile rename`."),
        }
      }
      ProfileCommand::Rename { name } => {
        let name = name.join(" ");
        if profile.profile().is_some() {
          let patch = ProfilePatch {
            full_name: Some(Some(name)),
            ..Default::default()
          };
          let outcome = profile.update_profile(&patch).await;
          self.checked(Action::UpdateProfile, outcome)?;
        } else {
          let draft = ProfileDraft {
            full_name: Some(name),
            avatar_url: None,
          };
          let outcome = profile.create_profile(&draft).await;
          self.checked(Action::UpdateProfile, outcome)?;
        }
      }
      ProfileCommand::Avatar { path } => {
        let upload = AvatarUpload::from_path(&path)
          .await
          .map_err(|e| self.fail(format!("Failed to read {}: {}", path.display(), e)))?;
        let updated = self.checked(Action::UploadAvatar, profile.upload_avatar(upload).await)?;
        if let Some(url) = updated.avatar_url {
          println!("{}", url);
        }
      }
    }

    Ok(())
  }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
  date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn task_patch(title: Option<String>, fields: TaskFields) -> TaskPatch {
  TaskPatch {
    title,
    description: fields.description.map(|d| (!d.is_empty()).then_some(d)),
    priority: fields.priority,
    status: fields.status,
    due_date: fields.due.map(|d| Some(start_of_day(d))),
  }
}

fn new_conversation(contact: String, platform: Platform) -> ConversationDraft {
  ConversationDraft {
    contact_name: contact,
    platform,
    last_message: None,
    last_message_time: None,
    unread_count: 0,
  }
}

fn short_id(id: &EntityId) -> &str {
  let s = id.as_str();
  s.get(..8).unwrap_or(s)
}

fn task_line(task: &Task) -> String {
  let check = match task.status {
    TaskStatus::Completed => "[x]",
    TaskStatus::InProgress => "[~]",
    TaskStatus::Todo => "[ ]",
  };
  let due = task
    .due_date
    .map(|d| format!("  due {}", d.format("%Y-%m-%d")))
    .unwrap_or_default();
  format!(
    "{}  {} {:<6} {}{}",
    short_id(&task.id),
    check,
    task.priority.as_str(),
    task.title,
    due
  )
}

fn resolve_id<E: Entity>(controller: &SyncController<E>, raw: &str) -> Result<EntityId, String> {
  controller.with_records(|records| resolve_in(records, E::kind(), raw))
}

/// Find a cached record by full id or unique id prefix.
fn resolve_in<E: Entity>(records: &[E], kind: EntityKind, raw: &str) -> Result<EntityId, String> {
  let raw = raw.trim();
  if let Some(exact) = records.iter().find(|r| r.id().as_str() == raw) {
    return Ok(exact.id().clone());
  }

  let mut matches = records
    .iter()
    .filter(|r| !raw.is_empty() && r.id().as_str().starts_with(raw));
  match (matches.next(), matches.next()) {
    (Some(only), None) => Ok(only.id().clone()),
    (Some(_), Some(_)) => Err(format!("Id prefix {} matches more than one {}", raw, kind)),
    (None, _) => Err(format!("No {} with id {}", kind, raw)),
  }
}
