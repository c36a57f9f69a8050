//! Turning operation outcomes into user-facing notices.
//!
//! Controllers only return results; whoever drives them passes each outcome
//! through [`report`] to decide what the user sees.

use std::fmt;
use tracing::{debug, info, warn};

use crate::sync::{EntityKind, Operation, SyncError, UploadRejection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
  Success,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub level: NoticeLevel,
  pub message: String,
}

impl Notice {
  pub fn success(message: impl Into<String>) -> Self {
    Self {
      level: NoticeLevel::Success,
      message: message.into(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      level: NoticeLevel::Error,
      message: message.into(),
    }
  }
}

impl fmt::Display for Notice {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.message)
  }
}

/// Destination for notices.
pub trait Notifier: Send + Sync {
  fn notify(&self, notice: Notice);
}

/// Sends notices to the log only.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
  fn notify(&self, notice: Notice) {
    match notice.level {
      NoticeLevel::Success => info!(notice = %notice, "notice"),
      NoticeLevel::Error => warn!(notice = %notice, "notice"),
    }
  }
}

/// Prints notices for the command line: successes on stdout, errors on stderr.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
  fn notify(&self, notice: Notice) {
    TracingNotifier.notify(notice.clone());
    match notice.level {
      NoticeLevel::Success => println!("{}", notice),
      NoticeLevel::Error => eprintln!("error: {}", notice),
    }
  }
}

/// What the user asked for, used to word the notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Load(EntityKind),
  Mutate(Operation, EntityKind),
  UpdateProfile,
  UploadAvatar,
  Suggest,
}

fn capitalize(word: &str) -> String {
  let mut chars = word.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

fn past_tense(op: Operation) -> &'static str {
  match op {
    Operation::Create => "created",
    Operation::Update => "updated",
    Operation::Delete => "deleted",
  }
}

fn load_subject(kind: EntityKind) -> &'static str {
  match kind {
    EntityKind::Profile => kind.label(),
    _ => kind.table(),
  }
}

/// "2MB" for whole mebibytes, otherwise the byte count.
fn size_limit(bytes: u64) -> String {
  const MIB: u64 = 1024 * 1024;
  if bytes >= MIB && bytes % MIB == 0 {
    format!("{}MB", bytes / MIB)
  } else {
    format!("{} bytes", bytes)
  }
}

impl Action {
  /// Notice for a successful outcome. Loads and suggestions succeed quietly.
  pub fn success(&self) -> Option<Notice> {
    match self {
      Action::Load(_) | Action::Suggest => None,
      Action::Mutate(op, kind) => Some(Notice::success(format!(
        "{} {} successfully",
        capitalize(kind.label()),
        past_tense(*op)
      ))),
      Action::UpdateProfile | Action::UploadAvatar => {
        Some(Notice::success("Profile updated successfully"))
      }
    }
  }

  /// Notice for a failed outcome. Local rejections say what was wrong;
  /// everything else gets a generic message.
  pub fn failure(&self, error: &SyncError) -> Notice {
    match error {
      SyncError::Rejected(UploadRejection::TooLarge { limit, .. }) => Notice::error(format!(
        "File size must be less than {}",
        size_limit(*limit)
      )),
      SyncError::Rejected(UploadRejection::NotAnImage { .. }) => {
        Notice::error("File must be an image")
      }
      SyncError::NoConversation => Notice::error("Select a conversation first"),
      _ => Notice::error(match self {
        Action::Load(kind) => format!("Failed to load {}", load_subject(*kind)),
        Action::Mutate(op, kind) => format!("Failed to {} {}", op, kind.label()),
        Action::UpdateProfile => "Failed to update profile".to_string(),
        Action::UploadAvatar => "Failed to upload avatar".to_string(),
        Action::Suggest => "Failed to generate suggestions".to_string(),
      }),
    }
  }
}

/// Tell the user how an operation went.
pub fn report<T>(notifier: &dyn Notifier, action: Action, outcome: &Result<T, SyncError>) {
  match outcome {
    Ok(_) => {
      if let Some(notice) = action.success() {
        notifier.notify(notice);
      }
    }
    Err(e) => {
      if e.is_local() {
        debug!(?action, error = %e, "operation refused locally");
      } else {
        warn!(?action, error = %e, "operation failed");
      }
      notifier.notify(action.failure(e));
    }
  }
}

#[cfg(test)]
pub mod testing {
  use super::*;
  use std::sync::Mutex;

  /// Keeps every notice it receives.
  #[derive(Default)]
  pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
  }

  impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
      self.notices.lock().unwrap().clone()
    }
  }

  impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
      self.notices.lock().unwrap().push(notice);
    }
  }
}
