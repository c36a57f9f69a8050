use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::sync::{Entity, EntityId, EntityKind, OrderBy, PrincipalId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
}

impl Priority {
  pub fn as_str(&self) -> &'static str {
    match self {
      Priority::Low => "low",
      Priority::Medium => "medium",
      Priority::High => "high",
    }
  }
}

impl fmt::Display for Priority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Priority {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "low" => Ok(Priority::Low),
      "medium" => Ok(Priority::Medium),
      "high" => Ok(Priority::High),
      other => Err(format!("unknown priority '{}' (low, medium, high)", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  #[default]
  Todo,
  InProgress,
  Completed,
}

impl TaskStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      TaskStatus::Todo => "todo",
      TaskStatus::InProgress => "in_progress",
      TaskStatus::Completed => "completed",
    }
  }

  /// Human label used for tabs and listings.
  pub fn label(&self) -> &'static str {
    match self {
      TaskStatus::Todo => "To Do",
      TaskStatus::InProgress => "In Progress",
      TaskStatus::Completed => "Completed",
    }
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TaskStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
      "todo" | "to_do" => Ok(TaskStatus::Todo),
      "in_progress" => Ok(TaskStatus::InProgress),
      "completed" | "done" => Ok(TaskStatus::Completed),
      other => Err(format!(
        "unknown status '{}' (todo, in_progress, completed)",
        other
      )),
    }
  }
}

/// A task as persisted by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
  pub id: EntityId,
  #[serde(rename = "user_id")]
  pub owner_id: PrincipalId,
  pub title: String,
  pub description: Option<String>,
  pub priority: Priority,
  pub status: TaskStatus,
  pub due_date: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a task.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskDraft {
  pub title: String,
  pub description: Option<String>,
  pub priority: Priority,
  pub status: TaskStatus,
  pub due_date: Option<DateTime<Utc>>,
}

/// Changed fields of a task. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<Option<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<TaskStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_date: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
  /// Patch for ticking or unticking a task's checkbox.
  pub fn completion(checked: bool) -> Self {
    Self {
      status: Some(if checked {
        TaskStatus::Completed
      } else {
        TaskStatus::Todo
      }),
      ..Default::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    self.title.is_none()
      && self.description.is_none()
      && self.priority.is_none()
      && self.status.is_none()
      && self.due_date.is_none()
  }
}

impl Entity for Task {
  type Draft = TaskDraft;
  type Patch = TaskPatch;

  fn id(&self) -> &EntityId {
    &self.id
  }

  fn owner_id(&self) -> &PrincipalId {
    &self.owner_id
  }

  fn kind() -> EntityKind {
    EntityKind::Task
  }

  fn default_order() -> OrderBy {
    OrderBy::desc("created_at")
  }
}
