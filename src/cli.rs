use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::models::{Platform, Priority, TaskStatus};

#[derive(Parser, Debug)]
#[command(name = "taskhub")]
#[command(about = "Tasks and conversations from your dashboard, on the command line")]
#[command(version)]
pub struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/taskhub/config.yaml)
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  /// Use the embedded local backend instead of the hosted one
  #[arg(long, global = true)]
  pub local: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Manage tasks
  #[command(subcommand)]
  Tasks(TaskCommand),

  /// Browse conversations
  #[command(subcommand)]
  Conversations(ConversationCommand),

  /// Read and send messages in a conversation
  #[command(subcommand)]
  Messages(MessageCommand),

  /// Show or edit your profile
  #[command(subcommand)]
  Profile(ProfileCommand),

  /// Ask for reply suggestions
  Suggest {
    /// Conversation text to base suggestions on
    #[arg(required = true, num_args = 1..)]
    context: Vec<String>,
  },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
  /// List tasks, newest first
  #[command(alias = "ls")]
  List {
    /// Case-insensitive search over title and description
    #[arg(short, long, default_value = "")]
    search: String,

    /// Only tasks with this status (todo, in_progress, completed)
    #[arg(long)]
    status: Option<TaskStatus>,
  },

  /// Create a task
  Add {
    title: String,
    #[command(flatten)]
    fields: TaskFields,
  },

  /// Change fields of a task
  Update {
    /// Task id or unique id prefix
    id: String,

    #[arg(short, long)]
    title: Option<String>,

    #[command(flatten)]
    fields: TaskFields,
  },

  /// Mark a task completed
  Done { id: String },

  /// Move a task back to todo
  Reopen { id: String },

  /// Delete a task
  #[command(alias = "delete")]
  Rm { id: String },

  /// Task counters
  Stats,
}

#[derive(ClapArgs, Debug, Default)]
pub struct TaskFields {
  #[arg(short, long)]
  pub description: Option<String>,

  /// low, medium or high
  #[arg(short, long)]
  pub priority: Option<Priority>,

  /// todo, in_progress or completed
  #[arg(long)]
  pub status: Option<TaskStatus>,

  /// Due date, YYYY-MM-DD
  #[arg(long)]
  pub due: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
pub enum ConversationCommand {
  /// List conversations, most recent activity first
  #[command(alias = "ls")]
  List {
    #[arg(short, long, default_value = "")]
    search: String,

    /// whatsapp, telegram, messenger, discord or slack
    #[arg(long)]
    platform: Option<Platform>,
  },

  /// Start tracking a conversation
  Add {
    contact: String,

    #[arg(long)]
    platform: Platform,
  },

  /// Stop tracking a conversation
  Rm { id: String },
}

#[derive(Subcommand, Debug)]
pub enum MessageCommand {
  /// Show the messages of a conversation and mark it read
  #[command(alias = "ls")]
  List { conversation: String },

  /// Send a message into a conversation
  Send {
    conversation: String,
    #[arg(required = true, num_args = 1..)]
    text: Vec<String>,
  },

  /// Replace the text of a message
  Edit {
    conversation: String,
    id: String,
    #[arg(required = true, num_args = 1..)]
    text: Vec<String>,
  },

  /// Delete a message
  Rm { conversation: String, id: String },
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
  /// Show the current profile
  Show,

  /// Change the display name
  Rename {
    #[arg(required = true, num_args = 1..)]
    name: Vec<String>,
  },

  /// Upload a new avatar image
  Avatar { path: PathBuf },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_task_add() {
    let args = Args::parse_from([
      "taskhub",
      "tasks",
      "add",
      "Buy milk",
      "--priority",
      "high",
      "--due",
      "2026-10-20",
    ]);
    match args.command {
      Command::Tasks(TaskCommand::Add { title, fields }) => {
        assert_eq!(title, "Buy milk");
        assert_eq!(fields.priority, Some(Priority::High));
        assert_eq!(fields.due, NaiveDate::from_ymd_opt(2026, 10, 20));
        assert!(fields.status.is_none());
      }
      other => panic!("unexpected command: {:?}", other),
    }
  }

  #[test]
  fn test_global_flags_after_subcommand() {
    let args = Args::parse_from(["taskhub", "tasks", "list", "--status", "in_progress", "--local"]);
    assert!(args.local);
    assert!(matches!(
      args.command,
      Command::Tasks(TaskCommand::List {
        status: Some(TaskStatus::InProgress),
        ..
      })
    ));
  }

  #[test]
  fn test_rejects_unknown_platform() {
    let result = Args::try_parse_from(["taskhub", "conversations", "list", "--platform", "icq"]);
    assert!(result.is_err());
  }

  #[test]
  fn test_parse_message_edit() {
    let args = Args::parse_from(["taskhub", "messages", "edit", "c1", "m1", "see", "you"]);
    match args.command {
      Command::Messages(MessageCommand::Edit {
        conversation,
        id,
        text,
      }) => {
        assert_eq!(conversation, "c1");
        assert_eq!(id, "m1");
        assert_eq!(text, vec!["see", "you"]);
      }
      other => panic!("unexpected command: {:?}", other),
    }
  }

  #[test]
  fn test_cli_definition() {
    use clap::CommandFactory;
    Args::command().debug_assert();
  }
}
