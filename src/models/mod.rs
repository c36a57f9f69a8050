//! Record types for every synced entity kind.

mod conversation;
mod profile;
mod task;

pub use conversation::{
  Conversation, ConversationDraft, ConversationPatch, Message, MessageDraft, MessagePatch,
  Platform,
};
pub use profile::{Profile, ProfileDraft, ProfilePatch};
pub use task::{Priority, Task, TaskDraft, TaskPatch, TaskStatus};
