use std::fmt;

use super::traits::EntityKind;
use crate::backend::RemoteError;

/// Mutating operations a controller performs against the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  Create,
  Update,
  Delete,
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Operation::Create => "create",
      Operation::Update => "update",
      Operation::Delete => "delete",
    })
  }
}

/// Why an upload was refused before anything was sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
  #[error("file is {size} bytes, the limit is {limit} bytes")]
  TooLarge { size: u64, limit: u64 },

  #[error("content type {content_type:?} is not an image")]
  NotAnImage { content_type: String },
}

/// Outcome of a failed sync operation.
///
/// None of these are fatal: the cache keeps its last confirmed state and the
/// caller may simply repeat the operation.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
  #[error("failed to load {kind} records: {source}")]
  Load {
    kind: EntityKind,
    source: RemoteError,
  },

  #[error("failed to {op} {kind}: {source}")]
  Mutation {
    op: Operation,
    kind: EntityKind,
    source: RemoteError,
  },

  #[error("failed to upload file: {source}")]
  Upload { source: RemoteError },

  #[error("function {name} failed: {source}")]
  Function { name: String, source: RemoteError },

  #[error("upload rejected: {0}")]
  Rejected(#[from] UploadRejection),

  #[error("no principal is bound to this session")]
  Unbound,

  #[error("no conversation is selected")]
  NoConversation,

  #[error("no {0} has been loaded")]
  NotLoaded(EntityKind),
}

impl SyncError {
  pub(crate) fn mutation(op: Operation, kind: EntityKind) -> impl FnOnce(RemoteError) -> Self {
    move |source| SyncError::Mutation { op, kind, source }
  }

  /// True when the failure was decided locally, without a remote call.
  pub fn is_local(&self) -> bool {
    match self {
      SyncError::Rejected(_)
      | SyncError::Unbound
      | SyncError::NoConversation
      | SyncError::NotLoaded(_) => true,
      SyncError::Load { .. }
      | SyncError::Mutation { .. }
      | SyncError::Upload { .. }
      | SyncError::Function { .. } => false,
    }
  }
}
