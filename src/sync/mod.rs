//! Client-side synchronization core.
//!
//! Each entity kind gets a [`SyncController`] owning an in-memory ordered
//! cache of one remote collection:
//! - `load` replaces the cache wholesale from the remote list
//! - `create`/`update`/`delete` mutate the cache only after the remote call
//!   succeeds, so the cache never shows state the backend has not committed
//! - failures leave the cache as it was and come back as [`SyncError`]
//!
//! [`SessionBinding`] clears and reloads every registered controller when the
//! signed-in principal changes.

mod controller;
mod error;
mod session;
mod traits;

#[cfg(test)]
pub mod testing;

pub use controller::SyncController;
pub use error::{Operation, SyncError, UploadRejection};
pub use session::{BindReport, Principal, SessionBinding, SessionListener};
pub use traits::{Entity, EntityId, EntityKind, Filter, ListQuery, OrderBy, PrincipalId};
