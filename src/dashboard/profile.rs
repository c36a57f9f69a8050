//! Profile controller and avatar uploads.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::{ObjectStore, RemoteCollection};
use crate::models::{Profile, ProfileDraft, ProfilePatch};
use crate::sync::{
  EntityKind, PrincipalId, SessionListener, SyncController, SyncError, UploadRejection,
};

/// 2 MiB
pub const DEFAULT_MAX_AVATAR_BYTES: u64 = 2 * 1024 * 1024;

/// Where avatars go and how big they may be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarPolicy {
  pub bucket: String,
  pub max_bytes: u64,
}

impl Default for AvatarPolicy {
  fn default() -> Self {
    Self {
      bucket: "avatars".to_string(),
      max_bytes: DEFAULT_MAX_AVATAR_BYTES,
    }
  }
}

impl AvatarPolicy {
  /// Checks made before anything is sent: size first, then content type.
  pub fn validate(&self, upload: &AvatarUpload) -> Result<(), UploadRejection> {
    let size = upload.bytes.len() as u64;
    if size > self.max_bytes {
      return Err(UploadRejection::TooLarge {
        size,
        limit: self.max_bytes,
      });
    }

    if !upload.content_type.starts_with("image/") {
      return Err(UploadRejection::NotAnImage {
        content_type: upload.content_type.clone(),
      });
    }

    Ok(())
  }
}

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct AvatarUpload {
  pub file_name: String,
  pub content_type: String,
  pub bytes: Vec<u8>,
}

impl AvatarUpload {
  /// Read a file from disk, guessing its content type from the extension.
  pub async fn from_path(path: &Path) -> std::io::Result<Self> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    let content_type = content_type_for(&file_name).to_string();

    Ok(Self {
      file_name,
      content_type,
      bytes,
    })
  }

  /// File extension for the stored object.
  fn extension(&self) -> String {
    if let Some((_, ext)) = self.file_name.rsplit_once('.') {
      if !ext.is_empty() {
        return ext.to_lowercase();
      }
    }

    // "image/svg+xml" -> "svg"
    self
      .content_type
      .split_once('/')
      .map(|(_, subtype)| subtype.split('+').next().unwrap_or(subtype))
      .filter(|s| !s.is_empty())
      .unwrap_or("bin")
      .to_string()
  }
}

fn content_type_for(file_name: &str) -> &'static str {
  let ext = file_name
    .rsplit_once('.')
    .map(|(_, ext)| ext.to_lowercase())
    .unwrap_or_default();

  match ext.as_str() {
    "png" => "image/png",
    "jpg" | "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "avif" => "image/avif",
    "bmp" => "image/bmp",
    "svg" => "image/svg+xml",
    _ => "application/octet-stream",
  }
}

/// Object path of a principal's avatar.
fn avatar_path(owner: &PrincipalId, upload: &AvatarUpload) -> String {
  format!("{}/avatar.{}", owner, upload.extension())
}

/// Short content hash appended to the public url so a replaced avatar is
/// not served from a stale cache.
fn content_version(bytes: &[u8]) -> String {
  let digest = Sha256::digest(bytes);
  hex::encode(&digest[..6])
}

/// Profile cache for the bound principal plus avatar handling.
#[derive(Clone)]
pub struct ProfileController {
  inner: SyncController<Profile>,
  files: Arc<dyn ObjectStore>,
  policy: AvatarPolicy,
}

impl ProfileController {
  pub fn new(
    remote: Arc<dyn RemoteCollection<Profile>>,
    files: Arc<dyn ObjectStore>,
    policy: AvatarPolicy,
  ) -> Self {
    Self {
      inner: SyncController::new(remote),
      files,
      policy,
    }
  }

  pub fn profile(&self) -> Option<Profile> {
    self.inner.first()
  }

  pub async fn refetch(&self) -> Result<usize, SyncError> {
    self.inner.refetch().await
  }

  /// Create the profile row when the backend has not provisioned one.
  pub async fn create_profile(&self, draft: &ProfileDraft) -> Result<Profile, SyncError> {
    self.inner.create(draft).await
  }

  pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<Profile, SyncError> {
    let profile = self
      .profile()
      .ok_or(SyncError::NotLoaded(EntityKind::Profile))?;
    self.inner.update(&profile.id, patch).await
  }

  /// Validate, upload, and point the profile at the new avatar.
  ///
  /// Rejected files never reach the network and leave the profile as it was.
  pub async fn upload_avatar(&self, upload: AvatarUpload) -> Result<Profile, SyncError> {
    self.policy.validate(&upload)?;

    let owner = self.inner.principal().ok_or(SyncError::Unbound)?;
    if self.profile().is_none() {
      return Err(SyncError::NotLoaded(EntityKind::Profile));
    }

    let path = avatar_path(&owner, &upload);
    let version = content_version(&upload.bytes);
    let content_type = upload.content_type.clone();

    self
      .files
      .upload(&self.policy.bucket, &path, upload.bytes, &content_type)
      .await
      .map_err(|source| {
        warn!(%path, error = %source, "avatar upload failed");
        SyncError::Upload { source }
      })?;

    let mut url = self
      .files
      .public_url(&self.policy.bucket, &path)
      .map_err(|source| SyncError::Upload { source })?;
    url.query_pairs_mut().append_pair("v", &version);
    info!(%path, "avatar uploaded");

    self
      .update_profile(&ProfilePatch {
        avatar_url: Some(Some(url.to_string())),
        ..Default::default()
      })
      .await
  }
}

#[async_trait]
impl SessionListener for ProfileController {
  fn kind(&self) -> EntityKind {
    EntityKind::Profile
  }

  fn unbind(&self) {
    self.inner.detach();
  }

  fn settle(&self) {
    self.inner.settle();
  }

  async fn bind(&self, principal: &PrincipalId) -> Result<usize, SyncError> {
    self.inner.attach(principal.clone());
    self.inner.load().await
  }
}
