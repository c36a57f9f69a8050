use async_trait::async_trait;
use std::path::{Path, PathBuf};
use url::Url;

use super::{ObjectStore, RemoteError};

/// Object store backed by a directory, one subdirectory per bucket.
pub struct LocalObjectStore {
  root: PathBuf,
}

impl LocalObjectStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn object_path(&self, bucket: &str, path: &str) -> Result<PathBuf, RemoteError> {
    let relative = Path::new(path);
    // Keep objects inside their bucket
    if relative.is_absolute()
      || relative
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
      return Err(RemoteError::Unsupported("object path escapes its bucket"));
    }
    Ok(self.root.join(bucket).join(relative))
  }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
  async fn upload(
    &self,
    bucket: &str,
    path: &str,
    bytes: Vec<u8>,
    _content_type: &str,
  ) -> Result<(), RemoteError> {
    let target = self.object_path(bucket, path)?;
    if let Some(parent) = target.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&target, bytes).await?;
    Ok(())
  }

  fn public_url(&self, bucket: &str, path: &str) -> Result<Url, RemoteError> {
    let target = self.object_path(bucket, path)?;
    let absolute = if target.is_absolute() {
      target
    } else {
      std::env::current_dir()?.join(target)
    };
    Url::from_file_path(&absolute)
      .map_err(|_| RemoteError::Unsupported("object path cannot be expressed as a file url"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_upload_overwrites_and_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(dir.path());

    store
      .upload("avatars", "u-1/avatar.png", vec![1, 2, 3], "image/png")
      .await
      .unwrap();
    store
      .upload("avatars", "u-1/avatar.png", vec![4], "image/png")
      .await
      .unwrap();

    let stored = std::fs::read(dir.path().join("avatars/u-1/avatar.png")).unwrap();
    assert_eq!(stored, vec![4]);

    let url = store.public_url("avatars", "u-1/avatar.png").unwrap();
    assert_eq!(url.scheme(), "file");
    assert!(url.path().ends_with("/avatars/u-1/avatar.png"));
  }

  #[tokio::test]
  async fn test_rejects_parent_components() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(dir.path());

    let result = store
      .upload("avatars", "../escape.png", vec![0], "image/png")
      .await;
    assert!(matches!(result, Err(RemoteError::Unsupported(_))));
  }
}
