use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::dashboard::{AvatarPolicy, DEFAULT_MAX_AVATAR_BYTES};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub backend: BackendConfig,
  /// Settings for running against the embedded local backend
  pub local: Option<LocalConfig>,
  #[serde(default)]
  pub uploads: UploadsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Project url, e.g. https://abcd.supabase.co
  #[serde(default)]
  pub url: String,
  /// Public (anon) API key. TASKHUB_ANON_KEY takes precedence.
  pub anon_key: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for BackendConfig {
  fn default() -> Self {
    Self {
      url: String::new(),
      anon_key: None,
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
  /// SQLite database file (default: <data_dir>/taskhub/taskhub.db)
  pub database: Option<PathBuf>,
  /// Directory for uploaded files (default: <data_dir>/taskhub/files)
  pub files: Option<PathBuf>,
  #[serde(default = "default_principal_id")]
  pub principal_id: String,
  pub email: Option<String>,
}

impl Default for LocalConfig {
  fn default() -> Self {
    Self {
      database: None,
      files: None,
      principal_id: default_principal_id(),
      email: None,
    }
  }
}

fn default_principal_id() -> String {
  "local".to_string()
}

fn data_dir() -> PathBuf {
  dirs::data_dir()
    .map(|d| d.join("taskhub"))
    .unwrap_or_else(|| PathBuf::from(".taskhub"))
}

impl LocalConfig {
  pub fn database_path(&self) -> PathBuf {
    self
      .database
      .clone()
      .unwrap_or_else(|| data_dir().join("taskhub.db"))
  }

  pub fn files_root(&self) -> PathBuf {
    self.files.clone().unwrap_or_else(|| data_dir().join("files"))
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadsConfig {
  #[serde(default = "default_avatar_bucket")]
  pub avatar_bucket: String,
  #[serde(default = "default_max_avatar_bytes")]
  pub max_avatar_bytes: u64,
}

impl Default for UploadsConfig {
  fn default() -> Self {
    Self {
      avatar_bucket: default_avatar_bucket(),
      max_avatar_bytes: default_max_avatar_bytes(),
    }
  }
}

fn default_avatar_bucket() -> String {
  "avatars".to_string()
}

fn default_max_avatar_bytes() -> u64 {
  DEFAULT_MAX_AVATAR_BYTES
}

impl UploadsConfig {
  pub fn avatar_policy(&self) -> AvatarPolicy {
    AvatarPolicy {
      bucket: self.avatar_bucket.clone(),
      max_bytes: self.max_avatar_bytes,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./taskhub.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/taskhub/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    Self::load_optional(explicit_path)?.ok_or_else(|| {
      eyre!(
        "No configuration file found. Create one at ~/.config/taskhub/config.yaml\n\
         or pass --local to use the embedded backend."
      )
    })
  }

  /// Like [`Config::load`], but a missing default config file is not an error.
  pub fn load_optional(explicit_path: Option<&Path>) -> Result<Option<Self>> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    path.map(|p| Self::load_from_path(&p)).transpose()
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("taskhub.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("taskhub").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file is a valid, all-default config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Local backend settings, defaulted when the section is absent.
  pub fn local(&self) -> LocalConfig {
    self.local.clone().unwrap_or_default()
  }

  /// The anon key: TASKHUB_ANON_KEY, else `backend.anon_key`.
  pub fn anon_key(&self) -> Result<String> {
    std::env::var("TASKHUB_ANON_KEY")
      .ok()
      .or_else(|| self.backend.anon_key.clone())
      .ok_or_else(|| {
        eyre!("Backend anon key not found. Set backend.anon_key or TASKHUB_ANON_KEY.")
      })
  }

  /// Get the session access token from environment variables.
  ///
  /// Checks TASKHUB_ACCESS_TOKEN first, then SUPABASE_ACCESS_TOKEN as fallback.
  pub fn get_access_token() -> Result<String> {
    std::env::var("TASKHUB_ACCESS_TOKEN")
      .or_else(|_| std::env::var("SUPABASE_ACCESS_TOKEN"))
      .map_err(|_| {
        eyre!(
          "Access token not found. Set TASKHUB_ACCESS_TOKEN or SUPABASE_ACCESS_TOKEN environment variable."
        )
      })
  }
}
