//! Log setup. Everything goes to `<data_dir>/taskhub/logs/taskhub.log` so
//! command output on stdout stays clean.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "taskhub=info";

pub fn log_file_path() -> Option<PathBuf> {
  dirs::data_dir().map(|dir| dir.join("taskhub").join("logs").join("taskhub.log"))
}

fn filter() -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held until
/// the program exits. Falls back to stderr when the log file can't be opened.
pub fn init() -> Option<WorkerGuard> {
  let Some(path) = log_file_path() else {
    init_stderr();
    return None;
  };

  if let Some(parent) = path.parent() {
    if let Err(e) = std::fs::create_dir_all(parent) {
      eprintln!("Failed to create log directory {}: {}", parent.display(), e);
      init_stderr();
      return None;
    }
  }

  let file = match std::fs::OpenOptions::new()
    .create(true)
    .append(true)
    .open(&path)
  {
    Ok(file) => file,
    Err(e) => {
      eprintln!("Failed to open log file {}: {}", path.display(), e);
      init_stderr();
      return None;
    }
  };

  let (writer, guard) = tracing_appender::non_blocking(file);
  let subscriber = tracing_subscriber::registry().with(filter()).with(
    fmt::layer()
      .with_writer(writer)
      .with_ansi(false)
      .with_target(true),
  );

  if tracing::subscriber::set_global_default(subscriber).is_err() {
    return None;
  }
  tracing::debug!(path = %path.display(), "logging initialized");

  Some(guard)
}

fn init_stderr() {
  let subscriber = tracing_subscriber::registry()
    .with(filter())
    .with(fmt::layer().with_writer(std::io::stderr).with_target(true));

  let _ = tracing::subscriber::set_global_default(subscriber);
}
