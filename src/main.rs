mod app;
mod backend;
mod cli;
mod config;
mod dashboard;
mod logging;
mod models;
mod notify;
mod sync;

use clap::Parser;
use color_eyre::Result;
use std::process::ExitCode;

use cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let args = Args::parse();

  // Held until exit so buffered log lines get flushed
  let _log_guard = logging::init();

  // Local mode works without a config file
  let config = if args.local {
    config::Config::load_optional(args.config.as_deref())?.unwrap_or_default()
  } else {
    config::Config::load(args.config.as_deref())?
  };

  let mut app = app::App::new(&config, args.local)?;
  let succeeded = app.run(args.command).await?;

  Ok(if succeeded {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}
