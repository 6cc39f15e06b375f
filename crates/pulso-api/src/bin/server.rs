//! Pulso server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, starts the job worker and the no-show sweep
//! schedule, and serves the HTTP API.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use pulso_api::{AppState, ServerConfig};
use pulso_jobs::{
  JobContext, JobsConfig, TokioDispatcher, run_cron, run_worker,
  services::{NullMessaging, NullScheduling, NullVoice},
};
use pulso_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Pulso sales orchestration server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("PULSO"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let mut jobs_cfg = JobsConfig::default();
  if let Some(number) = &server_cfg.outbound_number {
    jobs_cfg.outbound_number = number.clone();
  }
  if let Some(pattern) = &server_cfg.no_show_sweep_cron {
    jobs_cfg.no_show_sweep_cron = pattern.clone();
  }
  jobs_cfg.auto_retry_events = server_cfg.auto_retry_events;

  // Job runtime: in-process queues, one worker, the sweep schedule.
  let (dispatcher, queues) = TokioDispatcher::new();
  let ctx = Arc::new(JobContext {
    store:      store.clone(),
    dispatcher: dispatcher.clone(),
    voice:      NullVoice,
    scheduling: NullScheduling,
    messaging:  NullMessaging,
    config:     jobs_cfg.clone(),
  });
  tokio::spawn(run_worker(ctx, queues));

  let cron_dispatcher = dispatcher.clone();
  let cron_pattern = jobs_cfg.no_show_sweep_cron.clone();
  tokio::spawn(async move {
    if let Err(err) = run_cron(cron_dispatcher, &cron_pattern).await {
      tracing::error!(%err, "no-show sweep schedule stopped");
    }
  });

  // HTTP layer.
  let state = AppState {
    store:      Arc::new(store),
    dispatcher: Arc::new(dispatcher),
  };
  let app = pulso_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
