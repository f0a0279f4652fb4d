//! archivist server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) and `ARCHIVIST_*`
//! environment variables, opens the SQLite archive, syncs the directory from
//! Slack and serves the Events API endpoint over HTTP.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use archivist_slack::{
  AppState, ServerConfig,
  auth::SigningSecret,
  bot::{self, Archivist},
  client::SlackClient,
};
use archivist_store_sqlite::SqliteStore;
use clap::Parser;
use tokio::{net::TcpListener, sync::mpsc};
use tracing_subscriber::EnvFilter;

/// Events buffered between the HTTP handler and the worker.
const EVENT_QUEUE_CAPACITY: usize = 1024;

#[derive(Parser)]
#[command(author, version, about = "Slack archive bot")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Path to the SQLite archive; overrides the config file.
  #[arg(long)]
  database_path: Option<PathBuf>,

  /// Port to listen on; overrides the config file.
  #[arg(short, long)]
  port: Option<u16>,

  /// Default log level when `RUST_LOG` is unset.
  #[arg(long, default_value = "info")]
  log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
    )
    .init();

  // Load configuration.
  let settings = config::Config::builder()
    .set_default("host", "0.0.0.0")?
    .set_default("port", 3333)?
    .set_default("database_path", "slack.sqlite")?
    .set_default("slack_api_url", "https://slack.com/api")?
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("ARCHIVIST"))
    .set_override_option(
      "database_path",
      cli.database_path.map(|p| p.to_string_lossy().into_owned()),
    )?
    .set_override_option("port", cli.port.map(i64::from))?
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in the database path.
  let database_path = expand_tilde(&server_cfg.database_path);

  // Open SQLite store.
  let store = SqliteStore::open(&database_path)
    .await
    .with_context(|| format!("failed to open archive at {database_path:?}"))?;
  tracing::info!(
    path = %database_path.display(),
    messages = store.message_count().await?,
    "archive opened"
  );

  let slack = SlackClient::connect(&server_cfg.slack_api_url, &server_cfg.bot_token)
    .await
    .context("failed to authenticate with slack")?;

  // Warm the cache first so searches work even if the platform sync fails.
  let mut archivist = Archivist::new(store, slack);
  archivist
    .warm_from_store()
    .await
    .context("failed to load directory from archive")?;
  if let Err(e) = archivist.refresh_directory().await {
    tracing::warn!(error = %e, "directory refresh failed; serving cached directory");
  }

  let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
  tokio::spawn(bot::run(archivist, rx));

  let state = AppState {
    signing: Arc::new(SigningSecret::new(server_cfg.signing_secret.clone())),
    events:  tx,
  };

  let app = archivist_slack::router(state);
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
