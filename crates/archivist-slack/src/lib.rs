//! Slack front end for the archive.
//!
//! Exposes an axum [`Router`] receiving the Slack Events API, a Web API
//! client implementing [`Platform`](archivist_core::platform::Platform), and
//! the [`bot::Archivist`] that applies events to any
//! [`ArchiveStore`](archivist_core::store::ArchiveStore).

pub mod auth;
pub mod bot;
pub mod client;
pub mod error;
pub mod events;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use archivist_core::event::Event;
use axum::{
  Json, Router,
  body::Bytes,
  extract::State,
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use auth::{SigningSecret, verify_signature};
use events::{Envelope, decode_event};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `ARCHIVIST_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:           String,
  pub port:           u16,
  pub database_path:  PathBuf,
  /// Bot user OAuth token (`xoxb-…`).
  pub bot_token:      String,
  /// Used to verify that inbound requests come from Slack.
  pub signing_secret: String,
  pub slack_api_url:  String,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState {
  pub signing: Arc<SigningSecret>,
  /// Decoded events are queued here for the event worker.
  pub events:  mpsc::Sender<Event>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the Events API endpoint.
pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/slack/events", post(events_handler))
    .route("/health", get(health))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

async fn health() -> &'static str { "ok" }

/// Verify, decode and enqueue; the worker does the rest.
async fn events_handler(
  State(state): State<AppState>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Response, Error> {
  verify_signature(&headers, &body, &state.signing, chrono::Utc::now().timestamp())?;

  let envelope: Envelope =
    serde_json::from_slice(&body).map_err(|e| Error::BadRequest(e.to_string()))?;

  match envelope {
    Envelope::UrlVerification { challenge } => {
      Ok(Json(json!({ "challenge": challenge })).into_response())
    }
    Envelope::EventCallback { event, event_id } => {
      let event = decode_event(event).map_err(|e| Error::BadRequest(e.to_string()))?;
      tracing::debug!(event_id = ?event_id, kind = event.kind(), "event received");
      state.events.send(event).await.map_err(|_| Error::Unavailable)?;
      Ok(StatusCode::OK.into_response())
    }
    Envelope::Other => Ok(StatusCode::OK.into_response()),
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
