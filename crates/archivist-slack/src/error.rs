//! Error types and axum `IntoResponse` implementation.

use archivist_core::store::StoreError;
use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
};
use thiserror::Error;

/// An error returned by the HTTP layer.
#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,
  #[error("bad request: {0}")]
  BadRequest(String),
  /// The event worker has shut down.
  #[error("event queue closed")]
  Unavailable,
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => {
        (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
      }
      Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
      Error::Unavailable => {
        (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response()
      }
    }
  }
}

/// A failure while handling one inbound event.
#[derive(Debug, Error)]
pub enum HandlerError {
  #[error("store error: {source}")]
  Store {
    #[source]
    source:    Box<dyn std::error::Error + Send + Sync>,
    retryable: bool,
  },
  #[error("platform error: {0}")]
  Platform(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
  pub fn store<E: StoreError>(e: E) -> Self {
    Self::Store { retryable: e.is_retryable(), source: Box::new(e) }
  }

  pub fn platform<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Platform(Box::new(e))
  }

  /// Whether handling the same event again may succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Store { retryable: true, .. })
  }
}
