//! Error types for `archivist-core`.

use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while parsing or executing a search.
///
/// The first four variants are caused by the requester's input. Their
/// `Display` text is sent back verbatim as the bot's reply.
#[derive(Debug, Error)]
pub enum Error {
  #[error("Invalid sort order {0}")]
  InvalidSort(String),

  #[error("{0} not a valid number")]
  InvalidLimit(String),

  #[error("User {0} not found")]
  UserNotFound(String),

  #[error(
    "Channel {0} not found. Either {0} does not exist or the archive bot is \
     not a member of {0}."
  )]
  ChannelNotFound(String),

  #[error("store error: {source}")]
  Store {
    #[source]
    source:    Box<dyn std::error::Error + Send + Sync>,
    retryable: bool,
  },
}

impl Error {
  /// Wrap a backend error.
  pub fn store<E: StoreError>(e: E) -> Self {
    Self::Store { retryable: e.is_retryable(), source: Box::new(e) }
  }

  /// Whether this error stems from the requester's query and should be
  /// reported to them rather than logged as a failure.
  pub fn is_user_facing(&self) -> bool { !matches!(self, Self::Store { .. }) }
}

impl StoreError for Error {
  fn is_retryable(&self) -> bool { matches!(self, Self::Store { retryable: true, .. }) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
