//! Error type for `archivist-store-sqlite`.

use archivist_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// The file was written by a newer version of the archive.
  #[error("unsupported schema version {found} (this build supports up to {supported})")]
  UnsupportedSchema { found: i32, supported: i32 },
}

impl StoreError for Error {
  /// Busy and locked databases are retryable; everything else is not.
  fn is_retryable(&self) -> bool {
    matches!(
      self,
      Error::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)))
        if matches!(
          e.code,
          rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        )
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
