//! The `ArchiveStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `archivist-store-sqlite`). The search executor and the ingestion handler
//! depend on this abstraction, not on any concrete backend.

use std::{collections::HashSet, future::Future};

use crate::{
  directory::DirectorySnapshot,
  model::{Channel, Message, User},
  query::Sort,
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`ArchiveStore::search_messages`], with every name already
/// resolved to an id.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
  /// `LIKE` pattern over message text, escaped with `\`.
  pub pattern:          String,
  pub author_id:        Option<String>,
  pub channel_id:       Option<String>,
  /// Only messages from these channels may be returned. Empty means none.
  pub visible_channels: Vec<String>,
  pub sort:             Sort,
  pub limit:            usize,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// A failure reported by an [`ArchiveStore`].
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// Whether the call failed only because the store was momentarily busy,
  /// so the same call may succeed if repeated.
  fn is_retryable(&self) -> bool { false }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an archive backend.
///
/// Writes follow replace-on-conflict: a message with an existing
/// `(channel_id, timestamp)`, or a user or channel with an existing id,
/// overwrites the earlier row instead of failing.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait ArchiveStore: Send + Sync {
  type Error: StoreError;

  // ── Messages ──────────────────────────────────────────────────────────

  /// Insert or replace a message.
  fn archive_message(
    &self,
    message: Message,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Replace the text of the message identified by author, channel and
  /// timestamp. Returns whether a row was updated.
  fn edit_message<'a>(
    &'a self,
    author_id: &'a str,
    channel_id: &'a str,
    timestamp: &'a str,
    text: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Matching messages, filtered, ordered and truncated as `query` asks.
  fn search_messages<'a>(
    &'a self,
    query: &'a MessageQuery,
  ) -> impl Future<Output = Result<Vec<Message>, Self::Error>> + Send + 'a;

  // ── Directory ─────────────────────────────────────────────────────────

  /// Insert or replace users.
  fn upsert_users(
    &self,
    users: Vec<User>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Insert or replace a channel.
  fn upsert_channel(
    &self,
    channel: Channel,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Change a channel's name. Returns whether the channel existed.
  fn rename_channel<'a>(
    &'a self,
    channel_id: &'a str,
    name: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Replace the whole member set of a channel.
  fn replace_members(
    &self,
    channel_id: String,
    members: HashSet<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn add_member<'a>(
    &'a self,
    channel_id: &'a str,
    user_id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn remove_member<'a>(
    &'a self,
    channel_id: &'a str,
    user_id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Replace every persisted user, channel and membership with `snapshot`
  /// in one transaction. Rows the snapshot doesn't mention are deleted.
  fn replace_directory(
    &self,
    snapshot: DirectorySnapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Read back every persisted user, channel and membership.
  fn load_directory(
    &self,
  ) -> impl Future<Output = Result<DirectorySnapshot, Self::Error>> + Send + '_;
}
