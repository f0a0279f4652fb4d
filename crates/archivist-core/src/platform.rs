//! The messaging platform as seen from the archive: a directory source and a
//! reply channel.

use std::{collections::HashSet, future::Future};

use crate::model::{Channel, User};

/// A channel together with the ids of its members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMembers {
  pub channel: Channel,
  pub members: HashSet<String>,
}

/// Calls the archive makes out to the messaging platform.
///
/// Implementations are responsible for pagination and rate-limit retries.
pub trait Platform: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The bot's own user id; its messages are never archived.
  fn bot_user_id(&self) -> &str;

  /// Every user of the workspace.
  fn list_all_users(
    &self,
  ) -> impl Future<Output = Result<Vec<User>, Self::Error>> + Send + '_;

  /// Every channel the bot belongs to, with its members.
  fn list_all_channels_with_members(
    &self,
  ) -> impl Future<Output = Result<Vec<ChannelMembers>, Self::Error>> + Send + '_;

  /// One channel with its members, e.g. right after the bot was added to it.
  fn channel_with_members<'a>(
    &'a self,
    channel_id: &'a str,
  ) -> impl Future<Output = Result<ChannelMembers, Self::Error>> + Send + 'a;

  /// Post `text` to `destination` (a channel or direct-message id).
  fn send_message<'a>(
    &'a self,
    destination: &'a str,
    text: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
