//! The ingestion handler: applies decoded events to the archive and answers
//! direct-message searches.

use std::{collections::HashSet, time::Duration};

use archivist_core::{
  directory::{Directory, DirectorySnapshot},
  event::{Event, IncomingMessage},
  model::{Membership, User},
  platform::Platform,
  search::{SearchOutcome, search_text},
  store::{ArchiveStore, StoreError},
};
use tokio::sync::mpsc;

use crate::error::HandlerError;

/// Slack's own system user; its messages are never archived.
pub const SYSTEM_USER: &str = "USLACKBOT";

/// Reply sent when a search fails for reasons the requester can't fix.
pub const UNAVAILABLE_REPLY: &str =
  "Search is temporarily unavailable. Please try again later.";

/// Reply sent when a search hits a store failure that retrying won't fix.
pub const SEARCH_FAILED_REPLY: &str =
  "Search failed. Please contact the archive administrator.";

/// Pause before repeating a call the store rejected as busy.
pub const RETRY_DELAY: Duration = Duration::from_millis(100);

type Result<T, E = HandlerError> = std::result::Result<T, E>;

/// Owns the archive, the platform client and the directory cache, and
/// handles one event at a time.
pub struct Archivist<S, P> {
  store:     S,
  platform:  P,
  directory: Directory,
  /// Authors that already triggered a user refresh without turning up.
  refreshed_for: HashSet<String>,
}

impl<S, P> Archivist<S, P>
where
  S: ArchiveStore,
  P: Platform,
{
  /// An archivist with an empty directory; call [`Self::warm_from_store`]
  /// and [`Self::refresh_directory`] before handling events.
  pub fn new(store: S, platform: P) -> Self {
    Self {
      store,
      platform,
      directory: Directory::new(),
      refreshed_for: HashSet::new(),
    }
  }

  pub fn directory(&self) -> &Directory { &self.directory }

  pub fn store(&self) -> &S { &self.store }

  pub fn platform(&self) -> &P { &self.platform }

  // ── Directory ─────────────────────────────────────────────────────────────

  /// Rebuild the directory cache from what the store last persisted.
  pub async fn warm_from_store(&mut self) -> Result<()> {
    let snapshot = self.store.load_directory().await.map_err(HandlerError::store)?;
    self.directory = Directory::from_snapshot(snapshot);
    tracing::info!(
      users = self.directory.user_count(),
      channels = self.directory.channel_count(),
      "directory warmed from store"
    );
    Ok(())
  }

  /// Fetch every user and channel from the platform, replace what the store
  /// holds with them and rebuild the cache. Users and channels the platform
  /// no longer lists are forgotten.
  pub async fn refresh_directory(&mut self) -> Result<()> {
    let users = self.platform.list_all_users().await.map_err(HandlerError::platform)?;
    let channels = self
      .platform
      .list_all_channels_with_members()
      .await
      .map_err(HandlerError::platform)?;

    let snapshot = DirectorySnapshot {
      users:    users.clone(),
      channels: channels.iter().map(|cm| cm.channel.clone()).collect(),
      members:  channels
        .iter()
        .flat_map(|cm| {
          cm.members.iter().map(|user_id| Membership {
            channel_id: cm.channel.id.clone(),
            user_id:    user_id.clone(),
          })
        })
        .collect(),
    };
    self.store.replace_directory(snapshot).await.map_err(HandlerError::store)?;

    self.directory.replace_users(users);
    self
      .directory
      .replace_channels(channels.into_iter().map(|cm| (cm.channel, cm.members)));
    self.refreshed_for.clear();

    tracing::info!(
      users = self.directory.user_count(),
      channels = self.directory.channel_count(),
      "directory refreshed"
    );
    Ok(())
  }

  /// Fetch and persist the user list only.
  pub async fn refresh_users(&mut self) -> Result<()> {
    let users = self.platform.list_all_users().await.map_err(HandlerError::platform)?;
    self.store.upsert_users(users.clone()).await.map_err(HandlerError::store)?;
    self.directory.replace_users(users);
    tracing::info!(users = self.directory.user_count(), "users refreshed");
    Ok(())
  }

  // ── Events ────────────────────────────────────────────────────────────────

  /// Process one event to completion.
  pub async fn handle(&mut self, event: Event) -> Result<()> {
    tracing::debug!(kind = event.kind(), "handling event");

    match event {
      Event::Message(message) => self.on_message(message).await,

      Event::MessageEdited { author_id, channel_id, timestamp, text } => {
        let edited = self
          .store
          .edit_message(&author_id, &channel_id, &timestamp, &text)
          .await
          .map_err(HandlerError::store)?;
        if !edited {
          tracing::debug!(%channel_id, %timestamp, "edit of a message not in the archive");
        }
        Ok(())
      }

      Event::MemberJoined { channel_id, user_id } => {
        self.on_member_joined(&channel_id, &user_id).await
      }

      Event::MemberLeft { channel_id, user_id } => {
        self
          .store
          .remove_member(&channel_id, &user_id)
          .await
          .map_err(HandlerError::store)?;
        self.directory.remove_member(&channel_id, &user_id);
        Ok(())
      }

      Event::ChannelRenamed { channel_id, name } => {
        let known = self
          .store
          .rename_channel(&channel_id, &name)
          .await
          .map_err(HandlerError::store)?;
        if self.directory.rename_channel(&channel_id, &name) || known {
          tracing::info!(%channel_id, %name, "channel renamed");
        } else {
          tracing::debug!(%channel_id, "rename of an unknown channel");
        }
        Ok(())
      }

      Event::UserChanged(user) => self.on_user_changed(user).await,

      Event::Ignored { kind } => {
        tracing::debug!(%kind, "ignoring event");
        Ok(())
      }
    }
  }

  async fn on_message(&mut self, message: IncomingMessage) -> Result<()> {
    if message.author_id == SYSTEM_USER || message.author_id == self.platform.bot_user_id() {
      return Ok(());
    }
    if message.text.is_empty() {
      return Ok(());
    }

    if message.is_direct_message {
      return self.answer(message).await;
    }

    let author_id = message.author_id.clone();
    self
      .store
      .archive_message(message.into_message())
      .await
      .map_err(HandlerError::store)?;

    // One refresh per unknown author, so a user the platform doesn't list
    // can't make every message refetch the directory.
    if !self.directory.knows_user(&author_id) && self.refreshed_for.insert(author_id.clone()) {
      tracing::info!(%author_id, "message from unknown author; refreshing users");
      self.refresh_users().await?;
    }
    Ok(())
  }

  /// Treat a direct message as a search query and reply with the results.
  /// A busy store gets one more attempt before the requester is told to try
  /// again later.
  async fn answer(&mut self, message: IncomingMessage) -> Result<()> {
    let mut result = self.search(&message).await;
    if matches!(&result, Err(e) if e.is_retryable()) {
      tracing::debug!(author_id = %message.author_id, "store busy; repeating search");
      tokio::time::sleep(RETRY_DELAY).await;
      result = self.search(&message).await;
    }

    let reply = match result {
      Ok(outcome) => outcome.render(),
      Err(e) if e.is_user_facing() => e.to_string(),
      Err(e) if e.is_retryable() => {
        tracing::warn!(author_id = %message.author_id, error = %e, "store still busy; search dropped");
        UNAVAILABLE_REPLY.to_owned()
      }
      Err(e) => {
        self
          .platform
          .send_message(&message.channel_id, SEARCH_FAILED_REPLY)
          .await
          .map_err(HandlerError::platform)?;
        return Err(HandlerError::store(e));
      }
    };

    self
      .platform
      .send_message(&message.channel_id, &reply)
      .await
      .map_err(HandlerError::platform)
  }

  async fn search(
    &self,
    message: &IncomingMessage,
  ) -> std::result::Result<SearchOutcome, archivist_core::Error> {
    search_text(&self.store, &self.directory, &message.text, &message.author_id).await
  }

  async fn on_member_joined(&mut self, channel_id: &str, user_id: &str) -> Result<()> {
    if user_id == self.platform.bot_user_id() {
      let cm = self
        .platform
        .channel_with_members(channel_id)
        .await
        .map_err(HandlerError::platform)?;
      self.store.upsert_channel(cm.channel.clone()).await.map_err(HandlerError::store)?;
      self
        .store
        .replace_members(cm.channel.id.clone(), cm.members.clone())
        .await
        .map_err(HandlerError::store)?;
      tracing::info!(channel_id, name = %cm.channel.name, "joined channel");
      self.directory.upsert_channel(cm.channel, cm.members);
      return Ok(());
    }

    if self.directory.channel(channel_id).is_none() {
      tracing::debug!(channel_id, "join to a channel the archive doesn't track");
      return Ok(());
    }
    self.store.add_member(channel_id, user_id).await.map_err(HandlerError::store)?;
    self.directory.add_member(channel_id, user_id);
    Ok(())
  }

  async fn on_user_changed(&mut self, user: User) -> Result<()> {
    self.store.upsert_users(vec![user.clone()]).await.map_err(HandlerError::store)?;
    self.refreshed_for.remove(&user.id);
    self.directory.upsert_user(user);
    Ok(())
  }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

/// Drain `events`, handling each one before taking the next. An event that
/// fails because the store was busy is handled once more after
/// [`RETRY_DELAY`]. Returns once every sender has been dropped.
pub async fn run<S, P>(mut archivist: Archivist<S, P>, mut events: mpsc::Receiver<Event>)
where
  S: ArchiveStore,
  P: Platform,
{
  while let Some(event) = events.recv().await {
    let kind = event.kind().to_owned();
    let mut result = archivist.handle(event.clone()).await;
    if let Err(e) = &result
      && e.is_retryable()
    {
      tracing::warn!(%kind, error = %e, "store busy; retrying event");
      tokio::time::sleep(RETRY_DELAY).await;
      result = archivist.handle(event).await;
    }

    match result {
      Ok(()) => {}
      Err(e) if e.is_retryable() => {
        tracing::warn!(%kind, error = %e, "store still busy; event dropped");
      }
      Err(e) => tracing::error!(%kind, error = %e, "failed to handle event"),
    }
  }
  tracing::info!("event queue closed; worker stopping");
}
