//! The directory cache: name ↔ id mappings for users and channels, and the
//! membership set of every channel.
//!
//! The directory is a best-effort mirror of platform state. It is owned by
//! the ingestion handler, refreshed wholesale at startup and mutated by live
//! events. Search never talks to the platform; it only consults this cache.
//!
//! Names are matched case-insensitively because queries are lower-cased.

use std::collections::{HashMap, HashSet};

use crate::model::{Channel, Membership, User};

/// Cached state of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
  pub name:       String,
  pub is_private: bool,
  pub members:    HashSet<String>,
}

/// Everything needed to rebuild a [`Directory`], as persisted by a store.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
  pub users:    Vec<User>,
  pub channels: Vec<Channel>,
  pub members:  Vec<Membership>,
}

#[derive(Debug, Clone, Default)]
pub struct Directory {
  /// Lower-cased display name → user id.
  user_ids:    HashMap<String, String>,
  /// User id → display name as the platform spells it.
  user_names:  HashMap<String, String>,
  /// Lower-cased channel name → channel id.
  channel_ids: HashMap<String, String>,
  channels:    HashMap<String, ChannelEntry>,
}

impl Directory {
  pub fn new() -> Self { Self::default() }

  /// Build a directory from persisted state.
  pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
    let mut members: HashMap<String, HashSet<String>> = HashMap::new();
    for m in snapshot.members {
      members.entry(m.channel_id).or_default().insert(m.user_id);
    }

    let mut dir = Self::new();
    dir.replace_users(snapshot.users);
    dir.replace_channels(snapshot.channels.into_iter().map(|c| {
      let m = members.remove(&c.id).unwrap_or_default();
      (c, m)
    }));
    dir
  }

  // ── Lookups ─────────────────────────────────────────────────────────────

  /// Resolve a user display name to an id.
  pub fn resolve_user(&self, name: &str) -> Option<&str> {
    self.user_ids.get(&name.to_lowercase()).map(String::as_str)
  }

  /// Resolve a channel name to an id.
  pub fn resolve_channel(&self, name: &str) -> Option<&str> {
    self.channel_ids.get(&name.to_lowercase()).map(String::as_str)
  }

  pub fn user_name(&self, id: &str) -> Option<&str> {
    self.user_names.get(id).map(String::as_str)
  }

  pub fn channel_name(&self, id: &str) -> Option<&str> {
    self.channels.get(id).map(|c| c.name.as_str())
  }

  pub fn channel(&self, id: &str) -> Option<&ChannelEntry> { self.channels.get(id) }

  pub fn knows_user(&self, id: &str) -> bool { self.user_names.contains_key(id) }

  pub fn user_count(&self) -> usize { self.user_names.len() }

  pub fn channel_count(&self) -> usize { self.channels.len() }

  /// Whether `user_id` may see messages of `channel_id`: the channel is
  /// public, or the user is a recorded member. Unknown channels are hidden.
  pub fn is_visible(&self, channel_id: &str, user_id: &str) -> bool {
    self
      .channels
      .get(channel_id)
      .is_some_and(|c| !c.is_private || c.members.contains(user_id))
  }

  /// Ids of every channel `user_id` may see, sorted.
  pub fn visible_channels(&self, user_id: &str) -> Vec<String> {
    let mut ids: Vec<String> = self
      .channels
      .iter()
      .filter(|(_, c)| !c.is_private || c.members.contains(user_id))
      .map(|(id, _)| id.clone())
      .collect();
    ids.sort();
    ids
  }

  // ── Wholesale refresh ───────────────────────────────────────────────────

  /// Replace every cached user.
  pub fn replace_users(&mut self, users: impl IntoIterator<Item = User>) {
    self.user_ids.clear();
    self.user_names.clear();
    for user in users {
      self.upsert_user(user);
    }
  }

  /// Replace every cached channel together with its member set.
  pub fn replace_channels(
    &mut self,
    channels: impl IntoIterator<Item = (Channel, HashSet<String>)>,
  ) {
    self.channel_ids.clear();
    self.channels.clear();
    for (channel, members) in channels {
      self.upsert_channel(channel, members);
    }
  }

  // ── Incremental updates ─────────────────────────────────────────────────

  pub fn upsert_user(&mut self, user: User) {
    if let Some(old) = self.user_names.remove(&user.id) {
      self.forget_user_name(&old, &user.id);
    }
    self
      .user_ids
      .insert(user.display_name.to_lowercase(), user.id.clone());
    self.user_names.insert(user.id, user.display_name);
  }

  /// Give a known or unknown user a new display name. The old name stops
  /// resolving.
  pub fn rename_user(&mut self, id: &str, display_name: &str) {
    if let Some(old) = self.user_names.get(id).cloned() {
      self.forget_user_name(&old, id);
    }
    self.user_ids.insert(display_name.to_lowercase(), id.to_owned());
    self.user_names.insert(id.to_owned(), display_name.to_owned());
  }

  /// Insert or replace a channel and its full member set.
  pub fn upsert_channel(&mut self, channel: Channel, members: HashSet<String>) {
    if let Some(old) = self.channels.get(&channel.id) {
      let old_name = old.name.clone();
      self.forget_channel_name(&old_name, &channel.id);
    }
    self
      .channel_ids
      .insert(channel.name.to_lowercase(), channel.id.clone());
    self.channels.insert(channel.id, ChannelEntry {
      name: channel.name,
      is_private: channel.is_private,
      members,
    });
  }

  /// Rename a known channel. Returns `false` if the channel is not cached.
  pub fn rename_channel(&mut self, id: &str, name: &str) -> bool {
    let Some(old_name) = self.channels.get(id).map(|c| c.name.clone()) else {
      return false;
    };
    self.forget_channel_name(&old_name, id);
    self.channel_ids.insert(name.to_lowercase(), id.to_owned());
    if let Some(entry) = self.channels.get_mut(id) {
      entry.name = name.to_owned();
    }
    true
  }

  /// Record that `user_id` joined `channel_id`. Returns `false` if the
  /// channel is not cached.
  pub fn add_member(&mut self, channel_id: &str, user_id: &str) -> bool {
    match self.channels.get_mut(channel_id) {
      Some(c) => {
        c.members.insert(user_id.to_owned());
        true
      }
      None => false,
    }
  }

  /// Record that `user_id` left `channel_id`.
  pub fn remove_member(&mut self, channel_id: &str, user_id: &str) -> bool {
    match self.channels.get_mut(channel_id) {
      Some(c) => c.members.remove(user_id),
      None => false,
    }
  }

  // Only drop a name mapping that still points at `id`; another user may
  // have taken the name since.
  fn forget_user_name(&mut self, name: &str, id: &str) {
    let key = name.to_lowercase();
    if self.user_ids.get(&key).is_some_and(|v| v == id) {
      self.user_ids.remove(&key);
    }
  }

  fn forget_channel_name(&mut self, name: &str, id: &str) {
    let key = name.to_lowercase();
    if self.channel_ids.get(&key).is_some_and(|v| v == id) {
      self.channel_ids.remove(&key);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn user(id: &str, name: &str) -> User {
    User {
      id:           id.into(),
      display_name: name.into(),
      avatar:       String::new(),
    }
  }

  fn channel(id: &str, name: &str, is_private: bool) -> Channel {
    Channel { id: id.into(), name: name.into(), is_private }
  }

  fn members(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
  }

  fn sample() -> Directory {
    let mut dir = Directory::new();
    dir.replace_users([user("U1", "Alice"), user("U2", "bob")]);
    dir.replace_channels([
      (channel("C1", "general", false), members(&[])),
      (channel("G1", "secret", true), members(&["U1"])),
    ]);
    dir
  }

  #[test]
  fn resolves_names_case_insensitively() {
    let dir = sample();
    assert_eq!(dir.resolve_user("alice"), Some("U1"));
    assert_eq!(dir.resolve_user("ALICE"), Some("U1"));
    assert_eq!(dir.resolve_user("carol"), None);
    assert_eq!(dir.resolve_channel("General"), Some("C1"));
    assert_eq!(dir.user_name("U1"), Some("Alice"));
    assert_eq!(dir.channel_name("G1"), Some("secret"));
  }

  #[test]
  fn visibility_follows_membership() {
    let dir = sample();
    assert!(dir.is_visible("C1", "U2"));
    assert!(dir.is_visible("G1", "U1"));
    assert!(!dir.is_visible("G1", "U2"));
    assert!(!dir.is_visible("C404", "U1"));
    assert_eq!(dir.visible_channels("U1"), ["C1", "G1"]);
    assert_eq!(dir.visible_channels("U2"), ["C1"]);
  }

  #[test]
  fn join_and_leave() {
    let mut dir = sample();
    assert!(dir.add_member("G1", "U2"));
    assert!(dir.is_visible("G1", "U2"));
    assert!(dir.remove_member("G1", "U2"));
    assert!(!dir.is_visible("G1", "U2"));
    assert!(!dir.add_member("G404", "U2"));
  }

  #[test]
  fn rename_channel_moves_the_name() {
    let mut dir = sample();
    assert!(dir.rename_channel("C1", "announcements"));
    assert_eq!(dir.resolve_channel("announcements"), Some("C1"));
    assert_eq!(dir.resolve_channel("general"), None);
    assert!(!dir.rename_channel("C404", "nowhere"));
  }

  #[test]
  fn rename_user_moves_the_name() {
    let mut dir = sample();
    dir.rename_user("U2", "Robert");
    assert_eq!(dir.resolve_user("robert"), Some("U2"));
    assert_eq!(dir.resolve_user("bob"), None);
    assert_eq!(dir.user_name("U2"), Some("Robert"));
  }

  #[test]
  fn rename_does_not_steal_a_reused_name() {
    let mut dir = sample();
    // U3 takes the name "bob" before U2's rename arrives.
    dir.upsert_user(user("U3", "bob"));
    dir.rename_user("U2", "robert");
    assert_eq!(dir.resolve_user("bob"), Some("U3"));
  }

  #[test]
  fn refresh_is_total() {
    let mut dir = sample();
    dir.replace_users([user("U9", "zed")]);
    assert_eq!(dir.resolve_user("alice"), None);
    assert!(!dir.knows_user("U1"));
    assert!(dir.knows_user("U9"));

    dir.replace_channels([(channel("C2", "random", false), members(&[]))]);
    assert_eq!(dir.resolve_channel("general"), None);
    assert_eq!(dir.channel_count(), 1);
  }

  #[test]
  fn snapshot_rebuilds_membership() {
    let dir = Directory::from_snapshot(DirectorySnapshot {
      users:    vec![user("U1", "alice")],
      channels: vec![channel("G1", "secret", true)],
      members:  vec![Membership {
        channel_id: "G1".into(),
        user_id:    "U1".into(),
      }],
    });
    assert!(dir.is_visible("G1", "U1"));
    assert!(!dir.is_visible("G1", "U2"));
  }
}
