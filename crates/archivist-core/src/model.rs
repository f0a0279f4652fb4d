//! Archive entities.
//!
//! [`Message`] is the only entity the archive is authoritative for. Users,
//! channels and memberships mirror platform state and are refreshed from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Message ─────────────────────────────────────────────────────────────────

/// An archived chat message.
///
/// `(channel_id, timestamp)` identifies a message; archiving the same pair
/// twice replaces the earlier row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  pub text:             String,
  /// Soft reference to [`User::id`]; the author may not be known yet.
  pub author_id:        String,
  pub channel_id:       String,
  /// Platform timestamp in `"seconds.micros"` form, e.g. `"1512345678.000200"`.
  pub timestamp:        String,
  pub thread_timestamp: Option<String>,
}

impl Message {
  /// The timestamp as a UTC instant, if it parses.
  pub fn sent_at(&self) -> Option<DateTime<Utc>> { parse_timestamp(&self.timestamp) }
}

/// Parse a `"seconds.micros"` platform timestamp.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
  let (secs, frac) = ts.split_once('.').unwrap_or((ts, ""));
  let secs: i64 = secs.parse().ok()?;
  let micros: u32 = if frac.is_empty() {
    0
  } else {
    // Right-pad so "5" reads as 500000 µs.
    let digits: String = frac.chars().chain(std::iter::repeat('0')).take(6).collect();
    digits.parse().ok()?
  };
  DateTime::from_timestamp(secs, micros * 1_000)
}

// ─── Directory entities ──────────────────────────────────────────────────────

/// A platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id:           String,
  pub display_name: String,
  /// URL of the user's avatar image.
  pub avatar:       String,
}

/// A platform channel the bot is a member of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
  pub id:         String,
  pub name:       String,
  pub is_private: bool,
}

/// One `(channel, user)` membership pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Membership {
  pub channel_id: String,
  pub user_id:    String,
}
