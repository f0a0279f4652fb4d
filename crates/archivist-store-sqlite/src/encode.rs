//! Row mapping between SQLite columns and archive entities.
//!
//! Column names follow the legacy archive layout (`message`, `user`,
//! `channel`), so the `*_COLUMNS` lists and the `*_from_row` readers must be
//! kept in the same order.

use archivist_core::{
  model::{Channel, Membership, Message, User},
  query::Sort,
};
use rusqlite::Row;

pub const MESSAGE_COLUMNS: &str = "message, user, channel, timestamp, thread_timestamp";
pub const USER_COLUMNS: &str = "id, name, avatar";
pub const CHANNEL_COLUMNS: &str = "id, name, is_private";
pub const MEMBER_COLUMNS: &str = "channel, user";

pub fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
  Ok(Message {
    text:             row.get::<_, Option<String>>(0)?.unwrap_or_default(),
    author_id:        row.get::<_, Option<String>>(1)?.unwrap_or_default(),
    channel_id:       row.get(2)?,
    timestamp:        row.get(3)?,
    thread_timestamp: row.get(4)?,
  })
}

pub fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
  Ok(User {
    id:           row.get(0)?,
    display_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
    avatar:       row.get::<_, Option<String>>(2)?.unwrap_or_default(),
  })
}

pub fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<Channel> {
  Ok(Channel {
    id:         row.get(0)?,
    name:       row.get::<_, Option<String>>(1)?.unwrap_or_default(),
    is_private: row.get(2)?,
  })
}

pub fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<Membership> {
  Ok(Membership {
    channel_id: row.get(0)?,
    user_id:    row.get(1)?,
  })
}

/// `ORDER BY` clause for a requested sort. Timestamps are compared by their
/// numeric value; unspecified order is insertion order.
pub fn order_by(sort: Sort) -> &'static str {
  match sort {
    Sort::Ascending => "ORDER BY CAST(timestamp AS REAL) ASC, timestamp ASC",
    Sort::Descending => "ORDER BY CAST(timestamp AS REAL) DESC, timestamp DESC",
    Sort::Unspecified => "ORDER BY rowid ASC",
  }
}
