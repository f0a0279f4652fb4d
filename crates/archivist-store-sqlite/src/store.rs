//! [`SqliteStore`] — the SQLite implementation of [`ArchiveStore`].

use std::{collections::HashSet, path::Path, time::Duration};

use archivist_core::{
  directory::DirectorySnapshot,
  model::{Channel, Message, User},
  store::{ArchiveStore, MessageQuery},
};
use rusqlite::types::Value;

use crate::{
  Error, Result,
  encode::{
    CHANNEL_COLUMNS, MEMBER_COLUMNS, MESSAGE_COLUMNS, USER_COLUMNS, channel_from_row,
    membership_from_row, message_from_row, order_by, user_from_row,
  },
  schema::{FOLD_FN, PRAGMAS, SCHEMA_VERSION, migrate, register_functions},
};

/// How long a call waits on a locked database before failing with a
/// retryable error.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A chat archive backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) an archive at `path` and migrate it to the current
  /// schema.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory archive — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  pub(crate) async fn init_schema(&self) -> Result<()> {
    let found = self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(PRAGMAS)?;
        register_functions(conn)?;
        Ok(migrate(conn)?)
      })
      .await?;

    if found > SCHEMA_VERSION {
      return Err(Error::UnsupportedSchema {
        found,
        supported: SCHEMA_VERSION,
      });
    }
    if found < SCHEMA_VERSION {
      tracing::info!(from = found, to = SCHEMA_VERSION, "migrated archive schema");
    }
    Ok(())
  }

  /// How long a call waits on a locked database before failing with a
  /// retryable error. Defaults to five seconds.
  pub async fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| Ok(conn.busy_timeout(timeout)?))
      .await?;
    Ok(())
  }

  /// Number of archived messages.
  pub async fn message_count(&self) -> Result<u64> {
    let n = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get::<_, i64>(0))?)
      })
      .await?;
    Ok(u64::try_from(n).unwrap_or_default())
  }
}

// ─── ArchiveStore impl ───────────────────────────────────────────────────────

impl ArchiveStore for SqliteStore {
  type Error = Error;

  // ── Messages ──────────────────────────────────────────────────────────────

  async fn archive_message(&self, message: Message) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO messages (message, user, channel, timestamp, thread_timestamp)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            message.text,
            message.author_id,
            message.channel_id,
            message.timestamp,
            message.thread_timestamp,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn edit_message(
    &self,
    author_id:  &str,
    channel_id: &str,
    timestamp:  &str,
    text:       &str,
  ) -> Result<bool> {
    let author_id  = author_id.to_owned();
    let channel_id = channel_id.to_owned();
    let timestamp  = timestamp.to_owned();
    let text       = text.to_owned();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE messages SET message = ?1
           WHERE user = ?2 AND channel = ?3 AND timestamp = ?4",
          rusqlite::params![text, author_id, channel_id, timestamp],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  async fn search_messages(&self, query: &MessageQuery) -> Result<Vec<Message>> {
    if query.visible_channels.is_empty() || query.limit == 0 {
      return Ok(Vec::new());
    }

    // Build the WHERE clause from placeholders only; every value is bound.
    // Both sides are folded with the same Unicode rules.
    let mut sql = format!(
      "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {FOLD_FN}(message) LIKE ? ESCAPE '\\'"
    );
    let mut args: Vec<Value> = vec![Value::Text(query.pattern.to_lowercase())];

    let placeholders = vec!["?"; query.visible_channels.len()].join(", ");
    sql.push_str(&format!(" AND channel IN ({placeholders})"));
    args.extend(query.visible_channels.iter().cloned().map(Value::Text));

    if let Some(author) = &query.author_id {
      sql.push_str(" AND user = ?");
      args.push(Value::Text(author.clone()));
    }
    if let Some(channel) = &query.channel_id {
      sql.push_str(" AND channel = ?");
      args.push(Value::Text(channel.clone()));
    }

    sql.push(' ');
    sql.push_str(order_by(query.sort));
    sql.push_str(" LIMIT ?");
    args.push(Value::Integer(i64::try_from(query.limit).unwrap_or(i64::MAX)));

    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(args), message_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }

  // ── Directory ─────────────────────────────────────────────────────────────

  async fn upsert_users(&self, users: Vec<User>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt =
            tx.prepare("INSERT INTO users (name, id, avatar) VALUES (?1, ?2, ?3)")?;
          for user in &users {
            stmt.execute(rusqlite::params![user.display_name, user.id, user.avatar])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn upsert_channel(&self, channel: Channel) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO channels (name, id, is_private) VALUES (?1, ?2, ?3)",
          rusqlite::params![channel.name, channel.id, channel.is_private],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn rename_channel(&self, channel_id: &str, name: &str) -> Result<bool> {
    let channel_id = channel_id.to_owned();
    let name       = name.to_owned();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE channels SET name = ?1 WHERE id = ?2",
          rusqlite::params![name, channel_id],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  async fn replace_members(
    &self,
    channel_id: String,
    members:    HashSet<String>,
  ) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM members WHERE channel = ?1", rusqlite::params![channel_id])?;
        {
          let mut stmt =
            tx.prepare("INSERT OR IGNORE INTO members (channel, user) VALUES (?1, ?2)")?;
          for user in &members {
            stmt.execute(rusqlite::params![channel_id, user])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn add_member(&self, channel_id: &str, user_id: &str) -> Result<()> {
    let channel_id = channel_id.to_owned();
    let user_id    = user_id.to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO members (channel, user) VALUES (?1, ?2)",
          rusqlite::params![channel_id, user_id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn remove_member(&self, channel_id: &str, user_id: &str) -> Result<()> {
    let channel_id = channel_id.to_owned();
    let user_id    = user_id.to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM members WHERE channel = ?1 AND user = ?2",
          rusqlite::params![channel_id, user_id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn replace_directory(&self, snapshot: DirectorySnapshot) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute_batch("DELETE FROM members; DELETE FROM channels; DELETE FROM users;")?;
        {
          let mut stmt =
            tx.prepare("INSERT INTO users (name, id, avatar) VALUES (?1, ?2, ?3)")?;
          for user in &snapshot.users {
            stmt.execute(rusqlite::params![user.display_name, user.id, user.avatar])?;
          }

          let mut stmt =
            tx.prepare("INSERT INTO channels (name, id, is_private) VALUES (?1, ?2, ?3)")?;
          for channel in &snapshot.channels {
            stmt.execute(rusqlite::params![channel.name, channel.id, channel.is_private])?;
          }

          let mut stmt =
            tx.prepare("INSERT OR IGNORE INTO members (channel, user) VALUES (?1, ?2)")?;
          for m in &snapshot.members {
            stmt.execute(rusqlite::params![m.channel_id, m.user_id])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn load_directory(&self) -> Result<DirectorySnapshot> {
    let snapshot = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id IS NOT NULL"))?;
        let users = stmt
          .query_map([], user_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn
          .prepare(&format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id IS NOT NULL"))?;
        let channels = stmt
          .query_map([], channel_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {MEMBER_COLUMNS} FROM members
           WHERE channel IS NOT NULL AND user IS NOT NULL"
        ))?;
        let members = stmt
          .query_map([], membership_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(DirectorySnapshot { users, channels, members })
      })
      .await?;

    Ok(snapshot)
  }
}
