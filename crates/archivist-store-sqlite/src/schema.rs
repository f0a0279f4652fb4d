//! SQL schema and migrations for the archive.
//!
//! Gated on `PRAGMA user_version`. Version 0 covers both a brand-new file and
//! a legacy archive written before versioning existed; both are brought to
//! [`SCHEMA_VERSION`] in place.

use rusqlite::{Connection, Transaction, functions::FunctionFlags};

/// The schema version this build writes.
pub const SCHEMA_VERSION: i32 = 2;

/// Connection-level settings, applied on every open.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
";

/// Name of the SQL function that case-folds text with Unicode rules. SQLite's
/// own `LIKE` only folds ASCII letters.
pub const FOLD_FN: &str = "fold_case";

/// Register the connection-local SQL functions the queries rely on.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
  conn.create_scalar_function(
    FOLD_FN,
    1,
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
    |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| text.to_lowercase())),
  )
}

/// Tables as they exist at version 2. Idempotent thanks to
/// `CREATE TABLE IF NOT EXISTS`; columns missing from legacy tables are added
/// by [`migrate`].
const TABLES: &str = "
-- A later row with the same (channel, timestamp) replaces the earlier one,
-- so re-ingesting a message never duplicates it.
CREATE TABLE IF NOT EXISTS messages (
    message          TEXT,
    user             TEXT,
    channel          TEXT,
    timestamp        TEXT,            -- platform ts, 'seconds.micros'
    thread_timestamp TEXT,            -- parent ts for thread replies
    UNIQUE (channel, timestamp) ON CONFLICT REPLACE
);

CREATE TABLE IF NOT EXISTS users (
    name   TEXT,
    id     TEXT,
    avatar TEXT,
    UNIQUE (id) ON CONFLICT REPLACE
);

CREATE TABLE IF NOT EXISTS channels (
    name       TEXT,
    id         TEXT,
    is_private BOOLEAN NOT NULL CHECK (is_private IN (0, 1)),
    UNIQUE (id) ON CONFLICT REPLACE
);

-- Who may see a private channel. Not enforced: membership can name users
-- the directory has not caught up with yet.
CREATE TABLE IF NOT EXISTS members (
    channel TEXT,
    user    TEXT,
    FOREIGN KEY (channel) REFERENCES channels(id),
    FOREIGN KEY (user)    REFERENCES users(id)
);
";

const INDEXES: &str = "
-- Legacy member tables may hold duplicate pairs.
DELETE FROM members
 WHERE rowid NOT IN (SELECT MIN(rowid) FROM members GROUP BY channel, user);

CREATE UNIQUE INDEX IF NOT EXISTS members_pair_idx   ON members(channel, user);
CREATE INDEX        IF NOT EXISTS messages_user_idx  ON messages(user);
CREATE INDEX        IF NOT EXISTS messages_chan_idx  ON messages(channel);
";

/// Read the stored schema version.
pub fn user_version(conn: &Connection) -> rusqlite::Result<i32> {
  conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

/// Bring the database up to [`SCHEMA_VERSION`]. Returns the version found
/// before migrating; callers reject versions newer than this build.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<i32> {
  let found = user_version(conn)?;
  if found >= SCHEMA_VERSION {
    return Ok(found);
  }

  let tx = conn.transaction()?;
  tx.execute_batch(TABLES)?;

  // Channels from the first releases carried no privacy flag. Treat them as
  // private until the next directory refresh says otherwise.
  if !has_column(&tx, "channels", "is_private")? {
    tx.execute_batch(
      "ALTER TABLE channels
         ADD COLUMN is_private BOOLEAN NOT NULL DEFAULT 1
         CHECK (is_private IN (0, 1));",
    )?;
  }
  if !has_column(&tx, "messages", "thread_timestamp")? {
    tx.execute_batch("ALTER TABLE messages ADD COLUMN thread_timestamp TEXT;")?;
  }

  tx.execute_batch(INDEXES)?;
  tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
  tx.commit()?;

  Ok(found)
}

fn has_column(tx: &Transaction<'_>, table: &str, column: &str) -> rusqlite::Result<bool> {
  let mut stmt = tx.prepare(&format!("PRAGMA table_info({table})"))?;
  let names = stmt
    .query_map([], |row| row.get::<_, String>(1))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(names.iter().any(|n| n == column))
}
