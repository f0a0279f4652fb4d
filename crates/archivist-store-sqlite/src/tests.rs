//! Integration tests for `SqliteStore`, mostly against an in-memory database.

use std::{
  collections::HashSet,
  time::{Duration, SystemTime, UNIX_EPOCH},
};

use archivist_core::{
  directory::{Directory, DirectorySnapshot},
  model::{Channel, Membership, Message, User},
  search::{SearchOutcome, search_text},
  store::{ArchiveStore, MessageQuery, StoreError},
};

use crate::{SCHEMA_VERSION, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn message(text: &str, author: &str, channel: &str, ts: &str) -> Message {
  Message {
    text:             text.into(),
    author_id:        author.into(),
    channel_id:       channel.into(),
    timestamp:        ts.into(),
    thread_timestamp: None,
  }
}

fn user(id: &str, name: &str) -> User {
  User {
    id:           id.into(),
    display_name: name.into(),
    avatar:       format!("https://avatars.example.com/{id}.png"),
  }
}

fn channel(id: &str, name: &str, is_private: bool) -> Channel {
  Channel { id: id.into(), name: name.into(), is_private }
}

fn set(ids: &[&str]) -> HashSet<String> { ids.iter().map(|s| s.to_string()).collect() }

/// A store and matching directory with a public `#general` (C1) and a
/// private `#secret` (G1) that only alice (U1) belongs to.
async fn seeded() -> (SqliteStore, Directory) {
  let s = store().await;
  s.upsert_users(vec![user("U1", "alice"), user("U2", "bob")])
    .await
    .unwrap();
  s.upsert_channel(channel("C1", "general", false)).await.unwrap();
  s.upsert_channel(channel("G1", "secret", true)).await.unwrap();
  s.replace_members("G1".into(), set(&["U1"])).await.unwrap();

  let dir = Directory::from_snapshot(s.load_directory().await.unwrap());
  (s, dir)
}

fn texts(outcome: &SearchOutcome) -> Vec<&str> {
  outcome
    .hits()
    .iter()
    .map(|h| h.message.text.as_str())
    .collect()
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_store_is_at_current_version() {
  let s = store().await;
  let version = s
    .conn
    .call(|conn| Ok(crate::schema::user_version(conn)?))
    .await
    .unwrap();
  assert_eq!(version, SCHEMA_VERSION);
}

#[tokio::test]
async fn legacy_database_is_migrated_in_place() {
  let s = SqliteStore {
    conn: tokio_rusqlite::Connection::open_in_memory().await.unwrap(),
  };

  // The layout written by the first, unversioned releases.
  s.conn
    .call(|conn| {
      conn.execute_batch(
        "CREATE TABLE messages (message text, user text, channel text, timestamp text,
                                UNIQUE(channel, timestamp) ON CONFLICT REPLACE);
         CREATE TABLE users (name text, id text, avatar text, UNIQUE(id) ON CONFLICT REPLACE);
         CREATE TABLE channels (name text, id text, UNIQUE(id) ON CONFLICT REPLACE);
         INSERT INTO messages VALUES ('old news', 'U1', 'C1', '1500000000.000100');
         INSERT INTO channels VALUES ('general', 'C1');",
      )?;
      Ok(())
    })
    .await
    .unwrap();

  s.init_schema().await.unwrap();

  let snapshot = s.load_directory().await.unwrap();
  assert_eq!(snapshot.channels, vec![channel("C1", "general", true)]);
  assert!(snapshot.members.is_empty());

  // Migrated rows stay searchable once the channel is known to be public.
  s.upsert_channel(channel("C1", "general", false)).await.unwrap();
  let found = s
    .search_messages(&MessageQuery {
      pattern:          "%news%".into(),
      visible_channels: vec!["C1".into()],
      limit:            10,
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].thread_timestamp, None);

  // Running the migration again is a no-op.
  s.init_schema().await.unwrap();
}

#[tokio::test]
async fn newer_schema_is_rejected() {
  let s = SqliteStore {
    conn: tokio_rusqlite::Connection::open_in_memory().await.unwrap(),
  };
  s.conn
    .call(|conn| {
      conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)?;
      Ok(())
    })
    .await
    .unwrap();

  let err = s.init_schema().await.unwrap_err();
  assert!(matches!(err, crate::Error::UnsupportedSchema { .. }));
}

// ─── Messages ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn archive_then_search_round_trip() {
  let (s, dir) = seeded().await;
  let m = message("the build is green again", "U2", "C1", "1600000000.000100");

  s.archive_message(m.clone()).await.unwrap();
  // Re-ingesting the same (channel, timestamp) replaces instead of duplicating.
  s.archive_message(m.clone()).await.unwrap();
  assert_eq!(s.message_count().await.unwrap(), 1);

  let outcome = search_text(&s, &dir, "the build is green again", "U2")
    .await
    .unwrap();
  assert_eq!(outcome.hits().len(), 1);
  assert_eq!(outcome.hits()[0].message, m);
  assert_eq!(outcome.hits()[0].author_name, "bob");
  assert_eq!(outcome.hits()[0].channel_name, "general");
}

#[tokio::test]
async fn later_write_with_same_key_replaces() {
  let s = store().await;
  s.archive_message(message("draft", "U1", "C1", "1600000000.000100"))
    .await
    .unwrap();
  s.archive_message(message("final", "U1", "C1", "1600000000.000100"))
    .await
    .unwrap();
  // Same timestamp in another channel is a different message.
  s.archive_message(message("final", "U1", "C2", "1600000000.000100"))
    .await
    .unwrap();
  assert_eq!(s.message_count().await.unwrap(), 2);
}

#[tokio::test]
async fn edit_updates_text_in_place() {
  let (s, dir) = seeded().await;
  s.archive_message(message("teh typo", "U1", "C1", "1600000000.000100"))
    .await
    .unwrap();

  assert!(
    s.edit_message("U1", "C1", "1600000000.000100", "the typo")
      .await
      .unwrap()
  );
  // Wrong author: nothing matches.
  assert!(
    !s.edit_message("U2", "C1", "1600000000.000100", "hijacked")
      .await
      .unwrap()
  );

  let outcome = search_text(&s, &dir, "typo", "U1").await.unwrap();
  assert_eq!(texts(&outcome), ["the typo"]);
  assert_eq!(s.message_count().await.unwrap(), 1);
}

#[tokio::test]
async fn thread_timestamp_round_trips() {
  let (s, dir) = seeded().await;
  let mut reply = message("in thread", "U1", "C1", "1600000001.000000");
  reply.thread_timestamp = Some("1600000000.000100".into());
  s.archive_message(reply).await.unwrap();

  let outcome = search_text(&s, &dir, "thread", "U1").await.unwrap();
  assert_eq!(
    outcome.hits()[0].message.thread_timestamp.as_deref(),
    Some("1600000000.000100")
  );
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_is_case_insensitive_substring() {
  let (s, dir) = seeded().await;
  s.archive_message(message("Deploying the NEW release", "U1", "C1", "1600000000.1"))
    .await
    .unwrap();
  s.archive_message(message("lunch?", "U2", "C1", "1600000001.1"))
    .await
    .unwrap();

  let outcome = search_text(&s, &dir, "new RELEASE", "U2").await.unwrap();
  assert_eq!(texts(&outcome), ["Deploying the NEW release"]);
}

#[tokio::test]
async fn search_folds_non_ascii_case() {
  let (s, dir) = seeded().await;
  s.archive_message(message("École fermée demain", "U1", "C1", "1600000000.1"))
    .await
    .unwrap();
  s.archive_message(message("ΣΟΦΙΑ says hi", "U1", "C1", "1600000001.1"))
    .await
    .unwrap();

  for query in ["École", "FERMÉE", "école"] {
    let outcome = search_text(&s, &dir, query, "U2").await.unwrap();
    assert_eq!(texts(&outcome), ["École fermée demain"], "query {query:?}");
  }

  let outcome = search_text(&s, &dir, "σοφια", "U2").await.unwrap();
  assert_eq!(texts(&outcome), ["ΣΟΦΙΑ says hi"]);
}

#[tokio::test]
async fn wildcards_in_terms_match_literally() {
  let (s, dir) = seeded().await;
  s.archive_message(message("cpu at 100% again", "U1", "C1", "1600000000.1"))
    .await
    .unwrap();
  s.archive_message(message("cpu at 1000 again", "U1", "C1", "1600000001.1"))
    .await
    .unwrap();
  s.archive_message(message("use snake_case", "U1", "C1", "1600000002.1"))
    .await
    .unwrap();
  s.archive_message(message("use snakeXcase", "U1", "C1", "1600000003.1"))
    .await
    .unwrap();

  let outcome = search_text(&s, &dir, "100%", "U1").await.unwrap();
  assert_eq!(texts(&outcome), ["cpu at 100% again"]);
  let outcome = search_text(&s, &dir, "snake_case", "U1").await.unwrap();
  assert_eq!(texts(&outcome), ["use snake_case"]);
}

#[tokio::test]
async fn private_channel_is_visible_only_to_members() {
  let (s, dir) = seeded().await;
  s.archive_message(message("launch plan public", "U1", "C1", "1600000000.1"))
    .await
    .unwrap();
  s.archive_message(message("launch plan secret", "U1", "G1", "1600000001.1"))
    .await
    .unwrap();

  let member = search_text(&s, &dir, "launch plan", "U1").await.unwrap();
  assert_eq!(texts(&member), ["launch plan public", "launch plan secret"]);

  let outsider = search_text(&s, &dir, "launch plan", "U2").await.unwrap();
  assert_eq!(texts(&outsider), ["launch plan public"]);

  // Naming the private channel does not help an outsider.
  let outcome = search_text(&s, &dir, "launch in:secret", "U2").await.unwrap();
  assert_eq!(outcome, SearchOutcome::NoResults);
}

#[tokio::test]
async fn limit_counts_visible_results_only() {
  let (s, dir) = seeded().await;
  // Three hidden matches come first in insertion order.
  for i in 0..3 {
    s.archive_message(message("standup notes", "U1", "G1", &format!("160000000{i}.1")))
      .await
      .unwrap();
  }
  s.archive_message(message("standup notes", "U1", "C1", "1600000009.1"))
    .await
    .unwrap();

  let outcome = search_text(&s, &dir, "standup limit:1", "U2").await.unwrap();
  assert_eq!(outcome.hits().len(), 1);
  assert_eq!(outcome.hits()[0].message.channel_id, "C1");
}

#[tokio::test]
async fn non_positive_limit_yields_nothing() {
  let (s, dir) = seeded().await;
  s.archive_message(message("hello", "U1", "C1", "1600000000.1"))
    .await
    .unwrap();

  for raw in ["hello limit:0", "hello limit:-1"] {
    let outcome = search_text(&s, &dir, raw, "U1").await.unwrap();
    assert_eq!(outcome, SearchOutcome::NoResults, "{raw}");
  }
}

#[tokio::test]
async fn sort_orders_by_numeric_timestamp() {
  let (s, dir) = seeded().await;
  // Inserted out of order; "999999999.9" sorts after "1600000000.1" as text.
  s.archive_message(message("note b", "U1", "C1", "1600000000.1"))
    .await
    .unwrap();
  s.archive_message(message("note a", "U1", "C1", "999999999.9"))
    .await
    .unwrap();
  s.archive_message(message("note c", "U1", "C1", "1700000000.1"))
    .await
    .unwrap();

  let asc = search_text(&s, &dir, "note sort:asc", "U1").await.unwrap();
  assert_eq!(texts(&asc), ["note a", "note b", "note c"]);

  let desc = search_text(&s, &dir, "note sort:desc", "U1").await.unwrap();
  assert_eq!(texts(&desc), ["note c", "note b", "note a"]);

  let natural = search_text(&s, &dir, "note", "U1").await.unwrap();
  assert_eq!(texts(&natural), ["note b", "note a", "note c"]);
}

#[tokio::test]
async fn author_and_channel_filters() {
  let (s, dir) = seeded().await;
  s.archive_message(message("ping", "U1", "C1", "1600000000.1"))
    .await
    .unwrap();
  s.archive_message(message("ping", "U2", "C1", "1600000001.1"))
    .await
    .unwrap();
  s.archive_message(message("ping", "U1", "G1", "1600000002.1"))
    .await
    .unwrap();

  let outcome = search_text(&s, &dir, "ping from:@bob", "U1").await.unwrap();
  assert_eq!(outcome.hits().len(), 1);
  assert_eq!(outcome.hits()[0].message.author_id, "U2");

  let outcome = search_text(&s, &dir, "ping in:#secret from:alice", "U1")
    .await
    .unwrap();
  assert_eq!(outcome.hits().len(), 1);
  assert_eq!(outcome.hits()[0].message.channel_id, "G1");
}

#[tokio::test]
async fn hostile_terms_are_bound_not_spliced() {
  let (s, dir) = seeded().await;
  s.archive_message(message("harmless", "U1", "C1", "1600000000.1"))
    .await
    .unwrap();

  let outcome = search_text(&s, &dir, "'; drop table messages; --", "U1")
    .await
    .unwrap();
  assert_eq!(outcome, SearchOutcome::NoResults);
  assert_eq!(s.message_count().await.unwrap(), 1);
}

// ─── Directory ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn users_replace_on_conflict() {
  let s = store().await;
  s.upsert_users(vec![user("U1", "alice")]).await.unwrap();
  s.upsert_users(vec![user("U1", "alicia")]).await.unwrap();

  let snapshot = s.load_directory().await.unwrap();
  assert_eq!(snapshot.users, vec![user("U1", "alicia")]);
}

#[tokio::test]
async fn rename_channel_in_store_and_directory() {
  let (s, mut dir) = seeded().await;
  s.archive_message(message("retro notes", "U1", "C1", "1600000000.1"))
    .await
    .unwrap();

  assert!(s.rename_channel("C1", "town-square").await.unwrap());
  assert!(dir.rename_channel("C1", "town-square"));
  assert!(!s.rename_channel("C404", "nowhere").await.unwrap());

  let outcome = search_text(&s, &dir, "retro in:town-square", "U2")
    .await
    .unwrap();
  assert_eq!(texts(&outcome), ["retro notes"]);

  let err = search_text(&s, &dir, "retro in:general", "U2")
    .await
    .unwrap_err();
  assert!(matches!(err, archivist_core::Error::ChannelNotFound(ref n) if n == "general"));

  // A fresh directory built from the store agrees.
  let reloaded = Directory::from_snapshot(s.load_directory().await.unwrap());
  assert_eq!(reloaded.resolve_channel("town-square"), Some("C1"));
  assert_eq!(reloaded.resolve_channel("general"), None);
}

#[tokio::test]
async fn membership_add_remove_and_replace() {
  let s = store().await;
  s.upsert_channel(channel("G1", "secret", true)).await.unwrap();

  s.add_member("G1", "U1").await.unwrap();
  s.add_member("G1", "U1").await.unwrap();
  s.add_member("G1", "U2").await.unwrap();
  assert_eq!(s.load_directory().await.unwrap().members.len(), 2);

  s.remove_member("G1", "U1").await.unwrap();
  let members = s.load_directory().await.unwrap().members;
  assert_eq!(members.len(), 1);
  assert_eq!(members[0].user_id, "U2");

  s.replace_members("G1".into(), set(&["U3", "U4"])).await.unwrap();
  let members: HashSet<String> = s
    .load_directory()
    .await
    .unwrap()
    .members
    .into_iter()
    .map(|m| m.user_id)
    .collect();
  assert_eq!(members, set(&["U3", "U4"]));
}

#[tokio::test]
async fn replace_directory_drops_rows_missing_from_snapshot() {
  let (s, _) = seeded().await;
  s.upsert_channel(channel("C2", "random", false)).await.unwrap();
  s.upsert_users(vec![user("U3", "carol")]).await.unwrap();

  // alice left the workspace and #secret was archived.
  s.replace_directory(DirectorySnapshot {
    users:    vec![user("U2", "bob"), user("U3", "carol")],
    channels: vec![channel("C1", "general", false), channel("G2", "ops", true)],
    members:  vec![Membership { channel_id: "G2".into(), user_id: "U3".into() }],
  })
  .await
  .unwrap();

  let snapshot = s.load_directory().await.unwrap();
  let mut users: Vec<_> = snapshot.users.iter().map(|u| u.id.as_str()).collect();
  users.sort();
  assert_eq!(users, ["U2", "U3"]);
  let mut channels: Vec<_> = snapshot.channels.iter().map(|c| c.id.as_str()).collect();
  channels.sort();
  assert_eq!(channels, ["C1", "G2"]);
  assert_eq!(snapshot.members, vec![Membership {
    channel_id: "G2".into(),
    user_id:    "U3".into(),
  }]);

  let dir = Directory::from_snapshot(snapshot);
  assert_eq!(dir.resolve_channel("secret"), None);
  assert_eq!(dir.resolve_channel("random"), None);
  assert_eq!(dir.resolve_user("alice"), None);
}

// ─── Locking ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn busy_database_is_retryable() {
  let path = std::env::temp_dir().join(format!(
    "archivist-busy-{}-{}.sqlite",
    std::process::id(),
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos()
  ));
  let s = SqliteStore::open(&path).await.unwrap();
  s.set_busy_timeout(Duration::from_millis(50)).await.unwrap();

  // A second connection holds the write lock.
  let blocker = rusqlite::Connection::open(&path).unwrap();
  blocker
    .execute_batch("BEGIN IMMEDIATE; INSERT INTO users VALUES ('zed', 'U9', '');")
    .unwrap();

  let err = s
    .archive_message(message("blocked", "U1", "C1", "1600000000.1"))
    .await
    .unwrap_err();
  assert!(err.is_retryable(), "{err}");

  blocker.execute_batch("COMMIT;").unwrap();
  s.archive_message(message("blocked", "U1", "C1", "1600000000.1"))
    .await
    .unwrap();
  assert_eq!(s.message_count().await.unwrap(), 1);

  drop(blocker);
  drop(s);
  for suffix in ["", "-wal", "-shm"] {
    let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
  }
}

#[test]
fn schema_errors_are_not_retryable() {
  let err = crate::Error::UnsupportedSchema { found: 9, supported: SCHEMA_VERSION };
  assert!(!err.is_retryable());
}
