//! Slack Events API payloads and their decoding into [`Event`].
//!
//! Only the fields the archive acts on are modelled; everything else in a
//! payload is ignored by serde.

use archivist_core::{
  event::{Event, IncomingMessage},
  model::User,
};
use serde::Deserialize;
use serde_json::Value;

/// Avatar used for users whose profile carries no image.
pub const DEFAULT_AVATAR: &str = "https://secure.gravatar.com/avatar/c3a07fba0c4787b0ef1d417838eae9c5.jpg?s=32&d=https%3A%2F%2Ffst.slack-edge.com%2F66f9%2Fimg%2Favatars%2Fava_0024-32.png";

/// Message subtypes that never reach the archive. Renames arrive twice, once
/// as `channel_rename`/`group_rename` and once as one of these.
const SKIPPED_SUBTYPES: &[&str] = &["channel_name", "group_name", "message_deleted"];

// ─── Envelope ────────────────────────────────────────────────────────────────

/// The outer body of a request to the events endpoint.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
  /// Sent once when the endpoint URL is configured.
  UrlVerification { challenge: String },
  EventCallback {
    event:    Value,
    #[serde(default)]
    event_id: Option<String>,
  },
  #[serde(other)]
  Other,
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessagePayload {
  #[serde(default)]
  subtype:      Option<String>,
  #[serde(default)]
  user:         Option<String>,
  #[serde(default)]
  text:         Option<String>,
  channel:      String,
  #[serde(default)]
  ts:           String,
  #[serde(default)]
  thread_ts:    Option<String>,
  #[serde(default)]
  channel_type: Option<String>,
  /// The new version of the message, for `message_changed`.
  #[serde(default)]
  message:      Option<EditedMessage>,
}

#[derive(Debug, Deserialize)]
struct EditedMessage {
  #[serde(default)]
  user: Option<String>,
  #[serde(default)]
  text: Option<String>,
  ts:   String,
}

#[derive(Debug, Deserialize)]
struct MembershipPayload {
  channel: String,
  user:    String,
}

#[derive(Debug, Deserialize)]
struct RenamePayload {
  channel: RenamedChannel,
}

#[derive(Debug, Deserialize)]
struct RenamedChannel {
  id:   String,
  name: String,
}

#[derive(Debug, Deserialize)]
struct UserChangePayload {
  user: SlackUser,
}

/// A user object as returned by `users.list` and carried by `user_change`.
#[derive(Debug, Deserialize)]
pub struct SlackUser {
  pub id:        String,
  #[serde(default)]
  pub name:      String,
  #[serde(default)]
  pub real_name: Option<String>,
  #[serde(default)]
  pub profile:   Profile,
}

#[derive(Debug, Default, Deserialize)]
pub struct Profile {
  #[serde(default)]
  pub display_name: Option<String>,
  #[serde(default)]
  pub real_name:    Option<String>,
  #[serde(default)]
  pub image_72:     Option<String>,
}

impl SlackUser {
  /// The display name, falling back to the real name and then the account
  /// name when a user never set one.
  pub fn display_name(&self) -> &str {
    [
      self.profile.display_name.as_deref(),
      self.profile.real_name.as_deref(),
      self.real_name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find(|name| !name.is_empty())
    .unwrap_or(&self.name)
  }

  pub fn into_user(self) -> User {
    let display_name = self.display_name().to_owned();
    let avatar = self
      .profile
      .image_72
      .filter(|url| !url.is_empty())
      .unwrap_or_else(|| DEFAULT_AVATAR.to_owned());
    User { id: self.id, display_name, avatar }
  }
}

// ─── Decoding ────────────────────────────────────────────────────────────────

/// Decode the inner `event` object of an `event_callback`.
///
/// Unknown event types become [`Event::Ignored`]; a known type with missing
/// required fields is an error.
pub fn decode_event(event: Value) -> Result<Event, serde_json::Error> {
  let kind = event
    .get("type")
    .and_then(Value::as_str)
    .unwrap_or("unknown")
    .to_owned();

  let decoded = match kind.as_str() {
    "message" => decode_message(serde_json::from_value(event)?),
    "member_joined_channel" => {
      let p: MembershipPayload = serde_json::from_value(event)?;
      Event::MemberJoined { channel_id: p.channel, user_id: p.user }
    }
    "member_left_channel" => {
      let p: MembershipPayload = serde_json::from_value(event)?;
      Event::MemberLeft { channel_id: p.channel, user_id: p.user }
    }
    "channel_rename" | "group_rename" => {
      let p: RenamePayload = serde_json::from_value(event)?;
      Event::ChannelRenamed { channel_id: p.channel.id, name: p.channel.name }
    }
    "user_change" => {
      let p: UserChangePayload = serde_json::from_value(event)?;
      Event::UserChanged(p.user.into_user())
    }
    _ => Event::Ignored { kind },
  };
  Ok(decoded)
}

fn decode_message(p: MessagePayload) -> Event {
  match p.subtype.as_deref() {
    Some("message_changed") => {
      let Some(EditedMessage { user: Some(user), text: Some(text), ts }) = p.message
      else {
        return Event::Ignored { kind: "message_changed".into() };
      };
      return Event::MessageEdited {
        author_id: user,
        channel_id: p.channel,
        timestamp: ts,
        text,
      };
    }
    Some(subtype) if SKIPPED_SUBTYPES.contains(&subtype) => {
      return Event::Ignored { kind: subtype.to_owned() };
    }
    _ => {}
  }

  let (Some(author_id), Some(text)) = (p.user, p.text) else {
    return Event::Ignored { kind: "message".into() };
  };

  let is_direct_message = match p.channel_type.as_deref() {
    Some(t) => t == "im",
    None => p.channel.starts_with('D'),
  };

  Event::Message(IncomingMessage {
    text,
    author_id,
    channel_id: p.channel,
    timestamp: p.ts,
    thread_timestamp: p.thread_ts,
    is_direct_message,
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn envelope_kinds() {
    let v: Envelope =
      serde_json::from_value(json!({ "type": "url_verification", "challenge": "abc", "token": "x" }))
        .unwrap();
    assert!(matches!(v, Envelope::UrlVerification { challenge } if challenge == "abc"));

    let v: Envelope = serde_json::from_value(json!({
      "type": "event_callback",
      "event_id": "Ev1",
      "event": { "type": "message" }
    }))
    .unwrap();
    assert!(matches!(v, Envelope::EventCallback { event_id: Some(id), .. } if id == "Ev1"));

    let v: Envelope = serde_json::from_value(json!({ "type": "app_rate_limited" })).unwrap();
    assert!(matches!(v, Envelope::Other));
  }

  #[test]
  fn channel_message() {
    let e = decode_event(json!({
      "type": "message",
      "channel": "C1",
      "user": "U1",
      "text": "hello",
      "ts": "1512345678.000200",
      "channel_type": "channel"
    }))
    .unwrap();
    assert_eq!(
      e,
      Event::Message(IncomingMessage {
        text:              "hello".into(),
        author_id:         "U1".into(),
        channel_id:        "C1".into(),
        timestamp:         "1512345678.000200".into(),
        thread_timestamp:  None,
        is_direct_message: false,
      })
    );
  }

  #[test]
  fn thread_reply_keeps_parent() {
    let e = decode_event(json!({
      "type": "message",
      "channel": "C1",
      "user": "U1",
      "text": "reply",
      "ts": "2.0",
      "thread_ts": "1.0",
      "channel_type": "channel"
    }))
    .unwrap();
    let Event::Message(m) = e else { panic!("expected a message") };
    assert_eq!(m.thread_timestamp.as_deref(), Some("1.0"));
  }

  #[test]
  fn direct_message_detection() {
    let e = decode_event(json!({
      "type": "message", "channel": "D1", "user": "U1", "text": "x", "ts": "1.0",
      "channel_type": "im"
    }))
    .unwrap();
    assert_eq!(e.kind(), "direct_message");

    // Without channel_type the channel id prefix decides.
    let e = decode_event(json!({
      "type": "message", "channel": "D1", "user": "U1", "text": "x", "ts": "1.0"
    }))
    .unwrap();
    assert_eq!(e.kind(), "direct_message");

    let e = decode_event(json!({
      "type": "message", "channel": "G1", "user": "U1", "text": "x", "ts": "1.0",
      "channel_type": "group"
    }))
    .unwrap();
    assert_eq!(e.kind(), "message");
  }

  #[test]
  fn message_without_user_or_text_is_ignored() {
    let e = decode_event(json!({
      "type": "message", "subtype": "bot_message", "channel": "C1", "text": "x",
      "ts": "1.0", "bot_id": "B1"
    }))
    .unwrap();
    assert_eq!(e, Event::Ignored { kind: "message".into() });

    let e = decode_event(json!({
      "type": "message", "channel": "C1", "user": "U1", "ts": "1.0"
    }))
    .unwrap();
    assert_eq!(e, Event::Ignored { kind: "message".into() });
  }

  #[test]
  fn edits() {
    let e = decode_event(json!({
      "type": "message",
      "subtype": "message_changed",
      "channel": "C1",
      "ts": "9.0",
      "message": { "type": "message", "user": "U1", "text": "fixed", "ts": "1.0" },
      "previous_message": { "type": "message", "user": "U1", "text": "fxed", "ts": "1.0" }
    }))
    .unwrap();
    assert_eq!(
      e,
      Event::MessageEdited {
        author_id:  "U1".into(),
        channel_id: "C1".into(),
        timestamp:  "1.0".into(),
        text:       "fixed".into(),
      }
    );
  }

  #[test]
  fn rename_notices_are_skipped() {
    for subtype in ["channel_name", "group_name", "message_deleted"] {
      let e = decode_event(json!({
        "type": "message", "subtype": subtype, "channel": "C1", "user": "U1",
        "text": "renamed", "ts": "1.0"
      }))
      .unwrap();
      assert_eq!(e, Event::Ignored { kind: subtype.into() });
    }
  }

  #[test]
  fn membership_and_renames() {
    let e = decode_event(json!({
      "type": "member_joined_channel", "channel": "C1", "user": "U2", "channel_type": "C"
    }))
    .unwrap();
    assert_eq!(e, Event::MemberJoined { channel_id: "C1".into(), user_id: "U2".into() });

    let e = decode_event(json!({ "type": "member_left_channel", "channel": "C1", "user": "U2" }))
      .unwrap();
    assert_eq!(e, Event::MemberLeft { channel_id: "C1".into(), user_id: "U2".into() });

    let e = decode_event(json!({
      "type": "group_rename",
      "channel": { "id": "G1", "name": "new-secret", "created": 1 }
    }))
    .unwrap();
    assert_eq!(
      e,
      Event::ChannelRenamed { channel_id: "G1".into(), name: "new-secret".into() }
    );
  }

  #[test]
  fn user_change_name_fallbacks() {
    let e = decode_event(json!({
      "type": "user_change",
      "user": {
        "id": "U1", "name": "alice.a",
        "profile": { "display_name": "alice", "image_72": "https://img/a.png" }
      }
    }))
    .unwrap();
    assert_eq!(
      e,
      Event::UserChanged(User {
        id:           "U1".into(),
        display_name: "alice".into(),
        avatar:       "https://img/a.png".into(),
      })
    );

    let e = decode_event(json!({
      "type": "user_change",
      "user": { "id": "U2", "name": "bob.b", "profile": { "display_name": "", "real_name": "Bob B" } }
    }))
    .unwrap();
    let Event::UserChanged(user) = e else { panic!("expected user change") };
    assert_eq!(user.display_name, "Bob B");
    assert_eq!(user.avatar, DEFAULT_AVATAR);

    let user: SlackUser =
      serde_json::from_value(json!({ "id": "U3", "name": "carol" })).unwrap();
    assert_eq!(user.display_name(), "carol");
  }

  #[test]
  fn unknown_types_are_ignored() {
    let e = decode_event(json!({ "type": "reaction_added", "user": "U1" })).unwrap();
    assert_eq!(e, Event::Ignored { kind: "reaction_added".into() });
  }

  #[test]
  fn malformed_known_type_is_an_error() {
    assert!(decode_event(json!({ "type": "member_joined_channel" })).is_err());
  }
}
