//! Inbound platform events, already decoded into the kinds the archive acts
//! on.

use serde::{Deserialize, Serialize};

use crate::model::{Message, User};

/// A message posted somewhere the bot can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
  pub text:              String,
  pub author_id:         String,
  pub channel_id:        String,
  pub timestamp:         String,
  pub thread_timestamp:  Option<String>,
  /// Sent to the bot directly; treated as a search query, never archived.
  pub is_direct_message: bool,
}

impl IncomingMessage {
  pub fn into_message(self) -> Message {
    Message {
      text:             self.text,
      author_id:        self.author_id,
      channel_id:       self.channel_id,
      timestamp:        self.timestamp,
      thread_timestamp: self.thread_timestamp,
    }
  }
}

/// Every event kind the ingestion handler knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
  Message(IncomingMessage),
  /// The text of an archived message was edited.
  MessageEdited {
    author_id:  String,
    channel_id: String,
    timestamp:  String,
    text:       String,
  },
  MemberJoined {
    channel_id: String,
    user_id:    String,
  },
  MemberLeft {
    channel_id: String,
    user_id:    String,
  },
  /// A public or private channel was renamed.
  ChannelRenamed {
    channel_id: String,
    name:       String,
  },
  /// A user's profile changed; carries the full new profile.
  UserChanged(User),
  /// Anything else; `kind` names what was skipped, for logging.
  Ignored {
    kind: String,
  },
}

impl Event {
  /// Short name for logs.
  pub fn kind(&self) -> &str {
    match self {
      Self::Message(m) if m.is_direct_message => "direct_message",
      Self::Message(_) => "message",
      Self::MessageEdited { .. } => "message_edited",
      Self::MemberJoined { .. } => "member_joined",
      Self::MemberLeft { .. } => "member_left",
      Self::ChannelRenamed { .. } => "channel_renamed",
      Self::UserChanged(_) => "user_changed",
      Self::Ignored { kind } => kind,
    }
  }
}
