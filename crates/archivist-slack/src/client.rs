//! Async client for the Slack Web API, implementing [`Platform`].

use std::{collections::HashSet, time::Duration};

use archivist_core::{
  model::{Channel, User},
  platform::{ChannelMembers, Platform},
};
use reqwest::{Client, RequestBuilder, StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use thiserror::Error;

use crate::events::SlackUser;

/// Attempts per call when Slack answers 429.
const MAX_ATTEMPTS: u32 = 5;
/// Upper bound on a single `Retry-After` wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);
const PAGE_SIZE: &str = "200";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ClientError {
  #[error("failed to build HTTP client: {0}")]
  Build(#[source] reqwest::Error),

  #[error("{method} request failed: {source}")]
  Http {
    method: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("{method} → HTTP {status}")]
  Status { method: String, status: StatusCode },

  #[error("{method} → {error}")]
  Api { method: String, error: String },

  #[error("{method} still rate limited after {attempts} attempts")]
  RateLimited { method: String, attempts: u32 },

  #[error("deserialising {method} response: {source}")]
  Decode {
    method: String,
    #[source]
    source: serde_json::Error,
  },
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AuthTest {
  user_id: String,
}

#[derive(Debug, Deserialize)]
struct SlackChannel {
  id:         String,
  #[serde(default)]
  name:       String,
  #[serde(default)]
  is_private: bool,
  #[serde(default)]
  is_member:  bool,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
  channel: SlackChannel,
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Slack Web API client authenticated with a bot token.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct SlackClient {
  client:      Client,
  api_url:     String,
  token:       String,
  bot_user_id: String,
}

impl SlackClient {
  /// A client whose bot user id is not known yet; see [`Self::connect`].
  pub fn new(api_url: &str, token: &str) -> Result<Self, ClientError> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(ClientError::Build)?;
    Ok(Self {
      client,
      api_url: api_url.trim_end_matches('/').to_owned(),
      token: token.to_owned(),
      bot_user_id: String::new(),
    })
  }

  /// Build a client and learn the bot's own user id via `auth.test`.
  pub async fn connect(api_url: &str, token: &str) -> Result<Self, ClientError> {
    let mut client = Self::new(api_url, token)?;
    let auth: AuthTest = client.post_json("auth.test", &json!({})).await?;
    tracing::info!(bot_user_id = %auth.user_id, "authenticated with slack");
    client.bot_user_id = auth.user_id;
    Ok(client)
  }

  fn url(&self, method: &str) -> String { format!("{}/{method}", self.api_url) }

  /// Send one Web API call, retrying while Slack answers 429, and return the
  /// body of an `"ok": true` response.
  async fn call<F>(&self, method: &str, build: F) -> Result<Value, ClientError>
  where
    F: Fn(&Client, String) -> RequestBuilder,
  {
    for attempt in 1..=MAX_ATTEMPTS {
      let resp = build(&self.client, self.url(method))
        .bearer_auth(&self.token)
        .send()
        .await
        .map_err(|source| ClientError::Http { method: method.to_owned(), source })?;

      if resp.status() == StatusCode::TOO_MANY_REQUESTS {
        let wait = resp
          .headers()
          .get(RETRY_AFTER)
          .and_then(|v| v.to_str().ok())
          .and_then(|v| v.trim().parse().ok())
          .map(Duration::from_secs)
          .unwrap_or(Duration::from_secs(1))
          .min(MAX_RETRY_AFTER);
        tracing::warn!(method, attempt, wait_secs = wait.as_secs(), "rate limited by slack");
        tokio::time::sleep(wait).await;
        continue;
      }

      if !resp.status().is_success() {
        return Err(ClientError::Status { method: method.to_owned(), status: resp.status() });
      }

      let body: Value = resp
        .json()
        .await
        .map_err(|source| ClientError::Http { method: method.to_owned(), source })?;

      if body.get("ok").and_then(Value::as_bool) != Some(true) {
        let error = body
          .get("error")
          .and_then(Value::as_str)
          .unwrap_or("unknown_error")
          .to_owned();
        return Err(ClientError::Api { method: method.to_owned(), error });
      }
      return Ok(body);
    }

    Err(ClientError::RateLimited { method: method.to_owned(), attempts: MAX_ATTEMPTS })
  }

  fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value)
      .map_err(|source| ClientError::Decode { method: method.to_owned(), source })
  }

  async fn get<T: DeserializeOwned>(
    &self,
    method: &str,
    params: &[(&str, &str)],
  ) -> Result<T, ClientError> {
    let body = self.call(method, |c, url| c.get(url).query(params)).await?;
    Self::decode(method, body)
  }

  async fn post_json<T: DeserializeOwned>(
    &self,
    method: &str,
    payload: &Value,
  ) -> Result<T, ClientError> {
    let body = self.call(method, |c, url| c.post(url).json(payload)).await?;
    Self::decode(method, body)
  }

  /// Every item of a cursor-paginated list method; `field` names the array
  /// holding each page's items.
  async fn paginate<T: DeserializeOwned>(
    &self,
    method: &str,
    params: &[(&str, &str)],
    field: &str,
  ) -> Result<Vec<T>, ClientError> {
    let mut items = Vec::new();
    let mut cursor = String::new();

    loop {
      let mut query: Vec<(&str, &str)> = params.to_vec();
      query.push(("limit", PAGE_SIZE));
      if !cursor.is_empty() {
        query.push(("cursor", cursor.as_str()));
      }

      let mut page = self.call(method, |c, url| c.get(url).query(&query)).await?;
      let batch = page
        .get_mut(field)
        .map(Value::take)
        .unwrap_or_else(|| Value::Array(Vec::new()));
      items.extend(Self::decode::<Vec<T>>(method, batch)?);

      let next = page
        .pointer("/response_metadata/next_cursor")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
      if next.is_empty() {
        return Ok(items);
      }
      cursor = next;
    }
  }

  // ── Directory ─────────────────────────────────────────────────────────────

  async fn members_of(&self, channel: &SlackChannel) -> Result<HashSet<String>, ClientError> {
    // Public channels are visible to everyone; only private ones need their
    // member list.
    if !channel.is_private {
      return Ok(HashSet::new());
    }
    let members: Vec<String> = self
      .paginate("conversations.members", &[("channel", channel.id.as_str())], "members")
      .await?;
    Ok(members.into_iter().collect())
  }

  async fn with_members(&self, channel: SlackChannel) -> Result<ChannelMembers, ClientError> {
    let members = self.members_of(&channel).await?;
    Ok(ChannelMembers {
      channel: Channel {
        id:         channel.id,
        name:       channel.name,
        is_private: channel.is_private,
      },
      members,
    })
  }
}

// ─── Platform impl ───────────────────────────────────────────────────────────

impl Platform for SlackClient {
  type Error = ClientError;

  fn bot_user_id(&self) -> &str { &self.bot_user_id }

  async fn list_all_users(&self) -> Result<Vec<User>, ClientError> {
    let users: Vec<SlackUser> = self.paginate("users.list", &[], "members").await?;
    Ok(users.into_iter().map(SlackUser::into_user).collect())
  }

  async fn list_all_channels_with_members(&self) -> Result<Vec<ChannelMembers>, ClientError> {
    let channels: Vec<SlackChannel> = self
      .paginate(
        "conversations.list",
        &[
          ("types", "public_channel,private_channel"),
          ("exclude_archived", "true"),
        ],
        "channels",
      )
      .await?;

    let mut out = Vec::new();
    for channel in channels.into_iter().filter(|c| c.is_member) {
      out.push(self.with_members(channel).await?);
    }
    Ok(out)
  }

  async fn channel_with_members(&self, channel_id: &str) -> Result<ChannelMembers, ClientError> {
    let info: ChannelInfo = self.get("conversations.info", &[("channel", channel_id)]).await?;
    self.with_members(info.channel).await
  }

  async fn send_message(&self, destination: &str, text: &str) -> Result<(), ClientError> {
    let _: Value = self
      .post_json("chat.postMessage", &json!({ "channel": destination, "text": text }))
      .await?;
    Ok(())
  }
}
