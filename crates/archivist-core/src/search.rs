//! Search execution: turns a parsed [`Query`] into an access-controlled
//! [`MessageQuery`], runs it against an [`ArchiveStore`] and renders the
//! results for a chat reply.

use crate::{
  Error, Result,
  directory::Directory,
  model::Message,
  query::Query,
  store::{ArchiveStore, MessageQuery},
};

/// Reply text when nothing matched.
pub const NO_RESULTS: &str = "No results found";

/// One matching message with its author and channel resolved for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
  pub message:      Message,
  /// Display name, or the raw author id if the directory doesn't know it.
  pub author_name:  String,
  /// Channel name, or the raw channel id.
  pub channel_name: String,
}

impl SearchHit {
  fn resolve(message: Message, directory: &Directory) -> Self {
    let author_name = directory
      .user_name(&message.author_id)
      .unwrap_or(message.author_id.as_str())
      .to_owned();
    let channel_name = directory
      .channel_name(&message.channel_id)
      .unwrap_or(message.channel_id.as_str())
      .to_owned();
    Self { message, author_name, channel_name }
  }

  /// `*author* _date_ _#channel_` followed by the message text.
  pub fn render(&self) -> String {
    let when = match self.message.sent_at() {
      Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
      None => self.message.timestamp.clone(),
    };
    format!(
      "*{}* _{}_ _#{}_\n{}",
      self.author_name, when, self.channel_name, self.message.text
    )
  }
}

/// The result of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
  Hits(Vec<SearchHit>),
  /// Nothing visible to the requester matched.
  NoResults,
}

impl SearchOutcome {
  pub fn hits(&self) -> &[SearchHit] {
    match self {
      Self::Hits(hits) => hits,
      Self::NoResults => &[],
    }
  }

  /// The reply to send back to the requester.
  pub fn render(&self) -> String {
    match self {
      Self::Hits(hits) => hits
        .iter()
        .map(SearchHit::render)
        .collect::<Vec<_>>()
        .join("\n\n"),
      Self::NoResults => NO_RESULTS.to_owned(),
    }
  }
}

/// Resolve the names in `query` and scope it to what `requester` may see.
///
/// Returns `Ok(None)` when the search cannot match anything, so the store
/// need not be asked.
pub fn plan(
  directory: &Directory,
  query: &Query,
  requester: &str,
) -> Result<Option<MessageQuery>> {
  let author_id = query
    .author
    .as_deref()
    .map(|name| {
      directory
        .resolve_user(name)
        .map(str::to_owned)
        .ok_or_else(|| Error::UserNotFound(name.to_owned()))
    })
    .transpose()?;

  let channel_id = query
    .channel
    .as_deref()
    .map(|name| {
      directory
        .resolve_channel(name)
        .map(str::to_owned)
        .ok_or_else(|| Error::ChannelNotFound(name.to_owned()))
    })
    .transpose()?;

  if query.limit <= 0 {
    return Ok(None);
  }

  // Visibility is always the requester's, never the author's.
  let visible_channels = directory.visible_channels(requester);
  if visible_channels.is_empty() {
    return Ok(None);
  }
  if let Some(id) = &channel_id
    && !visible_channels.contains(id)
  {
    return Ok(None);
  }

  Ok(Some(MessageQuery {
    pattern: query.like_pattern(),
    author_id,
    channel_id,
    visible_channels,
    sort: query.sort,
    limit: usize::try_from(query.limit).unwrap_or(usize::MAX),
  }))
}

/// Run `query` on behalf of `requester`.
pub async fn search<S>(
  store: &S,
  directory: &Directory,
  query: &Query,
  requester: &str,
) -> Result<SearchOutcome>
where
  S: ArchiveStore,
{
  let Some(scoped) = plan(directory, query, requester)? else {
    tracing::debug!(requester, "search cannot match anything");
    return Ok(SearchOutcome::NoResults);
  };

  tracing::debug!(
    requester,
    pattern = %scoped.pattern,
    author = ?scoped.author_id,
    channel = ?scoped.channel_id,
    sort = ?scoped.sort,
    limit = scoped.limit,
    "searching archive"
  );

  let messages = store.search_messages(&scoped).await.map_err(Error::store)?;
  if messages.is_empty() {
    return Ok(SearchOutcome::NoResults);
  }

  Ok(SearchOutcome::Hits(
    messages
      .into_iter()
      .map(|m| SearchHit::resolve(m, directory))
      .collect(),
  ))
}

/// Parse `raw` and run it on behalf of `requester`.
pub async fn search_text<S>(
  store: &S,
  directory: &Directory,
  raw: &str,
  requester: &str,
) -> Result<SearchOutcome>
where
  S: ArchiveStore,
{
  let query = Query::parse(raw)?;
  search(store, directory, &query, requester).await
}
