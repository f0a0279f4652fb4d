//! The search query language.
//!
//! A query is a whitespace-separated line of words and `key:value` filters:
//!
//! ```text
//! <words> from:<user> in:<channel> sort:asc|desc limit:<number>
//! ```
//!
//! Words are matched as one case-insensitive substring of the message text.
//! Emoji shortcodes such as `:tada:` are kept as words.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of results returned when the query has no `limit:` filter.
pub const DEFAULT_LIMIT: i64 = 10;

/// Requested ordering on message timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
  Ascending,
  Descending,
  /// Leave ordering to the store (insertion order).
  #[default]
  Unspecified,
}

/// A parsed search query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
  pub terms:   Vec<String>,
  /// Display name of the author to restrict to.
  pub author:  Option<String>,
  /// Name of the channel to restrict to.
  pub channel: Option<String>,
  pub sort:    Sort,
  /// Maximum number of results; zero or negative yields nothing.
  pub limit:   i64,
}

impl Default for Query {
  fn default() -> Self {
    Self {
      terms:   Vec::new(),
      author:  None,
      channel: None,
      sort:    Sort::Unspecified,
      limit:   DEFAULT_LIMIT,
    }
  }
}

impl Query {
  /// Parse a raw query line. The line is lower-cased first.
  ///
  /// Fails on the first invalid `sort:` or `limit:` value; nothing of a
  /// failed query should be executed.
  pub fn parse(raw: &str) -> Result<Self> {
    let raw = raw.to_lowercase();
    let mut query = Self::default();

    for token in raw.split_whitespace() {
      if is_emoji(token) {
        query.terms.push(token.to_owned());
        continue;
      }

      let Some((key, value)) = token.split_once(':') else {
        query.terms.push(token.to_owned());
        continue;
      };

      // `a:b:c` has no agreed meaning; skip it.
      if value.contains(':') {
        continue;
      }

      match key {
        "from" => {
          query.author = Some(value.trim().trim_start_matches('@').trim().to_owned());
        }
        "in" => {
          query.channel = Some(value.trim().trim_start_matches('#').trim().to_owned());
        }
        "sort" => {
          query.sort = match value {
            "asc" => Sort::Ascending,
            "desc" => Sort::Descending,
            other => return Err(Error::InvalidSort(other.to_owned())),
          };
        }
        "limit" => {
          query.limit = value
            .parse()
            .map_err(|_| Error::InvalidLimit(value.to_owned()))?;
        }
        _ => query.terms.push(token.to_owned()),
      }
    }

    Ok(query)
  }

  /// The free-text terms joined with single spaces.
  pub fn text(&self) -> String { self.terms.join(" ") }

  /// A SQL `LIKE` pattern matching [`Self::text`] anywhere in a message.
  ///
  /// `%`, `_` and `\` are escaped with `\`; the statement must declare
  /// `ESCAPE '\'`.
  pub fn like_pattern(&self) -> String {
    let mut pattern = String::from("%");
    for c in self.text().chars() {
      if matches!(c, '%' | '_' | '\\') {
        pattern.push('\\');
      }
      pattern.push(c);
    }
    pattern.push('%');
    pattern
  }
}

fn is_emoji(token: &str) -> bool {
  token.len() > 2 && token.starts_with(':') && token.ends_with(':')
}
