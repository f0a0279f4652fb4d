//! Slack request signature verification.
//!
//! Every Events API request carries `X-Slack-Request-Timestamp` and
//! `X-Slack-Signature: v0=<hex>`, where the hex digest is
//! HMAC-SHA256(signing secret, `v0:{timestamp}:{body}`).

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Requests older (or newer) than this many seconds are rejected as replays.
pub const MAX_CLOCK_SKEW_SECS: i64 = 60 * 5;

/// The app's signing secret.
#[derive(Clone)]
pub struct SigningSecret(String);

impl SigningSecret {
  pub fn new(secret: impl Into<String>) -> Self { Self(secret.into()) }

  /// The `v0=<hex>` signature for `body` sent at `timestamp`.
  pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
    format!("v0={}", hex::encode(self.mac(timestamp, body).finalize().into_bytes()))
  }

  fn mac(&self, timestamp: &str, body: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(self.0.as_bytes())
      .unwrap_or_else(|_| unreachable!("hmac key of any length is valid"));
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    mac
  }
}

/// Verify the signature headers of a request whose raw body is `body`.
/// `now` is the current Unix time in seconds.
pub fn verify_signature(
  headers: &HeaderMap,
  body: &[u8],
  secret: &SigningSecret,
  now: i64,
) -> Result<(), Error> {
  let timestamp = headers
    .get(TIMESTAMP_HEADER)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthorized)?;

  let sent: i64 = timestamp.parse().map_err(|_| Error::Unauthorized)?;
  if (now - sent).abs() > MAX_CLOCK_SKEW_SECS {
    return Err(Error::Unauthorized);
  }

  let signature = headers
    .get(SIGNATURE_HEADER)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("v0="))
    .ok_or(Error::Unauthorized)?;
  let signature = hex::decode(signature).map_err(|_| Error::Unauthorized)?;

  // Constant-time comparison.
  secret
    .mac(timestamp, body)
    .verify_slice(&signature)
    .map_err(|_| Error::Unauthorized)
}
