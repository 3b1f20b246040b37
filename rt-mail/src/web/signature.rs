//! Mailgun webhook signature verification.
//!
//! Mailgun signs webhook requests using HMAC-SHA256.
//! See "Securing webhooks" in
//! <https://documentation.mailgun.com/docs/mailgun/user-manual/events/webhooks/>.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MailgunSignatureError {
    #[error("timestamp, token or signature missing")]
    MissingFields,

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("timestamp is {age}s old (max {max_age}s)")]
    Stale { age: u64, max_age: u64 },

    #[error("signature is not valid hex")]
    MalformedSignature,

    #[error("signature mismatch")]
    Mismatch,
}

/// Verify a Mailgun webhook signature.
///
/// Mailgun webhooks include three fields for signature verification:
/// - timestamp: Unix epoch seconds when the webhook was generated
/// - token: A randomly generated string
/// - signature: HMAC-SHA256 hex digest of timestamp + token
///
/// Timestamps further than `max_age_seconds` from now, in either direction,
/// are rejected to limit replays.
pub fn verify_mailgun_signature(
    signing_key: &str,
    timestamp: &str,
    token: &str,
    signature: &str,
    max_age_seconds: u64,
) -> Result<(), MailgunSignatureError> {
    if timestamp.is_empty() || token.is_empty() || signature.is_empty() {
        warn!(
            has_timestamp = !timestamp.is_empty(),
            has_token = !token.is_empty(),
            has_signature = !signature.is_empty(),
            "mailgun_signature_missing_fields"
        );
        return Err(MailgunSignatureError::MissingFields);
    }

    let webhook_time: u64 = timestamp.parse().map_err(|_| {
        warn!(timestamp = %timestamp, "mailgun_signature_invalid_timestamp");
        MailgunSignatureError::InvalidTimestamp(timestamp.to_string())
    })?;

    let current_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let age = current_time.abs_diff(webhook_time);
    if age > max_age_seconds {
        warn!(
            webhook_time = webhook_time,
            current_time = current_time,
            age_seconds = age,
            max_age_seconds = max_age_seconds,
            "mailgun_signature_stale"
        );
        return Err(MailgunSignatureError::Stale {
            age,
            max_age: max_age_seconds,
        });
    }

    let provided = hex::decode(signature).map_err(|_| MailgunSignatureError::MalformedSignature)?;

    // HMAC-SHA256(signing_key, timestamp + token); HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes())
        .map_err(|_| MailgunSignatureError::Mismatch)?;
    mac.update(timestamp.as_bytes());
    mac.update(token.as_bytes());

    // verify_slice compares in constant time
    mac.verify_slice(&provided).map_err(|_| {
        warn!(signature_length = signature.len(), "mailgun_signature_mismatch");
        MailgunSignatureError::Mismatch
    })
}

/// The signing key, if verification is configured.
pub fn configured_signing_key(signing_key: &Option<String>) -> Option<&str> {
    signing_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

#[cfg(test)]
pub(crate) fn sign_for_test(signing_key: &str, timestamp: &str, token: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes()).unwrap();
    mac.update(format!("{}{}", timestamp, token).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
