//! SNS → SES notification state machine.
//!
//! ```text
//! parse → verify → topic check → SubscriptionConfirmation → confirm GET
//!                              → Notification             → S3 → deliver_all
//!                              → UnsubscribeConfirmation  → ack
//! ```
//!
//! Every stage maps to a final [`Outcome`]; nothing is retried here. A 5xx
//! outcome tells SNS to redeliver.

use std::sync::Arc;

use axum::http::StatusCode;
use tracing::{error, info, warn};

use super::notification::EmailNotification;
use super::object_store::ObjectStore;
use crate::fetch::{FetchError, Fetcher};
use crate::rt::{deliver_all, DeliveryOutcome, Ticketing};
use crate::sns::{
    validate_sns_url, AuthError, MessageKind, SignatureVerifier, SignedEnvelope, Subscription,
};

/// Upper bound on a raw email read from S3 (50 MiB).
pub const MAX_EMAIL_SIZE: usize = 50 * 1024 * 1024;

/// Upper bound on a subscription confirmation response.
const MAX_CONFIRM_BYTES: usize = 64 * 1024;

/// Terminal state of one dispatched envelope.
#[derive(Debug)]
pub enum Outcome {
    /// Subscription confirmed with SNS.
    Confirmed,
    /// Unsubscribe confirmation acknowledged.
    Acknowledged,
    /// Authenticated notification that needs no action.
    Skipped,
    /// Message relayed to its recipients.
    Relayed(DeliveryOutcome),
    BadRequest(String),
    Unauthorized(AuthError),
    TopicMismatch { topic_arn: String },
    Failed(String),
}

impl Outcome {
    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::Confirmed | Outcome::Acknowledged => StatusCode::OK,
            Outcome::Skipped => StatusCode::NO_CONTENT,
            Outcome::Relayed(delivery) => delivery.status(),
            Outcome::BadRequest(_) => StatusCode::BAD_REQUEST,
            Outcome::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Outcome::TopicMismatch { .. } => StatusCode::FORBIDDEN,
            Outcome::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Authenticates SNS envelopes for one topic and acts on them.
#[derive(Clone)]
pub struct NotificationDispatcher {
    verifier: SignatureVerifier,
    fetcher: Arc<dyn Fetcher>,
    object_store: Arc<dyn ObjectStore>,
    ticketing: Arc<dyn Ticketing>,
    topic_arn: String,
    max_email_bytes: usize,
}

impl NotificationDispatcher {
    pub fn new(
        verifier: SignatureVerifier,
        fetcher: Arc<dyn Fetcher>,
        object_store: Arc<dyn ObjectStore>,
        ticketing: Arc<dyn Ticketing>,
        topic_arn: String,
    ) -> Self {
        Self {
            verifier,
            fetcher,
            object_store,
            ticketing,
            topic_arn,
            max_email_bytes: MAX_EMAIL_SIZE,
        }
    }

    /// Override the S3 object bound.
    pub fn with_max_email_bytes(mut self, max_email_bytes: usize) -> Self {
        self.max_email_bytes = max_email_bytes;
        self
    }

    /// Run one raw SNS POST body through the state machine.
    pub async fn dispatch(&self, body: &[u8]) -> Outcome {
        let envelope = match SignedEnvelope::from_json(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(stage = "parse", error = %e, "sns_envelope_invalid");
                return Outcome::BadRequest(format!("invalid SNS envelope: {e}"));
            }
        };

        if let Err(e) = self.verifier.verify(&envelope).await {
            warn!(
                stage = "verify",
                message_id = %envelope.message_id,
                error = %e,
                "sns_signature_invalid"
            );
            return Outcome::Unauthorized(e);
        }

        if envelope.topic_arn != self.topic_arn {
            warn!(
                stage = "classify",
                message_id = %envelope.message_id,
                topic_arn = %envelope.topic_arn,
                "sns_topic_mismatch"
            );
            return Outcome::TopicMismatch {
                topic_arn: envelope.topic_arn,
            };
        }

        info!(
            message_id = %envelope.message_id,
            message_type = envelope.kind.type_name(),
            "sns_envelope_authenticated"
        );

        match &envelope.kind {
            MessageKind::SubscriptionConfirmation(subscription) => {
                self.confirm_subscription(subscription).await
            }
            MessageKind::Notification { .. } => self.relay(&envelope.message).await,
            MessageKind::UnsubscribeConfirmation(_) => {
                info!(topic_arn = %envelope.topic_arn, "sns_unsubscribed");
                Outcome::Acknowledged
            }
            MessageKind::Unknown(name) => {
                warn!(stage = "classify", message_type = %name, "sns_message_type_unknown");
                Outcome::BadRequest(format!("unknown message type {name:?}"))
            }
        }
    }

    async fn confirm_subscription(&self, subscription: &Subscription) -> Outcome {
        if subscription.subscribe_url.is_empty() {
            warn!(stage = "confirm", "sns_subscribe_url_missing");
            return Outcome::BadRequest("SubscribeURL is empty".to_string());
        }

        let url = match validate_sns_url(&subscription.subscribe_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(stage = "confirm", error = %e, "sns_subscribe_url_untrusted");
                return Outcome::BadRequest(e.to_string());
            }
        };

        match self.fetcher.get(&url, MAX_CONFIRM_BYTES).await {
            Ok(_) => {
                info!(topic_arn = %self.topic_arn, "sns_subscription_confirmed");
                Outcome::Confirmed
            }
            Err(e) => {
                error!(stage = "confirm", error = %e, "sns_subscription_confirm_failed");
                Outcome::Failed(format!("subscription confirmation failed: {e}"))
            }
        }
    }

    async fn relay(&self, message: &str) -> Outcome {
        let notification = match EmailNotification::from_json(message) {
            Ok(notification) => notification,
            Err(e) => {
                warn!(stage = "relay", error = %e, "ses_notification_invalid");
                return Outcome::BadRequest(format!("invalid SES notification: {e}"));
            }
        };

        if !notification.is_relayable() {
            info!(
                notification_type = %notification.notification_type,
                action_type = %notification.receipt.action.action_type,
                "ses_notification_skipped"
            );
            return Outcome::Skipped;
        }

        let action = &notification.receipt.action;
        if action.bucket_name.is_empty() || action.object_key.is_empty() {
            warn!(stage = "relay", "ses_object_location_missing");
            return Outcome::BadRequest("S3 bucket or object key is empty".to_string());
        }

        let raw = match self
            .object_store
            .get_object(&action.bucket_name, &action.object_key, self.max_email_bytes)
            .await
        {
            Ok(raw) => raw,
            Err(e @ FetchError::TooLarge { .. }) => {
                warn!(
                    stage = "relay",
                    bucket = %action.bucket_name,
                    key = %action.object_key,
                    error = %e,
                    "ses_email_too_large"
                );
                return Outcome::BadRequest(e.to_string());
            }
            Err(e) => {
                error!(
                    stage = "relay",
                    bucket = %action.bucket_name,
                    key = %action.object_key,
                    error = %e,
                    "ses_email_fetch_failed"
                );
                return Outcome::Failed(format!("S3 fetch failed: {e}"));
            }
        };

        let recipients = &notification.receipt.recipients;
        if recipients.is_empty() {
            warn!(stage = "relay", message_id = %notification.mail.message_id, "ses_no_recipients");
            return Outcome::BadRequest("notification has no recipients".to_string());
        }

        info!(
            message_id = %notification.mail.message_id,
            source = %notification.mail.source,
            recipients = recipients.len(),
            email_size = raw.len(),
            "ses_email_fetched"
        );

        Outcome::Relayed(deliver_all(self.ticketing.as_ref(), recipients.as_slice(), &raw).await)
    }
}
