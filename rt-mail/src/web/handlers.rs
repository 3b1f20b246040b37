//! Webhook endpoint handlers.
//!
//! Each handler only adapts its provider's payload to
//! `(recipients, raw message)` and hands it to [`deliver_all`], so every
//! provider maps routing results to the same status codes.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::rt::{deliver_all, DeliveryOutcome, Ticketing};
use crate::ses::NotificationDispatcher;
use crate::web::form::FormFields;
use crate::web::signature::{configured_signing_key, verify_mailgun_signature};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ticketing: Arc<dyn Ticketing>,
    /// Present only when an SNS topic is configured.
    pub dispatcher: Option<NotificationDispatcher>,
}

impl AppState {
    pub fn new(config: Config, ticketing: Arc<dyn Ticketing>) -> Self {
        Self {
            config: Arc::new(config),
            ticketing,
            dispatcher: None,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }
}

/// Webhook response.
#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
}

/// Status-only reply; 204 carries no body.
fn reply(status: StatusCode) -> Response {
    let label = match status {
        StatusCode::NO_CONTENT => return status.into_response(),
        StatusCode::OK => "ok",
        StatusCode::BAD_REQUEST => "bad_request",
        StatusCode::UNAUTHORIZED => "unauthorized",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::SERVICE_UNAVAILABLE => "unavailable",
        _ => "error",
    };
    (status, Json(WebhookResponse { status: label })).into_response()
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Mailgun
// =============================================================================

/// Mailgun "store and notify / forward" route with the raw MIME message in
/// `body-mime`.
pub async fn mailgun_mime(State(state): State<AppState>, form: FormFields) -> Response {
    let recipient = form.text("recipient");
    let recipient = recipient.trim();
    let body = form.get("body-mime");

    info!(
        recipient = %recipient,
        body_mime_length = body.len(),
        has_signature = !form.get("signature").is_empty(),
        "mailgun_webhook_received"
    );

    if let Some(signing_key) = configured_signing_key(&state.config.mailgun_signing_key) {
        if let Err(e) = verify_mailgun_signature(
            signing_key,
            &form.text("timestamp"),
            &form.text("token"),
            &form.text("signature"),
            state.config.mailgun_signature_max_age,
        ) {
            warn!(recipient = %recipient, error = %e, "mailgun_signature_invalid");
            return reply(StatusCode::UNAUTHORIZED);
        }
    }

    if recipient.is_empty() {
        warn!("mailgun_recipient_missing");
        return reply(StatusCode::BAD_REQUEST);
    }

    let outcome = deliver_all(state.ticketing.as_ref(), &[recipient], body).await;
    reply(outcome.status())
}

// =============================================================================
// SendGrid
// =============================================================================

/// SMTP envelope posted by SendGrid Inbound Parse as a JSON string.
#[derive(Debug, Deserialize)]
pub struct SendgridEnvelope {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
}

/// SendGrid Inbound Parse with "post the raw, full MIME message" enabled.
pub async fn sendgrid_mx(State(state): State<AppState>, form: FormFields) -> Response {
    let raw_envelope = form.get("envelope");
    if raw_envelope.is_empty() {
        warn!("sendgrid_envelope_missing");
        return reply(StatusCode::BAD_REQUEST);
    }

    let envelope: SendgridEnvelope = match serde_json::from_slice(raw_envelope) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "sendgrid_envelope_invalid");
            return reply(StatusCode::BAD_REQUEST);
        }
    };

    if envelope.to.is_empty() {
        warn!(from = %envelope.from, "sendgrid_envelope_no_recipients");
        return reply(StatusCode::BAD_REQUEST);
    }

    let body = form.get("email");
    info!(
        from = %envelope.from,
        to = ?envelope.to,
        email_length = body.len(),
        "sendgrid_webhook_received"
    );

    let outcome = deliver_all(state.ticketing.as_ref(), envelope.to.as_slice(), body).await;
    reply(outcome.status())
}

// =============================================================================
// SparkPost
// =============================================================================

/// SparkPost checks webhook endpoints with HEAD before posting.
pub async fn spark_head() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct SparkEventBatchItem {
    #[serde(default)]
    msys: HashMap<String, SparkEvent>,
}

#[derive(Debug, Deserialize)]
struct SparkEvent {
    #[serde(rename = "type", default)]
    event_type: String,
    #[serde(default)]
    rcpt_to: Option<String>,
}

/// SparkPost event webhook. Events are logged, nothing else.
pub async fn spark_events(body: Bytes) -> Response {
    let batch: Vec<SparkEventBatchItem> = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(e) => {
            warn!(error = %e, "sparkpost_events_invalid");
            return reply(StatusCode::BAD_REQUEST);
        }
    };

    for (class, event) in batch.iter().flat_map(|item| item.msys.iter()) {
        info!(
            event_class = %class,
            event_type = %event.event_type,
            rcpt_to = ?event.rcpt_to,
            "sparkpost_event_received"
        );
    }

    reply(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct SparkRelayBatchItem {
    #[serde(default)]
    msys: HashMap<String, RelayMessage>,
}

#[derive(Debug, Deserialize)]
struct RelayMessage {
    rcpt_to: String,
    #[serde(default)]
    msg_from: String,
    content: RelayContent,
}

#[derive(Debug, Deserialize)]
struct RelayContent {
    email_rfc822: String,
    #[serde(default)]
    email_rfc822_is_base64: bool,
    #[serde(default)]
    subject: String,
}

impl RelayMessage {
    /// Message bytes; base64 content is decoded without charset conversion.
    fn raw_email(&self) -> Result<Vec<u8>, base64::DecodeError> {
        if self.content.email_rfc822_is_base64 {
            STANDARD.decode(self.content.email_rfc822.trim())
        } else {
            Ok(self.content.email_rfc822.clone().into_bytes())
        }
    }
}

/// SparkPost inbound relay webhook.
///
/// Each relay message goes to its own `rcpt_to`; outcomes are combined the
/// same way [`deliver_all`] combines recipients.
pub async fn spark_relay(State(state): State<AppState>, body: Bytes) -> Response {
    let batch: Vec<SparkRelayBatchItem> = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(e) => {
            warn!(error = %e, "sparkpost_relay_invalid");
            return reply(StatusCode::BAD_REQUEST);
        }
    };

    let mut messages = Vec::new();
    for message in batch.into_iter().flat_map(|item| item.msys.into_values()) {
        match message.raw_email() {
            Ok(raw) => messages.push((message, raw)),
            Err(e) => {
                warn!(
                    rcpt_to = %message.rcpt_to,
                    error = %e,
                    "sparkpost_relay_content_invalid"
                );
                return reply(StatusCode::BAD_REQUEST);
            }
        }
    }

    let mut outcomes = Vec::with_capacity(messages.len());
    for (message, raw) in &messages {
        info!(
            from = %message.msg_from,
            to = %message.rcpt_to,
            subject = %message.content.subject,
            "sparkpost_relay_message"
        );
        let recipients = [message.rcpt_to.as_str()];
        outcomes.push(deliver_all(state.ticketing.as_ref(), &recipients, raw).await);
    }

    let outcome = if outcomes.contains(&DeliveryOutcome::Unavailable) {
        DeliveryOutcome::Unavailable
    } else if !outcomes.is_empty()
        && outcomes.iter().all(|o| *o == DeliveryOutcome::NoneRouted)
    {
        DeliveryOutcome::NoneRouted
    } else {
        DeliveryOutcome::Delivered
    };

    reply(outcome.status())
}

// =============================================================================
// AWS SES via SNS
// =============================================================================

/// SNS HTTPS subscription endpoint.
pub async fn ses_notification(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(dispatcher) = &state.dispatcher else {
        return reply(StatusCode::NOT_FOUND);
    };

    let outcome = dispatcher.dispatch(&body).await;
    info!(
        outcome = ?outcome,
        status_code = outcome.status().as_u16(),
        "ses_webhook_handled"
    );

    reply(outcome.status())
}
