//! Fan-out of one raw message to all of its recipients.

use axum::http::StatusCode;
use tracing::{error, info, warn};

use super::client::Ticketing;
use crate::mail::MailSummary;

/// Aggregate result of delivering one message to every recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// At least one recipient was filed and nothing failed transiently.
    Delivered,
    /// No recipient resolved to a queue.
    NoneRouted,
    /// At least one post failed for a reason other than routing.
    Unavailable,
}

impl DeliveryOutcome {
    /// Webhook response status. 503 asks the sender to retry.
    pub fn status(&self) -> StatusCode {
        match self {
            DeliveryOutcome::Delivered => StatusCode::NO_CONTENT,
            DeliveryOutcome::NoneRouted => StatusCode::NOT_FOUND,
            DeliveryOutcome::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Post the raw `message` bytes for each recipient, sequentially and in order.
///
/// Not-found results do not stop the loop; the outcome is `NoneRouted` only
/// when every recipient was not found.
pub async fn deliver_all<S: AsRef<str>>(
    ticketing: &dyn Ticketing,
    recipients: &[S],
    message: &[u8],
) -> DeliveryOutcome {
    let summary = MailSummary::parse(message);
    info!(
        recipients = recipients.len(),
        message_id = ?summary.message_id,
        subject = ?summary.subject,
        from = ?summary.from,
        message_length = message.len(),
        "delivery_start"
    );

    let mut not_found = 0;
    let mut failed = 0;

    for recipient in recipients {
        let recipient = recipient.as_ref();
        match ticketing.postmail(recipient, message).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!(recipient = %recipient, error = %e, "delivery_recipient_not_configured");
                not_found += 1;
            }
            Err(e) => {
                error!(recipient = %recipient, error = %e, "delivery_recipient_failed");
                failed += 1;
            }
        }
    }

    let outcome = if not_found == recipients.len() {
        DeliveryOutcome::NoneRouted
    } else if failed > 0 {
        DeliveryOutcome::Unavailable
    } else {
        DeliveryOutcome::Delivered
    };

    info!(
        not_found = not_found,
        failed = failed,
        outcome = ?outcome,
        "delivery_complete"
    );

    outcome
}
