//! RT mail-gateway client.
//!
//! Messages are posted to RT's `mail-gateway` endpoint as a form with the
//! resolved `queue`, the `action` (`correspond` or `comment`) and the raw
//! RFC 5322 `message`.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::form_urlencoded::byte_serialize;
use url::Url;

use super::router::AddressRouter;
use crate::fetch::read_limited;

/// Upper bound on the RT response body we read.
const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Failure to file a message.
///
/// `NotFound` is a routing outcome (no queue configured for the recipient);
/// `Other` is anything else and is worth retrying upstream.
#[derive(Debug, Error)]
pub enum PostmailError {
    #[error("queue not found for {recipient:?}")]
    NotFound { recipient: String },

    #[error("{0}")]
    Other(String),
}

impl PostmailError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PostmailError::NotFound { .. })
    }
}

/// Files a raw message for a recipient in the ticketing system.
#[async_trait]
pub trait Ticketing: Send + Sync {
    /// File `message`, the raw RFC 5322 bytes, unchanged.
    async fn postmail(&self, recipient: &str, message: &[u8]) -> Result<(), PostmailError>;
}

/// [`Ticketing`] implementation for RT's mail gateway.
#[derive(Clone)]
pub struct RtClient {
    client: Client,
    url: Url,
    router: AddressRouter,
}

impl RtClient {
    pub fn new(client: Client, url: Url, router: AddressRouter) -> Self {
        Self {
            client,
            url,
            router,
        }
    }
}

#[async_trait]
impl Ticketing for RtClient {
    async fn postmail(&self, recipient: &str, message: &[u8]) -> Result<(), PostmailError> {
        let route = self.router.resolve(recipient);
        if route.is_unroutable() {
            warn!(recipient = %recipient, "rt_queue_not_found");
            return Err(PostmailError::NotFound {
                recipient: recipient.to_string(),
            });
        }

        info!(
            queue = %route.queue,
            action = route.action.as_str(),
            recipient = %recipient,
            message_length = message.len(),
            "rt_posting"
        );

        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form_body(&route.queue, route.action.as_str(), message))
            .send()
            .await
            .map_err(|e| PostmailError::Other(format!("post form: {e}")))?;

        let status = response.status();
        let body = read_limited(response, MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| PostmailError::Other(format!("reading RT response: {e}")))?;
        let body = String::from_utf8_lossy(&body);

        debug!(status_code = status.as_u16(), body = %body, "rt_response");

        if body.contains("failure") {
            return Err(PostmailError::Other("RT failure".to_string()));
        }

        if status.as_u16() > 299 {
            return Err(PostmailError::Other(format!(
                "status code {} (>299)",
                status.as_u16()
            )));
        }

        info!(queue = %route.queue, recipient = %recipient, "rt_post_complete");

        Ok(())
    }
}

/// `application/x-www-form-urlencoded` body. The message is encoded byte
/// for byte, so 8bit content in any charset reaches RT as received.
fn form_body(queue: &str, action: &str, message: &[u8]) -> String {
    let mut body = String::with_capacity(message.len() + 64);
    for (i, (name, value)) in [
        ("queue", queue.as_bytes()),
        ("action", action.as_bytes()),
        ("message", message),
    ]
    .into_iter()
    .enumerate()
    {
        if i > 0 {
            body.push('&');
        }
        body.push_str(name);
        body.push('=');
        body.extend(byte_serialize(value));
    }
    body
}
