//! Bounded outbound HTTP fetches.
//!
//! Every outbound read in the gateway (signing certificates, subscription
//! confirmations, S3 objects) goes through [`read_limited`], so no response
//! can grow past its configured bound and a body is either returned whole or
//! not at all.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// Errors from a bounded outbound fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status code {0}")]
    Status(u16),

    #[error("response exceeds size limit ({limit} bytes)")]
    TooLarge { limit: usize },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("object store request failed: {0}")]
    ObjectStore(String),
}

/// Performs a plain GET and returns the response body.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`, failing on any non-2xx status or when the body is larger
    /// than `max_bytes`.
    async fn get(&self, url: &Url, max_bytes: usize) -> Result<Vec<u8>, FetchError>;
}

/// [`Fetcher`] backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &Url, max_bytes: usize) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status_code = status.as_u16(), "fetch_bad_status");
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = read_limited(response, max_bytes).await?;

        info!(url = %url, body_length = body.len(), "fetch_complete");

        Ok(body)
    }
}

/// Build the outbound HTTP client shared by all collaborators.
pub fn build_client(connect_timeout: Duration, timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(timeout)
        .build()
}

/// Read a response body, refusing anything larger than `limit` bytes.
///
/// A declared Content-Length over the limit is rejected before any of the
/// body is read.
pub async fn read_limited(mut response: Response, limit: usize) -> Result<Vec<u8>, FetchError> {
    if let Some(length) = response.content_length() {
        if length > limit as u64 {
            return Err(FetchError::TooLarge { limit });
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Err(FetchError::TooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}
