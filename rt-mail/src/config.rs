//! Configuration.
//!
//! Runtime knobs come from environment variables ([`Config::from_env`]); the
//! RT gateway URL and the address table come from a JSON file
//! ([`RtConfig::load`]).

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::rt::AddressQueueTable;
use crate::ses::MAX_EMAIL_SIZE;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Path of the RT config file
    pub rt_config_path: PathBuf,

    /// Expected SNS topic; `/ses` is only served when set
    pub ses_topic_arn: Option<String>,

    /// Region of the SES inbound bucket
    pub aws_region: String,

    /// S3-compatible endpoint override, addressed path-style
    pub s3_endpoint: Option<String>,

    /// Total timeout of each outbound HTTP call
    pub http_timeout: Duration,

    pub connect_timeout: Duration,

    /// Deadline of each inbound request
    pub request_timeout: Duration,

    pub cert_cache_ttl: Duration,

    /// Bound on a raw email, from S3 or in a webhook body
    pub max_email_bytes: usize,

    /// Mailgun signing key for HMAC signature verification
    pub mailgun_signing_key: Option<String>,

    /// Maximum age in seconds for Mailgun webhook timestamps
    pub mailgun_signature_max_age: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            port: parse_or("PORT", 8002),

            rt_config_path: non_empty("RT_MAIL_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("rt-mail.json")),

            ses_topic_arn: non_empty("SES_TOPIC_ARN"),

            aws_region: non_empty("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),

            s3_endpoint: non_empty("S3_ENDPOINT"),

            http_timeout: Duration::from_millis(parse_or("HTTP_TIMEOUT_MS", 10_000)),

            connect_timeout: Duration::from_millis(parse_or("CONNECT_TIMEOUT_MS", 5_000)),

            request_timeout: Duration::from_millis(parse_or("REQUEST_TIMEOUT_MS", 60_000)),

            cert_cache_ttl: Duration::from_secs(parse_or("CERT_CACHE_TTL_SECS", 3_600)),

            max_email_bytes: parse_or("MAX_EMAIL_BYTES", MAX_EMAIL_SIZE),

            mailgun_signing_key: non_empty("MAILGUN_SIGNING_KEY"),

            // 5 minutes
            mailgun_signature_max_age: parse_or("MAILGUN_SIGNATURE_MAX_AGE", 300),
        }
    }
}

/// Contents of the RT config file.
///
/// ```json
/// {"rt-url": "https://rt.example/REST/1.0/NoAuth/mail-gateway",
///  "queues": {"support": "General", "billing@example.com": "Billing"}}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RtConfig {
    #[serde(rename = "rt-url")]
    pub rt_url: String,

    /// Target address or local part → queue, in declaration order
    #[serde(default)]
    pub queues: AddressQueueTable,
}

impl RtConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read RT config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid RT config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: RtConfig = serde_json::from_str(raw).context("Failed to parse RT config")?;
        config.gateway_url()?;

        if config.queues.is_empty() {
            warn!("rt_config_no_queues");
        }

        Ok(config)
    }

    /// The RT mail-gateway endpoint.
    pub fn gateway_url(&self) -> Result<Url> {
        let url = Url::parse(&self.rt_url)
            .with_context(|| format!("Invalid rt-url {:?}", self.rt_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("rt-url must be http or https, got {:?}", self.rt_url);
        }
        Ok(url)
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `name` or fall back to `default`, warning when the value is unusable.
fn parse_or<T: FromStr + Copy>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}
