//! rt-mail - Inbound email gateway for Request Tracker.
//!
//! This library provides the modules behind the `rt-mail` server:
//! - `web`: webhook endpoints for Mailgun, SendGrid, SparkPost and AWS SES
//! - `sns`: SNS envelope authentication (certificate cache, canonical string,
//!   signature verification)
//! - `ses`: the SES notification dispatcher and the S3 object store
//! - `rt`: recipient-to-queue routing and the RT mail-gateway client
//!
//! ## Architecture
//!
//! ```text
//! Provider webhook ─┐
//!                   ├→ deliver_all → AddressRouter → RT mail gateway
//! SNS → verify → SES dispatcher → S3 ┘
//! ```

pub mod config;
pub mod fetch;
pub mod mail;
pub mod rt;
pub mod ses;
pub mod sns;
pub mod web;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{Config, RtConfig};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use rt::{deliver_all, AddressRouter, DeliveryOutcome, PostmailError, RtClient, Ticketing};
pub use ses::{NotificationDispatcher, ObjectStore, Outcome, S3ObjectStore};
pub use sns::{CertificateCache, SignatureVerifier, SignedEnvelope};
pub use web::AppState;
