//! Fakes and fixtures shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde_json::json;
use sha1::Sha1;
use sha2::Sha256;
use url::Url;

use crate::fetch::{FetchError, Fetcher};
use crate::rt::{PostmailError, Ticketing};
use crate::ses::ObjectStore;
use crate::sns::{canonical_string, MessageKind, SignatureVersion, SignedEnvelope};

pub const SNS_CERT: &str = include_str!("../testdata/sns_signing_cert.pem");
pub const ISSUER_ONLY_CERT: &str = include_str!("../testdata/issuer_only_cert.pem");
pub const EXPIRED_CERT: &str = include_str!("../testdata/expired_cert.pem");
pub const FUTURE_CERT: &str = include_str!("../testdata/future_cert.pem");
pub const FOREIGN_CERT: &str = include_str!("../testdata/foreign_cert.pem");
const SIGNING_KEY: &str = include_str!("../testdata/signing_key.pem");

pub const SNS_CERT_URL: &str =
    "https://sns.us-east-1.amazonaws.com/SimpleNotificationService-test.pem";
pub const TOPIC_ARN: &str = "arn:aws:sns:us-east-1:123456789012:rt-mail";

static KEY: LazyLock<RsaPrivateKey> =
    LazyLock::new(|| RsaPrivateKey::from_pkcs8_pem(SIGNING_KEY).unwrap());

/// Sign `message` with the fixture key.
pub fn sign(version: SignatureVersion, message: &[u8]) -> Vec<u8> {
    match version {
        SignatureVersion::V1 => SigningKey::<Sha1>::new(KEY.clone()).sign(message).to_vec(),
        SignatureVersion::V2 => SigningKey::<Sha256>::new(KEY.clone()).sign(message).to_vec(),
    }
}

/// A correctly signed envelope for [`TOPIC_ARN`].
pub fn signed_envelope(
    kind: MessageKind,
    message: &str,
    version: SignatureVersion,
) -> SignedEnvelope {
    let mut envelope = SignedEnvelope {
        kind,
        message_id: "22b80b92-fdea-4c2c-8f9d-bdfb0c7bf324".to_string(),
        topic_arn: TOPIC_ARN.to_string(),
        message: message.to_string(),
        timestamp: "2025-01-01T00:00:00.000Z".to_string(),
        signature_version: match version {
            SignatureVersion::V1 => "1".to_string(),
            SignatureVersion::V2 => "2".to_string(),
        },
        signature: String::new(),
        signing_cert_url: SNS_CERT_URL.to_string(),
    };
    envelope.signature = STANDARD.encode(sign(version, canonical_string(&envelope).as_bytes()));
    envelope
}

/// Serialize an envelope the way SNS POSTs it.
pub fn envelope_json(envelope: &SignedEnvelope) -> Vec<u8> {
    let mut body = json!({
        "Type": envelope.kind.type_name(),
        "MessageId": envelope.message_id,
        "TopicArn": envelope.topic_arn,
        "Message": envelope.message,
        "Timestamp": envelope.timestamp,
        "SignatureVersion": envelope.signature_version,
        "Signature": envelope.signature,
        "SigningCertURL": envelope.signing_cert_url,
    });
    match &envelope.kind {
        MessageKind::SubscriptionConfirmation(sub) | MessageKind::UnsubscribeConfirmation(sub) => {
            body["SubscribeURL"] = json!(sub.subscribe_url);
            body["Token"] = json!(sub.token);
        }
        MessageKind::Notification {
            subject,
            unsubscribe_url,
        } => {
            if let Some(subject) = subject {
                body["Subject"] = json!(subject);
            }
            if let Some(url) = unsubscribe_url {
                body["UnsubscribeURL"] = json!(url);
            }
        }
        MessageKind::Unknown(_) => {}
    }
    serde_json::to_vec(&body).unwrap()
}

/// [`Fetcher`] serving fixed bodies by URL; unknown URLs answer 404.
#[derive(Default)]
pub struct StaticFetcher {
    bodies: HashMap<String, Result<Vec<u8>, u16>>,
    delay: Duration,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), Ok(body.as_bytes().to_vec()));
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.bodies.insert(url.to_string(), Err(status));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn get(&self, url: &Url, max_bytes: usize) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(url.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.bodies.get(url.as_str()) {
            Some(Ok(body)) if body.len() > max_bytes => {
                Err(FetchError::TooLarge { limit: max_bytes })
            }
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status)) => Err(FetchError::Status(*status)),
            None => Err(FetchError::Status(404)),
        }
    }
}

/// In-memory [`ObjectStore`]; missing objects answer 404.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: HashMap<(String, String), Vec<u8>>,
    calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, bucket: &str, key: &str, body: &[u8]) -> Self {
        self.objects
            .insert((bucket.to_string(), key.to_string()), body.to_vec());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        max_bytes: usize,
    ) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.objects.get(&(bucket.to_string(), key.to_string())) {
            Some(body) if body.len() > max_bytes => Err(FetchError::TooLarge { limit: max_bytes }),
            Some(body) => Ok(body.clone()),
            None => Err(FetchError::Status(404)),
        }
    }
}

/// Scripted reply for one recipient.
#[derive(Debug, Clone, Copy)]
pub enum TicketingReply {
    NotFound,
    Fail,
}

/// [`Ticketing`] fake recording every post; recipients succeed unless
/// scripted otherwise.
#[derive(Default)]
pub struct RecordingTicketing {
    replies: HashMap<String, TicketingReply>,
    posts: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingTicketing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, recipient: &str, reply: TicketingReply) -> Self {
        self.replies.insert(recipient.to_string(), reply);
        self
    }

    pub fn recipients(&self) -> Vec<String> {
        self.posts.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.posts.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }
}

#[async_trait]
impl Ticketing for RecordingTicketing {
    async fn postmail(&self, recipient: &str, message: &[u8]) -> Result<(), PostmailError> {
        self.posts
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.to_vec()));
        match self.replies.get(recipient) {
            None => Ok(()),
            Some(TicketingReply::NotFound) => Err(PostmailError::NotFound {
                recipient: recipient.to_string(),
            }),
            Some(TicketingReply::Fail) => Err(PostmailError::Other("RT failure".to_string())),
        }
    }
}
