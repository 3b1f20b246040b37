//! SNS message envelope types.

use std::str::FromStr;

use serde::Deserialize;

/// The outer SNS message as POSTed to the webhook.
///
/// The envelope's `Type` field is decoded into [`MessageKind`], which carries
/// only the fields that take part in that kind's signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    pub kind: MessageKind,
    pub message_id: String,
    pub topic_arn: String,
    pub message: String,
    pub timestamp: String,
    /// Raw `SignatureVersion`; parsed into [`SignatureVersion`] at verification.
    pub signature_version: String,
    /// Base64-encoded signature.
    pub signature: String,
    pub signing_cert_url: String,
}

/// Message kind with the kind-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    SubscriptionConfirmation(Subscription),
    Notification {
        subject: Option<String>,
        unsubscribe_url: Option<String>,
    },
    UnsubscribeConfirmation(Subscription),
    /// Any other `Type` value, kept verbatim so the canonical string still
    /// reproduces it.
    Unknown(String),
}

/// Subscribe fields shared by subscription and unsubscribe confirmations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscription {
    pub subscribe_url: String,
    pub token: String,
}

impl MessageKind {
    /// The `Type` value as it appears on the wire.
    pub fn type_name(&self) -> &str {
        match self {
            MessageKind::SubscriptionConfirmation(_) => "SubscriptionConfirmation",
            MessageKind::Notification { .. } => "Notification",
            MessageKind::UnsubscribeConfirmation(_) => "UnsubscribeConfirmation",
            MessageKind::Unknown(name) => name,
        }
    }
}

/// SNS signature scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureVersion {
    /// `SignatureVersion: "1"`, SHA1 with RSA.
    V1,
    /// `SignatureVersion: "2"`, SHA256 with RSA.
    V2,
}

impl FromStr for SignatureVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(SignatureVersion::V1),
            "2" => Ok(SignatureVersion::V2),
            other => Err(other.to_string()),
        }
    }
}

/// JSON shape of the envelope. Optional fields only matter for some kinds.
#[derive(Debug, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "MessageId")]
    message_id: String,
    #[serde(rename = "TopicArn")]
    topic_arn: String,
    #[serde(rename = "Subject", default)]
    subject: Option<String>,
    #[serde(rename = "Message")]
    message: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "SignatureVersion")]
    signature_version: String,
    #[serde(rename = "Signature")]
    signature: String,
    #[serde(rename = "SigningCertURL")]
    signing_cert_url: String,
    #[serde(rename = "SubscribeURL", default)]
    subscribe_url: Option<String>,
    #[serde(rename = "Token", default)]
    token: Option<String>,
    #[serde(rename = "UnsubscribeURL", default)]
    unsubscribe_url: Option<String>,
}

impl SignedEnvelope {
    /// Parse an SNS POST body. Missing required fields are an error.
    pub fn from_json(body: &[u8]) -> serde_json::Result<Self> {
        let wire: WireEnvelope = serde_json::from_slice(body)?;
        Ok(wire.into())
    }
}

impl From<WireEnvelope> for SignedEnvelope {
    fn from(wire: WireEnvelope) -> Self {
        let subscription = || Subscription {
            subscribe_url: wire.subscribe_url.clone().unwrap_or_default(),
            token: wire.token.clone().unwrap_or_default(),
        };

        let kind = match wire.kind.as_str() {
            "SubscriptionConfirmation" => MessageKind::SubscriptionConfirmation(subscription()),
            "UnsubscribeConfirmation" => MessageKind::UnsubscribeConfirmation(subscription()),
            "Notification" => MessageKind::Notification {
                subject: wire.subject.clone().filter(|s| !s.is_empty()),
                unsubscribe_url: wire.unsubscribe_url.clone(),
            },
            other => MessageKind::Unknown(other.to_string()),
        };

        SignedEnvelope {
            kind,
            message_id: wire.message_id,
            topic_arn: wire.topic_arn,
            message: wire.message,
            timestamp: wire.timestamp,
            signature_version: wire.signature_version,
            signature: wire.signature,
            signing_cert_url: wire.signing_cert_url,
        }
    }
}
