//! SNS message signature verification.
//!
//! Reference: https://docs.aws.amazon.com/sns/latest/dg/sns-verify-signature-of-message.html

use std::sync::{Arc, LazyLock};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use thiserror::Error;
use tracing::warn;
use url::Url;

use super::canonical::canonical_string;
use super::cert_cache::{CertificateCache, CertificateError};
use super::envelope::{SignatureVersion, SignedEnvelope};

/// Hosts allowed to serve signing certificates and subscribe URLs.
static SNS_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^sns\.[a-z0-9-]+\.amazonaws\.com$").expect("static regex is valid")
});

/// Reasons an envelope fails authentication.
///
/// Every variant is an authentication failure for the caller; none is
/// retried locally.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("untrusted source URL: {0}")]
    UntrustedSource(String),

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error("malformed signature: {0}")]
    MalformedSignature(#[from] base64::DecodeError),

    #[error("unsupported SignatureVersion: {0:?}")]
    UnsupportedSignatureVersion(String),

    #[error("signature verification failed")]
    SignatureMismatch,
}

/// Validate that `raw` is an https URL on an `sns.<region>.amazonaws.com` host.
///
/// Used for both `SigningCertURL` and `SubscribeURL`, so the gateway never
/// issues a request to a host chosen by the sender.
pub fn validate_sns_url(raw: &str) -> Result<Url, AuthError> {
    let url = Url::parse(raw).map_err(|e| AuthError::UntrustedSource(format!("{raw:?}: {e}")))?;

    if url.scheme() != "https" {
        return Err(AuthError::UntrustedSource(format!(
            "{raw:?}: scheme must be https"
        )));
    }

    let host_ok = url.port().is_none() && url.host_str().is_some_and(|h| SNS_HOST.is_match(h));
    if !host_ok {
        return Err(AuthError::UntrustedSource(format!(
            "{raw:?}: host is not an SNS endpoint"
        )));
    }

    Ok(url)
}

/// Verifies SNS envelopes against their signing certificate.
#[derive(Clone)]
pub struct SignatureVerifier {
    certificates: Arc<CertificateCache>,
}

impl SignatureVerifier {
    pub fn new(certificates: Arc<CertificateCache>) -> Self {
        Self { certificates }
    }

    /// Authenticate `envelope`.
    pub async fn verify(&self, envelope: &SignedEnvelope) -> Result<(), AuthError> {
        let cert_url = validate_sns_url(&envelope.signing_cert_url)?;

        let certificate = self.certificates.get(&cert_url).await?;

        let canonical = canonical_string(envelope);

        let signature = STANDARD.decode(envelope.signature.as_bytes())?;

        let version: SignatureVersion = envelope
            .signature_version
            .parse()
            .map_err(AuthError::UnsupportedSignatureVersion)?;

        certificate
            .verify(version, canonical.as_bytes(), &signature)
            .map_err(|_| {
                warn!(
                    message_id = %envelope.message_id,
                    signature_version = %envelope.signature_version,
                    "sns_signature_mismatch"
                );
                AuthError::SignatureMismatch
            })
    }
}
