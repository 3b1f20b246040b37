//! SNS signing certificate cache.
//!
//! Certificates are cached per URL and reused until the earlier of the cache
//! TTL and the certificate's own NotAfter. Readers share a read lock. A miss
//! takes the write lock and checks the map again before fetching, so concurrent
//! misses for a hot URL collapse into one fetch. The write lock is held across
//! the fetch, which also serializes first fetches for different URLs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use rsa::pkcs1v15;
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha1::Sha1;
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::{DecodePem, Encode};
use x509_cert::name::Name;
use x509_cert::Certificate;

use super::envelope::SignatureVersion;
use crate::fetch::{FetchError, Fetcher};

/// Default lifetime of a cached certificate.
pub const CERT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Upper bound on a signing certificate download.
const MAX_CERT_BYTES: usize = 64 * 1024;

/// Marker that must appear in the subject or issuer common name.
const TRUSTED_AUTHORITY: &str = "Amazon";

/// id-at-commonName
const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// Failures while obtaining a signing certificate.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("fetch certificate: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse certificate: {0}")]
    Parse(String),

    #[error("certificate not valid (not_before: {not_before}, not_after: {not_after})")]
    Expired { not_before: String, not_after: String },

    #[error("certificate not issued by Amazon (subject: {subject:?}, issuer: {issuer:?})")]
    UntrustedIssuer { subject: String, issuer: String },
}

/// A parsed, validated SNS signing certificate.
#[derive(Debug)]
pub struct SigningCertificate {
    public_key: RsaPublicKey,
    subject_cn: String,
    issuer_cn: String,
    not_before: SystemTime,
    not_after: SystemTime,
}

impl SigningCertificate {
    /// Parse a PEM-encoded X.509 certificate carrying an RSA key.
    pub fn from_pem(pem: &[u8]) -> Result<Self, CertificateError> {
        let certificate =
            Certificate::from_pem(pem).map_err(|e| CertificateError::Parse(e.to_string()))?;
        let tbs = &certificate.tbs_certificate;

        let spki = tbs
            .subject_public_key_info
            .to_der()
            .map_err(|e| CertificateError::Parse(e.to_string()))?;
        let public_key = RsaPublicKey::from_public_key_der(&spki)
            .map_err(|e| CertificateError::Parse(format!("public key: {e}")))?;

        Ok(Self {
            public_key,
            subject_cn: common_name(&tbs.subject),
            issuer_cn: common_name(&tbs.issuer),
            not_before: tbs.validity.not_before.to_system_time(),
            not_after: tbs.validity.not_after.to_system_time(),
        })
    }

    pub fn not_after(&self) -> SystemTime {
        self.not_after
    }

    pub fn subject_cn(&self) -> &str {
        &self.subject_cn
    }

    /// Reject the certificate unless `now` lies within [NotBefore, NotAfter].
    pub fn check_validity(&self, now: SystemTime) -> Result<(), CertificateError> {
        if now < self.not_before || now > self.not_after {
            return Err(CertificateError::Expired {
                not_before: rfc3339(self.not_before),
                not_after: rfc3339(self.not_after),
            });
        }
        Ok(())
    }

    /// Reject the certificate unless subject or issuer CN names Amazon.
    pub fn check_authority(&self) -> Result<(), CertificateError> {
        if self.subject_cn.contains(TRUSTED_AUTHORITY) || self.issuer_cn.contains(TRUSTED_AUTHORITY)
        {
            return Ok(());
        }
        Err(CertificateError::UntrustedIssuer {
            subject: self.subject_cn.clone(),
            issuer: self.issuer_cn.clone(),
        })
    }

    /// Verify an RSA PKCS#1 v1.5 signature over `message`.
    pub fn verify(
        &self,
        version: SignatureVersion,
        message: &[u8],
        signature: &[u8],
    ) -> rsa::signature::Result<()> {
        let signature = pkcs1v15::Signature::try_from(signature)?;
        match version {
            SignatureVersion::V1 => pkcs1v15::VerifyingKey::<Sha1>::new(self.public_key.clone())
                .verify(message, &signature),
            SignatureVersion::V2 => pkcs1v15::VerifyingKey::<Sha256>::new(self.public_key.clone())
                .verify(message, &signature),
        }
    }
}

struct CachedCertificate {
    certificate: Arc<SigningCertificate>,
    expires_at: SystemTime,
}

type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// Concurrent cache of signing certificates keyed by URL.
pub struct CertificateCache {
    fetcher: Arc<dyn Fetcher>,
    ttl: Duration,
    clock: Clock,
    entries: RwLock<HashMap<String, CachedCertificate>>,
}

impl CertificateCache {
    pub fn new(fetcher: Arc<dyn Fetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            clock: Arc::new(SystemTime::now),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the wall clock used for expiry and validity checks.
    pub fn with_clock(mut self, clock: impl Fn() -> SystemTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Return the certificate at `url`, fetching and validating it on a miss
    /// or after expiry.
    pub async fn get(&self, url: &Url) -> Result<Arc<SigningCertificate>, CertificateError> {
        let now = (self.clock)();

        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(url.as_str()) {
                if now < entry.expires_at {
                    return Ok(entry.certificate.clone());
                }
            }
        }

        let mut entries = self.entries.write().await;

        // Double-check after acquiring write lock
        if let Some(entry) = entries.get(url.as_str()) {
            if now < entry.expires_at {
                return Ok(entry.certificate.clone());
            }
        }

        info!(url = %url, "sns_certificate_fetching");

        let pem = self.fetcher.get(url, MAX_CERT_BYTES).await?;
        let certificate = SigningCertificate::from_pem(&pem)?;

        if let Err(e) = certificate
            .check_validity(now)
            .and_then(|_| certificate.check_authority())
        {
            warn!(url = %url, error = %e, "sns_certificate_rejected");
            return Err(e);
        }

        let expires_at = expiry_deadline(now, self.ttl, certificate.not_after);
        let certificate = Arc::new(certificate);

        entries.insert(
            url.to_string(),
            CachedCertificate {
                certificate: certificate.clone(),
                expires_at,
            },
        );

        info!(
            url = %url,
            subject = %certificate.subject_cn,
            expires_at = %rfc3339(expires_at),
            "sns_certificate_cached"
        );

        Ok(certificate)
    }
}

/// The earlier of `now + ttl` and the certificate's NotAfter.
pub fn expiry_deadline(now: SystemTime, ttl: Duration, not_after: SystemTime) -> SystemTime {
    (now + ttl).min(not_after)
}

fn common_name(name: &Name) -> String {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .filter(|atv| atv.oid == COMMON_NAME)
        .find_map(|atv| std::str::from_utf8(atv.value.value()).ok())
        .unwrap_or_default()
        .to_string()
}

fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}
