//! AWS SNS envelope authentication.
//!
//! An inbound SNS POST is parsed into a [`SignedEnvelope`], then
//! [`SignatureVerifier`] checks that it was signed by a genuine SNS signing
//! certificate:
//!
//! ```text
//! SigningCertURL → validate_sns_url → CertificateCache → canonical_string → RSA verify
//! ```

pub mod canonical;
pub mod cert_cache;
pub mod envelope;
pub mod verifier;

pub use canonical::canonical_string;
pub use cert_cache::{CertificateCache, CertificateError, SigningCertificate, CERT_CACHE_TTL};
pub use envelope::{MessageKind, SignatureVersion, SignedEnvelope, Subscription};
pub use verifier::{validate_sns_url, AuthError, SignatureVerifier};
