//! Form-field extraction for provider webhooks.
//!
//! Mailgun and SendGrid post either `multipart/form-data` or
//! `application/x-www-form-urlencoded`. Values are kept as raw bytes: a
//! MIME message in an 8bit charset must reach RT unchanged.

use std::borrow::Cow;
use std::collections::HashMap;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::{header::CONTENT_TYPE, StatusCode},
};
use percent_encoding::percent_decode;
use tracing::warn;

/// Non-file fields of a form body. For repeated names the first value wins.
#[derive(Debug, Default)]
pub struct FormFields(pub HashMap<String, Bytes>);

impl FormFields {
    /// Raw field value, empty when absent.
    pub fn get(&self, name: &str) -> &[u8] {
        self.0.get(name).map(|v| v.as_ref()).unwrap_or_default()
    }

    /// Field value as text, for headers-like fields (addresses, JSON, tokens).
    pub fn text(&self, name: &str) -> Cow<'_, str> {
        String::from_utf8_lossy(self.get(name))
    }

    /// Parse an `application/x-www-form-urlencoded` body without decoding
    /// values as UTF-8.
    pub fn from_urlencoded(body: &[u8]) -> Self {
        let mut fields = HashMap::new();
        for pair in body.split(|b| *b == b'&').filter(|p| !p.is_empty()) {
            let (name, value) = match pair.iter().position(|b| *b == b'=') {
                Some(idx) => (&pair[..idx], &pair[idx + 1..]),
                None => (pair, &[][..]),
            };
            let name = String::from_utf8_lossy(&form_decode(name)).into_owned();
            fields
                .entry(name)
                .or_insert_with(|| Bytes::from(form_decode(value)));
        }
        FormFields(fields)
    }
}

fn form_decode(input: &[u8]) -> Vec<u8> {
    let plus_as_space: Vec<u8> = input
        .iter()
        .map(|b| if *b == b'+' { b' ' } else { *b })
        .collect();
    percent_decode(&plus_as_space).collect()
}

#[async_trait]
impl<S> FromRequest<S> for FormFields
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let body = Bytes::from_request(req, state).await.map_err(|e| {
                warn!(error = %e, "form_body_invalid");
                e.status()
            })?;
            return Ok(Self::from_urlencoded(&body));
        }

        if !content_type.starts_with("multipart/form-data") {
            warn!(content_type = %content_type, "form_content_type_unsupported");
            return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE);
        }

        let mut multipart = Multipart::from_request(req, state).await.map_err(|e| {
            warn!(error = %e, "multipart_body_invalid");
            StatusCode::BAD_REQUEST
        })?;

        let mut fields = HashMap::new();
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "multipart_field_invalid");
                    return Err(e.status());
                }
            };

            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if field.file_name().is_some() {
                continue;
            }

            let value = field.bytes().await.map_err(|e| {
                warn!(field = %name, error = %e, "multipart_field_unreadable");
                e.status()
            })?;
            fields.entry(name).or_insert(value);
        }

        Ok(FormFields(fields))
    }
}
