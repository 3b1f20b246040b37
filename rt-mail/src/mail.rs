//! Header summary of raw RFC 5322 messages for logging.

use mailparse::{parse_headers, MailHeaderMap};
use tracing::warn;

/// Identifying headers of a raw message.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MailSummary {
    /// Message-Id header value (without angle brackets)
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
}

impl MailSummary {
    /// Parse the header block of `raw`. Unparsable input yields an empty
    /// summary; the message itself is still delivered untouched.
    pub fn parse(raw: &[u8]) -> Self {
        let headers = match parse_headers(raw) {
            Ok((headers, _)) => headers,
            Err(e) => {
                warn!(error = %e, raw_length = raw.len(), "mail_headers_parse_failed");
                return Self::default();
            }
        };

        Self {
            message_id: headers
                .get_first_value("Message-Id")
                .map(|id| id.trim().trim_matches(|c| c == '<' || c == '>').to_string()),
            subject: headers.get_first_value("Subject"),
            from: headers.get_first_value("From"),
        }
    }
}
