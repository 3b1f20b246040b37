//! Canonical string construction for SNS signatures.
//!
//! SNS signs a newline-delimited list of `name\nvalue\n` pairs in a fixed
//! order. Which optional pairs appear depends on the message kind, and an
//! omitted pair contributes nothing, not even its name.

use super::envelope::{MessageKind, SignedEnvelope};

/// Build the exact byte string SNS signed for `envelope`.
pub fn canonical_string(envelope: &SignedEnvelope) -> String {
    let mut out = String::with_capacity(envelope.message.len() + 256);

    push_field(&mut out, "Message", &envelope.message);
    push_field(&mut out, "MessageId", &envelope.message_id);

    if let MessageKind::Notification {
        subject: Some(subject),
        ..
    } = &envelope.kind
    {
        if !subject.is_empty() {
            push_field(&mut out, "Subject", subject);
        }
    }

    let subscription = match &envelope.kind {
        MessageKind::SubscriptionConfirmation(sub) | MessageKind::UnsubscribeConfirmation(sub) => {
            Some(sub)
        }
        MessageKind::Notification { .. } | MessageKind::Unknown(_) => None,
    };

    if let Some(sub) = subscription {
        push_field(&mut out, "SubscribeURL", &sub.subscribe_url);
    }

    push_field(&mut out, "Timestamp", &envelope.timestamp);

    if let Some(sub) = subscription {
        push_field(&mut out, "Token", &sub.token);
    }

    push_field(&mut out, "TopicArn", &envelope.topic_arn);
    push_field(&mut out, "Type", envelope.kind.type_name());

    out
}

fn push_field(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push('\n');
    out.push_str(value);
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sns::envelope::Subscription;

    const TOPIC: &str = "arn:aws:sns:us-east-1:123:topic";
    const TS: &str = "2025-01-01T00:00:00.000Z";

    fn envelope(kind: MessageKind, message: &str, message_id: &str) -> SignedEnvelope {
        SignedEnvelope {
            kind,
            message_id: message_id.to_string(),
            topic_arn: TOPIC.to_string(),
            message: message.to_string(),
            timestamp: TS.to_string(),
            signature_version: "1".to_string(),
            signature: String::new(),
            signing_cert_url: String::new(),
        }
    }

    fn subscription() -> Subscription {
        Subscription {
            subscribe_url: "https://sns.amazonaws.com/subscribe".to_string(),
            token: "token-abc".to_string(),
        }
    }

    #[test]
    fn test_notification_with_subject() {
        let env = envelope(
            MessageKind::Notification {
                subject: Some("Test Subject".to_string()),
                unsubscribe_url: Some("https://sns.amazonaws.com/unsub".to_string()),
            },
            "test message",
            "msg-123",
        );

        assert_eq!(
            canonical_string(&env),
            "Message\ntest message\nMessageId\nmsg-123\nSubject\nTest Subject\nTimestamp\n\
             2025-01-01T00:00:00.000Z\nTopicArn\narn:aws:sns:us-east-1:123:topic\nType\n\
             Notification\n"
        );
    }

    #[test]
    fn test_notification_without_subject() {
        let env = envelope(
            MessageKind::Notification {
                subject: None,
                unsubscribe_url: None,
            },
            "test message",
            "msg-123",
        );

        assert_eq!(
            canonical_string(&env),
            "Message\ntest message\nMessageId\nmsg-123\nTimestamp\n2025-01-01T00:00:00.000Z\n\
             TopicArn\narn:aws:sns:us-east-1:123:topic\nType\nNotification\n"
        );
    }

    #[test]
    fn test_notification_with_empty_subject_omits_field() {
        let env = envelope(
            MessageKind::Notification {
                subject: Some(String::new()),
                unsubscribe_url: None,
            },
            "m",
            "id",
        );

        assert!(!canonical_string(&env).contains("Subject"));
    }

    #[test]
    fn test_subscription_confirmation() {
        let env = envelope(
            MessageKind::SubscriptionConfirmation(subscription()),
            "confirm",
            "msg-456",
        );

        assert_eq!(
            canonical_string(&env),
            "Message\nconfirm\nMessageId\nmsg-456\nSubscribeURL\n\
             https://sns.amazonaws.com/subscribe\nTimestamp\n2025-01-01T00:00:00.000Z\nToken\n\
             token-abc\nTopicArn\narn:aws:sns:us-east-1:123:topic\nType\n\
             SubscriptionConfirmation\n"
        );
    }

    #[test]
    fn test_unsubscribe_confirmation() {
        let env = envelope(
            MessageKind::UnsubscribeConfirmation(subscription()),
            "bye",
            "msg-789",
        );

        assert_eq!(
            canonical_string(&env),
            "Message\nbye\nMessageId\nmsg-789\nSubscribeURL\n\
             https://sns.amazonaws.com/subscribe\nTimestamp\n2025-01-01T00:00:00.000Z\nToken\n\
             token-abc\nTopicArn\narn:aws:sns:us-east-1:123:topic\nType\n\
             UnsubscribeConfirmation\n"
        );
    }

    #[test]
    fn test_subscription_with_empty_fields_keeps_names() {
        let env = envelope(
            MessageKind::SubscriptionConfirmation(Subscription::default()),
            "m",
            "id",
        );

        assert_eq!(
            canonical_string(&env),
            "Message\nm\nMessageId\nid\nSubscribeURL\n\nTimestamp\n2025-01-01T00:00:00.000Z\n\
             Token\n\nTopicArn\narn:aws:sns:us-east-1:123:topic\nType\n\
             SubscriptionConfirmation\n"
        );
    }

    #[test]
    fn test_unknown_kind_has_no_optional_fields() {
        let env = envelope(MessageKind::Unknown("Weird".to_string()), "m", "id");

        assert_eq!(
            canonical_string(&env),
            "Message\nm\nMessageId\nid\nTimestamp\n2025-01-01T00:00:00.000Z\nTopicArn\n\
             arn:aws:sns:us-east-1:123:topic\nType\nWeird\n"
        );
    }

    #[test]
    fn test_message_with_newlines_is_verbatim() {
        let env = envelope(
            MessageKind::Notification {
                subject: None,
                unsubscribe_url: None,
            },
            "{\n  \"a\": 1\n}",
            "id",
        );

        assert!(canonical_string(&env).starts_with("Message\n{\n  \"a\": 1\n}\nMessageId\nid\n"));
    }
}
