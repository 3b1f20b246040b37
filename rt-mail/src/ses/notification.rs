//! SES notification payload carried in the SNS `Message` field.

use serde::Deserialize;

/// Received-mail notification published by SES.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailNotification {
    /// Empty when absent; anything but `Received` is skipped.
    #[serde(default)]
    pub notification_type: String,
    #[serde(default)]
    pub receipt: Receipt,
    #[serde(default)]
    pub mail: MailInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Receipt {
    #[serde(default)]
    pub action: ReceiptAction,
    /// Envelope recipients, in the order SES delivered them.
    #[serde(default)]
    pub recipients: Vec<String>,
}

/// Where SES put the message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptAction {
    #[serde(rename = "type", default)]
    pub action_type: String,
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default)]
    pub object_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailInfo {
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub destination: Vec<String>,
}

impl EmailNotification {
    pub fn from_json(message: &str) -> serde_json::Result<Self> {
        serde_json::from_str(message)
    }

    /// Only received mail stored in S3 is relayed.
    pub fn is_relayable(&self) -> bool {
        self.notification_type == "Received" && self.receipt.action.action_type == "S3"
    }
}
