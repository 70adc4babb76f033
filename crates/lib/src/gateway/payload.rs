//! Webhook body types.

use serde::{Deserialize, Serialize};

/// Wire body: `{ "payload": { "channel", "text", "user" } }`. Missing parts default to empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub payload: MessagePayload,
}

/// The chat message that may trigger a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Compared for exact equality with the configured channel id.
    #[serde(default)]
    pub channel: String,
    /// Used verbatim as the topic.
    #[serde(default)]
    pub text: String,
    /// Accepted and logged; not used otherwise.
    #[serde(default)]
    pub user: String,
}

impl WebhookEnvelope {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}
