//! Slack Web API client: conversations.history and chat.postMessage.

use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTORY_LIMIT: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("slack bot token not configured")]
    MissingToken,
    #[error("slack request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("slack api error: {0}")]
    Api(String),
}

/// One message from a channel history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackMessage {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    ok: bool,
    #[serde(default)]
    messages: Vec<SlackMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
pub struct SlackClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl SlackClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn token(&self) -> Result<&str, SlackError> {
        self.token.as_deref().ok_or(SlackError::MissingToken)
    }

    /// GET conversations.history: latest messages in a channel, newest first.
    pub async fn list_messages(
        &self,
        channel: &str,
        limit: u32,
    ) -> Result<Vec<SlackMessage>, SlackError> {
        let url = format!("{}/conversations.history", self.base_url);
        let res = self
            .client
            .get(&url)
            .bearer_auth(self.token()?)
            .query(&[("channel", channel.to_string()), ("limit", limit.to_string())])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SlackError::Api(format!("{} {}", status, body)));
        }
        let data: HistoryResponse = res.json().await?;
        if !data.ok {
            return Err(SlackError::Api(
                data.error.unwrap_or_else(|| "conversations.history returned ok: false".to_string()),
            ));
        }
        Ok(data.messages)
    }

    /// POST chat.postMessage. Returns the message timestamp.
    pub async fn send_message(&self, channel: &str, text: &str) -> Result<String, SlackError> {
        let url = format!("{}/chat.postMessage", self.base_url);
        let body = serde_json::json!({ "channel": channel, "text": text });
        let res = self
            .client
            .post(&url)
            .bearer_auth(self.token()?)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SlackError::Api(format!("{} {}", status, body)));
        }
        let data: PostMessageResponse = res.json().await?;
        if !data.ok {
            return Err(SlackError::Api(
                data.error.unwrap_or_else(|| "chat.postMessage returned ok: false".to_string()),
            ));
        }
        Ok(data.ts.unwrap_or_default())
    }
}
