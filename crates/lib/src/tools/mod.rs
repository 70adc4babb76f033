//! Tool layer: the Notion and Slack actions pipeline tasks can bind, and the executor that runs them.
//!
//! Each [`Action`] is exposed to the model as one function definition. [`Toolset`] routes a
//! model's function call to the matching client method and renders the result as text.

mod notion;
mod slack;

pub use notion::{NotionClient, NotionError, NotionPage};
pub use slack::{SlackClient, SlackError, SlackMessage, DEFAULT_HISTORY_LIMIT};
pub use crate::llm::ToolDefinition;

use crate::agent::ToolExecutor;
use crate::config::ServiceSettings;
use crate::llm::ToolFunctionDefinition;
use async_trait::async_trait;
use serde_json::json;

/// A named integration action a task can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    NotionSearchPage,
    NotionCreatePage,
    SlackListMessages,
    SlackSendMessage,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::NotionSearchPage,
        Action::NotionCreatePage,
        Action::SlackListMessages,
        Action::SlackSendMessage,
    ];

    /// Function name offered to the model.
    pub fn name(self) -> &'static str {
        match self {
            Action::NotionSearchPage => "NOTION_SEARCH_NOTION_PAGE",
            Action::NotionCreatePage => "NOTION_CREATE_NOTION_PAGE",
            Action::SlackListMessages => "SLACK_LIST_SLACK_MESSAGES",
            Action::SlackSendMessage => "SLACK_SEND_SLACK_MESSAGE",
        }
    }

    pub fn from_name(name: &str) -> Option<Action> {
        Action::ALL.into_iter().find(|a| a.name() == name)
    }

    /// Function-calling definition (name, description, JSON schema).
    pub fn definition(self) -> ToolDefinition {
        let (description, parameters) = match self {
            Action::NotionSearchPage => (
                "Search Notion pages by title. Returns matching page ids, titles and urls.",
                json!({
                    "type": "object",
                    "required": ["query"],
                    "properties": {
                        "query": { "type": "string", "description": "Text to match against page titles. Empty string lists all shared pages." }
                    }
                }),
            ),
            Action::NotionCreatePage => (
                "Create a Notion page as a child of an existing page.",
                json!({
                    "type": "object",
                    "required": ["parent_id", "title", "content"],
                    "properties": {
                        "parent_id": { "type": "string", "description": "Id of the parent page." },
                        "title": { "type": "string", "description": "Title of the new page." },
                        "content": { "type": "string", "description": "Page body; each line becomes a paragraph." }
                    }
                }),
            ),
            Action::SlackListMessages => (
                "List the latest messages of a Slack channel.",
                json!({
                    "type": "object",
                    "required": ["channel"],
                    "properties": {
                        "channel": { "type": "string", "description": "Channel id (e.g. C0123456789)." },
                        "limit": { "type": "integer", "description": "Maximum number of messages (default 10)." }
                    }
                }),
            ),
            Action::SlackSendMessage => (
                "Send a message to a Slack channel.",
                json!({
                    "type": "object",
                    "required": ["channel", "text"],
                    "properties": {
                        "channel": { "type": "string", "description": "Channel id or name (e.g. random)." },
                        "text": { "type": "string", "description": "Message text (Slack mrkdwn)." }
                    }
                }),
            ),
        };
        ToolDefinition {
            typ: "function".to_string(),
            function: ToolFunctionDefinition {
                name: self.name().to_string(),
                description: Some(description.to_string()),
                parameters,
            },
        }
    }
}

/// Executes [`Action`] calls against Notion and Slack.
#[derive(Clone)]
pub struct Toolset {
    notion: NotionClient,
    slack: SlackClient,
}

impl Toolset {
    pub fn new(notion: NotionClient, slack: SlackClient) -> Self {
        Self { notion, slack }
    }

    pub fn from_settings(settings: &ServiceSettings) -> Self {
        Self::new(
            NotionClient::new(
                settings.notion.base_url.clone(),
                settings.notion.api_key.clone(),
                settings.notion.version.clone(),
            ),
            SlackClient::new(settings.slack.base_url.clone(), settings.slack.bot_token.clone()),
        )
    }
}

fn str_arg<'a>(args: &'a serde_json::Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", key))
}

fn to_text<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| e.to_string())
}

#[async_trait]
impl ToolExecutor for Toolset {
    async fn execute(&self, name: &str, args: &serde_json::Value) -> Result<String, String> {
        let action = Action::from_name(name).ok_or_else(|| format!("unknown tool: {}", name))?;
        if !args.is_object() {
            return Err("arguments must be an object".to_string());
        }
        match action {
            Action::NotionSearchPage => {
                let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
                let pages = self
                    .notion
                    .search_pages(query)
                    .await
                    .map_err(|e| e.to_string())?;
                to_text(&pages)
            }
            Action::NotionCreatePage => {
                let page = self
                    .notion
                    .create_page(
                        str_arg(args, "parent_id")?,
                        str_arg(args, "title")?,
                        str_arg(args, "content")?,
                    )
                    .await
                    .map_err(|e| e.to_string())?;
                to_text(&page)
            }
            Action::SlackListMessages => {
                let limit = args
                    .get("limit")
                    .and_then(|v| v.as_u64())
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(DEFAULT_HISTORY_LIMIT);
                let messages = self
                    .slack
                    .list_messages(str_arg(args, "channel")?, limit)
                    .await
                    .map_err(|e| e.to_string())?;
                to_text(&messages)
            }
            Action::SlackSendMessage => {
                let channel = str_arg(args, "channel")?;
                let ts = self
                    .slack
                    .send_message(channel, str_arg(args, "text")?)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(format!("message sent to {} (ts {})", channel, ts))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn offline_toolset() -> Toolset {
        Toolset::new(
            NotionClient::new("http://127.0.0.1:9", None, "2022-06-28"),
            SlackClient::new("http://127.0.0.1:9", None),
        )
    }

    #[test]
    fn action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::from_name(action.name()), Some(action));
            let def = action.definition();
            assert_eq!(def.typ, "function");
            assert_eq!(def.function.name, action.name());
            assert_eq!(def.function.parameters["type"], "object");
        }
        assert_eq!(Action::from_name("GITHUB_STAR_REPO"), None);
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let err = offline_toolset()
            .execute("GITHUB_STAR_REPO", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err, "unknown tool: GITHUB_STAR_REPO");
    }

    #[tokio::test]
    async fn missing_argument_is_rejected() {
        let err = offline_toolset()
            .execute("NOTION_CREATE_NOTION_PAGE", &json!({ "parent_id": "p1", "title": "t" }))
            .await
            .unwrap_err();
        assert_eq!(err, "missing content");
    }

    #[tokio::test]
    async fn non_object_arguments_are_rejected() {
        let err = offline_toolset()
            .execute("SLACK_SEND_SLACK_MESSAGE", &serde_json::Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err, "arguments must be an object");
    }

    #[tokio::test]
    async fn missing_credential_surfaces_as_tool_error() {
        let err = offline_toolset()
            .execute("SLACK_SEND_SLACK_MESSAGE", &json!({ "channel": "random", "text": "hi" }))
            .await
            .unwrap_err();
        assert_eq!(err, "slack bot token not configured");
    }

    #[tokio::test]
    async fn send_message_reports_channel_and_ts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "ts": "17.1" })),
            )
            .mount(&server)
            .await;
        let toolset = Toolset::new(
            NotionClient::new("http://127.0.0.1:9", None, "2022-06-28"),
            SlackClient::new(server.uri(), Some("xoxb-1".to_string())),
        );
        let out = toolset
            .execute("SLACK_SEND_SLACK_MESSAGE", &json!({ "channel": "random", "text": "done" }))
            .await
            .unwrap();
        assert_eq!(out, "message sent to random (ts 17.1)");
    }
}
