//! Configuration types and loading.
//!
//! Raw config is loaded from an optional JSON file (e.g. `~/.relay/config.json`) and
//! overlaid with environment variables. [`Settings::resolve`] validates it into the
//! immutable value the gateway and pipeline run with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config (file shape).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Which inbound messages trigger a pipeline run.
    #[serde(default)]
    pub trigger: TriggerConfig,

    /// OpenAI chat completion settings.
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub notion: NotionConfig,

    #[serde(default)]
    pub slack: SlackConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the webhook listener (default 2000).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

/// Trigger identity. Both values are required; env TRIGGER_ID / CHANNEL_ID override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    pub trigger_id: Option<String>,
    /// Only messages posted in this channel start a pipeline run.
    pub channel_id: Option<String>,
}

/// LLM endpoint. The API key is required; env OPENAI_API_KEY overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// OpenAI-compatible base URL (default https://api.openai.com/v1).
    pub base_url: Option<String>,
    /// Model id passed as-is (default gpt-4-turbo).
    pub model: Option<String>,
    pub api_key: Option<String>,
}

/// Notion API access. The key is optional at startup; env NOTION_API_KEY overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotionConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Value of the Notion-Version header (default 2022-06-28).
    pub version: Option<String>,
}

/// Slack Web API access. The token is optional at startup; env SLACK_BOT_TOKEN overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    pub base_url: Option<String>,
    pub bot_token: Option<String>,
}

fn default_gateway_port() -> u16 {
    2000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo";
pub const DEFAULT_NOTION_BASE_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";
pub const DEFAULT_SLACK_BASE_URL: &str = "https://slack.com/api";

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// A required setting was missing or blank.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set; configure it in the environment or the .env file")]
    Missing(&'static str),
}

/// Validated, immutable runtime settings. Built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: String,
    pub port: u16,
    pub trigger_id: String,
    pub channel_id: String,
    pub services: ServiceSettings,
}

/// Settings for the services a pipeline run calls. `relay run` needs only these.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub llm: LlmSettings,
    pub notion: NotionSettings,
    pub slack: SlackSettings,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct NotionSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct SlackSettings {
    pub base_url: String,
    pub bot_token: Option<String>,
}

/// Env value first, then the config value. Blank values count as unset; others are kept as given.
fn lookup<F>(env: &F, key: &str, fallback: Option<&String>) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    non_blank(env(key)).or_else(|| non_blank(fallback.cloned()))
}

impl ServiceSettings {
    /// Resolve service settings from config and the process environment.
    pub fn resolve(config: &Config) -> Result<Self, ConfigError> {
        Self::resolve_with(config, |key| std::env::var(key).ok())
    }

    /// Resolve service settings with an explicit variable lookup. Only OPENAI_API_KEY is required.
    pub fn resolve_with<F>(config: &Config, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(&env, "OPENAI_API_KEY", config.llm.api_key.as_ref())
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        Ok(Self {
            llm: LlmSettings {
                base_url: base_url_or(config.llm.base_url.as_ref(), DEFAULT_OPENAI_BASE_URL),
                model: non_blank(config.llm.model.clone())
                    .map(|m| m.trim().to_string())
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                api_key,
            },
            notion: NotionSettings {
                base_url: base_url_or(config.notion.base_url.as_ref(), DEFAULT_NOTION_BASE_URL),
                api_key: lookup(&env, "NOTION_API_KEY", config.notion.api_key.as_ref()),
                version: non_blank(config.notion.version.clone())
                    .map(|v| v.trim().to_string())
                    .unwrap_or_else(|| DEFAULT_NOTION_VERSION.to_string()),
            },
            slack: SlackSettings {
                base_url: base_url_or(config.slack.base_url.as_ref(), DEFAULT_SLACK_BASE_URL),
                bot_token: lookup(&env, "SLACK_BOT_TOKEN", config.slack.bot_token.as_ref()),
            },
        })
    }
}

impl Settings {
    /// Resolve settings from config and the process environment.
    pub fn resolve(config: &Config) -> Result<Self, ConfigError> {
        Self::resolve_with(config, |key| std::env::var(key).ok())
    }

    /// Resolve settings with an explicit variable lookup. Env values win over config values;
    /// blank values count as unset.
    pub fn resolve_with<F>(config: &Config, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let trigger_id = lookup(&env, "TRIGGER_ID", config.trigger.trigger_id.as_ref())
            .ok_or(ConfigError::Missing("TRIGGER_ID"))?;
        let channel_id = lookup(&env, "CHANNEL_ID", config.trigger.channel_id.as_ref())
            .ok_or(ConfigError::Missing("CHANNEL_ID"))?;
        let services = ServiceSettings::resolve_with(config, env)?;

        Ok(Self {
            bind: config.gateway.bind.trim().to_string(),
            port: config.gateway.port,
            trigger_id,
            channel_id,
            services,
        })
    }

    /// `bind:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn base_url_or(value: Option<&String>, default: &str) -> String {
    non_blank(value.cloned())
        .map(|u| u.trim().trim_end_matches('/').to_string())
        .unwrap_or_else(|| default.to_string())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".relay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or RELAY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
