//! Relay core library: configuration, webhook gateway, LLM client, Notion/Slack tools,
//! and the linear task pipeline used by the CLI.

pub mod agent;
pub mod config;
pub mod gateway;
pub mod llm;
pub mod pipeline;
pub mod tools;
