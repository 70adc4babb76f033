//! The research relay: four agents and six tasks built for one topic.
//!
//! research → report → Notion lookup → Notion write → Slack read → Slack send.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Datelike;

use crate::agent::{Agent, ToolExecutor};
use crate::config::ServiceSettings;
use crate::llm::{LlmBackend, OpenAiClient};
use crate::pipeline::{LinearSyncPipeline, PipelineError, PipelineOutcome, PipelineTrigger, Task};
use crate::tools::{Action, Toolset};

pub const PIPELINE_NAME: &str = "Composio pipeline";
pub const PIPELINE_COMPLETION_MESSAGE: &str = "Pipeline completed successfully.";

pub const RESEARCH_TASK: &str = "Research task";
pub const REPORTING_TASK: &str = "Reporting task";
pub const NOTION_GET_TASK: &str = "Notion get task";
pub const NOTION_TASK: &str = "Notion task";
pub const SLACK_LIST_TASK: &str = "Slack messaging";
pub const SLACK_SEND_TASK: &str = "Slack send";

fn researcher(topic: &str) -> Agent {
    Agent::new(
        format!("{} Senior Data Researcher", topic),
        format!(
            "Uncover cutting-edge developments in {topic}. You're a seasoned researcher with a knack \
             for uncovering the latest developments in {topic}. Known for your ability to find the most \
             relevant information and present it in a clear and concise manner."
        ),
    )
}

fn analyst(topic: &str) -> Agent {
    Agent::new(
        format!("{} Senior Data Analyst", topic),
        format!(
            "Analyze and report on {topic}. You're a meticulous analyst with a keen eye for detail. \
             You're known for your ability to turn complex data into clear and concise reports, making \
             it easy for others to understand and act on the information you provide."
        ),
    )
}

fn notion_updater() -> Agent {
    Agent::new(
        "Notion updater",
        "You take action on Notion using the Notion API. You are an AI agent responsible for taking \
         actions on Notion on users' behalf using Notion APIs.",
    )
}

fn slack_updater() -> Agent {
    Agent::new(
        "Slack Updater",
        "You are an AI agent responsible for taking actions on Slack on users' behalf using Slack APIs.",
    )
}

/// The six tasks for `topic`, in execution order. `year` is quoted in the research instructions.
pub fn research_tasks(topic: &str, year: i32) -> Vec<Task> {
    let notion = notion_updater();
    let slack = slack_updater();
    vec![
        Task::new(
            RESEARCH_TASK,
            researcher(topic),
            format!(
                "Conduct a thorough research about {}. Ensure you find any interesting and relevant \
                 information given the current year is {}.",
                topic, year
            ),
        )
        .log_output(true),
        Task::new(
            REPORTING_TASK,
            analyst(topic),
            "Review the context you received and expand each topic into a full section for a report. \
             Ensure the report is detailed and contains all relevant information.",
        )
        .depends_on(&[RESEARCH_TASK])
        .log_output(true),
        Task::new(
            NOTION_GET_TASK,
            notion.clone(),
            "Retrieve the page ID you want to update on Notion.",
        )
        .with_tool(Action::NotionSearchPage)
        .log_output(true),
        Task::new(
            NOTION_TASK,
            notion,
            "Create a document on Notion that summarizes the report.",
        )
        .with_tool(Action::NotionCreatePage)
        .depends_on(&[REPORTING_TASK, NOTION_GET_TASK])
        .log_output(true),
        Task::new(
            SLACK_LIST_TASK,
            slack.clone(),
            "List the latest Slack message in the specified channel ID.",
        )
        .with_tool(Action::SlackListMessages)
        .log_output(true),
        Task::new(
            SLACK_SEND_TASK,
            slack,
            "Send a message on the Slack channel 'random' that summarizes the complete research \
             activity. Include a summary of your findings and attach the report.",
        )
        .with_tool(Action::SlackSendMessage)
        .depends_on(&[NOTION_TASK])
        .log_output(true),
    ]
}

/// [`PipelineTrigger`] that builds the research tasks for each topic and runs them.
#[derive(Clone)]
pub struct ResearchPipeline {
    backend: Arc<dyn LlmBackend>,
    model: String,
    executor: Arc<dyn ToolExecutor>,
}

impl ResearchPipeline {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        model: impl Into<String>,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            executor,
        }
    }

    /// OpenAI backend and Notion/Slack toolset from settings.
    pub fn from_settings(settings: &ServiceSettings) -> Self {
        let backend = OpenAiClient::new(
            Some(settings.llm.base_url.clone()),
            settings.llm.api_key.clone(),
        );
        Self::new(
            Arc::new(backend),
            settings.llm.model.clone(),
            Arc::new(Toolset::from_settings(settings)),
        )
    }

    pub fn pipeline_for(topic: &str) -> LinearSyncPipeline {
        let year = chrono::Local::now().year();
        LinearSyncPipeline::new(
            PIPELINE_NAME,
            PIPELINE_COMPLETION_MESSAGE,
            research_tasks(topic, year),
        )
    }
}

#[async_trait]
impl PipelineTrigger for ResearchPipeline {
    async fn trigger(&self, topic: &str) -> Result<PipelineOutcome, PipelineError> {
        let pipeline = Self::pipeline_for(topic);
        pipeline
            .run(
                self.backend.as_ref(),
                &self.model,
                Some(self.executor.as_ref()),
            )
            .await
    }
}
