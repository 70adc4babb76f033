//! Linear task pipeline.
//!
//! A [`LinearSyncPipeline`] holds tasks in execution order. Each task names the earlier tasks
//! whose outputs it consumes; the runner executes tasks one after another and threads those
//! outputs into the task's prompt. The first failing task aborts the run.

mod research;

pub use research::{research_tasks, ResearchPipeline, PIPELINE_COMPLETION_MESSAGE, PIPELINE_NAME};

use crate::agent::{self, Agent, ToolExecutor};
use crate::llm::{LlmBackend, LlmError};
use crate::tools::Action;
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("duplicate task name: {0}")]
    DuplicateTask(String),
    #[error("task {task} depends on {dependency}, which is not an earlier task")]
    UnknownDependency { task: String, dependency: String },
    #[error("task {task} is bound to a tool but no tool executor was provided")]
    NoExecutor { task: String },
    #[error("task {task} failed: {source}")]
    Task {
        task: String,
        #[source]
        source: LlmError,
    },
}

/// One unit of work: an agent, its instructions, an optional tool action and its input tasks.
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub agent: Agent,
    pub instructions: String,
    pub tool: Option<Action>,
    /// Names of earlier tasks whose outputs become this task's context.
    pub input_tasks: Vec<String>,
    /// Log the task's output at info level when it completes.
    pub log_output: bool,
}

impl Task {
    /// Text task with no tool and no inputs.
    pub fn new(name: impl Into<String>, agent: Agent, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent,
            instructions: instructions.into(),
            tool: None,
            input_tasks: Vec::new(),
            log_output: false,
        }
    }

    pub fn with_tool(mut self, action: Action) -> Self {
        self.tool = Some(action);
        self
    }

    pub fn depends_on(mut self, tasks: &[&str]) -> Self {
        self.input_tasks = tasks.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn log_output(mut self, enabled: bool) -> Self {
        self.log_output = enabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput {
    pub task: String,
    pub output: String,
}

/// Outputs of a completed run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub outputs: Vec<TaskOutput>,
}

impl PipelineOutcome {
    pub fn output_of(&self, task: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|o| o.task == task)
            .map(|o| o.output.as_str())
    }
}

/// Entry point the webhook depends on: run the pipeline for one topic.
#[async_trait]
pub trait PipelineTrigger: Send + Sync {
    async fn trigger(&self, topic: &str) -> Result<PipelineOutcome, PipelineError>;
}

/// Sequential executor over an ordered task list.
#[derive(Debug, Clone)]
pub struct LinearSyncPipeline {
    pub name: String,
    pub completion_message: String,
    pub tasks: Vec<Task>,
}

impl LinearSyncPipeline {
    pub fn new(
        name: impl Into<String>,
        completion_message: impl Into<String>,
        tasks: Vec<Task>,
    ) -> Self {
        Self {
            name: name.into(),
            completion_message: completion_message.into(),
            tasks,
        }
    }

    /// Check that task names are unique and every input names an earlier task.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.tasks.len());
        for task in &self.tasks {
            if seen.contains(&task.name.as_str()) {
                return Err(PipelineError::DuplicateTask(task.name.clone()));
            }
            for dep in &task.input_tasks {
                if !seen.contains(&dep.as_str()) {
                    return Err(PipelineError::UnknownDependency {
                        task: task.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            seen.push(&task.name);
        }
        Ok(())
    }

    /// Validate, then run every task in order.
    pub async fn run(
        &self,
        backend: &dyn LlmBackend,
        model: &str,
        executor: Option<&dyn ToolExecutor>,
    ) -> Result<PipelineOutcome, PipelineError> {
        self.validate()?;
        if executor.is_none() {
            if let Some(task) = self.tasks.iter().find(|t| t.tool.is_some()) {
                return Err(PipelineError::NoExecutor {
                    task: task.name.clone(),
                });
            }
        }

        log::info!("pipeline {}: running {} task(s)", self.name, self.tasks.len());
        let mut outputs: HashMap<&str, String> = HashMap::new();
        let mut outcome = PipelineOutcome::default();

        for task in &self.tasks {
            log::info!("pipeline {}: starting {}", self.name, task.name);
            let inputs: Vec<(String, String)> = task
                .input_tasks
                .iter()
                .map(|dep| {
                    let out = outputs.get(dep.as_str()).cloned().unwrap_or_default();
                    (dep.clone(), out)
                })
                .collect();
            let prompt = agent::task_prompt(&task.instructions, &inputs);
            let result = agent::run_turn(
                backend,
                model,
                &task.agent,
                &prompt,
                task.tool.map(Action::definition),
                executor,
            )
            .await
            .map_err(|source| PipelineError::Task {
                task: task.name.clone(),
                source,
            })?;

            let output = result.output();
            if task.log_output {
                log::info!("{} output:\n{}", task.name, output);
            }
            outputs.insert(task.name.as_str(), output.clone());
            outcome.outputs.push(TaskOutput {
                task: task.name.clone(),
                output,
            });
        }

        log::info!("{}", self.completion_message);
        Ok(outcome)
    }
}
