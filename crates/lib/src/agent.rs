//! Agent turn: build the prompt for one task, call the LLM, run tool calls until the model is done.
//! A task bound to a tool offers exactly that tool; tool results are fed back and the model re-called.

use crate::llm::{ChatMessage, LlmBackend, LlmError, ToolCall, ToolDefinition};
use async_trait::async_trait;

const MAX_TOOL_LOOP: usize = 5;

/// Role/persona configuration the model speaks as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    pub role: String,
    pub persona: String,
}

impl Agent {
    pub fn new(role: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            persona: persona.into(),
        }
    }

    /// System message: role line followed by the persona text.
    pub fn system_prompt(&self) -> String {
        format!("You are {}.\n{}", self.role, self.persona)
    }
}

/// Executes a tool by name and JSON arguments. Returns output or error string.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, args: &serde_json::Value) -> Result<String, String>;
}

/// Result of one agent turn: final text and the tool calls made along the way.
#[derive(Debug, Clone)]
pub struct AgentTurnResult {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// Output of the last executed tool call, if any.
    pub last_tool_output: Option<String>,
}

impl AgentTurnResult {
    /// Task output: the model's final text, or the last tool result when that text is empty.
    pub fn output(&self) -> String {
        if self.content.trim().is_empty() {
            self.last_tool_output.clone().unwrap_or_default()
        } else {
            self.content.clone()
        }
    }
}

/// Build the user message: instructions, then each input's output under its task name.
pub fn task_prompt(instructions: &str, inputs: &[(String, String)]) -> String {
    let mut out = instructions.trim().to_string();
    if !inputs.is_empty() {
        out.push_str("\n\nContext from previous tasks:");
        for (name, output) in inputs {
            out.push_str("\n\n## ");
            out.push_str(name);
            out.push('\n');
            out.push_str(output.trim());
        }
    }
    out
}

/// Run one agent turn for a task. When `tool` is set, the model may call it; calls are executed
/// through `executor` and their results appended until no more tool calls or max iterations.
pub async fn run_turn(
    backend: &dyn LlmBackend,
    model: &str,
    agent: &Agent,
    prompt: &str,
    tool: Option<ToolDefinition>,
    executor: Option<&dyn ToolExecutor>,
) -> Result<AgentTurnResult, LlmError> {
    let mut messages = vec![
        ChatMessage::system(agent.system_prompt()),
        ChatMessage::user(prompt),
    ];
    let tools = tool.map(|t| vec![t]);
    let mut made_calls = Vec::new();
    let mut last_tool_output = None;
    let mut loop_count = 0;

    loop {
        let res = backend.chat(model, messages.clone(), tools.clone()).await?;
        let content = res.content().to_string();
        let tool_calls = res.tool_calls().to_vec();

        if tool_calls.is_empty() {
            return Ok(AgentTurnResult {
                content,
                tool_calls: made_calls,
                last_tool_output,
            });
        }

        loop_count += 1;
        if loop_count > MAX_TOOL_LOOP {
            log::debug!("agent: max tool loop iterations reached");
            return Ok(AgentTurnResult {
                content,
                tool_calls: made_calls,
                last_tool_output,
            });
        }

        let Some(executor) = executor else {
            log::debug!("agent: tool_calls returned but no executor");
            return Ok(AgentTurnResult {
                content,
                tool_calls: made_calls,
                last_tool_output,
            });
        };

        messages.push(ChatMessage::assistant(content, Some(tool_calls.clone())));
        for call in &tool_calls {
            let name = call.function.name.as_str();
            let result = match executor.execute(name, &call.function.arguments).await {
                Ok(out) => out,
                Err(e) => {
                    log::warn!("agent: tool {} failed: {}", name, e);
                    format!("error: {}", e)
                }
            };
            last_tool_output = Some(result.clone());
            messages.push(ChatMessage::tool(call.id.clone(), result));
        }
        made_calls.extend(tool_calls);
    }
}
