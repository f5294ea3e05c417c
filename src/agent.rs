//! Query orchestration: one completion, at most one round of tool calls, one
//! follow-up completion.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::client::{Client, ClientError};
use crate::mcp::McpError;
use crate::model::{ChatMessage, ToolCall};
use crate::registry::ToolRegistry;

pub use crate::registry::ToolExecution;

/// Instruction prepended to every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. When using tools, provide a clear, readable summary of the results rather than showing raw data. Focus on answering the user's question with the information gathered.";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Tool(#[from] McpError),
}

impl AgentError {
    /// Whether the failure was caused by the caller's configuration rather
    /// than by a backend, a tool server, or the model's output.
    pub fn is_client_error(&self) -> bool {
        match self {
            AgentError::Client(e) => e.is_config(),
            AgentError::Tool(e) => e.is_config(),
        }
    }
}

/// Final reply of a query plus the trace of tools it ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub reply: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_responses: Vec<ToolExecution>,
}

/// Drives the active provider against the registered tool servers.
///
/// # Example
/// ```ignore
/// let registry = Arc::new(ToolRegistry::new());
/// registry.init(&Manifest::load("servers.json")?.servers).await?;
///
/// let state = ProviderState::new();
/// let orchestrator = Orchestrator::new(state.init_from_env().await?, registry);
///
/// let result = orchestrator
///     .process_query(vec![ChatMessage::user("What's the weather in Paris?")], &[])
///     .await?;
/// println!("{}", result.reply);
/// ```
pub struct Orchestrator {
    client: Arc<dyn Client>,
    registry: Arc<ToolRegistry>,
    system_prompt: String,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn Client>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            client,
            registry,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Replace the instruction prepended to each conversation.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Answer a conversation, running any tools the model asks for once.
    ///
    /// `enabled_servers` restricts the offered tools to those servers; an
    /// empty slice offers all of them. Any failure aborts the query without
    /// partial results.
    pub async fn process_query(
        &self,
        messages: Vec<ChatMessage>,
        enabled_servers: &[String],
    ) -> Result<QueryResult, AgentError> {
        let mut conversation = Vec::with_capacity(messages.len() + 1);
        conversation.push(ChatMessage::system(self.system_prompt.as_str()));
        conversation.extend(messages);

        let tools = self.registry.filtered_tools(enabled_servers).await;
        debug!(
            "Sending {} messages with {} tools to {}",
            conversation.len(),
            tools.len(),
            self.client.model()
        );

        let first = self.client.send_message(&conversation, &tools).await?;
        if !first.has_tool_calls() {
            return Ok(QueryResult {
                reply: first.text.unwrap_or_default(),
                tool_calls: Vec::new(),
                tool_responses: Vec::new(),
            });
        }

        info!("Model requested {} tool calls", first.tool_calls.len());
        let mut executions = Vec::with_capacity(first.tool_calls.len());
        for call in &first.tool_calls {
            let execution = self.registry.execute(call).await?;
            conversation.push(ChatMessage::assistant_tool_calls(vec![call.clone()]));
            conversation.push(ChatMessage::tool(&call.id, execution.result.as_str()));
            executions.push(execution);
        }

        let follow_up = self.client.send_message(&conversation, &[]).await?;
        Ok(QueryResult {
            reply: follow_up.text.unwrap_or_default(),
            tool_calls: first.tool_calls,
            tool_responses: executions,
        })
    }
}
