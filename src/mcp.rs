use std::time::Duration;

use async_trait::async_trait;
use itertools::Itertools;
use rmcp::model::{CallToolRequestParam, Tool};
use rmcp::service::{Peer, RoleClient, RunningService};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::model::ToolDefinition;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid server config: {0}")]
    Config(String),
    #[error("Runner not found: {0}")]
    RunnerNotFound(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Failed to connect to MCP server '{server}': {reason}")]
    ConnectionFailed { server: String, reason: String },
    #[error("MCP error: {0}")]
    Mcp(String),
    #[error("Tool '{0}' not found")]
    ToolNotFound(String),
    #[error("Client for server '{0}' not found")]
    ServerNotFound(String),
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl McpError {
    /// Whether the failure stems from a bad manifest entry.
    pub fn is_config(&self) -> bool {
        matches!(self, McpError::Config(_))
    }
}

/// A wrapper type that associates a value with the server it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Served<T> {
    /// The underlying value.
    pub value: T,
    /// Identifier of the owning server.
    pub server_id: String,
}

impl<T> Served<T> {
    pub fn new(value: T, server_id: impl Into<String>) -> Self {
        Self {
            value,
            server_id: server_id.into(),
        }
    }
}

/// One connected tool server, whatever the transport.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// List the tools the server exposes.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, McpError>;

    /// Execute a tool and return its raw content blocks, in order.
    async fn call_tool(&self, name: &str, args: Map<String, Value>) -> Result<Vec<Value>, McpError>;

    /// Tear the connection down. Later calls fail.
    async fn close(&self) -> Result<(), McpError>;
}

/// Flatten a tool's content blocks into one string.
///
/// Text blocks contribute their raw text, plain strings pass through, and
/// any other block is rendered as pretty-printed JSON without its `type`
/// tag. Blocks are joined by newlines in their original order.
pub fn flatten_content(blocks: &[Value]) -> String {
    blocks.iter().map(flatten_block).join("\n")
}

fn flatten_block(block: &Value) -> String {
    match block {
        Value::String(text) => text.clone(),
        Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("text") => map
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Value::Object(map) => {
            let mut rest = map.clone();
            rest.remove("type");
            pretty(&Value::Object(rest))
        }
        other => pretty(other),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

impl From<Tool> for ToolDefinition {
    fn from(tool: Tool) -> Self {
        ToolDefinition {
            name: tool.name.into_owned(),
            description: tool.description.map(|d| d.into_owned()).unwrap_or_default(),
            parameters: Value::Object((*tool.input_schema).clone()),
        }
    }
}

/// An rmcp client session serving as a [`ToolServer`].
pub struct McpConnection {
    name: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl McpConnection {
    pub fn new(name: impl Into<String>, service: RunningService<RoleClient, ()>) -> Self {
        Self {
            name: name.into(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ToolServer for McpConnection {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, McpError> {
        let tools = self
            .peer
            .list_all_tools()
            .await
            .map_err(|e| McpError::Mcp(e.to_string()))?;
        Ok(tools.into_iter().map(ToolDefinition::from).collect())
    }

    async fn call_tool(&self, name: &str, args: Map<String, Value>) -> Result<Vec<Value>, McpError> {
        let params = CallToolRequestParam {
            name: name.to_string().into(),
            arguments: Some(args),
        };

        let result = self
            .peer
            .call_tool(params)
            .await
            .map_err(|e| McpError::Mcp(e.to_string()))?;

        if result.is_error.unwrap_or(false) {
            warn!("Tool '{}' on '{}' reported an error result", name, self.name);
        }

        let mut rendered = serde_json::to_value(&result).map_err(|e| McpError::Mcp(e.to_string()))?;
        match rendered.get_mut("content").map(Value::take) {
            Some(Value::Array(blocks)) => Ok(blocks),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Ok(vec![other]),
        }
    }

    async fn close(&self) -> Result<(), McpError> {
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };
        let reason = service
            .cancel()
            .await
            .map_err(|e| McpError::Mcp(e.to_string()))?;
        debug!("MCP session '{}' closed: {:?}", self.name, reason);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_mixed_blocks_in_order() {
        let blocks = vec![
            json!({"type": "text", "text": "a"}),
            json!("b"),
            json!({"type": "other", "x": 1}),
        ];
        assert_eq!(flatten_content(&blocks), "a\nb\n{\n  \"x\": 1\n}");
    }

    #[test]
    fn flattens_empty_list_to_empty_string() {
        assert_eq!(flatten_content(&[]), "");
    }

    #[test]
    fn non_object_blocks_are_pretty_printed() {
        assert_eq!(flatten_content(&[json!([1, 2])]), "[\n  1,\n  2\n]");
    }

    #[test]
    fn image_blocks_keep_their_payload() {
        let blocks = vec![json!({"type": "image", "data": "AAA", "mimeType": "image/png"})];
        let flat = flatten_content(&blocks);
        assert!(flat.contains("\"data\": \"AAA\""));
        assert!(flat.contains("\"mimeType\": \"image/png\""));
    }
}
