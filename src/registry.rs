//! The set of connected tool servers and their aggregated tool catalog.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::mcp::{flatten_content, McpError, Served, ToolServer};
use crate::model::{ToolCall, ToolDefinition};
use crate::transport::{display_name, Connector, ServerConfig, ServerInfo, TransportConnector};

/// Bounds applied to every tool server interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Limit on a single `tools/call`.
    pub call_timeout: Duration,
    /// Limit on fetching one server's tool list after it connected.
    pub discovery_timeout: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(120),
            discovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Structured trace of one executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
    /// Flattened tool output.
    pub result: String,
    pub server_id: String,
}

struct ConnectedServer {
    id: String,
    server: Arc<dyn ToolServer>,
}

#[derive(Default)]
struct ServerSet {
    servers: Vec<ConnectedServer>,
    tools: Vec<Served<ToolDefinition>>,
}

impl ServerSet {
    fn server(&self, id: &str) -> Option<&Arc<dyn ToolServer>> {
        self.servers.iter().find(|s| s.id == id).map(|s| &s.server)
    }

    fn register(&mut self, server_id: &str, tools: Vec<ToolDefinition>) -> usize {
        let mut added = 0;
        for tool in tools {
            if let Some(existing) = self.tools.iter().find(|t| t.value.name == tool.name) {
                warn!(
                    "Tool '{}' from '{}' shadowed by the one registered by '{}'",
                    tool.name, server_id, existing.server_id
                );
                continue;
            }
            self.tools.push(Served::new(tool, server_id));
            added += 1;
        }
        added
    }

    async fn close_all(&self) {
        for connected in &self.servers {
            match connected.server.close().await {
                Ok(()) => debug!("Closed MCP server '{}'", connected.id),
                Err(e) => warn!("Failed to close MCP server '{}': {}", connected.id, e),
            }
        }
    }
}

/// Tool servers connected once and shared by every request.
///
/// [`init`](Self::init) and [`disconnect`](Self::disconnect) take the write
/// side of one lock, so concurrent first-time initialisation connects each
/// server exactly once. Everything else only reads.
pub struct ToolRegistry {
    connector: Arc<dyn Connector>,
    options: RegistryOptions,
    state: RwLock<Option<Arc<ServerSet>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(TransportConnector::default()))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            options: RegistryOptions::default(),
            state: RwLock::new(None),
        }
    }

    pub fn with_options(mut self, options: RegistryOptions) -> Self {
        self.options = options;
        self
    }

    /// Connect every server and fetch its tools.
    ///
    /// A no-op once a previous call succeeded. Any failure aborts the whole
    /// initialisation; servers connected before it are closed again.
    pub async fn init(&self, configs: &[ServerConfig]) -> Result<(), McpError> {
        let mut state = self.state.write().await;
        if state.is_some() {
            debug!("MCP servers already connected");
            return Ok(());
        }

        let mut set = ServerSet::default();
        if let Err(e) = self.connect_all(configs, &mut set).await {
            set.close_all().await;
            return Err(e);
        }

        info!(
            "Connected to {} MCP servers with {} tools",
            set.servers.len(),
            set.tools.len()
        );
        *state = Some(Arc::new(set));
        Ok(())
    }

    async fn connect_all(&self, configs: &[ServerConfig], set: &mut ServerSet) -> Result<(), McpError> {
        let mut seen = HashSet::new();
        for config in configs {
            if !seen.insert(config.name.as_str()) {
                return Err(McpError::Config(format!(
                    "duplicate server name '{}' in manifest",
                    config.name
                )));
            }

            let server = self.connector.connect(config).await?;
            set.servers.push(ConnectedServer {
                id: config.name.clone(),
                server: server.clone(),
            });

            let tools = tokio::time::timeout(self.options.discovery_timeout, server.list_tools())
                .await
                .map_err(|_| McpError::Timeout {
                    what: format!("listing tools of '{}'", config.name),
                    after: self.options.discovery_timeout,
                })??;

            let added = set.register(&config.name, tools);
            info!("Connected to MCP server '{}' with {} tools", config.name, added);
        }
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.is_some()
    }

    async fn snapshot(&self) -> Arc<ServerSet> {
        self.state.read().await.clone().unwrap_or_default()
    }

    /// Every registered tool, tagged with its owning server.
    pub async fn tools(&self) -> Vec<Served<ToolDefinition>> {
        self.snapshot().await.tools.clone()
    }

    /// Tools offered to the provider: restricted to `enabled` servers unless
    /// the list is empty, and stripped of their owner tag.
    pub async fn filtered_tools(&self, enabled: &[String]) -> Vec<ToolDefinition> {
        self.snapshot()
            .await
            .tools
            .iter()
            .filter(|t| enabled.is_empty() || enabled.contains(&t.server_id))
            .map(|t| t.value.clone())
            .collect()
    }

    /// Identifier of the server owning `tool`.
    pub async fn resolve(&self, tool: &str) -> Option<String> {
        self.snapshot()
            .await
            .tools
            .iter()
            .find(|t| t.value.name == tool)
            .map(|t| t.server_id.clone())
    }

    /// Connected servers, in manifest order.
    pub async fn servers(&self) -> Vec<ServerInfo> {
        self.snapshot()
            .await
            .servers
            .iter()
            .map(|s| ServerInfo {
                server_name: s.id.clone(),
                display_name: display_name(&s.id),
            })
            .collect()
    }

    /// Run one tool call against the server that owns it.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolExecution, McpError> {
        let set = self.snapshot().await;
        let name = call.name();
        let server_id = set
            .tools
            .iter()
            .find(|t| t.value.name == name)
            .map(|t| t.server_id.clone())
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;
        let server = set
            .server(&server_id)
            .ok_or_else(|| McpError::ServerNotFound(server_id.clone()))?;

        let arguments = call
            .parse_arguments()
            .map_err(|reason| McpError::InvalidArguments {
                tool: name.to_string(),
                reason,
            })?;

        info!("Calling tool '{}' on '{}'", name, server_id);
        let blocks = tokio::time::timeout(
            self.options.call_timeout,
            server.call_tool(name, arguments.clone()),
        )
        .await
        .map_err(|_| McpError::Timeout {
            what: format!("tool '{}'", name),
            after: self.options.call_timeout,
        })??;

        let result = flatten_content(&blocks);
        debug!("Tool '{}' returned: {}", name, result);

        Ok(ToolExecution {
            id: call.id.clone(),
            name: name.to_string(),
            arguments,
            result,
            server_id,
        })
    }

    /// Close every connection and forget all tools. Close failures are
    /// logged, not returned. A later [`init`](Self::init) reconnects.
    pub async fn disconnect(&self) {
        let Some(set) = self.state.write().await.take() else {
            return;
        };
        set.close_all().await;
        info!("Disconnected from {} MCP servers", set.servers.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: String::new(),
            parameters: json!({"type": "object"}),
        }
    }

    #[test]
    fn first_registration_wins() {
        let mut set = ServerSet::default();
        assert_eq!(set.register("a", vec![tool("search"), tool("fetch")]), 2);
        assert_eq!(set.register("b", vec![tool("search"), tool("open")]), 1);

        let owners: Vec<_> = set
            .tools
            .iter()
            .map(|t| (t.value.name.as_str(), t.server_id.as_str()))
            .collect();
        assert_eq!(owners, vec![("search", "a"), ("fetch", "a"), ("open", "b")]);
    }

    #[tokio::test]
    async fn empty_registry_knows_no_tools() {
        let registry = ToolRegistry::new();
        assert!(!registry.is_connected().await);
        assert!(registry.tools().await.is_empty());

        let err = registry
            .execute(&ToolCall::new("1", "anything", "{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ToolNotFound(name) if name == "anything"));
    }
}
