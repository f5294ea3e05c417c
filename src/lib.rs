//! # mcphost - LLM chat with tools from MCP servers
//!
//! Talk to any of several LLM backends through one contract while offering
//! them tools gathered from independently running Model Context Protocol
//! servers.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - One `Client` trait over OpenAI-compatible, Claude, Gemini and Ollama backends
//! - Tool servers reached over stdio, SSE or streamable HTTP
//! - One round of tool calling with a structured execution trace
//!
//! ## Architecture
//!
//! 1. **Providers** are factories that create Clients from configuration.
//! 2. The **ToolRegistry** connects tool servers once and aggregates their tools.
//! 3. The **Orchestrator** sends a conversation, runs the requested tools and
//!    asks for a follow-up answer.
//!
//! ### Core Types
//!
//! - **`Client`**: Sends a conversation plus tools to a provider.
//! - **`ProviderConfig`** / **`ProviderState`**: Select and hold the active provider.
//! - **`ServerConfig`** / **`Manifest`**: Describe the tool servers to connect.
//! - **`ToolRegistry`**: Connected servers and their tool catalog.
//! - **`Orchestrator`**: Runs the tool-calling protocol for one query.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use mcphost::{ChatMessage, Manifest, Orchestrator, ProviderState, ToolRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manifest = Manifest::load("servers.json")?;
//!     let registry = Arc::new(ToolRegistry::new());
//!     registry.init(&manifest.servers).await?;
//!
//!     let providers = ProviderState::new();
//!     let client = providers.init_from_env().await?;
//!
//!     let orchestrator = Orchestrator::new(client, registry.clone());
//!     let result = orchestrator
//!         .process_query(vec![ChatMessage::user("What's the weather in Paris?")], &[])
//!         .await?;
//!     println!("{}", result.reply);
//!
//!     registry.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod api;
pub mod client;
pub mod http;
pub mod mcp;
pub mod model;
pub mod options;
pub mod providers;
pub mod registry;
pub mod transport;

pub use agent::{AgentError, Orchestrator, QueryResult, ToolExecution};
pub use client::{Client, ClientError};
pub use mcp::{McpError, Served, ToolServer};
pub use model::{ChatMessage, ChatResult, Role, ToolCall, ToolDefinition};
pub use providers::{ProviderConfig, ProviderFactory, ProviderKind, ProviderState, ProviderStatus};
pub use registry::{RegistryOptions, ToolRegistry};
pub use transport::{Manifest, ServerConfig, ServerInfo, TransportKind};

// Re-export rmcp for convenience
pub use rmcp;
