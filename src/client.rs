//! Core client trait and error types.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ChatMessage, ChatResult, ToolDefinition};

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the failure stems from bad configuration rather than the backend.
    pub fn is_config(&self) -> bool {
        matches!(self, ClientError::Config(_))
    }
}

/// Uniform contract implemented by every provider adapter.
#[async_trait]
pub trait Client: Send + Sync {
    /// Send the conversation, optionally offering `tools`, and return the
    /// normalized completion.
    async fn send_message(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResult, ClientError>;

    /// Model identifier requests are sent with.
    fn model(&self) -> &str;
}
