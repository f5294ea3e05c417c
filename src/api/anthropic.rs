//! Anthropic API client implementation.

use async_trait::async_trait;
use itertools::Itertools;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

use crate::client::{Client, ClientError};
use crate::http::{build_http_client, endpoint_url, send_checked, RequestBuilderExt, ResponseExt};
use crate::model::{ChatMessage, ChatResult, Role, ToolCall, ToolDefinition, Usage};
use crate::options::{ModelOptions, TransportOptions};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Prefix of the user turn a tool result is folded into.
pub const TOOL_RESULT_MARKER: &str = "Tool result: ";

/// Anthropic model options.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnthropicModel {
    pub top_k: Option<u32>,
    pub metadata: Option<Value>,
}

/// Anthropic client.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    model_options: ModelOptions<AnthropicModel>,
    transport_options: TransportOptions,
}

impl AnthropicClient {
    pub fn new(
        api_key: String,
        base_url: String,
        model_options: ModelOptions<AnthropicModel>,
        transport_options: TransportOptions,
    ) -> Self {
        Self {
            api_key,
            base_url,
            model_options,
            transport_options,
        }
    }

    fn headers(&self) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|_| ClientError::Config("Invalid API key".to_string()))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl Client for AnthropicClient {
    async fn send_message(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResult, ClientError> {
        let url = endpoint_url(&self.base_url, "/messages");
        let request_body = AnthropicRequest::new(messages, &self.model_options, tools);

        let http_client = build_http_client(&self.transport_options)?;

        let mut req = http_client.post(&url).headers(self.headers()?);
        req = req.extra_headers(&self.transport_options);

        let response = send_checked("claude", req.json_logged(&request_body)).await?;
        let anthropic_response: AnthropicResponse = response.json_logged().await?;
        Ok(anthropic_response.into())
    }

    fn model(&self) -> &str {
        &self.model_options.model
    }
}

// --- Request Types ---

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    system: Option<String>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool<'a>>,
    #[serde(flatten)]
    provider_options: &'a AnthropicModel,
}

#[derive(Debug, Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, PartialEq, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

impl<'a> AnthropicRequest<'a> {
    fn new(
        messages_in: &[ChatMessage],
        model_options: &'a ModelOptions<AnthropicModel>,
        tool_defs: &'a [ToolDefinition],
    ) -> Self {
        let mut system_prompt: Option<String> = None;
        let mut messages = Vec::with_capacity(messages_in.len());

        for msg in messages_in {
            match msg.role {
                Role::System => {
                    let content = msg.content_or_empty();
                    match &mut system_prompt {
                        Some(sys) => {
                            sys.push('\n');
                            sys.push_str(content);
                        }
                        None => system_prompt = Some(content.to_string()),
                    }
                }
                Role::Tool => messages.push(AnthropicMessage {
                    role: "user",
                    content: format!("{}{}", TOOL_RESULT_MARKER, msg.content_or_empty()),
                }),
                Role::Assistant => messages.push(AnthropicMessage {
                    role: "assistant",
                    content: assistant_text(msg),
                }),
                Role::User => messages.push(AnthropicMessage {
                    role: "user",
                    content: msg.content_or_empty().to_string(),
                }),
            }
        }

        let tools = tool_defs
            .iter()
            .map(|t| AnthropicTool {
                name: &t.name,
                description: &t.description,
                input_schema: &t.parameters,
            })
            .collect();

        AnthropicRequest {
            model: &model_options.model,
            messages,
            max_tokens: model_options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: system_prompt,
            temperature: model_options.temperature,
            top_p: model_options.top_p,
            tools,
            provider_options: &model_options.provider,
        }
    }
}

// --- Response Types ---

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContent {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl From<AnthropicResponse> for ChatResult {
    fn from(resp: AnthropicResponse) -> Self {
        let mut text = None;
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                AnthropicContent::Text { text: t } => {
                    text.get_or_insert(t);
                }
                AnthropicContent::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::new(id, name, input.to_string()));
                }
                AnthropicContent::Other => {}
            }
        }

        ChatResult {
            text: Some(text.unwrap_or_default()),
            tool_calls,
            usage: resp
                .usage
                .map(|u| Usage::new(u.input_tokens, u.output_tokens)),
        }
    }
}

/// Text of an assistant turn. Tool-call turns carry no text of their own,
/// so the calls are spelled out instead.
fn assistant_text(msg: &ChatMessage) -> String {
    match msg.content.as_deref() {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => msg
            .tool_calls()
            .iter()
            .map(|call| {
                let args = call.function.arguments.trim();
                format!("Calling {} with {}", call.name(), if args.is_empty() { "{}" } else { args })
            })
            .join("\n"),
    }
}
