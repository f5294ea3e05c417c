//! Ollama native chat API client implementation.
//!
//! Messages travel almost as they are; the backend insists on string
//! content and on function arguments as JSON objects rather than text.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::skip_serializing_none;
use uuid::Uuid;

use crate::client::{Client, ClientError};
use crate::http::{build_http_client, endpoint_url, send_checked, RequestBuilderExt, ResponseExt};
use crate::model::{ChatMessage, ChatResult, Role, ToolCall, ToolDefinition, Usage};
use crate::options::{ModelOptions, TransportOptions};

/// Ollama-specific model options, sent inside the `options` object.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OllamaModel {
    pub num_ctx: Option<u32>,
    pub seed: Option<i64>,
}

/// Ollama client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model_options: ModelOptions<OllamaModel>,
    transport_options: TransportOptions,
}

impl OllamaClient {
    /// Create a new client; an OpenAI-style `/v1` suffix on `base_url` is dropped.
    pub fn new(
        base_url: String,
        model_options: ModelOptions<OllamaModel>,
        transport_options: TransportOptions,
    ) -> Self {
        let trimmed = base_url.trim_end_matches('/');
        let base_url = trimmed.strip_suffix("/v1").unwrap_or(trimmed).to_string();
        Self {
            base_url,
            model_options,
            transport_options,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Client for OllamaClient {
    async fn send_message(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResult, ClientError> {
        let url = endpoint_url(&self.base_url, "/api/chat");
        let request_body = OllamaRequest::new(messages, &self.model_options, tools);

        let http_client = build_http_client(&self.transport_options)?;

        let mut req = http_client.post(&url).header(CONTENT_TYPE, "application/json");
        req = req.extra_headers(&self.transport_options);

        let response = send_checked("ollama", req.json_logged(&request_body)).await?;
        let ollama_response: OllamaResponse = response.json_logged().await?;
        Ok(ollama_response.into())
    }

    fn model(&self) -> &str {
        &self.model_options.model
    }
}

// --- Request Types ---

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    tools: Option<Vec<OllamaTool<'a>>>,
    stream: bool,
    options: OllamaOptions<'a>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: Role,
    content: &'a str,
    tool_calls: Option<Vec<OllamaToolCall>>,
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct OllamaTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolDefinition,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct OllamaOptions<'a> {
    temperature: Option<f32>,
    top_p: Option<f32>,
    num_predict: Option<u32>,
    #[serde(flatten)]
    provider: &'a OllamaModel,
}

impl<'a> OllamaRequest<'a> {
    fn new(
        messages: &'a [ChatMessage],
        model_options: &'a ModelOptions<OllamaModel>,
        tool_defs: &'a [ToolDefinition],
    ) -> Self {
        let messages = messages
            .iter()
            .map(|msg| OllamaMessage {
                role: msg.role,
                content: msg.content_or_empty(),
                tool_calls: msg
                    .tool_calls
                    .as_ref()
                    .map(|calls| calls.iter().map(OllamaToolCall::from).collect()),
                tool_call_id: msg.tool_call_id.as_deref(),
            })
            .collect();

        let tools = (!tool_defs.is_empty()).then(|| {
            tool_defs
                .iter()
                .map(|function| OllamaTool {
                    tool_type: "function",
                    function,
                })
                .collect()
        });

        OllamaRequest {
            model: &model_options.model,
            messages,
            tools,
            stream: false,
            options: OllamaOptions {
                temperature: model_options.temperature,
                top_p: model_options.top_p,
                num_predict: model_options.max_tokens,
                provider: &model_options.provider,
            },
        }
    }
}

// --- Shared Types ---

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    id: Option<String>,
    function: OllamaFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl From<&ToolCall> for OllamaToolCall {
    fn from(call: &ToolCall) -> Self {
        // The backend only accepts an object here.
        let arguments = call
            .parse_arguments()
            .map(Value::Object)
            .unwrap_or_else(|_| Value::Object(Map::new()));
        OllamaToolCall {
            id: Some(call.id.clone()),
            function: OllamaFunctionCall {
                name: call.name().to_string(),
                arguments,
            },
        }
    }
}

// --- Response Types ---

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: Option<OllamaResponseMessage>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    tool_calls: Option<Vec<OllamaToolCall>>,
}

impl From<OllamaResponse> for ChatResult {
    fn from(resp: OllamaResponse) -> Self {
        let (text, tool_calls) = match resp.message {
            Some(message) => (
                Some(message.content).filter(|c| !c.is_empty()),
                message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|call| {
                        let arguments = match call.function.arguments {
                            Value::String(raw) => raw,
                            Value::Null => "{}".to_string(),
                            other => other.to_string(),
                        };
                        ToolCall::new(
                            call.id
                                .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
                            call.function.name,
                            arguments,
                        )
                    })
                    .collect(),
            ),
            None => (None, Vec::new()),
        };

        ChatResult {
            text,
            tool_calls,
            usage: Some(Usage::new(
                resp.prompt_eval_count.unwrap_or_default(),
                resp.eval_count.unwrap_or_default(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_url_drops_v1_suffix() {
        let options = ModelOptions::<OllamaModel>::new("llama3.1:8b");
        let client = OllamaClient::new(
            "http://localhost:11434/v1/".into(),
            options,
            TransportOptions::default(),
        );
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn null_content_is_sent_as_empty_string() {
        let messages = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant_tool_calls(vec![ToolCall::new(
                "c1",
                "getWeather",
                r#"{"city":"Paris"}"#,
            )]),
            ChatMessage::tool("c1", "18°C"),
        ];
        let options = ModelOptions::<OllamaModel>::new("llama3.1:8b");
        let body = serde_json::to_value(OllamaRequest::new(&messages, &options, &[])).unwrap();

        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][1]["content"], "");
        assert_eq!(
            body["messages"][1]["tool_calls"][0]["function"]["arguments"],
            json!({"city": "Paris"})
        );
        assert_eq!(body["messages"][2]["role"], "tool");
        assert_eq!(body["messages"][2]["tool_call_id"], "c1");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn response_tool_calls_are_normalized() {
        let resp: OllamaResponse = serde_json::from_value(json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "getWeather", "arguments": {"city": "Paris"}}}]
            },
            "prompt_eval_count": 12,
            "eval_count": 3
        }))
        .unwrap();

        let result = ChatResult::from(resp);
        assert_eq!(result.text, None);
        assert_eq!(result.tool_calls.len(), 1);
        assert!(!result.tool_calls[0].id.is_empty());
        assert_eq!(result.tool_calls[0].function.arguments, r#"{"city":"Paris"}"#);
        assert_eq!(result.usage, Some(Usage::new(12, 3)));
    }
}
