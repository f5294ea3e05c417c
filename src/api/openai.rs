//! OpenAI Chat Completions API client implementation.
//!
//! The canonical conversation types already follow this wire format, so the
//! request carries messages and tools as they are and the first choice of the
//! response is passed back unchanged.

use async_trait::async_trait;
use nonempty::NonEmpty;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::client::{Client, ClientError};
use crate::http::{build_http_client, endpoint_url, send_checked, RequestBuilderExt, ResponseExt};
use crate::model::{ChatMessage, ChatResult, ToolCall, ToolDefinition, Usage};
use crate::options::{ModelOptions, TransportOptions};

const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Trait for models compatible with OpenAI's Chat Completions API.
pub trait OpenAiCompatibleModel:
    Send + Sync + Default + Serialize + for<'de> Deserialize<'de> + Clone
{
}

/// Generic client for OpenAI-compatible Chat Completions APIs.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient<M> {
    label: &'static str,
    api_key: Option<String>,
    base_url: String,
    model_options: ModelOptions<M>,
    transport_options: TransportOptions,
}

impl<M: OpenAiCompatibleModel> OpenAiCompatibleClient<M> {
    /// Create a new client.
    ///
    /// `label` names the vendor in errors; `base_url` includes any version
    /// prefix such as `/v1`.
    pub fn new(
        label: &'static str,
        api_key: Option<String>,
        base_url: String,
        model_options: ModelOptions<M>,
        transport_options: TransportOptions,
    ) -> Self {
        Self {
            label,
            api_key,
            base_url,
            model_options,
            transport_options,
        }
    }

}

#[async_trait]
impl<M: OpenAiCompatibleModel> Client for OpenAiCompatibleClient<M> {
    async fn send_message(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResult, ClientError> {
        let url = endpoint_url(&self.base_url, "/chat/completions");
        let request_body = ChatRequest::new(messages, &self.model_options, tools);

        let http_client = build_http_client(&self.transport_options)?;

        let mut req = http_client.post(&url).header(CONTENT_TYPE, "application/json");
        if let Some(key) = &self.api_key {
            req = req.header(AUTHORIZATION, format!("Bearer {}", key));
        }
        req = req.extra_headers(&self.transport_options);

        let response = send_checked(self.label, req.json_logged(&request_body)).await?;
        let chat_response: ChatResponse = response.json_logged().await?;
        Ok(chat_response.into())
    }

    fn model(&self) -> &str {
        &self.model_options.model
    }
}

// --- Chat Completions API Types ---

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a, M> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    tools: Option<Vec<ChatTool<'a>>>,
    #[serde(flatten)]
    provider_options: &'a M,
}

impl<'a, M: OpenAiCompatibleModel> ChatRequest<'a, M> {
    fn new(
        messages: &'a [ChatMessage],
        model_options: &'a ModelOptions<M>,
        tool_defs: &'a [ToolDefinition],
    ) -> Self {
        let tools = if tool_defs.is_empty() {
            None
        } else {
            Some(
                tool_defs
                    .iter()
                    .map(|function| ChatTool {
                        tool_type: "function",
                        function,
                    })
                    .collect(),
            )
        };

        ChatRequest {
            model: &model_options.model,
            messages,
            max_tokens: Some(model_options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
            temperature: Some(model_options.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
            top_p: model_options.top_p,
            tools,
            provider_options: &model_options.provider,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: NonEmpty<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: Option<u32>,
}

impl From<ChatResponse> for ChatResult {
    fn from(resp: ChatResponse) -> Self {
        let message = resp.choices.head.message;
        ChatResult {
            text: message.content,
            tool_calls: message.tool_calls.unwrap_or_default(),
            usage: resp.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u
                    .total_tokens
                    .unwrap_or(u.prompt_tokens.saturating_add(u.completion_tokens)),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize, Default)]
    struct Plain;
    impl OpenAiCompatibleModel for Plain {}

    #[test]
    fn request_passes_messages_and_tools_through() {
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::assistant_tool_calls(vec![ToolCall::new("c1", "lookup", "{}")]),
            ChatMessage::tool("c1", "done"),
        ];
        let tools = vec![ToolDefinition {
            name: "lookup".into(),
            description: "Look something up".into(),
            parameters: json!({"type": "object"}),
        }];
        let options = ModelOptions::<Plain>::new("gpt-4o-mini");

        let body = serde_json::to_value(ChatRequest::new(&messages, &options, &tools)).unwrap();

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"], serde_json::to_value(&messages).unwrap());
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "lookup");
        assert_eq!(body["tools"][0]["function"]["parameters"], json!({"type": "object"}));
    }

    #[test]
    fn request_omits_empty_tool_list() {
        let options = ModelOptions::<Plain>::new("m");
        let body = serde_json::to_value(ChatRequest::new(&[], &options, &[])).unwrap();
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn response_first_choice_becomes_result() {
        let resp: ChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "getWeather", "arguments": "{\"city\":\"Paris\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        }))
        .unwrap();

        let result = ChatResult::from(resp);
        assert_eq!(result.text, None);
        assert_eq!(result.tool_calls[0].id, "call_1");
        assert_eq!(result.tool_calls[0].function.arguments, r#"{"city":"Paris"}"#);
        assert_eq!(result.usage, Some(Usage::new(3, 4)));
    }

    #[test]
    fn missing_usage_total_is_derived_without_overflow() {
        let resp: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "hi"}}],
            "usage": {"prompt_tokens": 4294967295u32, "completion_tokens": 2}
        }))
        .unwrap();

        let usage = ChatResult::from(resp).usage.unwrap();
        assert_eq!(usage.total_tokens, u32::MAX);
    }
}
