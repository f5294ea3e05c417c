//! Google Gemini API client implementation.
//!
//! Gemini differs from the canonical shape in three ways that matter here:
//! the system prompt travels as `systemInstruction`, tool results are
//! `function` turns keyed by function *name* rather than call id, and
//! returned function calls carry no id at all, so one is synthesized.
//! See: <https://ai.google.dev/api/rest>

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use serde_with::skip_serializing_none;
use uuid::Uuid;

use crate::client::{Client, ClientError};
use crate::http::{build_http_client, endpoint_url, send_checked, RequestBuilderExt, ResponseExt};
use crate::model::{ChatMessage, ChatResult, Role, ToolCall, ToolDefinition, Usage};
use crate::options::{ModelOptions, TransportOptions};

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

/// Name used for a function response whose originating call cannot be found.
const UNKNOWN_FUNCTION: &str = "unknown_function";

/// Schema keys Gemini's function declarations reject.
const UNSUPPORTED_SCHEMA_KEYS: [&str; 6] = [
    "$schema",
    "additionalProperties",
    "$id",
    "$ref",
    "definitions",
    "$defs",
];

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Gemini-specific model options.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeminiModel {
    pub top_k: Option<u32>,
}

/// Gemini client using HTTP transport.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    model_options: ModelOptions<GeminiModel>,
    transport_options: TransportOptions,
}

impl GeminiClient {
    /// Create a new Gemini client.
    ///
    /// `base_url` is the API host without the version segment.
    pub fn new(
        api_key: String,
        base_url: String,
        model_options: ModelOptions<GeminiModel>,
        transport_options: TransportOptions,
    ) -> Self {
        Self {
            api_key,
            base_url,
            model_options,
            transport_options,
        }
    }
}

#[async_trait]
impl Client for GeminiClient {
    async fn send_message(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResult, ClientError> {
        let url = endpoint_url(
            &self.base_url,
            &format!("/v1beta/models/{}:generateContent", self.model_options.model),
        );

        tracing::debug!(
            "Gemini: sending {} messages and {} tools",
            messages.len(),
            tools.len()
        );
        let request_body = GeminiRequest::new(messages, &self.model_options, tools)?;

        let http_client = build_http_client(&self.transport_options)?;

        let mut req = http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header(CONTENT_TYPE, "application/json");

        req = req.extra_headers(&self.transport_options);

        let response = send_checked("gemini", req.json_logged(&request_body)).await?;
        let gemini_response: GeminiResponse = response.json_logged().await?;
        Ok(gemini_response.into())
    }

    fn model(&self) -> &str {
        &self.model_options.model
    }
}

/// Strip schema keys Gemini rejects, at every nesting level reachable
/// through `properties`, `items`, `anyOf`, `oneOf` and `allOf`.
///
/// Everything else is copied unchanged.
pub fn sanitize_schema(schema: &Value) -> Value {
    let Value::Object(map) = schema else {
        return schema.clone();
    };

    let mut clean: Map<String, Value> = map
        .iter()
        .filter(|(key, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    if let Some(Value::Object(properties)) = clean.get_mut("properties") {
        for value in properties.values_mut() {
            *value = sanitize_schema(value);
        }
    }

    if let Some(items) = clean.get_mut("items") {
        *items = sanitize_schema(items);
    }

    for key in ["anyOf", "oneOf", "allOf"] {
        if let Some(Value::Array(variants)) = clean.get_mut(key) {
            for variant in variants.iter_mut() {
                *variant = sanitize_schema(variant);
            }
        }
    }

    Value::Object(clean)
}

/// Find the function name of the call a tool turn at `index` answers.
///
/// Scans backward for the nearest assistant turn carrying a call with the
/// matching id.
fn originating_function_name(messages: &[ChatMessage], index: usize) -> &str {
    let Some(call_id) = messages[index].tool_call_id.as_deref() else {
        return UNKNOWN_FUNCTION;
    };

    messages[..index]
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .find_map(|m| m.tool_calls().iter().find(|tc| tc.id == call_id))
        .map(|tc| tc.name())
        .unwrap_or(UNKNOWN_FUNCTION)
}

/// Tool output as a function response payload: JSON objects pass through,
/// anything else is wrapped as `{"result": <text>}`.
fn function_response_payload(content: Option<&str>) -> Value {
    let text = content.unwrap_or_default();
    if text.is_empty() {
        return json!({});
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({ "result": text }),
    }
}

impl GeminiRequest {
    fn new(
        messages: &[ChatMessage],
        model_options: &ModelOptions<GeminiModel>,
        tool_defs: &[ToolDefinition],
    ) -> Result<Self, ClientError> {
        let mut contents = Vec::with_capacity(messages.len());
        let mut system_parts = Vec::new();

        for (index, msg) in messages.iter().enumerate() {
            match msg.role {
                Role::System => {
                    if let Some(text) = &msg.content {
                        system_parts.push(GeminiPart::text(text.clone()));
                    }
                }
                Role::Tool => {
                    let name = originating_function_name(messages, index).to_string();
                    if name == UNKNOWN_FUNCTION {
                        tracing::warn!(
                            "Gemini: no call found for tool result {:?}",
                            msg.tool_call_id
                        );
                    }
                    contents.push(GeminiContent {
                        role: GeminiRole::Function,
                        parts: vec![GeminiPart::FunctionResponse {
                            function_response: FunctionResponse {
                                name,
                                response: function_response_payload(msg.content.as_deref()),
                            },
                        }],
                    });
                }
                Role::Assistant if !msg.tool_calls().is_empty() => {
                    let mut parts = Vec::new();
                    if let Some(text) = msg.content.as_deref().filter(|t| !t.is_empty()) {
                        parts.push(GeminiPart::text(text.to_string()));
                    }
                    for call in msg.tool_calls() {
                        let args = call.parse_arguments().map_err(|e| {
                            ClientError::ProviderError(format!(
                                "invalid arguments for function call '{}': {}",
                                call.name(),
                                e
                            ))
                        })?;
                        parts.push(GeminiPart::FunctionCall {
                            function_call: FunctionCall {
                                name: call.name().to_string(),
                                args: Value::Object(args),
                            },
                        });
                    }
                    contents.push(GeminiContent {
                        role: GeminiRole::Model,
                        parts,
                    });
                }
                Role::Assistant => contents.push(GeminiContent {
                    role: GeminiRole::Model,
                    parts: vec![GeminiPart::text(msg.content_or_empty().to_string())],
                }),
                Role::User => contents.push(GeminiContent {
                    role: GeminiRole::User,
                    parts: vec![GeminiPart::text(msg.content_or_empty().to_string())],
                }),
            }
        }

        let tools = if tool_defs.is_empty() {
            None
        } else {
            Some(vec![GeminiTool {
                function_declarations: tool_defs
                    .iter()
                    .map(|def| GeminiFunctionDeclaration {
                        name: def.name.clone(),
                        description: def.description.clone(),
                        parameters: sanitize_schema(&def.parameters),
                    })
                    .collect(),
            }])
        };

        Ok(GeminiRequest {
            contents,
            system_instruction: (!system_parts.is_empty())
                .then_some(GeminiSystemInstruction { parts: system_parts }),
            tools,
            generation_config: GeminiGenerationConfig {
                temperature: Some(model_options.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
                top_p: model_options.top_p,
                top_k: model_options.provider.top_k,
                max_output_tokens: Some(
                    model_options.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
                ),
            },
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|&category| GeminiSafetySetting {
                    category,
                    threshold: "BLOCK_MEDIUM_AND_ABOVE",
                })
                .collect(),
        })
    }
}

impl From<GeminiResponse> for ChatResult {
    fn from(resp: GeminiResponse) -> Self {
        let parts = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default();

        let mut text = None;
        let mut tool_calls = Vec::new();

        for part in parts {
            match part {
                GeminiPart::Text { text: t, .. } if !t.is_empty() => {
                    text.get_or_insert(t);
                }
                GeminiPart::FunctionCall { function_call } => {
                    let args = match function_call.args {
                        Value::Null => json!({}),
                        other => other,
                    };
                    tool_calls.push(ToolCall::new(
                        Uuid::new_v4().simple().to_string(),
                        function_call.name,
                        args.to_string(),
                    ));
                }
                _ => {}
            }
        }

        ChatResult {
            text: Some(text.unwrap_or_default()),
            tool_calls,
            usage: resp.usage_metadata.map(|u| Usage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            }),
        }
    }
}

// --- Gemini API Request/Response Types ---

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    system_instruction: Option<GeminiSystemInstruction>,
    tools: Option<Vec<GeminiTool>>,
    generation_config: GeminiGenerationConfig,
    safety_settings: Vec<GeminiSafetySetting>,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: Option<f32>,
    top_p: Option<f32>,
    top_k: Option<u32>,
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiSafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum GeminiRole {
    User,
    Model,
    Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    role: GeminiRole,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
enum GeminiPart {
    Text {
        thought: Option<bool>,
        text: String,
    },
    FunctionCall {
        function_call: FunctionCall,
    },
    FunctionResponse {
        function_response: FunctionResponse,
    },
    Other(Value),
}

impl GeminiPart {
    fn text(text: String) -> Self {
        GeminiPart::Text {
            thought: None,
            text,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Copy, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}
