use std::sync::Arc;

use mcphost::client::{Client, ClientError};
use mcphost::model::{ChatMessage, ToolCall, ToolDefinition};
use mcphost::providers::{
    Anthropic, Custom, Gemini, Ollama, OpenAi, Provider, ProviderConfig, ProviderFactory,
    ProviderKind, ProviderState,
};
use mcphost::options::{ModelOptions, TransportOptions};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn weather_tool() -> ToolDefinition {
    ToolDefinition {
        name: "getWeather".to_string(),
        description: "Current weather for a city".to_string(),
        parameters: json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"],
            "additionalProperties": false
        }),
    }
}

fn config(kind: ProviderKind, api_key: Option<&str>, base_url: &str, model: &str) -> ProviderConfig {
    ProviderConfig {
        kind,
        api_key: api_key.map(str::to_string),
        base_url: base_url.to_string(),
        model: model.to_string(),
    }
}

#[tokio::test]
async fn test_openai_text_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 1000})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAi::create_with_options(
        Some("sk-test".to_string()),
        format!("{}/v1", server.uri()),
        ModelOptions::new("gpt-4o-mini"),
        TransportOptions::default(),
    )
    .unwrap();

    let result = client.send_message(&[ChatMessage::user("Hi")], &[]).await.unwrap();
    assert_eq!(result.text.as_deref(), Some("Hello!"));
    assert!(result.tool_calls.is_empty());
    assert_eq!(result.usage.unwrap().total_tokens, 7);
}

#[tokio::test]
async fn test_openai_tool_call_passes_through() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "getWeather", "arguments": "{\"city\":\"Paris\"}"}
                }]
            }}]
        })))
        .mount(&server)
        .await;

    let client = OpenAi::create_with_options(
        Some("sk-test".to_string()),
        format!("{}/v1", server.uri()),
        ModelOptions::new("gpt-4o-mini"),
        TransportOptions::default(),
    )
    .unwrap();

    let result = client
        .send_message(&[ChatMessage::user("Weather?")], &[weather_tool()])
        .await
        .unwrap();
    assert_eq!(result.text, None);
    assert_eq!(
        result.tool_calls,
        vec![ToolCall::new("call_1", "getWeather", "{\"city\":\"Paris\"}")]
    );

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["tools"][0]["type"], "function");
    assert_eq!(body["tools"][0]["function"]["name"], "getWeather");
    assert_eq!(body["temperature"], 0.7);
}

#[tokio::test]
async fn test_custom_without_key_sends_no_authorization() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "local"}}]
        })))
        .mount(&server)
        .await;

    let client = Custom::create_with_options(
        None,
        format!("{}/v1", server.uri()),
        ModelOptions::new("qwen"),
        TransportOptions::default(),
    )
    .unwrap();
    let result = client.send_message(&[ChatMessage::user("Hi")], &[]).await.unwrap();
    assert_eq!(result.text.as_deref(), Some("local"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_non_success_status_carries_code_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let client = OpenAi::create_with_options(
        Some("sk-bad".to_string()),
        format!("{}/v1", server.uri()),
        ModelOptions::new("gpt-4o-mini"),
        TransportOptions::default(),
    )
    .unwrap();

    let err = client.send_message(&[ChatMessage::user("Hi")], &[]).await.unwrap_err();
    match &err {
        ClientError::Api { status, body, .. } => {
            assert_eq!(*status, 401);
            assert_eq!(body, "invalid api key");
        }
        other => panic!("expected an API error, got {:?}", other),
    }
    assert!(err.to_string().contains("401"));
    assert!(!err.is_config());
}

#[tokio::test]
async fn test_claude_request_and_tool_use_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({"system": "Be brief.", "max_tokens": 4096})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "text", "text": "Checking."},
                {"type": "tool_use", "id": "toolu_01", "name": "getWeather", "input": {"city": "Paris"}}
            ],
            "usage": {"input_tokens": 20, "output_tokens": 9}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Anthropic::create_with_options(
        Some("test-key".to_string()),
        format!("{}/v1", server.uri()),
        ModelOptions::new("claude-3-5-sonnet-20241022"),
        TransportOptions::default(),
    )
    .unwrap();

    let messages = vec![
        ChatMessage::system("Be brief."),
        ChatMessage::user("Weather in Paris?"),
        ChatMessage::tool("toolu_00", "18°C, cloudy"),
    ];
    let result = client.send_message(&messages, &[weather_tool()]).await.unwrap();

    assert_eq!(result.text.as_deref(), Some("Checking."));
    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_calls[0].id, "toolu_01");
    assert_eq!(result.tool_calls[0].name(), "getWeather");
    assert_eq!(
        result.tool_calls[0].parse_arguments().unwrap(),
        json!({"city": "Paris"}).as_object().unwrap().clone()
    );

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        body["messages"],
        json!([
            {"role": "user", "content": "Weather in Paris?"},
            {"role": "user", "content": "Tool result: 18°C, cloudy"}
        ])
    );
    assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
}

#[tokio::test]
async fn test_gemini_sanitizes_schema_and_synthesizes_ids() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-pro:generateContent"))
        .and(header("x-goog-api-key", "g-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"functionCall": {"name": "getWeather", "args": {"city": "Paris"}}}
            ]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Gemini::create_with_options(
        Some("g-key".to_string()),
        server.uri(),
        ModelOptions::new("gemini-1.5-pro"),
        TransportOptions::default(),
    )
    .unwrap();

    let result = client
        .send_message(&[ChatMessage::user("Weather?")], &[weather_tool()])
        .await
        .unwrap();
    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_calls[0].name(), "getWeather");
    assert!(!result.tool_calls[0].id.is_empty());

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let params = &body["tools"][0]["functionDeclarations"][0]["parameters"];
    assert!(params.get("$schema").is_none());
    assert!(params.get("additionalProperties").is_none());
    assert_eq!(params["properties"]["city"]["type"], "string");
}

#[tokio::test]
async fn test_ollama_uses_native_chat_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "llama3.1:8b", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "Hi there"},
            "done": true,
            "prompt_eval_count": 8,
            "eval_count": 3
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Ollama::create_with_options(
        None,
        format!("{}/v1", server.uri()),
        ModelOptions::new("llama3.1:8b"),
        TransportOptions::default(),
    )
    .unwrap();

    let result = client.send_message(&[ChatMessage::user("Hi")], &[]).await.unwrap();
    assert_eq!(result.text.as_deref(), Some("Hi there"));
    assert_eq!(result.usage.unwrap().total_tokens, 11);
}

#[test]
fn test_factory_rejects_missing_credential() {
    let err = ProviderFactory::create(&config(
        ProviderKind::Claude,
        None,
        "https://api.anthropic.com/v1",
        "claude-3-5-sonnet-20241022",
    ))
    .err()
    .unwrap();
    assert!(err.is_config());
}

#[test]
fn test_factory_builds_each_vendor() {
    for (kind, key) in [
        (ProviderKind::OpenAi, Some("k")),
        (ProviderKind::Claude, Some("k")),
        (ProviderKind::Gemini, Some("k")),
        (ProviderKind::Ollama, None),
        (ProviderKind::Custom, None),
    ] {
        let client = ProviderFactory::create(&config(kind, key, "http://localhost:1", "m")).unwrap();
        assert_eq!(client.model(), "m");
    }
}

#[tokio::test]
async fn test_provider_state_initializes_once() {
    let state = ProviderState::new();
    assert!(!state.is_connected());
    assert_eq!(state.status().error.as_deref(), Some("provider not initialized"));

    let first = state
        .init(&config(ProviderKind::Ollama, None, "http://localhost:11434", "llama3.1:8b"))
        .await
        .unwrap();
    let second = state
        .init(&config(ProviderKind::OpenAi, Some("k"), "https://api.openai.com/v1", "gpt-4o-mini"))
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.model(), "llama3.1:8b");

    let status = state.status();
    assert!(status.connected);
    assert_eq!(status.provider, "ollama");
    assert_eq!(status.base_url, "http://localhost:11434");
}
