use std::time::Duration;
use mcphost::options::{ModelOptions, TransportOptions, DEFAULT_REQUEST_TIMEOUT};
use mcphost::providers::{AnthropicModel, OpenAiModel};

#[test]
fn test_transport_options_builder() {
    let options = TransportOptions::new()
        .with_timeout(Duration::from_secs(30))
        .with_proxy("http://proxy.example.com".to_string())
        .with_header("X-Custom-Header".to_string(), "Value".to_string());

    match options {
        TransportOptions::Http {
            timeout,
            proxy,
            headers,
        } => {
            assert_eq!(timeout, Some(Duration::from_secs(30)));
            assert_eq!(proxy, Some("http://proxy.example.com".to_string()));

            let headers = headers.unwrap();
            assert_eq!(headers.get("X-Custom-Header"), Some(&"Value".to_string()));
        }
    }
}

#[test]
fn test_transport_options_are_bounded_by_default() {
    assert_eq!(TransportOptions::default().timeout(), Some(DEFAULT_REQUEST_TIMEOUT));
}

#[test]
fn test_model_options_new() {
    let options: ModelOptions<OpenAiModel> = ModelOptions::new("gpt-4o-mini");

    assert_eq!(options.model, "gpt-4o-mini");
    assert_eq!(options.temperature, None);
    assert_eq!(options.top_p, None);
    assert_eq!(options.max_tokens, None);
}

#[test]
fn test_model_options_builders() {
    let options = ModelOptions::<AnthropicModel>::new("claude-3-5-sonnet-20241022")
        .with_temperature(0.2)
        .with_max_tokens(512);

    assert_eq!(options.model, "claude-3-5-sonnet-20241022");
    assert_eq!(options.temperature, Some(0.2));
    assert_eq!(options.max_tokens, Some(512));
}
