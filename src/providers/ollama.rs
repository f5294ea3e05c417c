//! Ollama provider implementation.

pub use crate::api::ollama::{OllamaClient, OllamaModel};
use crate::client::ClientError;
use crate::options::{ModelOptions, TransportOptions};
use crate::providers::Provider;

pub struct Ollama;

impl Provider for Ollama {
    type Client = OllamaClient;
    type Model = OllamaModel;

    const DEFAULT_BASE_URL: &'static str = "http://localhost:11434";

    fn create_with_options(
        _api_key: Option<String>,
        base_url: String,
        model_options: ModelOptions<OllamaModel>,
        transport_options: TransportOptions,
    ) -> Result<Self::Client, ClientError> {
        Ok(OllamaClient::new(base_url, model_options, transport_options))
    }
}
