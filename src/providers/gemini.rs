//! Gemini provider implementation.

pub use crate::api::gemini::{GeminiClient, GeminiModel};
use crate::client::ClientError;
use crate::options::{ModelOptions, TransportOptions};
use crate::providers::{require_api_key, Provider, ProviderKind};

pub struct Gemini;

impl Provider for Gemini {
    type Client = GeminiClient;
    type Model = GeminiModel;

    const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

    fn create_with_options(
        api_key: Option<String>,
        base_url: String,
        model_options: ModelOptions<GeminiModel>,
        transport_options: TransportOptions,
    ) -> Result<Self::Client, ClientError> {
        Ok(GeminiClient::new(
            require_api_key(ProviderKind::Gemini, api_key)?,
            base_url,
            model_options,
            transport_options,
        ))
    }
}
