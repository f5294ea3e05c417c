//! Anthropic provider implementation.

pub use crate::api::anthropic::{AnthropicClient, AnthropicModel};
use crate::client::ClientError;
use crate::options::{ModelOptions, TransportOptions};
use crate::providers::{require_api_key, Provider, ProviderKind};

pub struct Anthropic;

impl Provider for Anthropic {
    type Client = AnthropicClient;
    type Model = AnthropicModel;

    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com/v1";

    fn create_with_options(
        api_key: Option<String>,
        base_url: String,
        model_options: ModelOptions<AnthropicModel>,
        transport_options: TransportOptions,
    ) -> Result<Self::Client, ClientError> {
        Ok(AnthropicClient::new(
            require_api_key(ProviderKind::Claude, api_key)?,
            base_url,
            model_options,
            transport_options,
        ))
    }
}
