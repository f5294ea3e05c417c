//! OpenAI provider implementation.

use serde::{Deserialize, Serialize};

use crate::api::openai::{OpenAiCompatibleClient, OpenAiCompatibleModel};
use crate::client::ClientError;
use crate::options::{ModelOptions, TransportOptions};
use crate::providers::{require_api_key, Provider, ProviderKind};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAiModel;

impl OpenAiCompatibleModel for OpenAiModel {}

pub type OpenAiClient = OpenAiCompatibleClient<OpenAiModel>;

pub struct OpenAi;

impl Provider for OpenAi {
    type Client = OpenAiClient;
    type Model = OpenAiModel;

    const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    fn create_with_options(
        api_key: Option<String>,
        base_url: String,
        model_options: ModelOptions<OpenAiModel>,
        transport_options: TransportOptions,
    ) -> Result<Self::Client, ClientError> {
        let api_key = require_api_key(ProviderKind::OpenAi, api_key)?;
        Ok(OpenAiClient::new(
            "openai",
            Some(api_key),
            base_url,
            model_options,
            transport_options,
        ))
    }
}
