//! Any OpenAI-compatible endpoint, e.g. a self-hosted gateway.

use serde::{Deserialize, Serialize};

use crate::api::openai::{OpenAiCompatibleClient, OpenAiCompatibleModel};
use crate::client::ClientError;
use crate::options::{ModelOptions, TransportOptions};
use crate::providers::Provider;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CustomModel;

impl OpenAiCompatibleModel for CustomModel {}

pub type CustomClient = OpenAiCompatibleClient<CustomModel>;

pub struct Custom;

impl Provider for Custom {
    type Client = CustomClient;
    type Model = CustomModel;

    // Only used by `Provider::create`; environment configuration must name an endpoint.
    const DEFAULT_BASE_URL: &'static str = "http://localhost:8000/v1";

    fn create_with_options(
        api_key: Option<String>,
        base_url: String,
        model_options: ModelOptions<CustomModel>,
        transport_options: TransportOptions,
    ) -> Result<Self::Client, ClientError> {
        Ok(CustomClient::new(
            "custom",
            api_key.filter(|k| !k.is_empty()),
            base_url,
            model_options,
            transport_options,
        ))
    }
}
