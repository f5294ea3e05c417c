//! LLM provider selection, configuration and construction.
//!
//! Exactly one provider is active per [`ProviderState`]. Its configuration is
//! resolved from the environment (or any lookup function), validated, and
//! handed to [`ProviderFactory`], which builds the matching adapter.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde_with::skip_serializing_none;
use tokio::sync::OnceCell;
use tracing::info;

use crate::client::{Client, ClientError};
use crate::options::{ModelOptions, TransportOptions};

pub mod anthropic;
pub mod custom;
pub mod gemini;
pub mod ollama;
pub mod openai;

pub use anthropic::{Anthropic, AnthropicClient, AnthropicModel};
pub use custom::{Custom, CustomClient, CustomModel};
pub use gemini::{Gemini, GeminiClient, GeminiModel};
pub use ollama::{Ollama, OllamaClient, OllamaModel};
pub use openai::{OpenAi, OpenAiClient, OpenAiModel};

/// Trait for LLM providers that can create configured clients.
pub trait Provider {
    /// The client type produced by this provider.
    type Client: Client + 'static;

    /// Vendor-specific model options.
    type Model: Default;

    /// Endpoint used when the configuration does not name one.
    const DEFAULT_BASE_URL: &'static str;

    /// Create a client against the default endpoint.
    fn create(api_key: Option<String>, model: String) -> Result<Self::Client, ClientError> {
        Self::create_with_options(
            api_key,
            Self::DEFAULT_BASE_URL.to_string(),
            ModelOptions::new(model),
            TransportOptions::default(),
        )
    }

    /// Create a client with custom options.
    fn create_with_options(
        api_key: Option<String>,
        base_url: String,
        model_options: ModelOptions<Self::Model>,
        transport_options: TransportOptions,
    ) -> Result<Self::Client, ClientError>;
}

pub(crate) fn require_api_key(
    kind: ProviderKind,
    api_key: Option<String>,
) -> Result<String, ClientError> {
    api_key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ClientError::Config(format!("API key is required for provider: {}", kind)))
}

/// The closed set of supported vendors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Claude,
    Gemini,
    Ollama,
    /// Any OpenAI-compatible endpoint.
    Custom,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Custom => "custom",
        }
    }

    /// Whether the vendor can be reached without a credential.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }

    fn env(&self) -> EnvKeys {
        match self {
            ProviderKind::OpenAi => EnvKeys {
                api_key: Some("OPENAI_API_KEY"),
                base_url: None,
                default_base_url: Some(OpenAi::DEFAULT_BASE_URL),
                model: "OPENAI_MODEL",
                default_model: Some("gpt-4o-mini"),
            },
            ProviderKind::Claude => EnvKeys {
                api_key: Some("ANTHROPIC_API_KEY"),
                base_url: None,
                default_base_url: Some(Anthropic::DEFAULT_BASE_URL),
                model: "ANTHROPIC_MODEL",
                default_model: Some("claude-3-5-sonnet-20241022"),
            },
            ProviderKind::Gemini => EnvKeys {
                api_key: Some("GOOGLE_API_KEY"),
                base_url: None,
                default_base_url: Some(Gemini::DEFAULT_BASE_URL),
                model: "GEMINI_MODEL",
                default_model: Some("gemini-1.5-pro"),
            },
            ProviderKind::Ollama => EnvKeys {
                api_key: None,
                base_url: Some("OLLAMA_BASE_URL"),
                default_base_url: Some(Ollama::DEFAULT_BASE_URL),
                model: "OLLAMA_MODEL",
                default_model: Some("llama3.1:8b"),
            },
            ProviderKind::Custom => EnvKeys {
                api_key: Some("CUSTOM_API_KEY"),
                base_url: Some("CUSTOM_BASE_URL"),
                default_base_url: None,
                model: "CUSTOM_MODEL",
                default_model: None,
            },
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "claude" => Ok(ProviderKind::Claude),
            "gemini" => Ok(ProviderKind::Gemini),
            "ollama" => Ok(ProviderKind::Ollama),
            "custom" => Ok(ProviderKind::Custom),
            other => Err(ClientError::Config(format!("Unknown provider: {}", other))),
        }
    }
}

/// Environment variable names for one vendor.
struct EnvKeys {
    api_key: Option<&'static str>,
    base_url: Option<&'static str>,
    default_base_url: Option<&'static str>,
    model: &'static str,
    default_model: Option<&'static str>,
}

/// Environment variable selecting the vendor.
pub const PROVIDER_ENV: &str = "LLM_PROVIDER";

/// Resolved configuration of the active provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl ProviderConfig {
    /// Resolve the configuration from the process environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the configuration from an arbitrary key lookup.
    ///
    /// Empty values count as unset. The vendor defaults to `openai`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let kind = match get(PROVIDER_ENV) {
            Some(name) => name.parse()?,
            None => ProviderKind::OpenAi,
        };
        let keys = kind.env();

        let api_key = keys.api_key.and_then(get);
        let base_url = keys
            .base_url
            .and_then(get)
            .or_else(|| keys.default_base_url.map(str::to_string));
        let model = get(keys.model).or_else(|| keys.default_model.map(str::to_string));

        let api_key = if kind.requires_api_key() {
            Some(require_api_key(kind, api_key)?)
        } else {
            api_key
        };
        let base_url = base_url.ok_or_else(|| {
            ClientError::Config(format!("Base URL is required for provider: {}", kind))
        })?;
        let model = model.ok_or_else(|| {
            ClientError::Config(format!("Model is required for provider: {}", kind))
        })?;

        Ok(Self {
            kind,
            api_key,
            base_url,
            model,
        })
    }

    pub fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider: self.kind.to_string(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

/// Builds the adapter matching a [`ProviderConfig`].
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create(config: &ProviderConfig) -> Result<Arc<dyn Client>, ClientError> {
        Self::create_with_transport(config, TransportOptions::default())
    }

    pub fn create_with_transport(
        config: &ProviderConfig,
        transport: TransportOptions,
    ) -> Result<Arc<dyn Client>, ClientError> {
        fn build<P: Provider>(
            config: &ProviderConfig,
            transport: TransportOptions,
        ) -> Result<Arc<dyn Client>, ClientError> {
            let client = P::create_with_options(
                config.api_key.clone(),
                config.base_url.clone(),
                ModelOptions::new(config.model.clone()),
                transport,
            )?;
            Ok(Arc::new(client))
        }

        match config.kind {
            ProviderKind::OpenAi => build::<OpenAi>(config, transport),
            ProviderKind::Claude => build::<Anthropic>(config, transport),
            ProviderKind::Gemini => build::<Gemini>(config, transport),
            ProviderKind::Ollama => build::<Ollama>(config, transport),
            ProviderKind::Custom => build::<Custom>(config, transport),
        }
    }
}

/// Display fields of a provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub provider: String,
    pub model: String,
    #[serde(rename = "baseURL")]
    pub base_url: String,
}

/// Read-only status snapshot for display.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub provider: String,
    pub model: String,
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub connected: bool,
    pub error: Option<String>,
}

impl ProviderStatus {
    /// Status of a configuration resolution attempt; never fails.
    pub fn from_config(config: Result<&ProviderConfig, &ClientError>) -> Self {
        match config {
            Ok(config) => Self::connected(config.info()),
            Err(e) => Self::disconnected(e.to_string()),
        }
    }

    /// Resolve the configuration from the environment and report on it.
    pub fn from_env() -> Self {
        Self::from_config(ProviderConfig::from_env().as_ref())
    }

    fn connected(info: ProviderInfo) -> Self {
        Self {
            provider: info.provider,
            model: info.model,
            base_url: info.base_url,
            connected: true,
            error: None,
        }
    }

    fn disconnected(error: String) -> Self {
        Self {
            provider: "unknown".to_string(),
            model: "unknown".to_string(),
            base_url: "unknown".to_string(),
            connected: false,
            error: Some(error),
        }
    }
}

struct ActiveProvider {
    client: Arc<dyn Client>,
    info: ProviderInfo,
}

/// Holds the single active provider adapter.
///
/// Initialization happens at most once; concurrent first calls are
/// serialized and later calls return the adapter already built.
#[derive(Default)]
pub struct ProviderState {
    active: OnceCell<ActiveProvider>,
    transport: TransportOptions,
}

impl ProviderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(transport: TransportOptions) -> Self {
        Self {
            active: OnceCell::new(),
            transport,
        }
    }

    /// Build the adapter for `config` unless one is already active.
    pub async fn init(&self, config: &ProviderConfig) -> Result<Arc<dyn Client>, ClientError> {
        let active = self
            .active
            .get_or_try_init(|| async {
                let client = ProviderFactory::create_with_transport(config, self.transport.clone())?;
                info!(
                    "Using LLM provider: {}, model: {}",
                    config.kind, config.model
                );
                Ok::<_, ClientError>(ActiveProvider {
                    client,
                    info: config.info(),
                })
            })
            .await?;
        Ok(Arc::clone(&active.client))
    }

    /// Resolve the configuration from the environment and initialize.
    pub async fn init_from_env(&self) -> Result<Arc<dyn Client>, ClientError> {
        if let Some(client) = self.client() {
            return Ok(client);
        }
        self.init(&ProviderConfig::from_env()?).await
    }

    pub fn client(&self) -> Option<Arc<dyn Client>> {
        self.active.get().map(|a| Arc::clone(&a.client))
    }

    pub fn is_connected(&self) -> bool {
        self.active.initialized()
    }

    /// Snapshot of the active provider; never fails.
    pub fn status(&self) -> ProviderStatus {
        match self.active.get() {
            Some(active) => ProviderStatus::connected(active.info.clone()),
            None => ProviderStatus::disconnected("provider not initialized".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_openai_with_default_model() {
        let config = ProviderConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.kind, ProviderKind::OpenAi);
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.model, "gpt-4o-mini");
    }

    #[test]
    fn ollama_needs_no_key_and_honours_base_url() {
        let config = ProviderConfig::from_lookup(lookup(&[
            ("LLM_PROVIDER", "ollama"),
            ("OLLAMA_BASE_URL", "http://gpu-box:11434"),
        ]))
        .unwrap();
        assert_eq!(config.api_key, None);
        assert_eq!(config.base_url, "http://gpu-box:11434");
        assert_eq!(config.model, "llama3.1:8b");
    }

    #[test]
    fn missing_credential_is_a_config_error() {
        let err = ProviderConfig::from_lookup(lookup(&[("LLM_PROVIDER", "claude")])).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("API key is required for provider: claude"));
    }

    #[test]
    fn custom_requires_endpoint_and_model() {
        let err = ProviderConfig::from_lookup(lookup(&[
            ("LLM_PROVIDER", "custom"),
            ("CUSTOM_API_KEY", "k"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("Base URL is required"));

        let err = ProviderConfig::from_lookup(lookup(&[
            ("LLM_PROVIDER", "custom"),
            ("CUSTOM_API_KEY", "k"),
            ("CUSTOM_BASE_URL", "http://localhost:8000/v1"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("Model is required"));
    }

    #[test]
    fn unknown_vendor_is_rejected() {
        let err = ProviderConfig::from_lookup(lookup(&[("LLM_PROVIDER", "mystery")])).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("Unknown provider: mystery"));
    }

    #[test]
    fn debug_output_redacts_credential() {
        let config = ProviderConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-secret")])).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn status_captures_failures() {
        let err = ProviderConfig::from_lookup(lookup(&[("LLM_PROVIDER", "gemini")])).unwrap_err();
        let status = ProviderStatus::from_config(Err(&err));
        assert!(!status.connected);
        assert_eq!(status.provider, "unknown");
        assert!(status.error.unwrap().contains("gemini"));
    }

    #[test]
    fn status_serializes_base_url_key() {
        let config = ProviderConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "k")])).unwrap();
        let value = serde_json::to_value(ProviderStatus::from_config(Ok(&config))).unwrap();
        assert_eq!(value["baseURL"], "https://api.openai.com/v1");
        assert_eq!(value["connected"], true);
        assert!(value.get("error").is_none());
    }
}
