//! HTTP plumbing shared by the provider adapters.

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::client::ClientError;
use crate::options::TransportOptions;

/// Build a configured HTTP client from transport options.
pub fn build_http_client(transport_options: &TransportOptions) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    match transport_options {
        TransportOptions::Http { timeout, proxy, .. } => {
            if let Some(t) = timeout {
                builder = builder.timeout(*t);
            }
            if let Some(proxy_url) = proxy {
                match reqwest::Proxy::all(proxy_url) {
                    Ok(p) => builder = builder.proxy(p),
                    Err(e) => warn!("Ignoring invalid proxy {}: {}", proxy_url, e),
                }
            }
        }
    }

    builder.build()
}

/// Join a base endpoint and a path without doubling the separator.
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Send a prepared request and fail on any non-2xx status.
///
/// The error carries the status code and the raw response body.
pub async fn send_checked(provider: &str, request: RequestBuilder) -> Result<Response, ClientError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    debug!("{} error response ({}): {}", provider, status, body);
    Err(ClientError::Api {
        provider: provider.to_string(),
        status: status.as_u16(),
        body,
    })
}

pub trait RequestBuilderExt {
    /// Attach the caller-supplied headers from the transport options.
    fn extra_headers(self, transport_options: &TransportOptions) -> Self;

    /// Set a JSON body, logging it at debug level.
    fn json_logged<T: Serialize + ?Sized>(self, json: &T) -> Self;
}

impl RequestBuilderExt for RequestBuilder {
    fn extra_headers(self, transport_options: &TransportOptions) -> Self {
        let TransportOptions::Http { headers, .. } = transport_options;
        headers
            .iter()
            .flatten()
            .fold(self, |req, (key, value)| req.header(key, value))
    }

    fn json_logged<T: Serialize + ?Sized>(self, json: &T) -> Self {
        if let Ok(body) = serde_json::to_string_pretty(json) {
            debug!("API request body ({} bytes):\n{}", body.len(), body);
        }
        self.json(json)
    }
}

#[async_trait::async_trait]
pub trait ResponseExt {
    /// Read the body as JSON, logging the raw text at debug level.
    async fn json_logged<T: DeserializeOwned>(self) -> Result<T, ClientError>;
}

#[async_trait::async_trait]
impl ResponseExt for Response {
    async fn json_logged<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        let bytes = self.bytes().await?;
        debug!(
            "API response ({} bytes):\n{}",
            bytes.len(),
            String::from_utf8_lossy(&bytes)
        );
        Ok(serde_json::from_slice(&bytes)?)
    }
}
