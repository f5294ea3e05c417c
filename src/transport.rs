//! Connections to tool servers over stdio, SSE, or streamable HTTP.
//!
//! A [`ServerConfig`] entry names exactly one way to reach a server: a `url`
//! for the HTTP based transports, or a `scriptPath` / `npxCommand` for a
//! local child process speaking over stdio.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use itertools::Itertools;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::transport::sse_client::SseClientConfig;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{
    ConfigureCommandExt, SseClientTransport, StreamableHttpClientTransport, TokioChildProcess,
};
use rmcp::ServiceExt;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use tokio::process::Command;
use tracing::{debug, info};

use crate::mcp::{McpConnection, McpError, ToolServer};

/// Upper bound on establishing one server connection unless overridden.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Wire mechanism used to reach a tool server.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    #[serde(rename = "stdio")]
    Stdio,
    #[serde(rename = "sse")]
    Sse,
    #[serde(rename = "streamable-http")]
    StreamableHttp,
}

/// One entry of the server manifest.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<TransportKind>,
    pub url: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub script_path: Option<String>,
    pub npx_command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ServerConfig {
    /// Effective transport: the explicit `type`, else streamable HTTP when a
    /// URL is given, else stdio.
    pub fn transport_kind(&self) -> TransportKind {
        match (self.kind, &self.url) {
            (Some(kind), _) => kind,
            (None, Some(_)) => TransportKind::StreamableHttp,
            (None, None) => TransportKind::Stdio,
        }
    }

    /// Check that exactly one connection-defining field is set and that it
    /// fits the transport.
    pub fn validate(&self) -> Result<(), McpError> {
        if self.name.trim().is_empty() {
            return Err(McpError::Config("server entry without a name".to_string()));
        }

        let defined = [
            self.url.is_some(),
            self.script_path.is_some(),
            self.npx_command.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count();
        if defined > 1 {
            return Err(McpError::Config(format!(
                "Server config for '{}' must set only one of url, scriptPath or npxCommand",
                self.name
            )));
        }

        match self.transport_kind() {
            TransportKind::StreamableHttp if self.url.is_none() => Err(McpError::Config(format!(
                "Server config for '{}' with streamable-http type must have a url",
                self.name
            ))),
            TransportKind::Sse if self.url.is_none() => Err(McpError::Config(format!(
                "Server config for '{}' with SSE type must have a url",
                self.name
            ))),
            TransportKind::Stdio if defined == 0 || self.url.is_some() => Err(self.no_endpoint()),
            _ => Ok(()),
        }
    }

    fn no_endpoint(&self) -> McpError {
        McpError::Config(format!(
            "Server config for '{}' must have either scriptPath, npxCommand, or url",
            self.name
        ))
    }
}

/// The server manifest: `{ "servers": [ ... ] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub servers: Vec<ServerConfig>,
}

impl Manifest {
    pub fn from_json(json: &str) -> Result<Self, McpError> {
        serde_json::from_str(json)
            .map_err(|e| McpError::Config(format!("malformed server manifest: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, McpError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Identifier and display name of every configured server.
    pub fn server_catalog(&self) -> Vec<ServerInfo> {
        self.servers
            .iter()
            .map(|s| ServerInfo {
                server_name: s.name.clone(),
                display_name: display_name(&s.name),
            })
            .collect()
    }
}

/// A configured server as shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub server_name: String,
    pub display_name: String,
}

/// `"weather-server"` becomes `"Weather Server"`.
pub fn display_name(id: &str) -> String {
    id.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .join(" ")
}

/// Finds a working package runner (`npx`).
///
/// Candidates are probed in order by running them with `--version`; the
/// first one that exits successfully wins.
#[derive(Debug, Clone)]
pub struct RunnerLocator {
    runtime: Option<PathBuf>,
    candidates: Vec<PathBuf>,
}

impl RunnerLocator {
    /// Locate the JavaScript runtime on `PATH` and derive the standard
    /// candidate list from it.
    pub fn detect() -> Self {
        let runtime = which::which("node").ok();
        let mut candidates = vec![PathBuf::from("npx")];
        if let Some(dir) = runtime.as_deref().and_then(Path::parent) {
            candidates.push(dir.join("npx"));
            candidates.push(dir.join("npx.cmd"));
        }
        candidates.extend(
            [
                "/usr/local/bin/npx",
                "/opt/homebrew/bin/npx",
                r"C:\Program Files\nodejs\npx.cmd",
            ]
            .into_iter()
            .map(PathBuf::from),
        );
        Self {
            runtime,
            candidates,
        }
    }

    /// Probe exactly `candidates`, in order.
    pub fn with_candidates(runtime: Option<PathBuf>, candidates: Vec<PathBuf>) -> Self {
        Self {
            runtime,
            candidates,
        }
    }

    /// The runtime executable scripts without a `.py` suffix are run with.
    pub fn runtime(&self) -> PathBuf {
        self.runtime.clone().unwrap_or_else(|| PathBuf::from("node"))
    }

    /// Directory of the runtime executable, if it was found.
    pub fn runtime_dir(&self) -> Option<&Path> {
        self.runtime.as_deref().and_then(Path::parent)
    }

    pub async fn locate(&self) -> Result<PathBuf, McpError> {
        for candidate in &self.candidates {
            if probe(candidate).await {
                debug!("Found npx at: {}", candidate.display());
                return Ok(candidate.clone());
            }
            debug!("npx not usable at: {}", candidate.display());
        }
        Err(McpError::RunnerNotFound(
            "npx not found. Please ensure Node.js is properly installed with npm.".to_string(),
        ))
    }
}

impl Default for RunnerLocator {
    fn default() -> Self {
        Self::detect()
    }
}

async fn probe(candidate: &Path) -> bool {
    let is_bare = candidate.parent().map_or(true, |p| p.as_os_str().is_empty());
    if !is_bare && tokio::fs::metadata(candidate).await.is_err() {
        return false;
    }

    Command::new(candidate)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// A fully resolved child-process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Variables overlaid on the inherited parent environment.
    pub env: Vec<(String, OsString)>,
}

fn python_interpreter() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Opens connections to tool servers.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ServerConfig) -> Result<Arc<dyn ToolServer>, McpError>;
}

/// Default [`Connector`] backed by rmcp transports.
#[derive(Debug, Clone)]
pub struct TransportConnector {
    runner: RunnerLocator,
    connect_timeout: Duration,
}

impl Default for TransportConnector {
    fn default() -> Self {
        Self::new(RunnerLocator::detect())
    }
}

impl TransportConnector {
    pub fn new(runner: RunnerLocator) -> Self {
        Self {
            runner,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Work out the program, arguments and environment for a stdio server.
    pub async fn stdio_command(&self, config: &ServerConfig) -> Result<StdioCommand, McpError> {
        let mut env: Vec<(String, OsString)> = config
            .env
            .iter()
            .map(|(k, v)| (k.clone(), OsString::from(v)))
            .collect();

        if let Some(package) = &config.npx_command {
            let program = self.runner.locate().await.map_err(|e| {
                McpError::RunnerNotFound(format!(
                    "Failed to find npx for server '{}': {}",
                    config.name, e
                ))
            })?;
            let mut args = vec!["-y".to_string(), package.clone()];
            args.extend(config.args.iter().cloned());

            if let Some(dir) = self.runner.runtime_dir() {
                env.push(("PATH".to_string(), prepend_path(dir)?));
            }
            return Ok(StdioCommand { program, args, env });
        }

        if let Some(script) = &config.script_path {
            let program = if script.ends_with(".py") {
                PathBuf::from(python_interpreter())
            } else {
                self.runner.runtime()
            };
            let mut args = vec![script.clone()];
            args.extend(config.args.iter().cloned());
            return Ok(StdioCommand { program, args, env });
        }

        Err(config.no_endpoint())
    }

    async fn connect_stdio(
        &self,
        config: &ServerConfig,
    ) -> Result<rmcp::service::RunningService<rmcp::RoleClient, ()>, McpError> {
        let command = self.stdio_command(config).await?;
        info!(
            "Connecting to MCP server '{}' via STDIO ({})",
            config.name,
            command.program.display()
        );

        let transport = TokioChildProcess::new(Command::new(&command.program).configure(|cmd| {
            cmd.args(&command.args)
                .envs(command.env.iter().map(|(k, v)| (k, v)))
                .stderr(Stdio::inherit());
        }))
        .map_err(|e| McpError::Transport(format!("spawn '{}': {}", command.program.display(), e)))?;

        ().serve(transport)
            .await
            .map_err(|e| connection_failed(config, e))
    }

    async fn connect_sse(
        &self,
        config: &ServerConfig,
        url: &str,
    ) -> Result<rmcp::service::RunningService<rmcp::RoleClient, ()>, McpError> {
        info!(
            "Connecting to MCP server '{}' via SSE at {}{}",
            config.name,
            url,
            if config.headers.is_some() { " with auth headers" } else { "" }
        );

        let http_client = http_client_with_headers(config)?;
        let sse_config = SseClientConfig {
            sse_endpoint: url.to_string().into(),
            ..Default::default()
        };
        let transport = SseClientTransport::start_with_client(http_client, sse_config)
            .await
            .map_err(|e| McpError::Transport(format!("create SSE transport: {}", e)))?;

        ().serve(transport)
            .await
            .map_err(|e| connection_failed(config, e))
    }

    async fn connect_streamable(
        &self,
        config: &ServerConfig,
        url: &str,
    ) -> Result<rmcp::service::RunningService<rmcp::RoleClient, ()>, McpError> {
        info!(
            "Connecting to MCP server '{}' via Streamable HTTP at {}{}",
            config.name,
            url,
            if config.headers.is_some() { " with auth headers" } else { "" }
        );

        let http_client = http_client_with_headers(config)?;
        let transport = StreamableHttpClientTransport::with_client(
            http_client,
            StreamableHttpClientTransportConfig::with_uri(url.to_string()),
        );

        ().serve(transport)
            .await
            .map_err(|e| connection_failed(config, e))
    }
}

#[async_trait]
impl Connector for TransportConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<Arc<dyn ToolServer>, McpError> {
        config.validate()?;

        let connecting = async {
            match (config.transport_kind(), config.url.as_deref()) {
                (TransportKind::Sse, Some(url)) => self.connect_sse(config, url).await,
                (TransportKind::StreamableHttp, Some(url)) => {
                    self.connect_streamable(config, url).await
                }
                _ => self.connect_stdio(config).await,
            }
        };

        let service = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| McpError::Timeout {
                what: format!("connecting to MCP server '{}'", config.name),
                after: self.connect_timeout,
            })??;

        Ok(Arc::new(McpConnection::new(config.name.clone(), service)))
    }
}

fn connection_failed(config: &ServerConfig, error: impl std::fmt::Display) -> McpError {
    McpError::ConnectionFailed {
        server: config.name.clone(),
        reason: error.to_string(),
    }
}

/// HTTP client attaching the entry's custom headers to every request.
fn http_client_with_headers(config: &ServerConfig) -> Result<reqwest::Client, McpError> {
    let mut headers = HeaderMap::new();
    for (name, value) in config.headers.iter().flatten() {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            McpError::Config(format!("invalid header name '{}' for '{}': {}", name, config.name, e))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            McpError::Config(format!("invalid value for header '{}' on '{}': {}", name, config.name, e))
        })?;
        headers.insert(name, value);
    }

    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .map_err(|e| McpError::Transport(format!("build HTTP client: {}", e)))
}

/// The parent `PATH` with `dir` in front.
fn prepend_path(dir: &Path) -> Result<OsString, McpError> {
    let current = std::env::var_os("PATH").unwrap_or_default();
    let paths = std::iter::once(dir.to_path_buf()).chain(std::env::split_paths(&current));
    std::env::join_paths(paths).map_err(|e| McpError::Config(format!("cannot extend PATH: {}", e)))
}
