use std::sync::Arc;

use mcphost::model::ChatMessage;
use mcphost::providers::ProviderState;
use mcphost::registry::ToolRegistry;
use mcphost::transport::Manifest;
use mcphost::Orchestrator;

/// Usage: `cargo run --example chat -- servers.json "What's the weather in Paris?" [server...]`
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let manifest_path = args.next().ok_or("missing manifest path")?;
    let question = args.next().ok_or("missing question")?;
    let enabled: Vec<String> = args.collect();

    let manifest = Manifest::load(&manifest_path)?;
    for server in manifest.server_catalog() {
        println!("server: {} ({})", server.display_name, server.server_name);
    }

    let registry = Arc::new(ToolRegistry::new());
    registry.init(&manifest.servers).await?;

    let providers = ProviderState::new();
    let client = providers.init_from_env().await?;
    println!("{}", serde_json::to_string_pretty(&providers.status())?);

    let orchestrator = Orchestrator::new(client, registry.clone());
    let result = orchestrator
        .process_query(vec![ChatMessage::user(question)], &enabled)
        .await;

    registry.disconnect().await;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}
