use financial_query_router::{
    agent::Orchestrator,
    api::start_server,
    classifier::{LlmClassifier, QueryClassifier},
    config::Settings,
    llm::{HttpModelClient, ModelClient},
    protocol::{StdioToolClient, ToolTransport},
    resolver::EntityResolver,
    suggest::SuggestionGenerator,
    tools::ToolRegistry,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;

    info!("🚀 Financial Query Router - API Server");
    info!("📍 Port: {}", settings.port);

    // Tool server
    let client = Arc::new(StdioToolClient::new(
        settings.tool_server_command.clone(),
        settings.tool_server_args.clone(),
        settings.tool_timeout,
    ));
    client.connect().await?;
    let transport: Arc<dyn ToolTransport> = client.clone();

    // Discover eagerly; an empty listing is retried lazily on first request
    let registry = Arc::new(ToolRegistry::new());
    if let Err(e) = registry.ensure_discovered(transport.as_ref()).await {
        warn!(code = e.code(), error = %e, "Tool discovery failed at startup");
    }

    // Model endpoint
    let model: Option<Arc<dyn ModelClient>> = if settings.classifier_llm_enabled {
        let client = HttpModelClient::new(
            &settings.model_endpoint,
            &settings.model_name,
            settings.model_timeout,
        )?;
        info!(endpoint = %settings.model_endpoint, model = %settings.model_name, "Model classifier enabled");
        Some(Arc::new(client))
    } else {
        info!("Model classifier disabled; using rules only");
        None
    };

    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        transport,
        QueryClassifier::new(model.clone().map(LlmClassifier::new)),
        EntityResolver::default(),
        SuggestionGenerator::new(model),
    ));

    info!("✅ Orchestrator initialized");
    info!("📡 Starting API server...");

    let served = start_server(orchestrator, settings.port).await;
    client.disconnect().await;
    served
}
