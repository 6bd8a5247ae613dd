use financial_query_router::{
    agent::Orchestrator,
    classifier::{LlmClassifier, QueryClassifier},
    config::Settings,
    llm::{HttpModelClient, ModelClient},
    protocol::{StdioToolClient, ToolTransport},
    resolver::EntityResolver,
    suggest::SuggestionGenerator,
    tools::ToolRegistry,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// One-shot: `router <query...>` prints the analysis result as JSON
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        eprintln!("usage: router <question>");
        eprintln!("example: router \"What is Apple trading at?\"");
        std::process::exit(2);
    }

    let settings = Settings::from_env()?;

    let client = Arc::new(StdioToolClient::new(
        settings.tool_server_command.clone(),
        settings.tool_server_args.clone(),
        settings.tool_timeout,
    ));
    client.connect().await?;
    let transport: Arc<dyn ToolTransport> = client.clone();

    let model: Option<Arc<dyn ModelClient>> = if settings.classifier_llm_enabled {
        Some(Arc::new(HttpModelClient::new(
            &settings.model_endpoint,
            &settings.model_name,
            settings.model_timeout,
        )?))
    } else {
        None
    };

    let orchestrator = Orchestrator::new(
        Arc::new(ToolRegistry::new()),
        transport,
        QueryClassifier::new(model.clone().map(LlmClassifier::new)),
        EntityResolver::default(),
        SuggestionGenerator::new(model),
    );

    info!(query = %query, "Running query");
    let result = orchestrator.analyze(&query).await;
    client.disconnect().await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.is_error() {
        std::process::exit(1);
    }
    Ok(())
}
