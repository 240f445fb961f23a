use bionic_advisor::{
    api::{start_server, ApiState},
    config::AdvisorConfig,
    orchestrator::Orchestrator,
    provider::{AzureOpenAiClient, CompletionProvider},
    retry::{RetryPolicy, RetryingProvider},
    session::SessionStore,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config = AdvisorConfig::from_env()?;

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Bionic Advisor - API Server");
    info!("Port: {}", api_port);

    let provider: Arc<dyn CompletionProvider> = Arc::new(RetryingProvider::new(
        AzureOpenAiClient::new(&config),
        RetryPolicy::new(config.max_retries, config.retry_base_delay),
    ));

    let state = ApiState {
        orchestrator: Arc::new(Orchestrator::new(provider.clone(), &config)),
        provider,
        sessions: Arc::new(SessionStore::new()),
    };

    info!("Advisor initialized, starting API server");

    start_server(state, api_port).await?;

    Ok(())
}
