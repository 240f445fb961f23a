use bionic_advisor::{
    config::AdvisorConfig,
    models::{InvestmentHorizon, RiskTolerance},
    orchestrator::Orchestrator,
    provider::AzureOpenAiClient,
    retry::{RetryPolicy, RetryingProvider},
    universe::StockUniverse,
};
use std::sync::Arc;
use tracing::info;

const SAMPLE_TICKERS: [&str; 5] = ["AAPL", "MSFT", "GOOGL", "AMZN", "META"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config = AdvisorConfig::from_env()?;

    info!("Bionic Advisor starting");

    let provider = Arc::new(RetryingProvider::new(
        AzureOpenAiClient::new(&config),
        RetryPolicy::new(config.max_retries, config.retry_base_delay),
    ));
    let orchestrator = Orchestrator::new(provider, &config);

    // Gather the investment profile.
    info!("Generating investment profile");
    let sectors = vec!["technology".to_string(), "healthcare".to_string()];
    let profile = orchestrator
        .generate_profile(
            RiskTolerance::Moderate,
            InvestmentHorizon::MediumTerm,
            &sectors,
        )
        .await?;

    println!("\n=== INVESTMENT PROFILE ===");
    println!("{}", serde_json::to_string_pretty(&profile)?);

    // Ticker universe: metadata file filtered by sector when available,
    // otherwise the sample list.
    let tickers = match std::env::var("STOCK_METADATA_CSV") {
        Ok(path) => {
            let universe = StockUniverse::from_csv_path(&path)?;
            universe.filter_by_sectors(&profile.sectors)
        }
        Err(_) => SAMPLE_TICKERS.iter().map(|t| t.to_string()).collect(),
    };

    info!(tickers = tickers.len(), "Running analysis pipeline");

    match orchestrator.run(profile, &tickers).await {
        Ok(report) => {
            println!("\n=== STOCK ANALYSES ===");
            println!("{}", serde_json::to_string_pretty(&report.analyses)?);

            println!("\n=== PORTFOLIO RECOMMENDATION ===");
            match &report.portfolio {
                Some(portfolio) => println!("{}", serde_json::to_string_pretty(portfolio)?),
                None => println!("(no tickers analyzed, no portfolio produced)"),
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Advisory run failed: {}", e);
            if let Some(raw) = e.raw_output() {
                eprintln!("Offending model output:\n{}", raw);
            }
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
