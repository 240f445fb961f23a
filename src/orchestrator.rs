//! Analysis orchestrator — profile → per-ticker fan-out → portfolio fan-in
//!
//! AwaitingProfile → AnalyzingTickers → SynthesizingPortfolio → Complete,
//! with Failed reachable from any non-terminal stage. The orchestrator never
//! retries the pipeline itself; transient-failure retries are entirely the
//! provider decorator's business.

use crate::config::AdvisorConfig;
use crate::error::AdvisorError;
use crate::models::{
    AdvisorReport, InvestmentHorizon, PortfolioAllocation, PreferenceContext, RiskTolerance,
    TickerAnalysis,
};
use crate::prompts;
use crate::provider::{CompletionProvider, CompletionRequest};
use crate::schema;
use crate::Result;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

const PROFILE_FIELDS: &[&str] = &["risk_tolerance", "investment_horizon"];

const ANALYSIS_FIELDS: &[&str] = &[
    "financial_health",
    "growth_potential",
    "competitive_position",
    "management_quality",
    "overall_score",
    "key_strengths",
    "key_risks",
    "recommendation",
];

// "portfolio" is the wire name for the holdings list.
const PORTFOLIO_FIELDS: &[&str] = &[
    "portfolio",
    "expected_return",
    "risk_score",
    "diversification_score",
    "sector_allocation",
    "key_risks",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AwaitingProfile,
    AnalyzingTickers,
    SynthesizingPortfolio,
    Complete,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::AwaitingProfile => "awaiting_profile",
            Stage::AnalyzingTickers => "analyzing_tickers",
            Stage::SynthesizingPortfolio => "synthesizing_portfolio",
            Stage::Complete => "complete",
            Stage::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

pub struct Orchestrator {
    provider: Arc<dyn CompletionProvider>,
    max_tokens: u32,
    temperature: f32,
    max_tickers: usize,
    analysis_workers: usize,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn CompletionProvider>, config: &AdvisorConfig) -> Self {
        Self {
            provider,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_tickers: config.max_tickers,
            analysis_workers: config.analysis_workers.max(1),
        }
    }

    fn request(&self, pair: prompts::PromptPair) -> CompletionRequest {
        CompletionRequest::new(pair.system, pair.user)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .force_json()
    }

    /// Profile stage: turn three raw preferences into the canonical profile
    /// object via one model call, alias-normalized and validated.
    pub async fn generate_profile(
        &self,
        risk: RiskTolerance,
        horizon: InvestmentHorizon,
        sectors: &[String],
    ) -> Result<PreferenceContext> {
        info!(%risk, %horizon, "Generating investment profile");

        let raw = self
            .provider
            .complete(&self.request(prompts::profile(risk, horizon, sectors)))
            .await?;

        let mut map = schema::parse_or_extract(self.provider.as_ref(), &raw, PROFILE_FIELDS).await?;
        schema::normalize_sector_alias(&mut map);

        if !map.contains_key("sectors") {
            return Err(AdvisorError::SchemaViolation {
                missing: vec!["sectors".to_string()],
                raw,
            });
        }

        let profile: PreferenceContext = serde_json::from_value(Value::Object(map))?;
        if profile.sectors.is_empty() {
            return Err(AdvisorError::IncompletePreferences(
                "profile has an empty sector list".to_string(),
            ));
        }

        Ok(profile)
    }

    /// Fan-out stage: one independent analysis call per ticker through a
    /// bounded worker pool. Fail-fast — the first unrecoverable failure
    /// aborts the remaining calls.
    pub async fn analyze_tickers(
        &self,
        context: &PreferenceContext,
        tickers: &[String],
    ) -> Result<HashMap<String, TickerAnalysis>> {
        if tickers.len() > self.max_tickers {
            warn!(
                requested = tickers.len(),
                cap = self.max_tickers,
                "Ticker batch capped"
            );
        }
        let batch = &tickers[..tickers.len().min(self.max_tickers)];

        let analyses: HashMap<String, TickerAnalysis> = stream::iter(
            batch
                .iter()
                .cloned()
                .map(|ticker| async move { self.analyze_one(context, &ticker).await }),
        )
        .buffer_unordered(self.analysis_workers)
        .try_collect()
        .await?;

        Ok(analyses)
    }

    async fn analyze_one(
        &self,
        context: &PreferenceContext,
        ticker: &str,
    ) -> Result<(String, TickerAnalysis)> {
        info!(%ticker, "Analyzing fundamentals");

        let raw = self
            .provider
            .complete(&self.request(prompts::fundamental_analysis(ticker, context)))
            .await?;

        let map = schema::parse_or_extract(self.provider.as_ref(), &raw, ANALYSIS_FIELDS).await?;
        let analysis: TickerAnalysis = serde_json::from_value(Value::Object(map))?;

        info!(%ticker, score = analysis.overall_score, recommendation = %analysis.recommendation, "Analysis complete");

        Ok((ticker.to_string(), analysis))
    }

    /// Fan-in stage: one synthesis call over every validated analysis.
    /// Weights come back exactly as the model produced them.
    pub async fn synthesize_portfolio(
        &self,
        context: &PreferenceContext,
        analyses: &HashMap<String, TickerAnalysis>,
    ) -> Result<PortfolioAllocation> {
        info!(analyses = analyses.len(), "Synthesizing portfolio allocation");

        let raw = self
            .provider
            .complete(&self.request(prompts::portfolio_synthesis(analyses, context)))
            .await?;

        let map = schema::parse_or_extract(self.provider.as_ref(), &raw, PORTFOLIO_FIELDS).await?;
        let portfolio: PortfolioAllocation = serde_json::from_value(Value::Object(map))?;

        Ok(portfolio)
    }

    /// Run the full pipeline from a completed preference context. An empty
    /// ticker list short-circuits synthesis: the report carries an empty
    /// analyses map and no portfolio.
    pub async fn run(
        &self,
        context: PreferenceContext,
        tickers: &[String],
    ) -> Result<AdvisorReport> {
        let mut stage = Stage::AwaitingProfile;
        self.advance(&mut stage, Stage::AnalyzingTickers);

        let analyses = match self.analyze_tickers(&context, tickers).await {
            Ok(analyses) => analyses,
            Err(e) => return Err(self.fail(&mut stage, e)),
        };

        let portfolio = if analyses.is_empty() {
            info!("No analyses produced; skipping portfolio synthesis");
            None
        } else {
            self.advance(&mut stage, Stage::SynthesizingPortfolio);
            match self.synthesize_portfolio(&context, &analyses).await {
                Ok(portfolio) => Some(portfolio),
                Err(e) => return Err(self.fail(&mut stage, e)),
            }
        };

        self.advance(&mut stage, Stage::Complete);

        Ok(AdvisorReport {
            profile: context,
            analyses,
            portfolio,
        })
    }

    fn advance(&self, stage: &mut Stage, next: Stage) {
        info!(from = %stage, to = %next, "Stage transition");
        *stage = next;
    }

    fn fail(&self, stage: &mut Stage, e: AdvisorError) -> AdvisorError {
        error!(at = %stage, error = %e, "Pipeline failed");
        *stage = Stage::Failed;
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Recommendation;
    use crate::provider::MockProvider;

    fn context() -> PreferenceContext {
        PreferenceContext {
            risk_tolerance: RiskTolerance::Moderate,
            investment_horizon: InvestmentHorizon::MediumTerm,
            sectors: vec!["technology".to_string(), "healthcare".to_string()],
        }
    }

    fn orchestrator(provider: Arc<MockProvider>) -> Orchestrator {
        Orchestrator::new(provider, &AdvisorConfig::default())
    }

    const ANALYSIS_JSON: &str = r#"{
        "financial_health": 0.8,
        "growth_potential": 0.7,
        "competitive_position": 0.9,
        "management_quality": 0.8,
        "overall_score": 0.8,
        "key_strengths": ["Strong balance sheet"],
        "key_risks": ["Regulatory pressure"],
        "recommendation": "buy"
    }"#;

    fn portfolio_json(tickers: &[&str]) -> String {
        let weight = 1.0 / tickers.len() as f64;
        let holdings: Vec<String> = tickers
            .iter()
            .enumerate()
            .map(|(i, t)| {
                // Slightly varied weights that still sum to 1.0.
                let tilt = (i as f64 - (tickers.len() as f64 - 1.0) / 2.0) * 0.01;
                format!(
                    r#"{{"ticker": "{}", "weight": {}, "rationale": "Scored well"}}"#,
                    t,
                    weight + tilt
                )
            })
            .collect();
        format!(
            r#"{{
                "portfolio": [{}],
                "expected_return": 0.11,
                "risk_score": 0.55,
                "diversification_score": 0.7,
                "sector_allocation": {{"technology": 0.6, "healthcare": 0.4}},
                "key_risks": ["Rate hikes"]
            }}"#,
            holdings.join(",")
        )
    }

    #[tokio::test]
    async fn test_empty_ticker_list_skips_synthesis() {
        let provider = Arc::new(MockProvider::always(ANALYSIS_JSON));
        let report = orchestrator(provider.clone())
            .run(context(), &[])
            .await
            .unwrap();

        assert!(report.analyses.is_empty());
        assert!(report.portfolio.is_none());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_five_ticker_round_trip() {
        let tickers: Vec<String> = ["AAPL", "MSFT", "GOOGL", "AMZN", "META"]
            .iter()
            .map(|t| t.to_string())
            .collect();

        let mut script: Vec<&str> = vec![ANALYSIS_JSON; 5];
        let portfolio = portfolio_json(&["AAPL", "MSFT", "GOOGL", "AMZN", "META"]);
        script.push(&portfolio);

        let provider = Arc::new(MockProvider::with_responses(script));
        let report = orchestrator(provider.clone())
            .run(context(), &tickers)
            .await
            .unwrap();

        assert_eq!(report.analyses.len(), 5);
        assert_eq!(
            report.analyses["AAPL"].recommendation,
            Recommendation::Buy
        );

        let allocation = report.portfolio.unwrap();
        assert_eq!(allocation.holdings.len(), 5);

        let total: f64 = allocation.holdings.iter().map(|h| h.weight).sum();
        assert!((total - 1.0).abs() < 1e-6, "weights sum to {}", total);

        // 5 analyses + 1 synthesis, no extraction fallbacks.
        assert_eq!(provider.call_count(), 6);
    }

    #[tokio::test]
    async fn test_ticker_batch_is_capped() {
        let tickers: Vec<String> = (0..40).map(|i| format!("TICK{}", i)).collect();

        let provider = Arc::new(MockProvider::always(ANALYSIS_JSON));
        let analyses = orchestrator(provider)
            .analyze_tickers(&context(), &tickers)
            .await
            .unwrap();

        assert_eq!(analyses.len(), 30);
    }

    #[tokio::test]
    async fn test_analysis_failure_is_fail_fast() {
        let tickers: Vec<String> = ["AAPL", "MSFT"].iter().map(|t| t.to_string()).collect();

        // Both scripted replies are unusable; the run must fail rather than
        // hand a partial analyses map to synthesis.
        let provider = Arc::new(MockProvider::with_responses(vec![
            "not json at all",
            "[]",
            "not json at all",
            "[]",
        ]));

        let err = orchestrator(provider)
            .run(context(), &tickers)
            .await
            .unwrap_err();

        assert!(matches!(err, AdvisorError::MalformedOutput { .. }));
    }

    #[tokio::test]
    async fn test_generate_profile_normalizes_alias() {
        let provider = Arc::new(MockProvider::with_responses(vec![
            r#"{
                "risk_tolerance": "moderate",
                "investment_horizon": "medium_term",
                "sector_preference": ["technology", "healthcare"]
            }"#,
        ]));

        let profile = orchestrator(provider)
            .generate_profile(
                RiskTolerance::Moderate,
                InvestmentHorizon::MediumTerm,
                &["technology".to_string(), "healthcare".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(
            profile.sectors,
            vec!["technology".to_string(), "healthcare".to_string()]
        );
    }

    #[tokio::test]
    async fn test_generate_profile_rejects_empty_sectors() {
        let provider = Arc::new(MockProvider::with_responses(vec![
            r#"{
                "risk_tolerance": "moderate",
                "investment_horizon": "medium_term",
                "sectors": []
            }"#,
        ]));

        let err = orchestrator(provider)
            .generate_profile(
                RiskTolerance::Moderate,
                InvestmentHorizon::MediumTerm,
                &["technology".to_string()],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AdvisorError::IncompletePreferences(_)));
    }

    #[tokio::test]
    async fn test_fenced_analysis_response_is_repaired() {
        let fenced = format!("```json\n{}\n```", ANALYSIS_JSON);
        let provider = Arc::new(MockProvider::with_responses(vec![&fenced]));

        let analyses = orchestrator(provider.clone())
            .analyze_tickers(&context(), &["AAPL".to_string()])
            .await
            .unwrap();

        assert_eq!(analyses["AAPL"].overall_score, 0.8);
        // Repaired locally, no extraction call needed.
        assert_eq!(provider.call_count(), 1);
    }
}
