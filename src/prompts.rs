//! Prompt templates for each pipeline stage
//!
//! Templates are data, not logic: pure functions from stage context to a
//! system/user prompt pair, with no branching beyond interpolation.

use crate::models::{InvestmentHorizon, PreferenceContext, RiskTolerance, TickerAnalysis};
use std::collections::HashMap;

/// Sentinel separating conversational text from the structured preferences
/// block in guided-chat replies.
pub const PREFERENCES_TAG: &str = "<preferences>";

#[derive(Debug, Clone)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Profile-generation stage: turn three known preferences into the
/// canonical profile object.
pub fn profile(
    risk: RiskTolerance,
    horizon: InvestmentHorizon,
    sectors: &[String],
) -> PromptPair {
    let system = format!(
        r#"You are a financial advisor assistant. Create an investment profile based on the following preferences:
- Risk tolerance: {}
- Investment horizon: {}
- Preferred sectors: {}

Return the profile as a JSON object with these exact fields:
{{
    "risk_tolerance": "{}",
    "investment_horizon": "{}",
    "sectors": [{}]
}}"#,
        risk,
        horizon,
        sectors.join(", "),
        risk,
        horizon,
        sectors
            .iter()
            .map(|s| format!("\"{}\"", s))
            .collect::<Vec<_>>()
            .join(", "),
    );

    PromptPair {
        system,
        user: "Create an investment profile.".to_string(),
    }
}

/// System prompt for the multi-turn preference-gathering chat. The model is
/// told to append its current understanding inside the sentinel block after
/// every reply, nulls included.
pub fn preference_chat_system() -> String {
    format!(
        r#"You are a financial advisor assistant. Your task is to help users determine their investment preferences.
You need to collect:
1. Risk tolerance (low, moderate, high)
2. Investment horizon (short_term, medium_term, long_term)
3. Preferred sectors (from: Technology, Healthcare, Financials, Energy, Consumer Discretionary, Consumer Staples, Industrials, Materials, Utilities, Real Estate, Communication Services)

Have a natural conversation with the user to collect these preferences. After EACH response, include a JSON object showing your current understanding of their preferences. Format your response like this:

[Your natural conversation response here]

{}
{{
    "risk_tolerance": "low/moderate/high or null if not yet determined",
    "investment_horizon": "short_term/medium_term/long_term or null if not yet determined",
    "sectors": ["sector1", "sector2", ...] or [] if not yet determined
}}
</preferences>

Keep the conversation natural, but always include the preferences JSON at the end of your response, even if some preferences are still null or empty."#,
        PREFERENCES_TAG
    )
}

/// Per-ticker fundamental-analysis stage.
pub fn fundamental_analysis(ticker: &str, context: &PreferenceContext) -> PromptPair {
    let system = r#"You are an expert fundamental analyst. Analyze the given stock based on:
1. Financial ratios (P/E, P/B, ROE, etc.)
2. Growth metrics (revenue growth, earnings growth)
3. Financial health (debt levels, cash flow)
4. Competitive position
5. Management quality

Return your analysis as a JSON object with the following structure:
{
    "financial_health": 0.0,
    "growth_potential": 0.0,
    "competitive_position": 0.0,
    "management_quality": 0.0,
    "overall_score": 0.0,
    "key_strengths": ["..."],
    "key_risks": ["..."],
    "recommendation": "buy" | "hold" | "sell"
}

All scores are floats from 0 to 1; overall_score is the weighted average of the other four."#
        .to_string();

    let user = format!(
        r#"Analyze {} based on fundamental factors.
Consider the following context:
- Risk tolerance: {}
- Investment horizon: {}
- Preferred sectors: {}"#,
        ticker,
        context.risk_tolerance,
        context.investment_horizon,
        context.sectors.join(", "),
    );

    PromptPair { system, user }
}

/// Portfolio-synthesis stage: fan-in over every validated analysis.
pub fn portfolio_synthesis(
    analyses: &HashMap<String, TickerAnalysis>,
    context: &PreferenceContext,
) -> PromptPair {
    let system = r#"You are an expert portfolio manager. Based on the analyses provided and user preferences, create an optimal portfolio allocation. You MUST return a valid JSON object, nothing else.

Prioritize including a diverse set of tickers, aiming for a portfolio of up to 30 stocks if sufficient analyses are provided. Ensure the weights assigned to each stock are varied based on your analysis, rather than being uniform.

Example of the required JSON structure:
{
    "portfolio": [
        {
            "ticker": "AAPL",
            "weight": 0.25,
            "rationale": "Strong financial health and growth"
        }
    ],
    "expected_return": 0.12,
    "risk_score": 0.6,
    "diversification_score": 0.8,
    "sector_allocation": {
        "technology": 0.75,
        "healthcare": 0.25
    },
    "key_risks": [
        "Supply chain disruptions",
        "Regulatory risks"
    ]
}

Important: Return ONLY the JSON object, no additional text or formatting."#
        .to_string();

    let analyses_json =
        serde_json::to_string_pretty(analyses).unwrap_or_else(|_| "{}".to_string());

    let user = format!(
        r#"Create a portfolio allocation based on the following:

User Preferences:
- Risk tolerance: {}
- Investment horizon: {}
- Preferred sectors: {}

Stock Analyses:
{}

Please create a diversified portfolio from the provided stocks. Aim to include between 20 and 30 stocks from the analyzed list, distributing the weights optimally. Ensure weights are not identical.

Remember: Return ONLY a valid JSON object matching the example structure above."#,
        context.risk_tolerance,
        context.investment_horizon,
        context.sectors.join(", "),
        analyses_json,
    );

    PromptPair { system, user }
}

/// Secondary repair stage: extract named fields as strict JSON from text
/// that failed local parsing.
pub fn extraction(required_fields: &[&str], raw: &str) -> PromptPair {
    let field_list = required_fields
        .iter()
        .map(|f| format!("\"{}\"", f))
        .collect::<Vec<_>>()
        .join(", ");

    let system = format!(
        r#"You are a JSON extraction assistant. Your task is to extract specific fields from the input text and return them as a JSON object.

Extract the following fields: {}

IMPORTANT:
- You MUST return a complete JSON object containing the fields above
- The response must start with {{ and end with }}
- Do not include any additional text or formatting
- Do not return an empty array or object"#,
        field_list
    );

    PromptPair {
        system,
        user: format!("Input text to analyze:\n{}", raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Recommendation;

    fn context() -> PreferenceContext {
        PreferenceContext {
            risk_tolerance: RiskTolerance::Moderate,
            investment_horizon: InvestmentHorizon::MediumTerm,
            sectors: vec!["technology".to_string(), "healthcare".to_string()],
        }
    }

    #[test]
    fn test_analysis_prompt_embeds_preferences() {
        let pair = fundamental_analysis("AAPL", &context());
        assert!(pair.user.contains("Analyze AAPL"));
        assert!(pair.user.contains("moderate"));
        assert!(pair.user.contains("medium_term"));
        assert!(pair.user.contains("technology, healthcare"));
        assert!(pair.system.contains("\"recommendation\""));
    }

    #[test]
    fn test_synthesis_prompt_embeds_analyses_json() {
        let mut analyses = HashMap::new();
        analyses.insert(
            "MSFT".to_string(),
            TickerAnalysis {
                financial_health: 0.9,
                growth_potential: 0.8,
                competitive_position: 0.9,
                management_quality: 0.85,
                overall_score: 0.86,
                key_strengths: vec!["Cloud growth".to_string()],
                key_risks: vec!["Valuation".to_string()],
                recommendation: Recommendation::Buy,
            },
        );

        let pair = portfolio_synthesis(&analyses, &context());
        assert!(pair.user.contains("MSFT"));
        assert!(pair.user.contains("Cloud growth"));
        assert!(pair.system.contains("rather than being uniform"));
    }

    #[test]
    fn test_chat_system_prompt_carries_sentinel() {
        let system = preference_chat_system();
        assert!(system.contains(PREFERENCES_TAG));
        assert!(system.contains("null if not yet determined"));
    }

    #[test]
    fn test_extraction_prompt_names_fields() {
        let pair = extraction(&["risk_tolerance", "sectors"], "some prose");
        assert!(pair.system.contains("\"risk_tolerance\", \"sectors\""));
        assert!(pair.user.contains("some prose"));
    }
}
