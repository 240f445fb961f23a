//! Core data models for the advisory pipeline

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    #[serde(alias = "conservative")]
    Low,
    #[serde(alias = "medium")]
    Moderate,
    #[serde(alias = "aggressive")]
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentHorizon {
    ShortTerm,
    MediumTerm,
    LongTerm,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Buy,
    Hold,
    Sell,
}

//
// ================= Preferences =================
//

/// A complete investment profile. Immutable once built; required input to
/// every analysis and synthesis call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreferenceContext {
    pub risk_tolerance: RiskTolerance,
    pub investment_horizon: InvestmentHorizon,
    pub sectors: Vec<String>,
}

/// The evolving preference object owned by the conversation state machine.
///
/// The `sector_preference` alias covers models that report the field under
/// its older name; the rename happens once, at deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PartialPreferences {
    #[serde(default)]
    pub risk_tolerance: Option<RiskTolerance>,
    #[serde(default)]
    pub investment_horizon: Option<InvestmentHorizon>,
    #[serde(default, alias = "sector_preference")]
    pub sectors: Option<Vec<String>>,
}

impl PartialPreferences {
    /// Field-wise merge. An absent or empty incoming field never erases a
    /// previously captured value.
    pub fn merge(&mut self, incoming: PartialPreferences) {
        if let Some(risk) = incoming.risk_tolerance {
            self.risk_tolerance = Some(risk);
        }
        if let Some(horizon) = incoming.investment_horizon {
            self.investment_horizon = Some(horizon);
        }
        if let Some(sectors) = incoming.sectors {
            if !sectors.is_empty() {
                self.sectors = Some(sectors);
            }
        }
    }

    /// True when at least one field was captured.
    pub fn any_field(&self) -> bool {
        self.risk_tolerance.is_some()
            || self.investment_horizon.is_some()
            || self.sectors.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn is_complete(&self) -> bool {
        self.risk_tolerance.is_some()
            && self.investment_horizon.is_some()
            && self.sectors.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// Promote to an immutable context once all three fields are captured.
    pub fn into_complete(self) -> Option<PreferenceContext> {
        let sectors = self.sectors.filter(|s| !s.is_empty())?;
        Some(PreferenceContext {
            risk_tolerance: self.risk_tolerance?,
            investment_horizon: self.investment_horizon?,
            sectors,
        })
    }
}

//
// ================= Analysis =================
//

/// Model-produced fundamental analysis for one ticker. Never mutated after
/// validation; keyed by symbol in the analyses map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickerAnalysis {
    pub financial_health: f64,
    pub growth_potential: f64,
    pub competitive_position: f64,
    pub management_quality: f64,
    pub overall_score: f64,
    pub key_strengths: Vec<String>,
    pub key_risks: Vec<String>,
    pub recommendation: Recommendation,
}

//
// ================= Portfolio =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holding {
    pub ticker: String,
    pub weight: f64,
    pub rationale: String,
}

/// Model-produced portfolio allocation. Weights are intended to sum to 1.0
/// but this layer passes them through unvalidated; the per-stock cap the UI
/// mentions is advisory prompt text only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioAllocation {
    #[serde(alias = "portfolio")]
    pub holdings: Vec<Holding>,
    pub expected_return: f64,
    pub risk_score: f64,
    pub diversification_score: f64,
    pub sector_allocation: HashMap<String, f64>,
    pub key_risks: Vec<String>,
}

//
// ================= Final Result =================
//

/// The three JSON-serializable objects handed back to the rendering
/// collaborator. `portfolio` is None when no tickers were analyzed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorReport {
    pub profile: PreferenceContext,
    pub analyses: HashMap<String, TickerAnalysis>,
    pub portfolio: Option<PortfolioAllocation>,
}

impl fmt::Display for RiskTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskTolerance::Low => "low",
            RiskTolerance::Moderate => "moderate",
            RiskTolerance::High => "high",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for InvestmentHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvestmentHorizon::ShortTerm => "short_term",
            InvestmentHorizon::MediumTerm => "medium_term",
            InvestmentHorizon::LongTerm => "long_term",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::Buy => "buy",
            Recommendation::Hold => "hold",
            Recommendation::Sell => "sell",
        };
        write!(f, "{}", s)
    }
}
