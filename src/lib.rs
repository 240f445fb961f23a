//! Bionic Advisor
//!
//! A conversational investment-advisory core that:
//! - Gathers risk preferences through a multi-turn guided chat
//! - Requests scored fundamental analyses of candidate securities from an LLM
//! - Asks the same model to synthesize a weighted portfolio allocation
//! - Treats every model response as untrusted text: validated, repaired,
//!   and only then chained into the next call
//!
//! PIPELINE:
//! CHAT → PREFERENCES → PER-TICKER ANALYSIS (fan-out) → PORTFOLIO (fan-in)

pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod provider;
pub mod retry;
pub mod schema;
pub mod session;
pub mod universe;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use orchestrator::{Orchestrator, Stage};
