//! REST API Server for the advisory core
//!
//! Exposes the conversation and the orchestration pipeline via HTTP.
//! Responses use a uniform envelope; provider failures and unparseable
//! model output map to different status codes so the caller can tell a
//! broken call from a broken answer.

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::AdvisorError;
use crate::models::PreferenceContext;
use crate::orchestrator::Orchestrator;
use crate::provider::CompletionProvider;
use crate::session::SessionStore;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct PortfolioRequest {
    /// Completed preferences supplied directly by the caller…
    pub preferences: Option<PreferenceContext>,
    /// …or the id of a chat session that has gathered them.
    pub session_id: Option<String>,
    pub tickers: Vec<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn from_advisor_error(e: &AdvisorError) -> Self {
        let mut response = Self::error(e.to_string());
        // Attach the offending raw text so the caller can diagnose what the
        // model actually said.
        if let Some(raw) = e.raw_output() {
            response.data = Some(serde_json::json!({ "raw_output": raw }));
        }
        response
    }
}

fn status_for(e: &AdvisorError) -> StatusCode {
    match e {
        AdvisorError::MalformedOutput { .. }
        | AdvisorError::SchemaViolation { .. }
        | AdvisorError::SerializationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AdvisorError::TransientProvider(_)
        | AdvisorError::FatalProvider(_)
        | AdvisorError::RetriesExhausted { .. }
        | AdvisorError::HttpError(_) => StatusCode::BAD_GATEWAY,
        AdvisorError::IncompletePreferences(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub provider: Arc<dyn CompletionProvider>,
    pub sessions: Arc<SessionStore>,
}

/// =============================
/// Session Id Helpers
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

fn session_uuid(value: Option<&str>) -> uuid::Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            uuid::Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => uuid::Uuid::new_v4(),
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let session_id = session_uuid(req.session_id.as_deref());
    info!(%session_id, "Received chat turn");

    let session = state.sessions.get_or_create(session_id).await;
    let mut conversation = session.lock().await;

    match conversation
        .handle_turn(state.provider.as_ref(), &req.message)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": session_id,
                "reply": outcome.reply_text,
                "preferences": outcome.preferences,
                "complete": outcome.complete,
            }))),
        ),
        Err(e) => (status_for(&e), Json(ApiResponse::from_advisor_error(&e))),
    }
}

/// =============================
/// Portfolio Endpoint
/// =============================

async fn portfolio_handler(
    State(state): State<ApiState>,
    Json(req): Json<PortfolioRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let context = match resolve_preferences(&state, &req).await {
        Ok(context) => context,
        Err(e) => return (status_for(&e), Json(ApiResponse::from_advisor_error(&e))),
    };

    info!(tickers = req.tickers.len(), "Received portfolio request");

    match state.orchestrator.run(context, &req.tickers).await {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::success(report))),
        Err(e) => (status_for(&e), Json(ApiResponse::from_advisor_error(&e))),
    }
}

/// Preferences either come in the request body or from a completed chat
/// session; anything less is a bad request.
async fn resolve_preferences(
    state: &ApiState,
    req: &PortfolioRequest,
) -> crate::Result<PreferenceContext> {
    if let Some(preferences) = &req.preferences {
        return Ok(preferences.clone());
    }

    let Some(session_id) = req.session_id.as_deref() else {
        return Err(AdvisorError::IncompletePreferences(
            "supply preferences or a session_id".to_string(),
        ));
    };

    let session_id = session_uuid(Some(session_id));
    let Some(session) = state.sessions.get(session_id).await else {
        return Err(AdvisorError::IncompletePreferences(format!(
            "unknown session {}",
            session_id
        )));
    };

    let conversation = session.lock().await;
    conversation.context().ok_or_else(|| {
        AdvisorError::IncompletePreferences(
            "conversation has not gathered all three preferences yet".to_string(),
        )
    })
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/portfolio", post(portfolio_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_uuid_is_deterministic() {
        let a = session_uuid(Some("my-session"));
        let b = session_uuid(Some("my-session"));
        assert_eq!(a, b);

        let fresh = session_uuid(None);
        assert_ne!(fresh, a);
    }

    #[test]
    fn test_error_statuses_distinguish_parse_from_provider() {
        let parse = AdvisorError::MalformedOutput {
            message: "not json".to_string(),
            raw: "oops".to_string(),
        };
        let provider = AdvisorError::FatalProvider("401".to_string());

        assert_eq!(status_for(&parse), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(&provider), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_error_envelope_carries_raw_output() {
        let e = AdvisorError::SchemaViolation {
            missing: vec!["sectors".to_string()],
            raw: "{\"risk_tolerance\": \"low\"}".to_string(),
        };
        let response = ApiResponse::from_advisor_error(&e);

        assert!(!response.success);
        assert!(response.data.unwrap()["raw_output"]
            .as_str()
            .unwrap()
            .contains("risk_tolerance"));
    }
}
