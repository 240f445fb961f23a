//! Azure OpenAI chat-completions client
//!
//! Speaks the `chat/completions` deployment API with an `api-key` header.
//! Uses a long-lived reqwest::Client for connection pooling. HTTP 429 is
//! surfaced as a transient error so the retry layer can see it; every other
//! failure is fatal and propagates immediately.

use crate::config::AdvisorConfig;
use crate::error::AdvisorError;
use crate::provider::{ChatRole, CompletionProvider, CompletionRequest};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

pub struct AzureOpenAiClient {
    client: Client,
    api_key: String,
    endpoint: String,
    deployment: String,
    api_version: String,
}

impl AzureOpenAiClient {
    pub fn new(config: &AdvisorConfig) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            deployment: config.deployment.clone(),
            api_version: config.api_version.clone(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }
}

#[async_trait]
impl CompletionProvider for AzureOpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(AdvisorError::FatalProvider(
                "AZURE_OPENAI_API_KEY not configured".to_string(),
            ));
        }

        let body = ChatCompletionRequest::from_request(request);

        debug!(
            deployment = %self.deployment,
            messages = body.messages.len(),
            json_mode = request.force_json_object,
            "Calling chat-completions API"
        );

        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Completion request failed: {}", e);
                AdvisorError::FatalProvider(format!("completion request failed: {}", e))
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let detail = response.text().await.unwrap_or_default();
            info!("Provider rate limit hit");
            return Err(AdvisorError::TransientProvider(detail));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(status = %status, "Provider error response: {}", detail);
            return Err(AdvisorError::FatalProvider(format!(
                "{}: {}",
                status, detail
            )));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            error!("Failed to decode completion response: {}", e);
            AdvisorError::FatalProvider(format!("completion decode error: {}", e))
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AdvisorError::FatalProvider("no completion choices returned".to_string())
            })?;

        debug!(chars = content.len(), "Completion received");

        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

impl ChatCompletionRequest {
    fn from_request(request: &CompletionRequest) -> Self {
        let mut messages = vec![WireMessage {
            role: "system",
            content: request.system_prompt.clone(),
        }];
        messages.extend(request.messages.iter().map(|m| WireMessage {
            role: match m.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            },
            content: m.content.clone(),
        }));

        Self {
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request
                .force_json_object
                .then_some(ResponseFormat { kind: "json_object" }),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
