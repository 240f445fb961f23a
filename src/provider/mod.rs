//! Completion provider boundary
//!
//! The single wire protocol the core depends on: a chat-completion request
//! in, free-form text out. The response is untrusted by default — schema
//! enforcement lives in `schema`, retry discipline in `retry`.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

pub mod openai;
pub use openai::AzureOpenAiClient;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// One completion call. Single-prompt stages use [`CompletionRequest::new`];
/// the conversation passes its full history.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub force_json_object: bool,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self::with_history(system_prompt, vec![ChatMessage::user(user_prompt)])
    }

    pub fn with_history(system_prompt: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
            max_tokens: 4096,
            temperature: 0.7,
            force_json_object: false,
        }
    }

    /// Ask the provider for its JSON-object output mode.
    pub fn force_json(mut self) -> Self {
        self.force_json_object = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Trait for chat-completion backends (LLM controlled)
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

//
// ================= Mock =================
//

/// One scripted reply for the mock provider.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    RateLimited,
    Fatal(String),
}

/// Scripted provider for development & testing
///
/// Replies are consumed front-to-back; when the script runs out the
/// default reply (if any) repeats. Call counts are recorded so tests can
/// assert which stages were actually invoked.
pub struct MockProvider {
    script: Mutex<VecDeque<MockReply>>,
    default_reply: Option<String>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(script: Vec<MockReply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default_reply: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Script of plain-text replies.
    pub fn with_responses(responses: Vec<&str>) -> Self {
        Self::new(
            responses
                .into_iter()
                .map(|r| MockReply::Text(r.to_string()))
                .collect(),
        )
    }

    /// Every call answers with the same text.
    pub fn always(reply: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Rate-limit signal for `failures` calls, then `reply` from then on.
    pub fn rate_limited_then(failures: usize, reply: &str) -> Self {
        Self {
            script: Mutex::new(vec![MockReply::RateLimited; failures].into()),
            default_reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self.script.lock().await.pop_front();
        match scripted {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::RateLimited) => Err(crate::error::AdvisorError::TransientProvider(
                "429 Too Many Requests".to_string(),
            )),
            Some(MockReply::Fatal(message)) => {
                Err(crate::error::AdvisorError::FatalProvider(message))
            }
            None => match &self.default_reply {
                Some(text) => Ok(text.clone()),
                None => Err(crate::error::AdvisorError::FatalProvider(
                    "mock script exhausted".to_string(),
                )),
            },
        }
    }
}
