//! Multi-turn preference-gathering conversation
//!
//! Drives the guided chat that fills in a PartialPreferences object one
//! turn at a time. Each assistant reply is a two-part contract: free
//! conversation text, then a structured preferences block behind the
//! sentinel tag. The block is parsed permissively and merged — a turn that
//! yields nothing never erases previously captured fields. Completeness is
//! evaluated here after every turn, not asserted by the model.

use crate::models::{PartialPreferences, PreferenceContext};
use crate::prompts::{self, PREFERENCES_TAG};
use crate::provider::{ChatMessage, CompletionProvider, CompletionRequest};
use crate::schema;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An assistant reply split at the sentinel: what the user sees, and the
/// raw structured block (when the model included one).
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorReply {
    pub conversation_text: String,
    pub block: Option<String>,
}

/// Split the raw assistant text into its two parts. The closing tag and any
/// trailing commentary are left in the block; the repair ladder trims them.
pub fn split_reply(raw: &str) -> AdvisorReply {
    match raw.split_once(PREFERENCES_TAG) {
        Some((conversation, block)) => AdvisorReply {
            conversation_text: conversation.trim().to_string(),
            block: Some(block.trim().to_string()),
        },
        None => AdvisorReply {
            conversation_text: raw.trim().to_string(),
            block: None,
        },
    }
}

/// Outcome of one conversation turn, for the rendering collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub reply_text: String,
    pub preferences: PartialPreferences,
    pub complete: bool,
}

/// A single active preference-gathering conversation. Sole owner and writer
/// of its running preferences; downstream stages only ever receive the
/// completed, read-only context.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    messages: Vec<ChatMessage>,
    prefs: PartialPreferences,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            messages: Vec::new(),
            prefs: PartialPreferences::default(),
        }
    }

    pub fn preferences(&self) -> &PartialPreferences {
        &self.prefs
    }

    pub fn is_complete(&self) -> bool {
        self.prefs.is_complete()
    }

    /// The completed context, once all three fields are captured.
    pub fn context(&self) -> Option<PreferenceContext> {
        self.prefs.clone().into_complete()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Process one user turn: append it to the history, get the assistant
    /// reply over the full history, and merge whatever the structured block
    /// yields into the running preferences.
    pub async fn handle_turn(
        &mut self,
        provider: &dyn CompletionProvider,
        user_text: &str,
    ) -> Result<TurnOutcome> {
        self.messages.push(ChatMessage::user(user_text));

        let request = CompletionRequest::with_history(
            prompts::preference_chat_system(),
            self.messages.clone(),
        );

        let raw = provider.complete(&request).await?;
        self.messages.push(ChatMessage::assistant(raw.clone()));

        let reply = split_reply(&raw);

        if let Some(block) = &reply.block {
            match self.extract_block(provider, block).await {
                Ok(Some(incoming)) => {
                    debug!(conversation_id = %self.id, "Merging extracted preferences");
                    self.prefs.merge(incoming);
                }
                Ok(None) => {
                    debug!(conversation_id = %self.id, "Preferences block yielded no fields");
                }
                Err(e) => return Err(e),
            }
        } else {
            warn!(
                conversation_id = %self.id,
                "Assistant reply carried no preferences block"
            );
        }

        let complete = self.prefs.is_complete();
        if complete {
            info!(conversation_id = %self.id, "Preference gathering complete");
        }

        Ok(TurnOutcome {
            reply_text: reply.conversation_text,
            preferences: self.prefs.clone(),
            complete,
        })
    }

    /// Parse a sentinel block into a partial update. Returns Ok(None) when
    /// the block parses but its fields are unusable — that is a quiet turn,
    /// not an error.
    async fn extract_block(
        &self,
        provider: &dyn CompletionProvider,
        block: &str,
    ) -> Result<Option<PartialPreferences>> {
        let mut map = schema::parse_or_extract(provider, block, &[]).await?;
        schema::normalize_sector_alias(&mut map);

        match serde_json::from_value::<PartialPreferences>(Value::Object(map)) {
            Ok(incoming) if incoming.any_field() => Ok(Some(incoming)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(
                    conversation_id = %self.id,
                    "Preferences block has unusable field values: {}", e
                );
                Ok(None)
            }
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
