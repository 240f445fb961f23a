//! In-memory store for active conversations
//!
//! One conversation per session id; nothing is persisted — an abandoned
//! session simply disappears with the process.

use crate::conversation::Conversation;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Conversation>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the conversation for `id`, creating it on first use. Each
    /// session is individually locked so one long-running turn never blocks
    /// the whole store.
    pub async fn get_or_create(&self, id: Uuid) -> Arc<Mutex<Conversation>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&id) {
                return session.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(Conversation::new())))
            .clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Mutex<Conversation>>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<Mutex<Conversation>>> {
        self.sessions.write().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
