//! Conversation sessions: one agent runtime per conversation, created on first use.
//!
//! Requests for the same conversation run one at a time (the session's mutex); requests
//! for different conversations never wait on each other. Lookup is lock-free; only the
//! creation of a missing session goes through the manager-wide creation lock.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome of one runtime turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionResult {
    pub success: bool,
    pub response: Option<String>,
    pub error: Option<String>,
}

impl InteractionResult {
    pub fn ok(response: impl Into<String>) -> Self {
        Self {
            success: true,
            response: Some(response.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.into()),
        }
    }
}

/// Per-conversation agent. Never called concurrently for the same conversation.
#[async_trait]
pub trait AgentRuntime: Send {
    async fn execute(&mut self, text: &str) -> InteractionResult;
}

/// Builds the runtime for a newly seen conversation.
pub trait RuntimeFactory: Send + Sync {
    fn create(&self, conversation_id: &str) -> Box<dyn AgentRuntime>;
}

impl<F> RuntimeFactory for F
where
    F: Fn(&str) -> Box<dyn AgentRuntime> + Send + Sync,
{
    fn create(&self, conversation_id: &str) -> Box<dyn AgentRuntime> {
        self(conversation_id)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Processing(String),
}

/// A conversation and its runtime. The mutex around the runtime is the session lock.
pub struct ConversationSession {
    conversation_id: String,
    runtime: Mutex<Box<dyn AgentRuntime>>,
    last_used: AtomicU64,
}

impl ConversationSession {
    fn new(conversation_id: &str, runtime: Box<dyn AgentRuntime>) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            runtime: Mutex::new(runtime),
            last_used: AtomicU64::new(0),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

/// Registry of conversation sessions.
pub struct SessionManager {
    sessions: DashMap<String, Arc<ConversationSession>>,
    create_lock: Mutex<()>,
    factory: Box<dyn RuntimeFactory>,
    capacity: Option<usize>,
    clock: AtomicU64,
}

impl SessionManager {
    /// Unbounded manager: sessions live as long as the manager.
    pub fn new(factory: impl RuntimeFactory + 'static) -> Self {
        Self::with_capacity(factory, None)
    }

    /// With a capacity, creating a session when full evicts the least recently used
    /// idle session. Sessions with a request in flight or waiting are never evicted, so
    /// the table can briefly exceed the capacity when every session is busy.
    pub fn with_capacity(factory: impl RuntimeFactory + 'static, capacity: Option<usize>) -> Self {
        Self {
            sessions: DashMap::new(),
            create_lock: Mutex::new(()),
            factory: Box::new(factory),
            capacity: capacity.filter(|c| *c > 0),
            clock: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.sessions.contains_key(conversation_id)
    }

    /// Run one message through the conversation's runtime and return the trimmed reply.
    pub async fn process_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<String, SessionError> {
        if conversation_id.is_empty() {
            return Err(SessionError::InvalidInput(
                "conversation_id must not be empty".to_string(),
            ));
        }

        let session = self.session_for(conversation_id).await;
        session
            .last_used
            .store(self.clock.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);

        let result = {
            let mut runtime = session.runtime.lock().await;
            runtime.execute(text).await
        };

        if !result.success {
            let detail = result
                .error
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "processing failed".to_string());
            log::warn!("session: {} failed: {}", conversation_id, detail);
            return Err(SessionError::Processing(detail));
        }

        let reply = result.response.unwrap_or_default().trim().to_string();
        if reply.is_empty() {
            log::warn!("session: {} produced an empty reply", conversation_id);
        }
        Ok(reply)
    }

    async fn session_for(&self, conversation_id: &str) -> Arc<ConversationSession> {
        if let Some(existing) = self.sessions.get(conversation_id) {
            return existing.value().clone();
        }

        let _creating = self.create_lock.lock().await;
        if let Some(existing) = self.sessions.get(conversation_id) {
            return existing.value().clone();
        }
        if let Some(capacity) = self.capacity {
            if self.sessions.len() >= capacity {
                self.evict_idle();
            }
        }
        let session = Arc::new(ConversationSession::new(
            conversation_id,
            self.factory.create(conversation_id),
        ));
        self.sessions
            .insert(conversation_id.to_string(), session.clone());
        log::info!("session: created for {}", conversation_id);
        session
    }

    /// Remove the least recently used session nobody holds. Called with the creation lock held.
    fn evict_idle(&self) {
        let mut idle: Vec<(u64, String)> = self
            .sessions
            .iter()
            .filter(|e| Arc::strong_count(e.value()) == 1)
            .map(|e| (e.value().last_used.load(Ordering::Relaxed), e.key().clone()))
            .collect();
        idle.sort();
        for (_, key) in idle {
            // Re-checked under the shard's write lock; a lookup in progress holds a clone.
            if self
                .sessions
                .remove_if(&key, |_, s| Arc::strong_count(s) == 1)
                .is_some()
            {
                log::info!("session: evicted idle session {}", key);
                return;
            }
        }
        log::warn!(
            "session: all {} sessions busy, exceeding capacity",
            self.sessions.len()
        );
    }
}
