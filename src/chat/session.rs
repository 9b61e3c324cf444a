//! Chat session - send/receive/clear cycle
//!
//! `idle -> generating -> idle` per send. A send is refused while another is
//! generating; nothing in flight can be aborted. The user message is appended
//! before the backend answers, and exactly one assistant message follows it
//! (the reply, or a classified failure).

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use uuid::Uuid;

use super::classify::classify_generation_error;
use super::types::{ChatError, ChatMessage, ChatRole, MessageClock};
use crate::backend::{Model, ModelBackend};

/// What became of an accepted send
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Backend replied; the reply was appended
    Replied(ChatMessage),
    /// Generation failed; a classified error reply was appended
    Failed(ChatMessage),
    /// The conversation was cleared while generating; nothing was appended
    Discarded,
}

struct SessionInner {
    messages: Vec<ChatMessage>,
    clock: MessageClock,
    /// Bumped by `clear()`; replies started under an older epoch are dropped
    epoch: u64,
}

/// Resets the generating flag on every exit path
struct GeneratingGuard<'a>(&'a AtomicBool);

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ChatSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    backend: Arc<dyn ModelBackend>,
    current_model: watch::Receiver<Option<Model>>,
    inner: Mutex<SessionInner>,
    generating: AtomicBool,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ModelBackend>, current_model: watch::Receiver<Option<Model>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            backend,
            current_model,
            inner: Mutex::new(SessionInner {
                messages: Vec::new(),
                clock: MessageClock::default(),
                epoch: 0,
            }),
            generating: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    fn push(inner: &mut SessionInner, role: ChatRole, content: String, is_error: bool) -> ChatMessage {
        let (id, timestamp) = inner.clock.next();
        let message = ChatMessage {
            id,
            role,
            content,
            timestamp,
            is_error,
        };
        inner.messages.push(message.clone());
        message
    }

    /// Send a user message and wait for the assistant's reply.
    ///
    /// Rejections leave the history untouched. Once accepted, generation
    /// failures are turned into an assistant message, not an error.
    pub async fn send(&self, content: &str) -> Result<SendOutcome, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.current_model.borrow().is_none() {
            return Err(ChatError::NoModelLoaded);
        }
        if self
            .generating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ChatError::AlreadyGenerating);
        }
        let _generating = GeneratingGuard(&self.generating);

        let epoch = {
            let mut inner = self.lock();
            Self::push(&mut inner, ChatRole::User, content.to_string(), false);
            inner.epoch
        };

        let result = self.backend.generate_response(content).await;

        let mut inner = self.lock();
        if inner.epoch != epoch {
            log::debug!("Conversation cleared during generation, dropping reply");
            return Ok(SendOutcome::Discarded);
        }

        Ok(match result {
            Ok(reply) => SendOutcome::Replied(Self::push(&mut inner, ChatRole::Assistant, reply, false)),
            Err(e) => {
                log::error!("Failed to generate response: {}", e);
                let reply = classify_generation_error(&e.to_string());
                SendOutcome::Failed(Self::push(&mut inner, ChatRole::Assistant, reply, true))
            }
        })
    }

    /// Empty the conversation, then ask the backend to reset its context.
    ///
    /// The local history stays empty whatever the backend says.
    pub async fn clear(&self) {
        {
            let mut inner = self.lock();
            inner.messages.clear();
            inner.epoch += 1;
        }

        if let Err(e) = self.backend.clear_conversation().await {
            log::warn!("Failed to clear backend conversation: {}", e);
        }
    }
}
