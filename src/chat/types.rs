//! Chat types and structures

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: u64,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Reply stands in for a failed generation
    #[serde(default)]
    pub is_error: bool,
}

/// Hands out message ids and timestamps that strictly increase within a session,
/// even when the wall clock stalls or steps back.
#[derive(Debug, Default)]
pub struct MessageClock {
    last_id: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl MessageClock {
    pub fn next(&mut self) -> (u64, DateTime<Utc>) {
        self.last_id += 1;
        let now = Utc::now();
        let timestamp = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(timestamp);
        (self.last_id, timestamp)
    }
}

/// Why a send was not accepted. History is untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    EmptyMessage,
    NoModelLoaded,
    AlreadyGenerating,
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::EmptyMessage => write!(f, "Message is empty"),
            ChatError::NoModelLoaded => write!(f, "No model loaded"),
            ChatError::AlreadyGenerating => write!(f, "A response is already being generated"),
        }
    }
}

impl std::error::Error for ChatError {}
