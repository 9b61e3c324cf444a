//! Chat with the loaded model
//!
//! Module structure:
//! - types.rs: ChatMessage, ChatRole, MessageClock, ChatError
//! - classify.rs: user-facing text for generation failures
//! - session.rs: ChatSession send/clear cycle

pub mod classify;
pub mod session;
pub mod types;

pub use classify::classify_generation_error;
pub use session::{ChatSession, SendOutcome};
pub use types::{ChatError, ChatMessage, ChatRole};
