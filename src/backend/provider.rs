//! Backend trait and error types
//!
//! Defines the command boundary between the client and the model-serving backend.
//! Every operation is an asynchronous round trip; nothing here performs inference.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use super::types::{Model, ModelInfo};
use crate::settings::{AppSettings, RecentProject};

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Backend process is not running or closed its channel
    Unavailable(String),
    /// Writing or reading the channel failed
    Transport(String),
    /// Backend answered with something we could not decode
    Protocol(String),
    /// Backend reported a failure; the message is its own text
    Remote(String),
    /// The call did not resolve within its deadline
    Timeout {
        operation: String,
        after: Duration,
    },
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Unavailable(msg) => write!(f, "Backend unavailable: {}", msg),
            BackendError::Transport(msg) => write!(f, "Backend transport error: {}", msg),
            BackendError::Protocol(msg) => write!(f, "Backend protocol error: {}", msg),
            BackendError::Remote(msg) => write!(f, "{}", msg),
            BackendError::Timeout { operation, after } => write!(
                f,
                "Backend call '{}' timed out after {}s",
                operation,
                after.as_secs()
            ),
        }
    }
}

impl std::error::Error for BackendError {}

/// Operation names as the backend knows them
pub mod ops {
    pub const DISCOVER_MODELS: &str = "discover_models";
    pub const GET_AVAILABLE_MODELS: &str = "get_available_models";
    pub const LOAD_MODEL_BY_NAME: &str = "load_model_by_name";
    pub const LOAD_BEST_MODEL: &str = "load_best_model";
    pub const GENERATE_RESPONSE: &str = "generate_response";
    pub const GET_MODEL_INFO: &str = "get_model_info";
    pub const CLEAR_CONVERSATION: &str = "clear_conversation";
    pub const GET_SETTINGS: &str = "get_settings";
    pub const GET_RECENT_PROJECTS: &str = "get_recent_projects";
    pub const DISCOVER_EMBEDDING_MODELS: &str = "discover_embedding_models";
}

/// The model-serving backend as seen from the client.
///
/// Implementations must be cheap to share (`Arc<dyn ModelBackend>`) and must allow
/// several calls to be in flight at once.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Rescan and return every discoverable chat model
    async fn discover_models(&self) -> Result<Vec<Model>, BackendError>;

    /// Return the backend's current model list without rescanning
    async fn get_available_models(&self) -> Result<Vec<Model>, BackendError>;

    /// Ask the backend to load the model with this name.
    /// `Ok(false)` is a backend-reported failure.
    async fn load_model_by_name(&self, model_name: &str) -> Result<bool, BackendError>;

    /// Let the backend pick and load a model by its own heuristic
    async fn load_best_model(&self) -> Result<bool, BackendError>;

    /// Generate a reply to `message` with the backend's active model
    async fn generate_response(&self, message: &str) -> Result<String, BackendError>;

    /// Opaque description of the loaded model
    async fn get_model_info(&self) -> Result<ModelInfo, BackendError>;

    /// Reset the backend's own conversation context
    async fn clear_conversation(&self) -> Result<(), BackendError>;

    /// Application settings owned by the backend
    async fn get_settings(&self) -> Result<AppSettings, BackendError>;

    /// Most recently opened projects, newest first
    async fn get_recent_projects(&self, limit: usize) -> Result<Vec<RecentProject>, BackendError>;

    /// Embedding models, tracked separately from chat models
    async fn discover_embedding_models(&self) -> Result<Vec<Model>, BackendError>;
}
