//! Wire types exchanged with the backend

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A discoverable model as reported by the backend.
///
/// `name` is the key for load operations; `id` is the key the status overlay
/// was designed around. The backend does not promise they coincide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Backend format label (e.g. "Gguf", "Onnx", "HuggingFace")
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub size_mb: u64,
    /// Authoritative only as of the discovery that produced this value
    #[serde(default)]
    pub loaded: bool,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl Model {
    /// Minimal model with matching id and name, not loaded
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            description: String::new(),
            format: String::new(),
            path: String::new(),
            size_mb: 0,
            loaded: false,
            capabilities: BTreeSet::new(),
        }
    }

    pub fn with_loaded(mut self, loaded: bool) -> Self {
        self.loaded = loaded;
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Opaque model description; only displayed, never interpreted
pub type ModelInfo = serde_json::Value;
