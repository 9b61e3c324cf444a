//! In-memory backend for tests
//!
//! Behaves like a single-active-model server. Individual calls can be made to
//! fail, and the next call of an operation can be held at a gate so tests decide
//! the order in which concurrent calls resolve.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::oneshot;

use super::provider::{ops, BackendError, ModelBackend};
use super::types::{Model, ModelInfo};
use crate::settings::{AppSettings, RecentProject};

/// Holds one backend call until released (or dropped)
pub struct Gate(oneshot::Sender<()>);

impl Gate {
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

#[derive(Default)]
struct FakeState {
    models: Vec<Model>,
    embedding_models: Vec<Model>,
    loaded: Option<String>,
    settings: AppSettings,
    recent: Vec<RecentProject>,
    failures: HashMap<&'static str, BackendError>,
    refuse_loads: bool,
    reply: Option<String>,
    prompts: Vec<String>,
    gates: HashMap<&'static str, VecDeque<oneshot::Receiver<()>>>,
    calls: HashMap<&'static str, usize>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(models: Vec<Model>) -> Self {
        let fake = Self::new();
        fake.set_models(models);
        fake
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Replace the discoverable models; a model flagged loaded becomes active
    pub fn set_models(&self, models: Vec<Model>) {
        let mut state = self.state();
        state.loaded = models.iter().find(|m| m.loaded).map(|m| m.name.clone());
        state.models = models;
    }

    pub fn set_embedding_models(&self, models: Vec<Model>) {
        self.state().embedding_models = models;
    }

    pub fn set_settings(&self, settings: AppSettings) {
        self.state().settings = settings;
    }

    pub fn set_recent_projects(&self, projects: Vec<RecentProject>) {
        self.state().recent = projects;
    }

    /// Every later call of `op` fails with `error`
    pub fn fail(&self, op: &'static str, error: BackendError) {
        self.state().failures.insert(op, error);
    }

    /// Load calls report `false` instead of loading
    pub fn refuse_loads(&self, refuse: bool) {
        self.state().refuse_loads = refuse;
    }

    pub fn set_reply(&self, reply: impl Into<String>) {
        self.state().reply = Some(reply.into());
    }

    /// Hold the next not-yet-started call of `op` until the gate is released
    pub fn hold_next(&self, op: &'static str) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.state().gates.entry(op).or_default().push_back(rx);
        Gate(tx)
    }

    pub fn calls(&self, op: &'static str) -> usize {
        self.state().calls.get(op).copied().unwrap_or(0)
    }

    pub fn loaded(&self) -> Option<String> {
        self.state().loaded.clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.state().prompts.clone()
    }

    async fn enter(&self, op: &'static str) -> Result<(), BackendError> {
        let gate = {
            let mut state = self.state();
            *state.calls.entry(op).or_default() += 1;
            state.gates.get_mut(op).and_then(|q| q.pop_front())
        };
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        match self.state().failures.get(op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn snapshot(&self) -> Vec<Model> {
        let state = self.state();
        state
            .models
            .iter()
            .cloned()
            .map(|m| {
                let loaded = state.loaded.as_deref() == Some(m.name.as_str());
                m.with_loaded(loaded)
            })
            .collect()
    }
}

#[async_trait]
impl ModelBackend for FakeBackend {
    async fn discover_models(&self) -> Result<Vec<Model>, BackendError> {
        self.enter(ops::DISCOVER_MODELS).await?;
        Ok(self.snapshot())
    }

    async fn get_available_models(&self) -> Result<Vec<Model>, BackendError> {
        self.enter(ops::GET_AVAILABLE_MODELS).await?;
        Ok(self.snapshot())
    }

    async fn load_model_by_name(&self, model_name: &str) -> Result<bool, BackendError> {
        self.enter(ops::LOAD_MODEL_BY_NAME).await?;
        let mut state = self.state();
        if state.refuse_loads || !state.models.iter().any(|m| m.name == model_name) {
            return Ok(false);
        }
        state.loaded = Some(model_name.to_string());
        Ok(true)
    }

    async fn load_best_model(&self) -> Result<bool, BackendError> {
        self.enter(ops::LOAD_BEST_MODEL).await?;
        let mut state = self.state();
        if state.refuse_loads {
            return Ok(false);
        }
        let best = state.models.last().map(|m| m.name.clone());
        match best {
            Some(name) => {
                state.loaded = Some(name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn generate_response(&self, message: &str) -> Result<String, BackendError> {
        self.enter(ops::GENERATE_RESPONSE).await?;
        let mut state = self.state();
        state.prompts.push(message.to_string());
        Ok(state
            .reply
            .clone()
            .unwrap_or_else(|| format!("Echo: {}", message)))
    }

    async fn get_model_info(&self) -> Result<ModelInfo, BackendError> {
        self.enter(ops::GET_MODEL_INFO).await?;
        Ok(match self.loaded() {
            Some(name) => json!({ "name": name, "status": "loaded" }),
            None => Value::Null,
        })
    }

    async fn clear_conversation(&self) -> Result<(), BackendError> {
        self.enter(ops::CLEAR_CONVERSATION).await
    }

    async fn get_settings(&self) -> Result<AppSettings, BackendError> {
        self.enter(ops::GET_SETTINGS).await?;
        Ok(self.state().settings.clone())
    }

    async fn get_recent_projects(&self, limit: usize) -> Result<Vec<RecentProject>, BackendError> {
        self.enter(ops::GET_RECENT_PROJECTS).await?;
        Ok(self.state().recent.iter().take(limit).cloned().collect())
    }

    async fn discover_embedding_models(&self) -> Result<Vec<Model>, BackendError> {
        self.enter(ops::DISCOVER_EMBEDDING_MODELS).await?;
        Ok(self.state().embedding_models.clone())
    }
}
