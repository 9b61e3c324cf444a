//! Model Status Tracker
//!
//! A UI-facing lifecycle overlay per model id. It is deliberately separate from
//! the loader's busy flag: the loader knows whether one of its calls is in
//! flight, the tracker records what a user-visible action last said about a
//! model. Neither is derived from the other.
//!
//! Entries are not pruned when the registry is refreshed, so an entry may
//! refer to a model that is no longer discoverable.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::backend::ModelBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Chat,
    Embedding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Discovering,
    Ready,
    Loading,
    Loaded,
    Error,
    NotFound,
}

impl ModelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelState::Discovering => "discovering",
            ModelState::Ready => "ready",
            ModelState::Loading => "loading",
            ModelState::Loaded => "loaded",
            ModelState::Error => "error",
            ModelState::NotFound => "not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub id: String,
    pub name: String,
    pub kind: ModelKind,
    pub state: ModelState,
    pub progress: Option<f32>,
    pub error: Option<String>,
    pub last_updated: DateTime<Utc>,
}

/// Fields to write; anything left `None` falls back as described on
/// [`StatusTracker::set_status`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub name: Option<String>,
    pub kind: Option<ModelKind>,
    pub state: Option<ModelState>,
    pub progress: Option<f32>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn state(state: ModelState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: ModelKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_progress(mut self, progress: f32) -> Self {
        self.progress = Some(progress);
        self
    }
}

#[derive(Default)]
pub struct StatusTracker {
    statuses: DashMap<String, ModelStatus>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a complete record for `id`, stamped now.
    ///
    /// `name`, `kind` and `state` fall back to the existing record, then to
    /// `id`, `Chat` and `Ready`. `progress` and `error` come from the update
    /// alone, so a new status clears an old error.
    ///
    /// Always applies: if the wall clock stepped back, the stamp is held at
    /// the stored record's time.
    pub fn set_status(&self, id: &str, update: StatusUpdate) {
        let now = Utc::now();
        let at = self
            .statuses
            .get(id)
            .map_or(now, |existing| now.max(existing.last_updated));
        self.set_status_at(id, update, at);
    }

    /// As [`set_status`](Self::set_status) with an explicit timestamp.
    /// A write older than the stored record is ignored; returns whether it applied.
    pub fn set_status_at(&self, id: &str, update: StatusUpdate, at: DateTime<Utc>) -> bool {
        match self.statuses.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get();
                if at < existing.last_updated {
                    log::debug!("Ignoring stale status for '{}'", id);
                    return false;
                }
                let status = ModelStatus {
                    id: id.to_string(),
                    name: update.name.unwrap_or_else(|| existing.name.clone()),
                    kind: update.kind.unwrap_or(existing.kind),
                    state: update.state.unwrap_or(existing.state),
                    progress: update.progress,
                    error: update.error,
                    last_updated: at,
                };
                entry.insert(status);
            }
            Entry::Vacant(entry) => {
                entry.insert(ModelStatus {
                    id: id.to_string(),
                    name: update.name.unwrap_or_else(|| id.to_string()),
                    kind: update.kind.unwrap_or(ModelKind::Chat),
                    state: update.state.unwrap_or(ModelState::Ready),
                    progress: update.progress,
                    error: update.error,
                    last_updated: at,
                });
            }
        }
        true
    }

    /// Set progress on an existing entry; unknown ids are ignored
    pub fn update_progress(&self, id: &str, progress: f32) -> bool {
        match self.statuses.get_mut(id) {
            Some(mut status) => {
                status.progress = Some(progress);
                status.last_updated = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Move an existing entry to `Error`; it stays there until the next `set_status`
    pub fn set_error(&self, id: &str, error: impl Into<String>) -> bool {
        match self.statuses.get_mut(id) {
            Some(mut status) => {
                status.state = ModelState::Error;
                status.error = Some(error.into());
                status.last_updated = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn clear(&self, id: &str) {
        self.statuses.remove(id);
    }

    pub fn get(&self, id: &str) -> Option<ModelStatus> {
        self.statuses.get(id).map(|s| s.clone())
    }

    /// All entries, oldest update first
    pub fn all(&self) -> Vec<ModelStatus> {
        let mut all: Vec<ModelStatus> = self.statuses.iter().map(|s| s.value().clone()).collect();
        all.sort_by(|a, b| a.last_updated.cmp(&b.last_updated).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Entries currently in `Loading`
    pub fn loading(&self) -> Vec<ModelStatus> {
        self.all()
            .into_iter()
            .filter(|s| s.state == ModelState::Loading)
            .collect()
    }

    /// Record every embedding model the backend reports as ready
    pub async fn initialize_embedding_models(&self, backend: &dyn ModelBackend) -> usize {
        let models = match backend.discover_embedding_models().await {
            Ok(models) => models,
            Err(e) => {
                log::error!("Failed to initialize embedding models: {}", e);
                return 0;
            }
        };

        for model in &models {
            self.set_status(
                &model.id,
                StatusUpdate::state(ModelState::Ready)
                    .with_kind(ModelKind::Embedding)
                    .with_name(model.name.clone()),
            );
        }
        log::info!("Tracking {} embedding models", models.len());
        models.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::backend::{ops, BackendError, Model};
    use chrono::Duration;

    #[test]
    fn test_set_status_defaults_for_new_entry() {
        let tracker = StatusTracker::new();
        tracker.set_status("phi-2", StatusUpdate::default());

        let status = tracker.get("phi-2").unwrap();
        assert_eq!(status.name, "phi-2");
        assert_eq!(status.kind, ModelKind::Chat);
        assert_eq!(status.state, ModelState::Ready);
    }

    #[test]
    fn test_set_status_keeps_identity_but_replaces_progress_and_error() {
        let tracker = StatusTracker::new();
        tracker.set_status(
            "e5",
            StatusUpdate::state(ModelState::Loading)
                .with_kind(ModelKind::Embedding)
                .with_name("E5 Small")
                .with_progress(0.5),
        );
        assert!(tracker.set_error("e5", "disk full"));

        tracker.set_status("e5", StatusUpdate::state(ModelState::Loaded));
        let status = tracker.get("e5").unwrap();
        assert_eq!(status.name, "E5 Small");
        assert_eq!(status.kind, ModelKind::Embedding);
        assert_eq!(status.state, ModelState::Loaded);
        assert_eq!(status.progress, None);
        assert_eq!(status.error, None);
    }

    #[test]
    fn test_error_is_sticky_until_next_status() {
        let tracker = StatusTracker::new();
        tracker.set_status("phi-2", StatusUpdate::state(ModelState::Loading));
        tracker.set_error("phi-2", "Failed to load model");
        tracker.update_progress("phi-2", 0.9);

        let status = tracker.get("phi-2").unwrap();
        assert_eq!(status.state, ModelState::Error);
        assert_eq!(status.error.as_deref(), Some("Failed to load model"));
    }

    #[test]
    fn test_progress_and_error_ignore_unknown_ids() {
        let tracker = StatusTracker::new();
        assert!(!tracker.update_progress("ghost", 0.3));
        assert!(!tracker.set_error("ghost", "boom"));
        assert!(tracker.get("ghost").is_none());
    }

    #[test]
    fn test_older_write_loses() {
        let tracker = StatusTracker::new();
        let now = Utc::now();

        assert!(tracker.set_status_at("phi-2", StatusUpdate::state(ModelState::Loaded), now));
        assert!(!tracker.set_status_at(
            "phi-2",
            StatusUpdate::state(ModelState::Loading),
            now - Duration::seconds(1)
        ));
        assert_eq!(tracker.get("phi-2").unwrap().state, ModelState::Loaded);
    }

    #[test]
    fn test_set_status_applies_after_clock_step_back() {
        let tracker = StatusTracker::new();
        let ahead = Utc::now() + Duration::hours(1);
        tracker.set_status_at("phi-2", StatusUpdate::state(ModelState::Loading), ahead);

        tracker.set_status("phi-2", StatusUpdate::state(ModelState::Loaded));
        let status = tracker.get("phi-2").unwrap();
        assert_eq!(status.state, ModelState::Loaded);
        assert_eq!(status.last_updated, ahead);
        assert!(tracker.loading().is_empty());
    }

    #[test]
    fn test_clear_and_loading_filter() {
        let tracker = StatusTracker::new();
        tracker.set_status("a", StatusUpdate::state(ModelState::Loading));
        tracker.set_status("b", StatusUpdate::state(ModelState::Ready));

        let loading: Vec<String> = tracker.loading().into_iter().map(|s| s.id).collect();
        assert_eq!(loading, vec!["a"]);

        tracker.clear("a");
        assert!(tracker.get("a").is_none());
        assert_eq!(tracker.all().len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_embedding_models() {
        let fake = FakeBackend::new();
        let mut model = Model::named("all-MiniLM-L6-v2");
        model.id = "minilm".to_string();
        fake.set_embedding_models(vec![model]);

        let tracker = StatusTracker::new();
        assert_eq!(tracker.initialize_embedding_models(&fake).await, 1);

        let status = tracker.get("minilm").unwrap();
        assert_eq!(status.name, "all-MiniLM-L6-v2");
        assert_eq!(status.kind, ModelKind::Embedding);
        assert_eq!(status.state, ModelState::Ready);
    }

    #[tokio::test]
    async fn test_initialize_embedding_models_failure_is_logged() {
        let fake = FakeBackend::new();
        fake.fail(
            ops::DISCOVER_EMBEDDING_MODELS,
            BackendError::Unavailable("not running".into()),
        );

        let tracker = StatusTracker::new();
        assert_eq!(tracker.initialize_embedding_models(&fake).await, 0);
        assert!(tracker.all().is_empty());
    }
}
