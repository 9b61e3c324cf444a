// State management for RAIN.CHAT

use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::backend::ModelBackend;
use crate::chat::ChatSession;
use crate::events::{AppEvent, EventBus};
use crate::models::{select_model, ModelLoader, StatusTracker};
use crate::settings::{AppSettings, RecentProject, RecentProjects, Theme};
use crate::startup::{discover_and_auto_load, StartupReport, StartupScheduler};

/// What the model side of the app is doing right now, for status display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    Discovering,
    /// A load is in flight; the name is known unless it was a best-model load
    Loading(Option<String>),
    Active(String),
    Idle,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Discovering => write!(f, "🔍 Discovering models..."),
            Activity::Loading(Some(name)) => write!(f, "🔄 Loading {}...", name),
            Activity::Loading(None) => write!(f, "🔄 Loading model..."),
            Activity::Active(name) => write!(f, "AI: {}", name),
            Activity::Idle => write!(f, "Ready"),
        }
    }
}

#[derive(Default)]
struct UiState {
    ready: bool,
    theme: Theme,
    settings: Option<AppSettings>,
    /// Why settings fell back to defaults, if they did
    settings_error: Option<String>,
    recent_projects: RecentProjects,
    current_project: Option<RecentProject>,
}

pub struct AppState {
    backend: Arc<dyn ModelBackend>,
    /// Model registry and current-model pointer
    pub loader: Arc<ModelLoader>,
    /// Per-model status overlay
    pub status: Arc<StatusTracker>,
    pub chat: Arc<ChatSession>,
    events: EventBus,
    startup: StartupScheduler,
    recent_projects_limit: usize,
    ui: RwLock<UiState>,
}

impl AppState {
    pub fn new(backend: Arc<dyn ModelBackend>, events: EventBus, recent_projects_limit: usize) -> Self {
        let loader = Arc::new(ModelLoader::new(backend.clone()));
        let chat = Arc::new(ChatSession::new(backend.clone(), loader.subscribe()));

        Self {
            backend,
            loader,
            status: Arc::new(StatusTracker::new()),
            chat,
            events,
            startup: StartupScheduler::new(),
            recent_projects_limit,
            ui: RwLock::new(UiState::default()),
        }
    }

    /// Load settings and recent projects, mark the app ready, then start
    /// background model discovery (first call only).
    pub async fn initialize(&self) -> Option<JoinHandle<StartupReport>> {
        log::info!("Initializing app...");

        let (settings, settings_error) = match self.backend.get_settings().await {
            Ok(settings) => (settings, None),
            Err(e) => {
                log::error!("Failed to load settings, using defaults: {}", e);
                (AppSettings::default(), Some(e.to_string()))
            }
        };

        let recent = match self.backend.get_recent_projects(self.recent_projects_limit).await {
            Ok(projects) => projects,
            Err(e) => {
                log::warn!("Failed to load recent projects: {}", e);
                Vec::new()
            }
        };

        {
            let mut ui = self.ui.write().await;
            ui.theme = settings.theme;
            ui.settings = Some(settings.clone());
            ui.settings_error = settings_error;
            ui.recent_projects = RecentProjects::from_list(recent);
            ui.ready = true;
        }
        log::info!("Initialization complete.");

        let loader = self.loader.clone();
        let status = self.status.clone();
        let backend = self.backend.clone();
        let ai = settings.ai;
        self.startup.spawn(async move {
            let report = discover_and_auto_load(&loader, &ai).await;
            status.initialize_embedding_models(backend.as_ref()).await;
            report
        })
    }

    /// Apply backend events until the state is dropped
    pub fn spawn_event_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.events.subscribe();
        let state: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("Event listener lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(state) = state.upgrade() else {
                    break;
                };
                state.handle_event(event).await;
            }
            log::debug!("Event listener stopped");
        })
    }

    pub async fn handle_event(&self, event: AppEvent) {
        match event {
            AppEvent::ProjectOpened(project) => {
                log::info!("Project opened: {}", project.path);
                let mut ui = self.ui.write().await;
                ui.current_project = Some(project.clone());
                ui.recent_projects.push(project);
            }
            AppEvent::ModelLoaded(model) => self.loader.apply_loaded_event(model),
            AppEvent::ThemeChanged(theme) => {
                log::info!("Theme changed to {}", theme);
                self.ui.write().await.theme = theme;
            }
            AppEvent::FileChanged(payload) => log::debug!("File changed: {}", payload),
            AppEvent::AiResponse(payload) => log::debug!("AI response: {}", payload),
        }
    }

    /// User-initiated load, reflected in the status overlay
    pub async fn select_model(&self, name: &str) -> bool {
        select_model(&self.loader, &self.status, name).await
    }

    pub fn activity(&self) -> Activity {
        if self.loader.is_discovering() && !self.loader.is_loading() {
            return Activity::Discovering;
        }
        if let Some(status) = self.status.loading().into_iter().next() {
            return Activity::Loading(Some(status.name));
        }
        if self.loader.is_loading() {
            return Activity::Loading(self.loader.loading_target());
        }
        match self.loader.current_model() {
            Some(model) => Activity::Active(model.name),
            None => Activity::Idle,
        }
    }

    pub async fn is_ready(&self) -> bool {
        self.ui.read().await.ready
    }

    pub async fn theme(&self) -> Theme {
        self.ui.read().await.theme
    }

    pub async fn settings(&self) -> Option<AppSettings> {
        self.ui.read().await.settings.clone()
    }

    pub async fn settings_error(&self) -> Option<String> {
        self.ui.read().await.settings_error.clone()
    }

    pub async fn recent_projects(&self) -> Vec<RecentProject> {
        self.ui.read().await.recent_projects.items().to_vec()
    }

    pub async fn current_project(&self) -> Option<RecentProject> {
        self.ui.read().await.current_project.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::backend::{ops, BackendError, Model};
    use crate::settings::AiSettings;
    use crate::startup::AutoLoad;
    use chrono::Utc;
    use std::time::Duration;

    fn project(id: &str, path: &str) -> RecentProject {
        RecentProject {
            id: id.to_string(),
            name: id.to_string(),
            path: path.to_string(),
            last_opened: Utc::now(),
        }
    }

    fn app(fake: &Arc<FakeBackend>) -> Arc<AppState> {
        Arc::new(AppState::new(fake.clone(), EventBus::default(), 10))
    }

    #[tokio::test]
    async fn test_initialize_auto_loads_preferred_model() {
        let fake = Arc::new(FakeBackend::with_models(vec![
            Model::named("llama-7b"),
            Model::named("phi-2"),
        ]));
        fake.set_settings(AppSettings {
            theme: Theme::Light,
            ai: AiSettings {
                auto_load_model: true,
                preferred_models: vec!["phi-2".to_string()],
            },
            ..AppSettings::default()
        });
        fake.set_embedding_models(vec![Model::named("minilm")]);
        let state = app(&fake);

        let startup = state.initialize().await.unwrap();
        assert!(state.is_ready().await);
        assert_eq!(state.theme().await, Theme::Light);

        let report = startup.await.unwrap();
        assert_eq!(report.auto_load, AutoLoad::Loaded("phi-2".to_string()));
        assert_eq!(state.activity(), Activity::Active("phi-2".to_string()));
        assert!(state.status.get("minilm").is_some());

        // Second initialization does not rediscover
        assert!(state.initialize().await.is_none());
        assert_eq!(fake.calls(ops::DISCOVER_EMBEDDING_MODELS), 1);
    }

    #[tokio::test]
    async fn test_initialize_survives_settings_failure() {
        let fake = Arc::new(FakeBackend::with_models(vec![Model::named("phi-2")]));
        fake.fail(ops::GET_SETTINGS, BackendError::Unavailable("starting".into()));
        fake.fail(ops::GET_RECENT_PROJECTS, BackendError::Unavailable("starting".into()));
        let state = app(&fake);

        let report = state.initialize().await.unwrap().await.unwrap();
        assert!(state.is_ready().await);
        assert!(state.settings_error().await.is_some());
        assert_eq!(state.settings().await, Some(AppSettings::default()));
        assert!(state.recent_projects().await.is_empty());
        assert_eq!(report.discovered, 1);
        assert_eq!(report.auto_load, AutoLoad::Disabled);
    }

    #[tokio::test]
    async fn test_recent_projects_limited() {
        let fake = Arc::new(FakeBackend::new());
        fake.set_recent_projects((0..20).map(|i| project(&i.to_string(), &format!("/p{}", i))).collect());
        let state = app(&fake);

        state.initialize().await;
        assert_eq!(state.recent_projects().await.len(), 10);
    }

    #[tokio::test]
    async fn test_events_update_state() {
        let fake = Arc::new(FakeBackend::new());
        let state = app(&fake);

        state.handle_event(AppEvent::ProjectOpened(project("a", "/a"))).await;
        state.handle_event(AppEvent::ProjectOpened(project("b", "/b"))).await;
        state.handle_event(AppEvent::ProjectOpened(project("a", "/a"))).await;
        state.handle_event(AppEvent::ThemeChanged(Theme::Light)).await;
        state
            .handle_event(AppEvent::ModelLoaded(Model::named("phi-2").with_loaded(true)))
            .await;

        let paths: Vec<String> = state.recent_projects().await.into_iter().map(|p| p.path).collect();
        assert_eq!(paths, vec!["/a", "/b"]);
        assert_eq!(state.current_project().await.map(|p| p.id), Some("a".to_string()));
        assert_eq!(state.theme().await, Theme::Light);
        assert_eq!(state.loader.current_model().map(|m| m.name), Some("phi-2".to_string()));
    }

    #[tokio::test]
    async fn test_listener_applies_published_events() {
        let fake = Arc::new(FakeBackend::new());
        let state = app(&fake);
        let listener = state.spawn_event_listener();

        state.events().publish(AppEvent::ThemeChanged(Theme::Light));

        for _ in 0..100 {
            if state.theme().await == Theme::Light {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(state.theme().await, Theme::Light);
        listener.abort();
    }

    #[tokio::test]
    async fn test_activity_reports_status_overlay_loading() {
        let fake = Arc::new(FakeBackend::with_models(vec![Model::named("phi-2")]));
        let gate = fake.hold_next(ops::LOAD_MODEL_BY_NAME);
        let state = app(&fake);
        assert_eq!(state.activity(), Activity::Idle);

        let pending = tokio::spawn({
            let state = state.clone();
            async move { state.select_model("phi-2").await }
        });
        while fake.calls(ops::LOAD_MODEL_BY_NAME) == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(state.activity(), Activity::Loading(Some("phi-2".to_string())));
        assert_eq!(state.activity().to_string(), "🔄 Loading phi-2...");

        gate.release();
        assert!(pending.await.unwrap());
        assert_eq!(state.activity().to_string(), "AI: phi-2");
    }

    #[tokio::test]
    async fn test_chat_follows_loaded_model() {
        let fake = Arc::new(FakeBackend::with_models(vec![Model::named("phi-2")]));
        let state = app(&fake);

        assert!(state.chat.send("hi").await.is_err());
        state.loader.load("phi-2").await;
        assert!(state.chat.send("hi").await.is_ok());
        assert_eq!(state.chat.messages().len(), 2);
    }
}
