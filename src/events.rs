//! Backend events
//!
//! The backend pushes fire-and-forget notifications. They are decoded into
//! [`AppEvent`] and fanned out on an [`EventBus`] to whoever subscribes.

use serde_json::Value;
use tokio::sync::broadcast;

use crate::backend::{Model, Notification};
use crate::settings::{RecentProject, Theme};

pub const PROJECT_OPENED: &str = "project-opened";
pub const MODEL_LOADED: &str = "model-loaded";
pub const THEME_CHANGED: &str = "theme-changed";
pub const FILE_CHANGED: &str = "file-changed";
pub const AI_RESPONSE: &str = "ai-response";

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    ProjectOpened(RecentProject),
    ModelLoaded(Model),
    ThemeChanged(Theme),
    FileChanged(Value),
    AiResponse(Value),
}

impl AppEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::ProjectOpened(_) => PROJECT_OPENED,
            AppEvent::ModelLoaded(_) => MODEL_LOADED,
            AppEvent::ThemeChanged(_) => THEME_CHANGED,
            AppEvent::FileChanged(_) => FILE_CHANGED,
            AppEvent::AiResponse(_) => AI_RESPONSE,
        }
    }

    /// Decode a backend notification.
    ///
    /// Returns `Ok(None)` for notifications that are not application events.
    pub fn from_notification(notification: &Notification) -> Result<Option<Self>, String> {
        let params = notification.params.clone();
        let event = match notification.method.as_str() {
            PROJECT_OPENED => AppEvent::ProjectOpened(decode(PROJECT_OPENED, params)?),
            MODEL_LOADED => AppEvent::ModelLoaded(decode(MODEL_LOADED, params)?),
            THEME_CHANGED => {
                let theme: String = decode(THEME_CHANGED, params)?;
                AppEvent::ThemeChanged(theme.parse()?)
            }
            FILE_CHANGED => AppEvent::FileChanged(params),
            AI_RESPONSE => AppEvent::AiResponse(params),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

fn decode<T: serde::de::DeserializeOwned>(event: &str, params: Value) -> Result<T, String> {
    serde_json::from_value(params).map_err(|e| format!("Invalid '{}' payload: {}", event, e))
}

/// Broadcast fan-out of decoded events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to current subscribers; returns how many received it
    pub fn publish(&self, event: AppEvent) -> usize {
        log::debug!("Event: {}", event.name());
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Decode and publish a raw backend notification, logging anything unusable
    pub fn publish_notification(&self, notification: Notification) {
        match AppEvent::from_notification(&notification) {
            Ok(Some(event)) => {
                self.publish(event);
            }
            Ok(None) => log::debug!("Ignoring backend notification '{}'", notification.method),
            Err(e) => log::warn!("Dropping backend event: {}", e),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
