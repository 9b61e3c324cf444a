//! Startup model discovery
//!
//! Runs after the application is already usable: discover models, then, if the
//! settings ask for it, load a preferred model. Nothing here can keep the app
//! from reaching its ready state, and it runs at most once per process.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;

use crate::models::ModelLoader;
use crate::settings::AiSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoLoad {
    /// Settings do not ask for auto-load
    Disabled,
    /// Auto-load requested but discovery found nothing
    NoModels,
    Loaded(String),
    /// Load of the named candidate failed (logged, not raised)
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReport {
    pub discovered: usize,
    pub auto_load: AutoLoad,
}

/// Discover models and auto-load the preferred one if configured
pub async fn discover_and_auto_load(loader: &ModelLoader, ai: &AiSettings) -> StartupReport {
    log::info!("Discovering models in background...");
    let models = loader.discover().await;
    let discovered = models.len();
    log::info!("Model discovery complete: {} models", discovered);

    if !ai.auto_load_model {
        return StartupReport {
            discovered,
            auto_load: AutoLoad::Disabled,
        };
    }

    let Some(candidate) = loader.startup_candidate(&ai.preferred_models) else {
        log::info!("Auto-load enabled but no models were discovered");
        return StartupReport {
            discovered,
            auto_load: AutoLoad::NoModels,
        };
    };

    log::info!("Auto-loading model: {}", candidate.name);
    let auto_load = if loader.load(&candidate.name).await {
        AutoLoad::Loaded(candidate.name)
    } else {
        log::warn!("Failed to auto-load model '{}'", candidate.name);
        AutoLoad::Failed(candidate.name)
    };

    StartupReport {
        discovered,
        auto_load,
    }
}

/// Guards the once-per-process startup discovery
#[derive(Default)]
pub struct StartupScheduler {
    started: AtomicBool,
}

impl StartupScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Start the startup work in the background. `None` if it was already started.
    pub fn spawn<F>(&self, work: F) -> Option<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            log::debug!("Startup discovery already ran");
            return None;
        }
        Some(tokio::spawn(work))
    }
}
