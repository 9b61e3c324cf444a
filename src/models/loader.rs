//! Model Loader - load/switch orchestration
//!
//! Owns the [`ModelRegistry`] and the current-model pointer; nothing else
//! writes either. Backend calls may overlap, so every result is fenced: each
//! call takes an epoch when it starts and its result is applied only if no
//! newer call of the same kind has been issued in the meantime. Registry
//! writes (discover, sync, post-load refresh) share one epoch counter; pointer
//! writes (load, load best, model-loaded events) share another.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;

use super::registry::{first_loaded, loaded_named, ModelRegistry};
use crate::backend::{BackendError, Model, ModelBackend, ModelInfo};

/// How a load request ended
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Backend loaded the model and the pointer was updated (to `None` if the
    /// refreshed listing did not show it loaded)
    Loaded(Option<Model>),
    /// Backend loaded the model but a newer load was issued before this one
    /// resolved; the pointer was left to the newer call
    Superseded,
    /// Backend answered `false`
    Rejected,
    /// The load call, or the listing refresh after it, failed; the pointer
    /// was left alone
    Failed(BackendError),
}

impl LoadOutcome {
    /// Whether the backend reports the model as loaded
    pub fn succeeded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded(_) | LoadOutcome::Superseded)
    }
}

#[derive(Debug, Clone, Copy)]
enum Listing {
    Discover,
    Available,
}

impl Listing {
    fn as_str(&self) -> &'static str {
        match self {
            Listing::Discover => "discovery",
            Listing::Available => "model sync",
        }
    }
}

struct LoaderInner {
    registry: ModelRegistry,
    /// Target of the most recent in-flight load (`None` for load best)
    loading_target: Option<String>,
}

/// Counts in-flight operations; the guard releases on every exit path
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ModelLoader {
    backend: Arc<dyn ModelBackend>,
    inner: Mutex<LoaderInner>,
    registry_epoch: AtomicU64,
    pointer_epoch: AtomicU64,
    loads_in_flight: AtomicUsize,
    discoveries_in_flight: AtomicUsize,
    current: watch::Sender<Option<Model>>,
}

impl ModelLoader {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            backend,
            inner: Mutex::new(LoaderInner {
                registry: ModelRegistry::new(),
                loading_target: None,
            }),
            registry_epoch: AtomicU64::new(0),
            pointer_epoch: AtomicU64::new(0),
            loads_in_flight: AtomicUsize::new(0),
            discoveries_in_flight: AtomicUsize::new(0),
            current,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoaderInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Rescan the backend and replace the registry.
    ///
    /// On failure the registry is left as it was. Returns the registry contents
    /// after the call.
    pub async fn discover(&self) -> Vec<Model> {
        let _ = self.refresh(Listing::Discover).await;
        self.available_models()
    }

    /// Replace the registry from the backend's current listing, without a rescan
    pub async fn sync_available(&self) -> Vec<Model> {
        let _ = self.refresh(Listing::Available).await;
        self.available_models()
    }

    /// Fetch a listing and apply it if still current.
    /// Returns the fetched list whether or not it was applied.
    async fn refresh(&self, listing: Listing) -> Result<Vec<Model>, BackendError> {
        let epoch = self.registry_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let _discovering = InFlight::enter(&self.discoveries_in_flight);
        let started = Instant::now();

        let result = match listing {
            Listing::Discover => self.backend.discover_models().await,
            Listing::Available => self.backend.get_available_models().await,
        };

        let models = match result {
            Ok(models) => models,
            Err(e) => {
                log::warn!("Model {} failed, keeping previous list: {}", listing.as_str(), e);
                return Err(e);
            }
        };

        let mut inner = self.lock();
        if self.registry_epoch.load(Ordering::SeqCst) == epoch {
            log::info!(
                "Model {} found {} models in {}ms",
                listing.as_str(),
                models.len(),
                started.elapsed().as_millis()
            );
            inner.registry.replace(models.clone());
        } else {
            log::debug!("Discarding superseded model {} (epoch {})", listing.as_str(), epoch);
        }
        Ok(models)
    }

    pub fn available_models(&self) -> Vec<Model> {
        self.lock().registry.models().to_vec()
    }

    /// Startup auto-load candidate from the current registry
    pub fn startup_candidate(&self, preferred: &[String]) -> Option<Model> {
        self.lock().registry.startup_candidate(preferred).cloned()
    }

    pub fn is_discovering(&self) -> bool {
        self.discoveries_in_flight.load(Ordering::SeqCst) > 0
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load a model by name; `false` on any failure, never an error
    pub async fn load(&self, name: &str) -> bool {
        self.load_with_outcome(name).await.succeeded()
    }

    pub async fn load_with_outcome(&self, name: &str) -> LoadOutcome {
        let epoch = self.pointer_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let _loading = InFlight::enter(&self.loads_in_flight);
        self.lock().loading_target = Some(name.to_string());

        log::info!("Loading model '{}'", name);
        let started = Instant::now();

        match self.backend.load_model_by_name(name).await {
            Ok(true) => {}
            Ok(false) => {
                log::warn!("Backend refused to load model '{}'", name);
                return LoadOutcome::Rejected;
            }
            Err(e) => {
                log::error!("Failed to load model '{}': {}", name, e);
                return LoadOutcome::Failed(e);
            }
        }

        let models = match self.refresh(Listing::Discover).await {
            Ok(models) => models,
            Err(e) => {
                log::error!("Model '{}' loaded but the model list could not be refreshed: {}", name, e);
                return LoadOutcome::Failed(e);
            }
        };
        let outcome = self.apply_pointer(epoch, loaded_named(&models, name).cloned());

        if let LoadOutcome::Loaded(_) = outcome {
            log::info!("Model '{}' loaded in {}ms", name, started.elapsed().as_millis());
        }
        outcome
    }

    /// Let the backend choose a model, then point at whichever it loaded
    pub async fn load_best(&self) -> bool {
        self.load_best_with_outcome().await.succeeded()
    }

    pub async fn load_best_with_outcome(&self) -> LoadOutcome {
        let epoch = self.pointer_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let _loading = InFlight::enter(&self.loads_in_flight);
        self.lock().loading_target = None;

        log::info!("Loading best available model");

        match self.backend.load_best_model().await {
            Ok(true) => {}
            Ok(false) => {
                log::warn!("Backend could not load a best model");
                return LoadOutcome::Rejected;
            }
            Err(e) => {
                log::error!("Failed to load best model: {}", e);
                return LoadOutcome::Failed(e);
            }
        }

        let models = match self.refresh(Listing::Discover).await {
            Ok(models) => models,
            Err(e) => {
                log::error!("Best model loaded but the model list could not be refreshed: {}", e);
                return LoadOutcome::Failed(e);
            }
        };
        self.apply_pointer(epoch, first_loaded(&models).cloned())
    }

    fn apply_pointer(&self, epoch: u64, model: Option<Model>) -> LoadOutcome {
        let _inner = self.lock();
        if self.pointer_epoch.load(Ordering::SeqCst) != epoch {
            log::debug!("Discarding superseded load result (epoch {})", epoch);
            return LoadOutcome::Superseded;
        }
        self.current.send_replace(model.clone());
        LoadOutcome::Loaded(model)
    }

    /// Point at a model the backend announced as loaded.
    ///
    /// Counts as the newest pointer write, so loads still in flight will not
    /// override it when they resolve.
    pub fn apply_loaded_event(&self, model: Model) {
        let _inner = self.lock();
        let epoch = self.pointer_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!("Backend reports model '{}' loaded (epoch {})", model.name, epoch);
        self.current.send_replace(Some(model));
    }

    pub fn is_loading(&self) -> bool {
        self.loads_in_flight.load(Ordering::SeqCst) > 0
    }

    /// Name of the most recently requested load while any load is in flight
    pub fn loading_target(&self) -> Option<String> {
        let inner = self.lock();
        if self.is_loading() {
            inner.loading_target.clone()
        } else {
            None
        }
    }

    // ========================================================================
    // Current model
    // ========================================================================

    pub fn current_model(&self) -> Option<Model> {
        self.current.borrow().clone()
    }

    /// Watch the current-model pointer
    pub fn subscribe(&self) -> watch::Receiver<Option<Model>> {
        self.current.subscribe()
    }

    /// Backend description of the loaded model, `None` if unavailable
    pub async fn model_info(&self) -> Option<ModelInfo> {
        match self.backend.get_model_info().await {
            Ok(info) => Some(info),
            Err(e) => {
                log::warn!("Failed to get model info: {}", e);
                None
            }
        }
    }
}
