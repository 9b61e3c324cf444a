//! Deadline decorator for backend calls
//!
//! An unresponsive backend must never wedge the client: every operation is
//! wrapped in a wall-clock timeout chosen per operation class.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::provider::{ops, BackendError, ModelBackend};
use super::types::{Model, ModelInfo};
use crate::settings::{AppSettings, RecentProject};

/// Per-operation deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTimeouts {
    /// Discovery, info, settings, clear
    pub default: Duration,
    /// load_model_by_name / load_best_model
    pub load: Duration,
    /// generate_response
    pub generate: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(30),
            load: Duration::from_secs(300),
            generate: Duration::from_secs(300),
        }
    }
}

pub struct TimedBackend {
    inner: Arc<dyn ModelBackend>,
    timeouts: CallTimeouts,
}

impl TimedBackend {
    pub fn new(inner: Arc<dyn ModelBackend>, timeouts: CallTimeouts) -> Self {
        Self { inner, timeouts }
    }

    pub fn timeouts(&self) -> CallTimeouts {
        self.timeouts
    }

    async fn timed<T, F>(&self, operation: &str, after: Duration, call: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>> + Send,
    {
        let started = Instant::now();
        let result = match tokio::time::timeout(after, call).await {
            Ok(result) => result,
            Err(_) => {
                log::error!("Backend call '{}' timed out after {:?}", operation, after);
                Err(BackendError::Timeout {
                    operation: operation.to_string(),
                    after,
                })
            }
        };
        log::debug!(
            "Backend call '{}' finished in {}ms (ok: {})",
            operation,
            started.elapsed().as_millis(),
            result.is_ok()
        );
        result
    }
}

#[async_trait]
impl ModelBackend for TimedBackend {
    async fn discover_models(&self) -> Result<Vec<Model>, BackendError> {
        self.timed(ops::DISCOVER_MODELS, self.timeouts.default, self.inner.discover_models())
            .await
    }

    async fn get_available_models(&self) -> Result<Vec<Model>, BackendError> {
        self.timed(
            ops::GET_AVAILABLE_MODELS,
            self.timeouts.default,
            self.inner.get_available_models(),
        )
        .await
    }

    async fn load_model_by_name(&self, model_name: &str) -> Result<bool, BackendError> {
        self.timed(
            ops::LOAD_MODEL_BY_NAME,
            self.timeouts.load,
            self.inner.load_model_by_name(model_name),
        )
        .await
    }

    async fn load_best_model(&self) -> Result<bool, BackendError> {
        self.timed(ops::LOAD_BEST_MODEL, self.timeouts.load, self.inner.load_best_model())
            .await
    }

    async fn generate_response(&self, message: &str) -> Result<String, BackendError> {
        self.timed(
            ops::GENERATE_RESPONSE,
            self.timeouts.generate,
            self.inner.generate_response(message),
        )
        .await
    }

    async fn get_model_info(&self) -> Result<ModelInfo, BackendError> {
        self.timed(ops::GET_MODEL_INFO, self.timeouts.default, self.inner.get_model_info())
            .await
    }

    async fn clear_conversation(&self) -> Result<(), BackendError> {
        self.timed(
            ops::CLEAR_CONVERSATION,
            self.timeouts.default,
            self.inner.clear_conversation(),
        )
        .await
    }

    async fn get_settings(&self) -> Result<AppSettings, BackendError> {
        self.timed(ops::GET_SETTINGS, self.timeouts.default, self.inner.get_settings())
            .await
    }

    async fn get_recent_projects(&self, limit: usize) -> Result<Vec<RecentProject>, BackendError> {
        self.timed(
            ops::GET_RECENT_PROJECTS,
            self.timeouts.default,
            self.inner.get_recent_projects(limit),
        )
        .await
    }

    async fn discover_embedding_models(&self) -> Result<Vec<Model>, BackendError> {
        self.timed(
            ops::DISCOVER_EMBEDDING_MODELS,
            self.timeouts.default,
            self.inner.discover_embedding_models(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;

    fn timed(fake: &Arc<FakeBackend>) -> TimedBackend {
        TimedBackend::new(
            fake.clone(),
            CallTimeouts {
                default: Duration::from_secs(5),
                load: Duration::from_secs(60),
                generate: Duration::from_secs(120),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_discovery_times_out() {
        let fake = Arc::new(FakeBackend::new());
        let _gate = fake.hold_next(ops::DISCOVER_MODELS);

        let result = timed(&fake).discover_models().await;
        assert_eq!(
            result,
            Err(BackendError::Timeout {
                operation: ops::DISCOVER_MODELS.to_string(),
                after: Duration::from_secs(5),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_uses_load_deadline() {
        let fake = Arc::new(FakeBackend::new());
        let _gate = fake.hold_next(ops::LOAD_MODEL_BY_NAME);

        let result = timed(&fake).load_model_by_name("phi-2").await;
        assert!(matches!(
            result,
            Err(BackendError::Timeout { after, .. }) if after == Duration::from_secs(60)
        ));
    }

    #[tokio::test]
    async fn test_fast_calls_pass_through() {
        let fake = Arc::new(FakeBackend::new());
        fake.set_models(vec![Model::named("phi-2")]);

        let models = timed(&fake).discover_models().await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(fake.calls(ops::DISCOVER_MODELS), 1);
    }
}
