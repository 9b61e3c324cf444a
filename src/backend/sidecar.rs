//! Sidecar backend
//!
//! The model-serving backend runs as a separate process. It is spawned with
//! piped stdin/stdout and spoken to over JSON-RPC; its stderr goes straight to
//! ours so its own logs stay visible.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

/// Windows flag to prevent console window from appearing
#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

use super::provider::{ops, BackendError, ModelBackend};
use super::rpc::RpcChannel;
use super::types::{Model, ModelInfo};
use crate::events::EventBus;
use crate::settings::{AppSettings, RecentProject};

pub struct SidecarBackend {
    channel: RpcChannel,
    child: Mutex<Option<Child>>,
}

impl SidecarBackend {
    /// Spawn the backend process and connect to it
    pub async fn spawn(command: &str, args: &[String], events: EventBus) -> Result<Self> {
        log::info!("Starting backend: {} {:?}", command, args);

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        #[cfg(target_os = "windows")]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn backend: {} {:?}", command, args))?;

        let stdin = child.stdin.take().context("Failed to get backend stdin")?;
        let stdout = child.stdout.take().context("Failed to get backend stdout")?;

        let mut backend = Self::connect(stdout, stdin, events);
        backend.child = Mutex::new(Some(child));

        log::info!("Backend started");
        Ok(backend)
    }

    /// Talk to a backend over an already-open stream pair
    pub fn connect<R, W>(reader: R, writer: W, events: EventBus) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let channel = RpcChannel::new(
            reader,
            writer,
            Box::new(move |notification| events.publish_notification(notification)),
        );
        Self {
            channel,
            child: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.channel.is_closed()
    }

    /// Stop reading and terminate the process
    pub async fn shutdown(&self) {
        self.channel.shutdown();
        if let Some(mut child) = self.child.lock().await.take() {
            log::info!("Stopping backend process");
            if let Err(e) = child.kill().await {
                log::warn!("Failed to kill backend process: {}", e);
            }
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, BackendError> {
        let value = self.channel.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| BackendError::Protocol(format!("Invalid '{}' response: {}", method, e)))
    }
}

#[async_trait]
impl ModelBackend for SidecarBackend {
    async fn discover_models(&self) -> Result<Vec<Model>, BackendError> {
        self.request(ops::DISCOVER_MODELS, None).await
    }

    async fn get_available_models(&self) -> Result<Vec<Model>, BackendError> {
        self.request(ops::GET_AVAILABLE_MODELS, None).await
    }

    async fn load_model_by_name(&self, model_name: &str) -> Result<bool, BackendError> {
        self.request(ops::LOAD_MODEL_BY_NAME, Some(json!({ "model_name": model_name })))
            .await
    }

    async fn load_best_model(&self) -> Result<bool, BackendError> {
        self.request(ops::LOAD_BEST_MODEL, None).await
    }

    async fn generate_response(&self, message: &str) -> Result<String, BackendError> {
        self.request(ops::GENERATE_RESPONSE, Some(json!({ "message": message })))
            .await
    }

    async fn get_model_info(&self) -> Result<ModelInfo, BackendError> {
        self.channel.call(ops::GET_MODEL_INFO, None).await
    }

    async fn clear_conversation(&self) -> Result<(), BackendError> {
        self.channel.call(ops::CLEAR_CONVERSATION, None).await?;
        Ok(())
    }

    async fn get_settings(&self) -> Result<AppSettings, BackendError> {
        self.request(ops::GET_SETTINGS, None).await
    }

    async fn get_recent_projects(&self, limit: usize) -> Result<Vec<RecentProject>, BackendError> {
        self.request(ops::GET_RECENT_PROJECTS, Some(json!({ "limit": limit })))
            .await
    }

    async fn discover_embedding_models(&self) -> Result<Vec<Model>, BackendError> {
        self.request(ops::DISCOVER_EMBEDDING_MODELS, None).await
    }
}
