//! Orchestrator configuration
//!
//! Read from `<config dir>/rainchat/orchestrator.json` when present, then
//! overridden by `RAINCHAT_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::CallTimeouts;

pub const ENV_BACKEND: &str = "RAINCHAT_BACKEND";
pub const ENV_CALL_TIMEOUT_SECS: &str = "RAINCHAT_CALL_TIMEOUT_SECS";
pub const ENV_LOG: &str = "RAINCHAT_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Backend executable to spawn
    pub backend_command: String,
    pub backend_args: Vec<String>,
    pub call_timeout_secs: u64,
    pub load_timeout_secs: u64,
    pub generate_timeout_secs: u64,
    pub recent_projects_limit: usize,
    /// Default `env_logger` filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backend_command: "rainchat-backend".to_string(),
            backend_args: Vec::new(),
            call_timeout_secs: 30,
            load_timeout_secs: 300,
            generate_timeout_secs: 300,
            recent_projects_limit: 10,
            log_filter: "info".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rainchat").join("orchestrator.json"))
    }

    /// Config file (if any) plus process environment
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply `RAINCHAT_*` overrides; unparsable values are logged and skipped
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(command) = lookup(ENV_BACKEND).filter(|v| !v.trim().is_empty()) {
            self.backend_command = command;
        }
        if let Some(raw) = lookup(ENV_CALL_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.call_timeout_secs = secs,
                _ => log::warn!("Ignoring invalid {}={}", ENV_CALL_TIMEOUT_SECS, raw),
            }
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.log_filter = filter;
        }
    }

    pub fn call_timeouts(&self) -> CallTimeouts {
        CallTimeouts {
            default: Duration::from_secs(self.call_timeout_secs),
            load: Duration::from_secs(self.load_timeout_secs),
            generate: Duration::from_secs(self.generate_timeout_secs),
        }
    }
}
