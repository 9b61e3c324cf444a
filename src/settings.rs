//! Application settings and recent projects
//!
//! Both are owned by the backend and handed to the client at startup; the
//! client only reads them, apart from keeping its own recent-project list
//! current as `project-opened` events arrive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of recent projects kept in memory
pub const RECENT_PROJECTS_CAP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(format!("Unknown theme: {}", other)),
        }
    }
}

/// The `ai` section of the settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub auto_load_model: bool,
    /// Model names in order of preference for startup auto-load
    pub preferred_models: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub theme: Theme,
    pub auto_save: bool,
    pub font_size: u32,
    pub ai: AiSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            auto_save: true,
            font_size: 14,
            ai: AiSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentProject {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(default = "Utc::now")]
    pub last_opened: DateTime<Utc>,
}

/// Most-recent-first project list, unique by path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentProjects {
    items: Vec<RecentProject>,
}

impl RecentProjects {
    pub fn from_list(mut items: Vec<RecentProject>) -> Self {
        items.truncate(RECENT_PROJECTS_CAP);
        Self { items }
    }

    /// Record that `project` was just opened
    pub fn push(&mut self, mut project: RecentProject) {
        self.items.retain(|p| p.path != project.path);
        project.last_opened = Utc::now();
        self.items.insert(0, project);
        self.items.truncate(RECENT_PROJECTS_CAP);
    }

    pub fn items(&self) -> &[RecentProject] {
        &self.items
    }
}
