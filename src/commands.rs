//! Console commands
//!
//! Thin adapter between stdin lines and the service objects in [`AppState`].
//! Lines starting with `/` are commands; anything else is a chat message.

use crate::chat::{ChatMessage, SendOutcome};
use crate::models::ModelState;
use crate::state::AppState;

pub const HELP: &str = "\
Commands:
  /models        list discovered models
  /refresh       rediscover models
  /load <name>   load a model by name
  /best          let the backend pick and load a model
  /status        show loader and model status
  /info          show backend info for the loaded model
  /clear         clear the conversation
  /help          show this help
  /quit          exit
Anything else is sent to the loaded model.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Models,
    Refresh,
    Load(String),
    Best,
    Status,
    Info,
    Clear,
    Help,
    Quit,
    Chat(String),
}

impl ConsoleCommand {
    /// Parse one input line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(ConsoleCommand::Chat(line.to_string())));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match name {
            "models" => ConsoleCommand::Models,
            "refresh" => ConsoleCommand::Refresh,
            "load" if arg.is_empty() => return Err("Usage: /load <model name>".to_string()),
            "load" => ConsoleCommand::Load(arg.to_string()),
            "best" => ConsoleCommand::Best,
            "status" => ConsoleCommand::Status,
            "info" => ConsoleCommand::Info,
            "clear" => ConsoleCommand::Clear,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(format!("Unknown command: /{} (try /help)", other)),
        };
        Ok(Some(command))
    }
}

fn format_size(size_mb: u64) -> String {
    if size_mb < 1024 {
        format!("{} MB", size_mb)
    } else {
        format!("{:.1} GB", size_mb as f64 / 1024.0)
    }
}

fn format_reply(message: &ChatMessage) -> String {
    format!("assistant> {}", message.content)
}

/// Run a command and return the text to print
pub async fn execute(state: &AppState, command: ConsoleCommand) -> String {
    match command {
        ConsoleCommand::Models => list_models(state),
        ConsoleCommand::Refresh => {
            state.loader.discover().await;
            list_models(state)
        }
        ConsoleCommand::Load(name) => {
            if state.select_model(&name).await {
                format!("Loaded {}", name)
            } else {
                format!("Failed to load {}", name)
            }
        }
        ConsoleCommand::Best => {
            if state.loader.load_best().await {
                match state.loader.current_model() {
                    Some(model) => format!("Loaded {}", model.name),
                    None => "Backend loaded a model but did not report which".to_string(),
                }
            } else {
                "No model could be loaded".to_string()
            }
        }
        ConsoleCommand::Status => status(state),
        ConsoleCommand::Info => match state.loader.model_info().await {
            Some(info) => serde_json::to_string_pretty(&info).unwrap_or_else(|_| info.to_string()),
            None => "No model info available".to_string(),
        },
        ConsoleCommand::Clear => {
            state.chat.clear().await;
            "Conversation cleared".to_string()
        }
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => String::new(),
        ConsoleCommand::Chat(text) => match state.chat.send(&text).await {
            Ok(SendOutcome::Replied(reply)) | Ok(SendOutcome::Failed(reply)) => format_reply(&reply),
            Ok(SendOutcome::Discarded) => "(reply discarded, conversation was cleared)".to_string(),
            Err(e) => format!("Cannot send: {}", e),
        },
    }
}

fn list_models(state: &AppState) -> String {
    let models = state.loader.available_models();
    if models.is_empty() {
        return "No models discovered".to_string();
    }
    let current = state.loader.current_model().map(|m| m.name);

    models
        .iter()
        .map(|m| {
            let marker = if current.as_deref() == Some(m.name.as_str()) { "*" } else { " " };
            let mut line = format!("{} {} [{}] {}", marker, m.name, m.format, format_size(m.size_mb));
            if !m.description.is_empty() {
                line.push_str(" - ");
                line.push_str(&m.description);
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn status(state: &AppState) -> String {
    let mut lines = vec![state.activity().to_string()];
    for status in state.status.all() {
        let mut line = format!("  {} ({:?}): {}", status.name, status.kind, status.state.as_str());
        if let Some(progress) = status.progress {
            line.push_str(&format!(" {:.0}%", progress * 100.0));
        }
        if let (ModelState::Error, Some(error)) = (status.state, &status.error) {
            line.push_str(&format!(" - {}", error));
        }
        lines.push(line);
    }
    lines.join("\n")
}
