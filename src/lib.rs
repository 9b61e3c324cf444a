// RAIN.CHAT - model lifecycle and chat orchestration
//
// The client side of a local AI assistant:
// - Discovers, loads and switches models on a separate backend process
// - Tracks per-model status for display
// - Runs the chat send/receive/clear cycle against the loaded model

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub mod backend;
pub mod chat;
pub mod commands;
pub mod config;
pub mod events;
pub mod models;
pub mod settings;
pub mod startup;
pub mod state;

use backend::{ModelBackend, SidecarBackend, TimedBackend};
use commands::ConsoleCommand;
use config::OrchestratorConfig;
use events::EventBus;
use state::AppState;

/// Initialize env_logger to output to stderr (RUST_LOG takes precedence)
pub fn init_logging(default_filter: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init();
}

// ============== Main App Entry ==============

pub async fn run() -> Result<()> {
    let config = OrchestratorConfig::load()?;
    init_logging(&config.log_filter);
    log::info!("RAIN.CHAT starting...");

    let events = EventBus::default();
    let sidecar = Arc::new(
        SidecarBackend::spawn(&config.backend_command, &config.backend_args, events.clone()).await?,
    );
    let backend: Arc<dyn ModelBackend> =
        Arc::new(TimedBackend::new(sidecar.clone(), config.call_timeouts()));

    let state = Arc::new(AppState::new(backend, events, config.recent_projects_limit));
    let _listener = state.spawn_event_listener();

    if let Some(startup) = state.initialize().await {
        tokio::spawn(async move {
            match startup.await {
                Ok(report) => log::info!(
                    "Startup discovery finished: {} models, auto-load {:?}",
                    report.discovered,
                    report.auto_load
                ),
                Err(e) => log::error!("Startup discovery task failed: {}", e),
            }
        });
    }

    println!("RAIN.CHAT ready. Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match ConsoleCommand::parse(&line) {
            Ok(None) => continue,
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(command)) => println!("{}", commands::execute(&state, command).await),
            Err(e) => println!("{}", e),
        }
    }

    log::info!("Shutting down");
    sidecar.shutdown().await;
    Ok(())
}
