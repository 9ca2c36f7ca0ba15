//! `chorus run`: supervise all enabled agents until Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use chorus_agent::{DefaultRuntimeFactory, Supervisor};
use chorus_config::{AppConfig, FileConfigSource};
use chorus_core::{DomainEvent, EventBus};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

pub async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        AppConfig::load_from(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    println!("Chorus supervisor starting");
    println!("   Config: {}", config_path.display());
    println!("   Feed: {}", config.feed.base_url);
    println!(
        "   Agents: {} configured, {} enabled",
        config.agents.len(),
        config.active_agents().count()
    );
    println!("   Refresh: every {}s", config.supervisor.refresh_interval_secs);

    let events = EventBus::new(256);
    tokio::spawn(log_events(events.subscribe()));

    let factory = Arc::new(DefaultRuntimeFactory::new(config.clone(), events.clone())?);
    let source = Arc::new(FileConfigSource::new(config_path));
    let mut supervisor = Supervisor::new(factory, source, config.supervisor.clone(), events);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, stopping agents"),
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C, stopping"),
        }
        let _ = shutdown_tx.send(true);
    });

    supervisor.run(shutdown_rx).await;

    for status in supervisor.status() {
        if let Some(reason) = status.failed_to_start {
            println!("   ❌ {}: {reason}", status.agent_id);
        }
    }
    println!("Chorus supervisor stopped");
    Ok(())
}

/// Mirror domain events into the log.
async fn log_events(mut rx: broadcast::Receiver<Arc<DomainEvent>>) {
    loop {
        match rx.recv().await {
            Ok(event) => log_event(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::TriggerFired { agent_id, kind, message_id, .. } => {
            debug!(agent_id = %agent_id, kind = %kind, message_id = %message_id, "event: trigger fired");
        }
        DomainEvent::ToolExecuted { agent_id, tool_name, success, duration_ms, .. } => {
            debug!(agent_id = %agent_id, tool = %tool_name, success, duration_ms, "event: tool executed");
        }
        DomainEvent::ReplyPosted { agent_id, message_id, rounds, .. } => {
            debug!(agent_id = %agent_id, message_id = %message_id, rounds, "event: reply posted");
        }
        DomainEvent::RuntimeCrashed { agent_id, error_message, restart_in_ms, .. } => {
            warn!(agent_id = %agent_id, error = %error_message, restart_in_ms, "event: runtime crashed");
        }
        other => debug!(agent_id = other.agent_id(), "event: {other:?}"),
    }
}
