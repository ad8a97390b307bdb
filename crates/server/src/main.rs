mod bootstrap;
mod health;
mod schedule;

use std::time::Duration;

use anyhow::Result;
use checksweep_core::broadcast::broadcast;
use checksweep_core::config::{AppConfig, LoadOptions};
use checksweep_core::platform::MessagingClient;
use tracing::{info, warn};

fn init_logging(config: &AppConfig) {
    use checksweep_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.coordinator.clone(),
    )
    .await?;

    if let Some(text) = app.config.announcements.startup_message.as_deref() {
        broadcast(app.client.as_ref(), text).await;
    }

    let periodic = app
        .config
        .moderation
        .reconcile_interval()
        .map(|interval| schedule::spawn_periodic_reconciliation(app.scanner.clone(), interval));

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        reaction = app.coordinator.settings().target_reaction(),
        "checksweep-server started"
    );

    let outcome = tokio::select! {
        result = app.slack_runner.start() => result.map_err(anyhow::Error::from),
        signal = wait_for_shutdown() => signal,
    };

    if let Some(task) = periodic {
        task.abort();
    }

    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "checksweep-server stopping"
    );

    if let Some(text) = app.config.announcements.shutdown_message.as_deref() {
        let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
        announce_shutdown(app.client.as_ref(), text, grace).await;
    }

    outcome
}

async fn announce_shutdown(client: &dyn MessagingClient, text: &str, grace: Duration) {
    if tokio::time::timeout(grace, broadcast(client, text)).await.is_err() {
        warn!(
            event_name = "system.server.shutdown_notice_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "shutdown notice did not finish before the grace period"
        );
    }
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    info!(event_name = "system.server.signal", correlation_id = "shutdown", "shutdown requested");
    Ok(())
}
