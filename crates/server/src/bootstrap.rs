use std::sync::Arc;

use checksweep_core::config::{AppConfig, ConfigError};
use checksweep_core::errors::ApiError;
use checksweep_core::moderation::{ReconciliationScanner, ReviewCoordinator};
use checksweep_core::platform::MessagingClient;
use checksweep_slack::events::moderation_dispatcher;
use checksweep_slack::socket::{ReconnectPolicy, SocketModeRunner, SocketTransport};
use checksweep_slack::transport::SlackSocketTransport;
use checksweep_slack::web::SlackWebClient;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub client: Arc<dyn MessagingClient>,
    pub coordinator: Arc<ReviewCoordinator>,
    pub scanner: Arc<ReconciliationScanner>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("slack client setup failed: {0}")]
    SlackClient(#[source] ApiError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let web = Arc::new(SlackWebClient::new(&config.slack).map_err(BootstrapError::SlackClient)?);
    let transport = Arc::new(SlackSocketTransport::new(web.clone()));
    info!(
        event_name = "system.bootstrap.slack_client_ready",
        correlation_id = "bootstrap",
        api_base_url = %config.slack.api_base_url,
        "slack web client initialized"
    );

    Ok(assemble(config, web, transport))
}

/// Wires moderation around an arbitrary client and transport.
pub fn assemble(
    config: AppConfig,
    client: Arc<dyn MessagingClient>,
    transport: Arc<dyn SocketTransport>,
) -> Application {
    let coordinator =
        Arc::new(ReviewCoordinator::new(client.clone(), config.moderation.review_settings()));
    let scanner = Arc::new(ReconciliationScanner::new(
        client.clone(),
        coordinator.clone(),
        config.moderation.history_page_size,
    ));
    let slack_runner = SocketModeRunner::new(
        transport,
        moderation_dispatcher(coordinator.clone()),
        ReconnectPolicy::default(),
    )
    .with_reconciler(scanner.clone());

    info!(
        event_name = "system.bootstrap.moderation_ready",
        correlation_id = "bootstrap",
        reaction = coordinator.settings().target_reaction(),
        delay_secs = coordinator.settings().confirmation_delay().as_secs(),
        history_page_size = config.moderation.history_page_size,
        "moderation pipeline assembled"
    );

    Application { config, client, coordinator, scanner, slack_runner }
}
