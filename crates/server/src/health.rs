use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use checksweep_core::moderation::{ReviewCoordinator, ReviewStats};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    coordinator: Arc<ReviewCoordinator>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub moderation: ReviewStats,
    pub checked_at: String,
}

pub fn router(coordinator: Arc<ReviewCoordinator>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { coordinator })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    coordinator: Arc<ReviewCoordinator>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(coordinator)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let settings = state.coordinator.settings();
    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: format!(
                "watching :{}: with a {}s confirmation delay",
                settings.target_reaction(),
                settings.confirmation_delay().as_secs()
            ),
        },
        moderation: state.coordinator.stats(),
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
