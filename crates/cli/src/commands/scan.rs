use std::path::Path;
use std::sync::Arc;

use checksweep_core::config::AppConfig;
use checksweep_core::moderation::{CandidateScan, ReconciliationScanner, ReviewCoordinator};
use checksweep_core::platform::MessagingClient;
use checksweep_slack::web::SlackWebClient;
use serde::Serialize;

use crate::commands::{load_options, runtime, CommandResult};

/// What a reconciliation pass would hand to the coordinator right now.
#[derive(Debug, Serialize)]
pub struct ScanPreview {
    pub target_reaction: String,
    #[serde(flatten)]
    pub scan: CandidateScan,
}

pub fn run(config_path: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("scan", "config_validation", error.to_string(), 2)
        }
    };

    let client = match SlackWebClient::new(&config.slack) {
        Ok(client) => Arc::new(client),
        Err(error) => return CommandResult::failure("scan", "slack_client", error.to_string(), 3),
    };

    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::failure("scan", "runtime", error.to_string(), 4),
    };

    let preview = runtime.block_on(preview(client, &config));
    let exit_code = if preview.scan.failures.is_empty() { 0 } else { 1 };
    match serde_json::to_string_pretty(&preview) {
        Ok(output) => CommandResult { exit_code, output },
        Err(error) => CommandResult::failure("scan", "serialization", error.to_string(), 5),
    }
}

/// Runs the candidate search of a reconciliation pass without dispatching
/// anything, so no message is reviewed or deleted.
pub async fn preview(client: Arc<dyn MessagingClient>, config: &AppConfig) -> ScanPreview {
    let coordinator =
        Arc::new(ReviewCoordinator::new(client.clone(), config.moderation.review_settings()));
    let scanner =
        ReconciliationScanner::new(client, coordinator, config.moderation.history_page_size);

    ScanPreview {
        target_reaction: config.moderation.target_reaction.clone(),
        scan: scanner.find_candidates().await,
    }
}
