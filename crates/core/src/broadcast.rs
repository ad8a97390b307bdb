use serde::Serialize;
use tracing::{info, warn};

use crate::platform::MessagingClient;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Posts `text` to every channel the bot is a member of. A channel that
/// rejects the post is counted and skipped.
pub async fn broadcast(client: &dyn MessagingClient, text: &str) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    let channels = match client.list_member_channels().await {
        Ok(channels) => channels,
        Err(error) => {
            warn!(
                event_name = "broadcast.list_failed",
                correlation_id = "bootstrap",
                operation = error.method(),
                error = %error,
                "could not list channels for broadcast"
            );
            report.failed += 1;
            return report;
        }
    };

    for channel_id in channels {
        match client.post_message(&channel_id, text).await {
            Ok(()) => {
                let channel_name = client
                    .channel_name(&channel_id)
                    .await
                    .unwrap_or_else(|_| "unknown channel".to_owned());
                info!(
                    event_name = "broadcast.delivered",
                    correlation_id = "bootstrap",
                    channel_id = %channel_id,
                    channel_name = %channel_name,
                    "posted notice"
                );
                report.delivered += 1;
            }
            Err(error) => {
                warn!(
                    event_name = "broadcast.post_failed",
                    correlation_id = "bootstrap",
                    channel_id = %channel_id,
                    operation = error.method(),
                    error = %error,
                    "failed to post notice"
                );
                report.failed += 1;
            }
        }
    }

    report
}
