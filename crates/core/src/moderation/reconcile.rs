use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::message::{ChannelId, ReviewCandidate};
use crate::errors::ApiError;
use crate::platform::MessagingClient;

use super::coordinator::{Admission, ReviewCoordinator, ReviewOutcome};

pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelFailure {
    /// `None` when listing the channels themselves failed.
    pub channel_id: Option<ChannelId>,
    pub operation: String,
    pub error: String,
}

impl ChannelFailure {
    fn new(channel_id: Option<ChannelId>, error: &ApiError) -> Self {
        Self { channel_id, operation: error.method().to_owned(), error: error.to_string() }
    }
}

/// Messages currently carrying the target reaction, as found in history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CandidateScan {
    pub channels_scanned: usize,
    pub candidates: Vec<ReviewCandidate>,
    pub failures: Vec<ChannelFailure>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub channels_scanned: usize,
    pub channels_failed: usize,
    pub candidates: usize,
    pub skipped: usize,
    pub retained: usize,
    pub deleted: usize,
    pub delete_failed: usize,
    pub evidence_unavailable: usize,
    pub aborted: usize,
}

impl ScanReport {
    fn record(&mut self, outcome: ReviewOutcome) {
        match outcome {
            ReviewOutcome::Skipped => self.skipped += 1,
            ReviewOutcome::Retained => self.retained += 1,
            ReviewOutcome::DeletedOk => self.deleted += 1,
            ReviewOutcome::DeleteFailed => self.delete_failed += 1,
            ReviewOutcome::EvidenceUnavailable => self.evidence_unavailable += 1,
            ReviewOutcome::Aborted => self.aborted += 1,
        }
    }
}

/// Sweeps recent channel history for messages that picked up the target
/// reaction while nothing was listening, and feeds them to the coordinator.
///
/// Only one history page per channel is read, so reactions on older messages
/// are not covered.
pub struct ReconciliationScanner {
    client: Arc<dyn MessagingClient>,
    coordinator: Arc<ReviewCoordinator>,
    page_size: u32,
}

impl ReconciliationScanner {
    pub fn new(
        client: Arc<dyn MessagingClient>,
        coordinator: Arc<ReviewCoordinator>,
        page_size: u32,
    ) -> Self {
        Self { client, coordinator, page_size }
    }

    pub async fn find_candidates(&self) -> CandidateScan {
        let target = self.coordinator.settings().target_reaction();
        let mut scan = CandidateScan::default();

        let channels = match self.client.list_member_channels().await {
            Ok(channels) => channels,
            Err(error) => {
                warn!(
                    event_name = "moderation.reconcile.list_failed",
                    correlation_id = "reconcile",
                    operation = error.method(),
                    error = %error,
                    "failed to list member channels"
                );
                scan.failures.push(ChannelFailure::new(None, &error));
                return scan;
            }
        };

        for channel_id in channels {
            match self.client.channel_history(&channel_id, self.page_size).await {
                Ok(messages) => {
                    scan.channels_scanned += 1;
                    scan.candidates.extend(
                        messages
                            .iter()
                            .filter(|message| message.has_reaction(target))
                            .map(ReviewCandidate::from_history),
                    );
                }
                Err(error) => {
                    warn!(
                        event_name = "moderation.reconcile.channel_failed",
                        correlation_id = "reconcile",
                        channel_id = %channel_id,
                        operation = error.method(),
                        error = %error,
                        "failed to read channel history; continuing with other channels"
                    );
                    scan.failures.push(ChannelFailure::new(Some(channel_id), &error));
                }
            }
        }

        scan
    }

    /// Finds candidates, dispatches each one and waits for every scheduled
    /// review to settle.
    pub async fn run(&self) -> ScanReport {
        info!(
            event_name = "moderation.reconcile.start",
            correlation_id = "reconcile",
            page_size = self.page_size,
            "scanning channel history for existing reactions"
        );

        let scan = self.find_candidates().await;
        let mut report = ScanReport {
            channels_scanned: scan.channels_scanned,
            channels_failed: scan.failures.len(),
            candidates: scan.candidates.len(),
            ..ScanReport::default()
        };

        let mut handles = Vec::new();
        for candidate in scan.candidates {
            match self.coordinator.dispatch(candidate) {
                Admission::Scheduled(handle) => handles.push(handle),
                Admission::Skipped => report.record(ReviewOutcome::Skipped),
            }
        }
        for handle in handles {
            report.record(handle.outcome().await);
        }

        info!(
            event_name = "moderation.reconcile.finished",
            correlation_id = "reconcile",
            channels_scanned = report.channels_scanned,
            channels_failed = report.channels_failed,
            candidates = report.candidates,
            deleted = report.deleted,
            retained = report.retained,
            skipped = report.skipped,
            "reconciliation scan finished"
        );

        report
    }
}
