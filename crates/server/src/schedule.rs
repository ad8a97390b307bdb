use std::sync::Arc;
use std::time::Duration;

use checksweep_core::moderation::ReconciliationScanner;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Re-runs the history scan every `interval`. The first run happens one full
/// interval after spawning, since every socket connect already triggers one.
pub fn spawn_periodic_reconciliation(
    scanner: Arc<ReconciliationScanner>,
    interval: Duration,
) -> JoinHandle<()> {
    info!(
        event_name = "moderation.reconcile.schedule",
        correlation_id = "reconcile",
        interval_secs = interval.as_secs(),
        "periodic reconciliation enabled"
    );

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer.tick().await;

        loop {
            timer.tick().await;
            scanner.run().await;
        }
    })
}
