use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use checksweep_core::moderation::ReconciliationScanner;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::events::{EventContext, EventDispatcher, HandlerResult, SlackEnvelope, SlackEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
    #[error("session closed after {lasted_ms}ms without delivering an envelope")]
    ClosedEarly { lasted_ms: u64 },
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("socket mode subscription lost after {attempts} failed attempts: {last_error}")]
    SubscriptionLost { attempts: u32, last_error: TransportError },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// A session that delivers nothing and ends sooner than this counts as a
    /// failed attempt rather than a clean close.
    pub min_session_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000, min_session_ms: 10_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Source of Socket Mode envelopes. `next_envelope` returning `Ok(None)`
/// means the server ended the session and a reconnect is expected.
#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Keeps the Socket Mode subscription alive and feeds every envelope to the
/// dispatcher.
///
/// Each envelope is acknowledged exactly once, after dispatch, whether or not
/// dispatch succeeded. Transport errors and sessions that close early without
/// delivering anything back off and count against the policy; a session that
/// stays up or delivers an envelope clears the count.
pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
    reconciler: Option<Arc<ReconciliationScanner>>,
    reconciliation: Mutex<Option<JoinHandle<()>>>,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            reconnect_policy,
            reconciler: None,
            reconciliation: Mutex::new(None),
        }
    }

    /// Runs a history scan in the background after every successful connect,
    /// covering reactions added while the subscription was down. A connect
    /// while the previous scan is still running does not start another.
    pub fn with_reconciler(mut self, scanner: Arc<ReconciliationScanner>) -> Self {
        self.reconciler = Some(scanner);
        self
    }

    /// Returns only when reconnecting is no longer possible.
    pub async fn start(&self) -> Result<(), SocketError> {
        let mut consecutive_failures = 0_u32;

        loop {
            let session = self.connect_and_pump(&mut consecutive_failures).await;
            let Err(transport_error) = session else {
                info!(
                    event_name = "ingress.slack.reconnecting",
                    "socket mode session ended; reconnecting"
                );
                continue;
            };

            consecutive_failures += 1;
            warn!(
                event_name = "ingress.slack.transport_failed",
                attempt = consecutive_failures,
                max_retries = self.reconnect_policy.max_retries,
                error = %transport_error,
                "socket mode transport failed"
            );

            if consecutive_failures > self.reconnect_policy.max_retries {
                error!(
                    event_name = "ingress.slack.subscription_lost",
                    attempts = consecutive_failures,
                    error = %transport_error,
                    "socket mode retries exhausted"
                );
                return Err(SocketError::SubscriptionLost {
                    attempts: consecutive_failures,
                    last_error: transport_error,
                });
            }

            let delay = self.reconnect_policy.backoff(consecutive_failures - 1);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Resets `failures` once the session proves healthy: it delivered an
    /// envelope or stayed open for `min_session_ms`.
    async fn connect_and_pump(&self, failures: &mut u32) -> Result<(), TransportError> {
        info!(attempt = *failures, "opening socket mode transport connection");
        self.transport.connect().await?;
        let connected_at = Instant::now();
        info!(event_name = "ingress.slack.connected", "socket mode transport connected");
        self.spawn_reconciliation();

        let min_session = Duration::from_millis(self.reconnect_policy.min_session_ms);
        let mut delivered = 0_usize;
        loop {
            let next = self.transport.next_envelope().await;
            if connected_at.elapsed() >= min_session {
                *failures = 0;
            }

            let envelope = match next {
                Ok(Some(envelope)) => envelope,
                Ok(None) => {
                    info!("socket mode transport stream closed");
                    self.transport.disconnect().await?;
                    if delivered == 0 && connected_at.elapsed() < min_session {
                        let lasted_ms = connected_at.elapsed().as_millis() as u64;
                        return Err(TransportError::ClosedEarly { lasted_ms });
                    }
                    return Ok(());
                }
                Err(receive_error) => {
                    if let Err(disconnect_error) = self.transport.disconnect().await {
                        debug!(error = %disconnect_error, "disconnect after read failure failed");
                    }
                    return Err(receive_error);
                }
            };
            delivered += 1;
            *failures = 0;
            self.handle_envelope(&envelope).await;
        }
    }

    async fn handle_envelope(&self, envelope: &SlackEnvelope) {
        let (channel_id, message_ts) = correlation_fields(envelope);

        info!(
            event_name = "ingress.slack.envelope_received",
            envelope_id = %envelope.envelope_id,
            event_type = ?envelope.event.event_type(),
            correlation_id = %envelope.envelope_id,
            channel_id = channel_id.unwrap_or("unknown"),
            message_ts = message_ts.unwrap_or("unknown"),
            "received slack envelope"
        );

        let context = EventContext { correlation_id: envelope.envelope_id.clone() };
        match self.dispatcher.dispatch(envelope, &context).await {
            Ok(result) => debug!(
                event_name = "ingress.slack.dispatched",
                correlation_id = %envelope.envelope_id,
                result = handler_result_label(&result),
                "dispatched slack envelope"
            ),
            Err(error) => warn!(
                event_name = "ingress.slack.dispatch_failed",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                channel_id = channel_id.unwrap_or("unknown"),
                message_ts = message_ts.unwrap_or("unknown"),
                error = %error,
                "event dispatch failed; acknowledging anyway"
            ),
        }

        if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
            warn!(
                event_name = "ingress.slack.ack_failed",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                error = %error,
                "failed to acknowledge slack envelope"
            );
        } else {
            debug!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                "acknowledged slack envelope"
            );
        }
    }

    fn spawn_reconciliation(&self) {
        let Some(scanner) = &self.reconciler else {
            return;
        };
        let mut running = self.reconciliation.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!(
                event_name = "moderation.reconcile.already_running",
                correlation_id = "reconcile",
                "previous reconciliation still running; not starting another"
            );
            return;
        }

        let scanner = Arc::clone(scanner);
        *running = Some(tokio::spawn(async move {
            scanner.run().await;
        }));
    }
}

fn correlation_fields(envelope: &SlackEnvelope) -> (Option<&str>, Option<&str>) {
    match &envelope.event {
        SlackEvent::ReactionAdded(event) => {
            (Some(event.channel_id.as_str()), Some(event.message_ts.as_str()))
        }
        SlackEvent::Other { .. } => (None, None),
    }
}

fn handler_result_label(result: &HandlerResult) -> &'static str {
    match result {
        HandlerResult::Scheduled => "scheduled",
        HandlerResult::Skipped => "skipped",
        HandlerResult::Ignored => "ignored",
    }
}
