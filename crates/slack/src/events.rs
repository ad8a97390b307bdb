use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use checksweep_core::domain::message::{
    normalize_reaction, MessageIdentity, ReviewCandidate, ReviewSource, UserId,
};
use checksweep_core::moderation::{Admission, ReviewCoordinator};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    ReactionAdded(ReactionAddedEvent),
    Other { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::ReactionAdded(_) => SlackEventType::ReactionAdded,
            Self::Other { .. } => SlackEventType::Other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    ReactionAdded,
    Other,
}

/// A reaction added to a message. Reactions on files never reach this type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionAddedEvent {
    pub channel_id: String,
    pub message_ts: String,
    pub reaction: String,
    /// User who added the reaction.
    pub user_id: Option<String>,
    /// Author of the reacted-to message.
    pub item_user: Option<String>,
}

/// One text frame received over the Socket Mode connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: Option<String> },
    Envelope(SlackEnvelope),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("socket frame is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("socket frame of type `{frame_type}` has no envelope id")]
    MissingEnvelopeId { frame_type: String },
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: String,
    envelope_id: Option<String>,
    reason: Option<String>,
    payload: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawEventCallback {
    event: RawEvent,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    user: Option<String>,
    reaction: Option<String>,
    item_user: Option<String>,
    item: Option<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(rename = "type")]
    item_type: String,
    channel: Option<String>,
    ts: Option<String>,
}

impl SocketFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let RawFrame { frame_type, envelope_id, reason, payload } = serde_json::from_str(text)?;
        match frame_type.as_str() {
            "hello" => return Ok(Self::Hello),
            "disconnect" => return Ok(Self::Disconnect { reason }),
            _ => {}
        }

        let Some(envelope_id) = envelope_id else {
            return Err(FrameError::MissingEnvelopeId { frame_type });
        };
        let event = match (frame_type.as_str(), payload) {
            ("events_api", Some(payload)) => event_from_payload(payload),
            _ => SlackEvent::Other { event_type: frame_type.clone() },
        };
        Ok(Self::Envelope(SlackEnvelope { envelope_id, event }))
    }
}

impl SlackEnvelope {
    /// Parses an envelope frame. Control frames (`hello`, `disconnect`) yield `None`.
    pub fn from_socket_payload(text: &str) -> Result<Option<Self>, FrameError> {
        Ok(match SocketFrame::parse(text)? {
            SocketFrame::Envelope(envelope) => Some(envelope),
            SocketFrame::Hello | SocketFrame::Disconnect { .. } => None,
        })
    }
}

fn event_from_payload(payload: serde_json::Value) -> SlackEvent {
    let event = match serde_json::from_value::<RawEventCallback>(payload) {
        Ok(callback) => callback.event,
        Err(_) => return SlackEvent::Other { event_type: "undecodable".to_owned() },
    };

    if event.event_type != "reaction_added" {
        return SlackEvent::Other { event_type: event.event_type };
    }

    let Some(RawItem { item_type, channel: Some(channel_id), ts: Some(message_ts) }) = event.item
    else {
        return SlackEvent::Other { event_type: event.event_type };
    };
    match event.reaction {
        Some(reaction) if item_type == "message" => {
            SlackEvent::ReactionAdded(ReactionAddedEvent {
                channel_id,
                message_ts,
                reaction,
                user_id: event.user,
                item_user: event.item_user,
            })
        }
        _ => SlackEvent::Other { event_type: event.event_type },
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// A review was admitted and runs in the background.
    Scheduled,
    /// The message is already under review or was deleted.
    Skipped,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("{handler} handler failed: {detail}")]
    Failed { handler: &'static str, detail: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn moderation_dispatcher(coordinator: Arc<ReviewCoordinator>) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ReactionIngestor::new(coordinator));
    dispatcher
}

/// Turns `reaction_added` events carrying the target reaction into review
/// candidates. Admission happens before `handle` returns; the confirmation
/// window runs on a spawned task.
pub struct ReactionIngestor {
    coordinator: Arc<ReviewCoordinator>,
}

impl ReactionIngestor {
    pub fn new(coordinator: Arc<ReviewCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl EventHandler for ReactionIngestor {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ReactionAdded
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ReactionAdded(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        if normalize_reaction(&event.reaction) != self.coordinator.settings().target_reaction() {
            debug!(
                event_name = "ingress.slack.reaction_ignored",
                channel_id = %event.channel_id,
                message_ts = %event.message_ts,
                correlation_id = %ctx.correlation_id,
                reaction = %event.reaction,
                "reaction is not the moderation trigger"
            );
            return Ok(HandlerResult::Ignored);
        }

        if event.channel_id.trim().is_empty() || event.message_ts.trim().is_empty() {
            return Err(EventHandlerError::Failed {
                handler: "reaction_added",
                detail: format!(
                    "reaction `{}` names no message (channel `{}`, ts `{}`)",
                    event.reaction, event.channel_id, event.message_ts
                ),
            });
        }

        let candidate = ReviewCandidate {
            identity: MessageIdentity::new(event.channel_id.as_str(), event.message_ts.as_str()),
            source: ReviewSource::LiveEvent { correlation_id: ctx.correlation_id.clone() },
            author_id: event.item_user.clone().map(UserId),
            reactor_id: event.user_id.clone().map(UserId),
            text: None,
        };

        Ok(match self.coordinator.dispatch(candidate) {
            Admission::Scheduled(_) => HandlerResult::Scheduled,
            Admission::Skipped => HandlerResult::Skipped,
        })
    }
}
