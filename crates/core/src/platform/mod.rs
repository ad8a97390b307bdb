//! Messaging-platform capability consumed by moderation.
//!
//! The core never talks to Slack directly; it only sees this trait. The Slack
//! adapter lives in `checksweep-slack`, and [`memory::InMemoryWorkspace`] backs
//! the tests.

pub mod memory;

use async_trait::async_trait;

use crate::domain::message::{ChannelId, MessageIdentity, MessageSummary, UserId};
use crate::errors::ApiError;

#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Channels (public and private) the bot is a member of.
    async fn list_member_channels(&self) -> Result<Vec<ChannelId>, ApiError>;

    /// Most recent messages of a channel, newest first, at most `page_size`.
    async fn channel_history(
        &self,
        channel_id: &ChannelId,
        page_size: u32,
    ) -> Result<Vec<MessageSummary>, ApiError>;

    /// Text of one message, for logging. `Ok(None)` when the message has no text.
    async fn message_text(&self, identity: &MessageIdentity) -> Result<Option<String>, ApiError>;

    /// Reaction names currently attached to a message. Fails with
    /// [`ApiError::NotFound`] when the message no longer exists.
    async fn reactions(&self, identity: &MessageIdentity) -> Result<Vec<String>, ApiError>;

    async fn user_display_name(&self, user_id: &UserId) -> Result<String, ApiError>;

    async fn channel_name(&self, channel_id: &ChannelId) -> Result<String, ApiError>;

    async fn post_message(&self, channel_id: &ChannelId, text: &str) -> Result<(), ApiError>;

    async fn delete_message(&self, identity: &MessageIdentity) -> Result<(), ApiError>;
}
