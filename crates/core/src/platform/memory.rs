use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::message::{
    normalize_reaction, ChannelId, MessageIdentity, MessageSummary, UserId,
};
use crate::errors::ApiError;

use super::MessagingClient;

/// In-process workspace implementing [`MessagingClient`].
///
/// Messages are kept newest first per channel. Failures can be scripted per
/// API method name (`chat.delete`, `reactions.get`, ...) either for the next
/// call only or for every call.
#[derive(Default)]
pub struct InMemoryWorkspace {
    state: RwLock<WorkspaceState>,
}

#[derive(Default)]
struct WorkspaceState {
    channels: Vec<ChannelRecord>,
    users: HashMap<UserId, String>,
    next_failures: HashMap<String, VecDeque<ApiError>>,
    sticky_failures: HashMap<String, ApiError>,
    history_failures: HashMap<ChannelId, ApiError>,
    deleted: Vec<MessageIdentity>,
    delete_attempts: usize,
    reaction_checks: usize,
    channel_listings: usize,
    posted: Vec<(ChannelId, String)>,
}

struct ChannelRecord {
    id: ChannelId,
    name: String,
    is_member: bool,
    messages: Vec<MessageSummary>,
}

impl WorkspaceState {
    fn take_failure(&mut self, method: &str) -> Option<ApiError> {
        if let Some(error) = self.sticky_failures.get(method) {
            return Some(error.clone());
        }
        self.next_failures.get_mut(method).and_then(VecDeque::pop_front)
    }

    fn channel(&self, channel_id: &ChannelId) -> Option<&ChannelRecord> {
        self.channels.iter().find(|channel| &channel.id == channel_id)
    }

    fn channel_mut(&mut self, channel_id: &ChannelId) -> Option<&mut ChannelRecord> {
        self.channels.iter_mut().find(|channel| &channel.id == channel_id)
    }

    fn message(&self, identity: &MessageIdentity) -> Option<&MessageSummary> {
        self.channel(&identity.channel_id)?
            .messages
            .iter()
            .find(|message| message.identity == *identity)
    }

    fn message_mut(&mut self, identity: &MessageIdentity) -> Option<&mut MessageSummary> {
        self.channel_mut(&identity.channel_id)?
            .messages
            .iter_mut()
            .find(|message| message.identity == *identity)
    }
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_channel(&self, id: &str, name: &str, is_member: bool) {
        let mut state = self.state.write().await;
        state.channels.push(ChannelRecord {
            id: ChannelId(id.to_owned()),
            name: name.to_owned(),
            is_member,
            messages: Vec::new(),
        });
    }

    pub async fn add_user(&self, id: &str, display_name: &str) {
        let mut state = self.state.write().await;
        state.users.insert(UserId(id.to_owned()), display_name.to_owned());
    }

    /// Posts a message as the newest in its channel. The channel must exist.
    pub async fn add_message(
        &self,
        channel_id: &str,
        ts: &str,
        author_id: &str,
        text: &str,
        reactions: &[&str],
    ) -> MessageIdentity {
        let identity = MessageIdentity::new(channel_id, ts);
        let mut state = self.state.write().await;
        if let Some(channel) = state.channel_mut(&identity.channel_id) {
            channel.messages.insert(
                0,
                MessageSummary {
                    identity: identity.clone(),
                    author_id: Some(UserId(author_id.to_owned())),
                    text: Some(text.to_owned()),
                    reactions: reactions.iter().map(|name| (*name).to_owned()).collect(),
                },
            );
        }
        identity
    }

    pub async fn add_reaction(&self, identity: &MessageIdentity, reaction: &str) {
        let mut state = self.state.write().await;
        if let Some(message) = state.message_mut(identity) {
            if !message.has_reaction(reaction) {
                message.reactions.push(reaction.to_owned());
            }
        }
    }

    pub async fn remove_reaction(&self, identity: &MessageIdentity, reaction: &str) {
        let wanted = normalize_reaction(reaction);
        let mut state = self.state.write().await;
        if let Some(message) = state.message_mut(identity) {
            message.reactions.retain(|name| normalize_reaction(name) != wanted);
        }
    }

    /// Makes the next call of `method` fail with `error`. Calls queue up.
    pub async fn fail_next(&self, method: &str, error: ApiError) {
        let mut state = self.state.write().await;
        state.next_failures.entry(method.to_owned()).or_default().push_back(error);
    }

    /// Makes every call of `method` fail with `error`.
    pub async fn fail_always(&self, method: &str, error: ApiError) {
        let mut state = self.state.write().await;
        state.sticky_failures.insert(method.to_owned(), error);
    }

    pub async fn fail_history_for(&self, channel_id: &str, error: ApiError) {
        let mut state = self.state.write().await;
        state.history_failures.insert(ChannelId(channel_id.to_owned()), error);
    }

    pub async fn contains(&self, identity: &MessageIdentity) -> bool {
        self.state.read().await.message(identity).is_some()
    }

    pub async fn deleted(&self) -> Vec<MessageIdentity> {
        self.state.read().await.deleted.clone()
    }

    pub async fn delete_attempts(&self) -> usize {
        self.state.read().await.delete_attempts
    }

    pub async fn reaction_checks(&self) -> usize {
        self.state.read().await.reaction_checks
    }

    pub async fn channel_listings(&self) -> usize {
        self.state.read().await.channel_listings
    }

    pub async fn posted(&self) -> Vec<(ChannelId, String)> {
        self.state.read().await.posted.clone()
    }
}

#[async_trait]
impl MessagingClient for InMemoryWorkspace {
    async fn list_member_channels(&self) -> Result<Vec<ChannelId>, ApiError> {
        let mut state = self.state.write().await;
        state.channel_listings += 1;
        if let Some(error) = state.take_failure("conversations.list") {
            return Err(error);
        }
        Ok(state
            .channels
            .iter()
            .filter(|channel| channel.is_member)
            .map(|channel| channel.id.clone())
            .collect())
    }

    async fn channel_history(
        &self,
        channel_id: &ChannelId,
        page_size: u32,
    ) -> Result<Vec<MessageSummary>, ApiError> {
        let mut state = self.state.write().await;
        if let Some(error) = state.history_failures.get(channel_id) {
            return Err(error.clone());
        }
        if let Some(error) = state.take_failure("conversations.history") {
            return Err(error);
        }
        let channel = state
            .channel(channel_id)
            .ok_or_else(|| ApiError::not_found("conversations.history", "channel_not_found"))?;
        Ok(channel.messages.iter().take(page_size as usize).cloned().collect())
    }

    async fn message_text(&self, identity: &MessageIdentity) -> Result<Option<String>, ApiError> {
        let mut state = self.state.write().await;
        if let Some(error) = state.take_failure("conversations.history") {
            return Err(error);
        }
        Ok(state.message(identity).and_then(|message| message.text.clone()))
    }

    async fn reactions(&self, identity: &MessageIdentity) -> Result<Vec<String>, ApiError> {
        let mut state = self.state.write().await;
        state.reaction_checks += 1;
        if let Some(error) = state.take_failure("reactions.get") {
            return Err(error);
        }
        state
            .message(identity)
            .map(|message| message.reactions.clone())
            .ok_or_else(|| ApiError::not_found("reactions.get", "message_not_found"))
    }

    async fn user_display_name(&self, user_id: &UserId) -> Result<String, ApiError> {
        let mut state = self.state.write().await;
        if let Some(error) = state.take_failure("users.info") {
            return Err(error);
        }
        state
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| ApiError::platform("users.info", "user_not_found"))
    }

    async fn channel_name(&self, channel_id: &ChannelId) -> Result<String, ApiError> {
        let mut state = self.state.write().await;
        if let Some(error) = state.take_failure("conversations.info") {
            return Err(error);
        }
        state
            .channel(channel_id)
            .map(|channel| channel.name.clone())
            .ok_or_else(|| ApiError::platform("conversations.info", "channel_not_found"))
    }

    async fn post_message(&self, channel_id: &ChannelId, text: &str) -> Result<(), ApiError> {
        let mut state = self.state.write().await;
        if let Some(error) = state.take_failure("chat.postMessage") {
            return Err(error);
        }
        if state.channel(channel_id).is_none() {
            return Err(ApiError::platform("chat.postMessage", "channel_not_found"));
        }
        state.posted.push((channel_id.clone(), text.to_owned()));
        Ok(())
    }

    async fn delete_message(&self, identity: &MessageIdentity) -> Result<(), ApiError> {
        let mut state = self.state.write().await;
        state.delete_attempts += 1;
        if let Some(error) = state.take_failure("chat.delete") {
            return Err(error);
        }
        let channel = state
            .channel_mut(&identity.channel_id)
            .ok_or_else(|| ApiError::platform("chat.delete", "channel_not_found"))?;
        let before = channel.messages.len();
        channel.messages.retain(|message| message.identity != *identity);
        if channel.messages.len() == before {
            return Err(ApiError::platform("chat.delete", "message_not_found"));
        }
        state.deleted.push(identity.clone());
        Ok(())
    }
}
