use std::time::Duration;

use async_trait::async_trait;
use checksweep_core::config::SlackConfig;
use checksweep_core::domain::message::{
    ChannelId, MessageIdentity, MessageSummary, MessageTs, UserId,
};
use checksweep_core::errors::ApiError;
use checksweep_core::platform::MessagingClient;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const CHANNEL_PAGE_LIMIT: u32 = 200;

/// Which of the three Slack tokens a Web API call is made with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Channel listing and info, user info, posting.
    Bot,
    /// History, reactions and deletion of other users' messages.
    User,
    /// `apps.connections.open` only.
    App,
}

/// Slack Web API client. Calls are never retried here; a failed call surfaces
/// as an [`ApiError`] and the caller decides.
pub struct SlackWebClient {
    http: Client,
    base_url: String,
    app_token: SecretString,
    bot_token: SecretString,
    user_token: SecretString,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthIdentity {
    pub user_id: String,
    pub user: String,
    pub team: String,
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelsPage {
    #[serde(default)]
    channels: Vec<ChannelEntry>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ChannelEntry {
    id: String,
    #[serde(default)]
    is_member: bool,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct HistoryPage {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    ts: String,
    user: Option<String>,
    text: Option<String>,
    #[serde(default)]
    reactions: Vec<ReactionEntry>,
}

#[derive(Debug, Deserialize)]
struct ReactionEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ReactionsResponse {
    message: Option<ReactedMessage>,
}

#[derive(Debug, Deserialize)]
struct ReactedMessage {
    #[serde(default)]
    reactions: Vec<ReactionEntry>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    user: UserEntry,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    name: String,
    real_name: Option<String>,
    #[serde(default)]
    profile: Option<UserProfile>,
}

#[derive(Debug, Deserialize)]
struct UserProfile {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelInfoResponse {
    channel: ChannelName,
}

#[derive(Debug, Deserialize)]
struct ChannelName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpenResponse {
    url: String,
}

impl SlackWebClient {
    pub fn new(config: &SlackConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|error| ApiError::transport("client.build", error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            app_token: config.app_token.clone(),
            bot_token: config.bot_token.clone(),
            user_token: config.user_token.clone(),
        })
    }

    /// Identity behind one of the tokens (`auth.test`).
    pub async fn auth_test(&self, token: TokenKind) -> Result<AuthIdentity, ApiError> {
        self.call("auth.test", token, &[]).await
    }

    /// WebSocket URL for a new Socket Mode session (`apps.connections.open`).
    pub async fn open_socket_url(&self) -> Result<String, ApiError> {
        let response: ConnectionsOpenResponse =
            self.call("apps.connections.open", TokenKind::App, &[]).await?;
        Ok(response.url)
    }

    fn token(&self, kind: TokenKind) -> &SecretString {
        match kind {
            TokenKind::Bot => &self.bot_token,
            TokenKind::User => &self.user_token,
            TokenKind::App => &self.app_token,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        token: TokenKind,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(self.token(token).expose_secret())
            .form(params)
            .send()
            .await
            .map_err(|error| ApiError::transport(method, error.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok());
            return Err(ApiError::RateLimited { method: method.to_owned(), retry_after_secs });
        }
        if !status.is_success() {
            return Err(ApiError::transport(method, format!("http status {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|error| ApiError::decode(method, error.to_string()))?;
        parse_body(method, body)
    }
}

fn parse_body<T: DeserializeOwned>(method: &str, body: Value) -> Result<T, ApiError> {
    if body.get("ok").and_then(Value::as_bool) != Some(true) {
        let code = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
        return Err(match code {
            "message_not_found" | "channel_not_found" | "user_not_found" | "no_item_specified" => {
                ApiError::not_found(method, code)
            }
            _ => ApiError::platform(method, code),
        });
    }
    serde_json::from_value(body).map_err(|error| ApiError::decode(method, error.to_string()))
}

fn display_name(user: UserEntry) -> String {
    let profile_name = user.profile.and_then(|profile| profile.display_name);
    [user.real_name, profile_name]
        .into_iter()
        .flatten()
        .find(|name| !name.trim().is_empty())
        .unwrap_or(user.name)
}

fn summary(channel_id: &ChannelId, message: HistoryMessage) -> MessageSummary {
    MessageSummary {
        identity: MessageIdentity {
            channel_id: channel_id.clone(),
            message_ts: MessageTs(message.ts),
        },
        author_id: message.user.map(UserId),
        text: message.text,
        reactions: message.reactions.into_iter().map(|reaction| reaction.name).collect(),
    }
}

#[async_trait]
impl MessagingClient for SlackWebClient {
    async fn list_member_channels(&self) -> Result<Vec<ChannelId>, ApiError> {
        let mut channels = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut params = vec![
                ("types", "public_channel,private_channel".to_owned()),
                ("exclude_archived", "true".to_owned()),
                ("limit", CHANNEL_PAGE_LIMIT.to_string()),
            ];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.clone()));
            }

            let page: ChannelsPage =
                self.call("conversations.list", TokenKind::Bot, &params).await?;
            channels.extend(
                page.channels
                    .into_iter()
                    .filter(|channel| channel.is_member)
                    .map(|channel| ChannelId(channel.id)),
            );

            cursor = page.response_metadata.map(|meta| meta.next_cursor).unwrap_or_default();
            if cursor.is_empty() {
                return Ok(channels);
            }
        }
    }

    async fn channel_history(
        &self,
        channel_id: &ChannelId,
        page_size: u32,
    ) -> Result<Vec<MessageSummary>, ApiError> {
        let params = [("channel", channel_id.0.clone()), ("limit", page_size.to_string())];
        let page: HistoryPage =
            self.call("conversations.history", TokenKind::User, &params).await?;
        Ok(page.messages.into_iter().map(|message| summary(channel_id, message)).collect())
    }

    async fn message_text(&self, identity: &MessageIdentity) -> Result<Option<String>, ApiError> {
        let params = [
            ("channel", identity.channel_id.0.clone()),
            ("latest", identity.message_ts.0.clone()),
            ("inclusive", "true".to_owned()),
            ("limit", "1".to_owned()),
        ];
        let page: HistoryPage =
            self.call("conversations.history", TokenKind::User, &params).await?;
        Ok(page
            .messages
            .into_iter()
            .find(|message| message.ts == identity.message_ts.0)
            .and_then(|message| message.text))
    }

    async fn reactions(&self, identity: &MessageIdentity) -> Result<Vec<String>, ApiError> {
        let params = [
            ("channel", identity.channel_id.0.clone()),
            ("timestamp", identity.message_ts.0.clone()),
            ("full", "true".to_owned()),
        ];
        let response: ReactionsResponse =
            self.call("reactions.get", TokenKind::User, &params).await?;
        let message = response
            .message
            .ok_or_else(|| ApiError::not_found("reactions.get", "response has no message"))?;
        Ok(message.reactions.into_iter().map(|reaction| reaction.name).collect())
    }

    async fn user_display_name(&self, user_id: &UserId) -> Result<String, ApiError> {
        let params = [("user", user_id.0.clone())];
        let response: UserInfoResponse = self.call("users.info", TokenKind::Bot, &params).await?;
        Ok(display_name(response.user))
    }

    async fn channel_name(&self, channel_id: &ChannelId) -> Result<String, ApiError> {
        let params = [("channel", channel_id.0.clone())];
        let response: ChannelInfoResponse =
            self.call("conversations.info", TokenKind::Bot, &params).await?;
        Ok(response.channel.name)
    }

    async fn post_message(&self, channel_id: &ChannelId, text: &str) -> Result<(), ApiError> {
        let params = [("channel", channel_id.0.clone()), ("text", text.to_owned())];
        self.call::<IgnoredAny>("chat.postMessage", TokenKind::Bot, &params).await?;
        Ok(())
    }

    async fn delete_message(&self, identity: &MessageIdentity) -> Result<(), ApiError> {
        let params =
            [("channel", identity.channel_id.0.clone()), ("ts", identity.message_ts.0.clone())];
        self.call::<IgnoredAny>("chat.delete", TokenKind::User, &params).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use checksweep_core::domain::message::ChannelId;
    use checksweep_core::errors::ApiError;
    use serde_json::json;

    use super::{display_name, parse_body, summary, HistoryPage, UserInfoResponse};

    #[test]
    fn error_codes_map_to_taxonomy() {
        let missing = parse_body::<serde_json::Value>(
            "reactions.get",
            json!({"ok": false, "error": "message_not_found"}),
        );
        assert!(matches!(missing, Err(ref error) if error.is_not_found()));

        let denied = parse_body::<serde_json::Value>(
            "chat.delete",
            json!({"ok": false, "error": "cant_delete_message"}),
        );
        assert_eq!(
            denied.err(),
            Some(ApiError::Platform {
                method: "chat.delete".to_owned(),
                code: "cant_delete_message".to_owned()
            })
        );
    }

    #[test]
    fn unexpected_payload_is_a_decode_error() {
        let result =
            parse_body::<HistoryPage>("conversations.history", json!({"ok": true, "messages": 3}));
        assert!(matches!(result, Err(ApiError::Decode { .. })));
    }

    #[test]
    fn history_messages_keep_reaction_names() {
        let page: HistoryPage = parse_body(
            "conversations.history",
            json!({
                "ok": true,
                "messages": [
                    {"ts": "2.0", "user": "U1", "text": "hi",
                     "reactions": [{"name": "white_check_mark", "count": 1, "users": ["U2"]}]},
                    {"ts": "1.0", "subtype": "bot_message", "text": "beep"}
                ]
            }),
        )
        .expect("page");

        let channel = ChannelId("C1".to_owned());
        let summaries: Vec<_> =
            page.messages.into_iter().map(|message| summary(&channel, message)).collect();
        assert_eq!(summaries[0].identity.to_string(), "C1/2.0");
        assert!(summaries[0].has_reaction("white_check_mark"));
        assert!(summaries[1].author_id.is_none());
        assert!(summaries[1].reactions.is_empty());
    }

    #[test]
    fn display_name_prefers_real_name_then_profile_then_handle() {
        let parse = |value| parse_body::<UserInfoResponse>("users.info", value).expect("user").user;

        let real = parse(json!({"ok": true, "user": {"name": "jd", "real_name": "Jane Doe"}}));
        assert_eq!(display_name(real), "Jane Doe");

        let profile = parse(json!({"ok": true, "user": {
            "name": "jd", "real_name": "", "profile": {"display_name": "Jane"}}}));
        assert_eq!(display_name(profile), "Jane");

        let handle = parse(json!({"ok": true, "user": {"name": "jd"}}));
        assert_eq!(display_name(handle), "jd");
    }
}
