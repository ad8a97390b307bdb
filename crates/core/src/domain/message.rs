use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageTs(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for MessageTs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message is addressed by its channel plus its timestamp; a timestamp alone
/// is only unique within one channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageIdentity {
    pub channel_id: ChannelId,
    pub message_ts: MessageTs,
}

impl MessageIdentity {
    pub fn new(channel_id: impl Into<String>, message_ts: impl Into<String>) -> Self {
        Self { channel_id: ChannelId(channel_id.into()), message_ts: MessageTs(message_ts.into()) }
    }
}

impl fmt::Display for MessageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel_id, self.message_ts)
    }
}

/// One entry of a channel history page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub identity: MessageIdentity,
    pub author_id: Option<UserId>,
    pub text: Option<String>,
    pub reactions: Vec<String>,
}

impl MessageSummary {
    pub fn has_reaction(&self, reaction: &str) -> bool {
        let wanted = normalize_reaction(reaction);
        self.reactions.iter().any(|name| normalize_reaction(name) == wanted)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewSource {
    LiveEvent { correlation_id: String },
    Reconciliation,
}

impl ReviewSource {
    pub fn correlation_id(&self) -> &str {
        match self {
            Self::LiveEvent { correlation_id } => correlation_id,
            Self::Reconciliation => "reconcile",
        }
    }
}

/// A message handed to the coordinator for review, with whatever the producer
/// already knows about it. Everything except `identity` is only used for logs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReviewCandidate {
    pub identity: MessageIdentity,
    pub source: ReviewSource,
    pub author_id: Option<UserId>,
    pub reactor_id: Option<UserId>,
    pub text: Option<String>,
}

impl ReviewCandidate {
    pub fn from_history(summary: &MessageSummary) -> Self {
        Self {
            identity: summary.identity.clone(),
            source: ReviewSource::Reconciliation,
            author_id: summary.author_id.clone(),
            reactor_id: None,
            text: summary.text.clone(),
        }
    }
}

/// Reaction names arrive as `white_check_mark`, `:white_check_mark:` or with
/// stray casing depending on the source.
pub fn normalize_reaction(reaction: &str) -> String {
    reaction.trim().trim_matches(':').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{normalize_reaction, MessageIdentity, MessageSummary, ReviewCandidate, UserId};

    #[test]
    fn identity_is_scoped_by_channel() {
        let first = MessageIdentity::new("C1", "1730000000.0100");
        let second = MessageIdentity::new("C2", "1730000000.0100");

        assert_ne!(first, second);
        assert_eq!(first.to_string(), "C1/1730000000.0100");
    }

    #[test]
    fn reaction_normalization_strips_colons_and_case() {
        assert_eq!(normalize_reaction(" :White_Check_Mark: "), "white_check_mark");
    }

    #[test]
    fn summary_matches_target_reaction_loosely() {
        let summary = MessageSummary {
            identity: MessageIdentity::new("C1", "1"),
            author_id: Some(UserId("U1".to_owned())),
            text: Some("ok".to_owned()),
            reactions: vec!["eyes".to_owned(), "white_check_mark".to_owned()],
        };

        assert!(summary.has_reaction(":white_check_mark:"));
        assert!(!summary.has_reaction("thumbsup"));
    }

    #[test]
    fn history_candidate_keeps_known_author_and_text() {
        let summary = MessageSummary {
            identity: MessageIdentity::new("C1", "2"),
            author_id: Some(UserId("U9".to_owned())),
            text: Some("done".to_owned()),
            reactions: vec!["white_check_mark".to_owned()],
        };

        let candidate = ReviewCandidate::from_history(&summary);

        assert_eq!(candidate.identity, summary.identity);
        assert_eq!(candidate.source.correlation_id(), "reconcile");
        assert_eq!(candidate.text.as_deref(), Some("done"));
        assert!(candidate.reactor_id.is_none());
    }
}
