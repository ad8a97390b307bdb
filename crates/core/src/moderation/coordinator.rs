use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::message::{normalize_reaction, MessageIdentity, ReviewCandidate, UserId};
use crate::errors::ApiError;
use crate::platform::MessagingClient;

use super::registry::{AdmissionGuard, ReviewRegistry, ReviewState, ReviewStats};

pub const DEFAULT_TARGET_REACTION: &str = "white_check_mark";
pub const DEFAULT_CONFIRMATION_DELAY: Duration = Duration::from_secs(5);

const UNKNOWN_USER: &str = "unknown user";
const UNKNOWN_CHANNEL: &str = "unknown channel";
const UNKNOWN_TEXT: &str = "unknown text";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewSettings {
    target_reaction: String,
    confirmation_delay: Duration,
}

impl ReviewSettings {
    pub fn new(target_reaction: &str, confirmation_delay: Duration) -> Self {
        Self { target_reaction: normalize_reaction(target_reaction), confirmation_delay }
    }

    pub fn target_reaction(&self) -> &str {
        &self.target_reaction
    }

    pub fn confirmation_delay(&self) -> Duration {
        self.confirmation_delay
    }
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_REACTION, DEFAULT_CONFIRMATION_DELAY)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    /// Another review already owns the message, or it was deleted earlier.
    Skipped,
    /// The reaction was gone after the confirmation window.
    Retained,
    DeletedOk,
    DeleteFailed,
    /// The reaction re-check itself failed; nothing was deleted.
    EvidenceUnavailable,
    /// The review task panicked or was cancelled before settling.
    Aborted,
}

impl ReviewOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Retained => "retained",
            Self::DeletedOk => "deleted",
            Self::DeleteFailed => "delete_failed",
            Self::EvidenceUnavailable => "evidence_unavailable",
            Self::Aborted => "aborted",
        }
    }
}

/// Result of [`ReviewCoordinator::dispatch`].
#[derive(Debug)]
pub enum Admission {
    Skipped,
    Scheduled(ReviewHandle),
}

impl Admission {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled(_))
    }
}

/// A review running in the background.
#[derive(Debug)]
pub struct ReviewHandle {
    identity: MessageIdentity,
    task: JoinHandle<ReviewOutcome>,
}

impl ReviewHandle {
    pub fn identity(&self) -> &MessageIdentity {
        &self.identity
    }

    pub async fn outcome(self) -> ReviewOutcome {
        self.task.await.unwrap_or(ReviewOutcome::Aborted)
    }
}

/// Single arbiter for message reviews.
///
/// Both live reaction events and reconciliation scans hand candidates here.
/// Admission is an atomic check-and-set on the registry: the first caller for
/// an identity wins and every concurrent or later caller is `Skipped` until
/// the first review releases it. A deleted identity is never reviewed again.
///
/// The protocol after admission is: wait out the confirmation window, re-read
/// the message's reactions, delete only if the target reaction is still there.
pub struct ReviewCoordinator {
    client: Arc<dyn MessagingClient>,
    registry: Arc<ReviewRegistry>,
    settings: ReviewSettings,
}

impl ReviewCoordinator {
    pub fn new(client: Arc<dyn MessagingClient>, settings: ReviewSettings) -> Self {
        Self { client, registry: Arc::new(ReviewRegistry::default()), settings }
    }

    pub fn settings(&self) -> &ReviewSettings {
        &self.settings
    }

    /// Runs the whole review on the caller's task, confirmation window included.
    pub async fn admit(&self, candidate: ReviewCandidate) -> ReviewOutcome {
        let Some(guard) = self.begin(&candidate) else {
            return ReviewOutcome::Skipped;
        };
        self.review(candidate, guard).await
    }

    /// Admits synchronously and runs the rest of the review on a spawned task,
    /// so the caller never waits for the confirmation window.
    pub fn dispatch(self: &Arc<Self>, candidate: ReviewCandidate) -> Admission {
        let Some(guard) = self.begin(&candidate) else {
            return Admission::Skipped;
        };

        let identity = candidate.identity.clone();
        let coordinator = Arc::clone(self);
        let task = tokio::spawn(async move { coordinator.review(candidate, guard).await });
        Admission::Scheduled(ReviewHandle { identity, task })
    }

    /// Point-in-time view of one identity's lifecycle.
    pub fn state_of(&self, identity: &MessageIdentity) -> ReviewState {
        self.registry.state(identity)
    }

    pub fn stats(&self) -> ReviewStats {
        self.registry.stats()
    }

    fn begin(&self, candidate: &ReviewCandidate) -> Option<AdmissionGuard> {
        let identity = &candidate.identity;
        match AdmissionGuard::acquire(&self.registry, identity) {
            Ok(guard) => Some(guard),
            Err(state) => {
                debug!(
                    event_name = "moderation.review.skipped",
                    channel_id = %identity.channel_id,
                    message_ts = %identity.message_ts,
                    correlation_id = candidate.source.correlation_id(),
                    state = ?state,
                    "message already under review or deleted"
                );
                None
            }
        }
    }

    async fn review(&self, candidate: ReviewCandidate, guard: AdmissionGuard) -> ReviewOutcome {
        let identity = &candidate.identity;
        let correlation_id = candidate.source.correlation_id();

        info!(
            event_name = "moderation.review.admitted",
            channel_id = %identity.channel_id,
            message_ts = %identity.message_ts,
            correlation_id,
            reaction = %self.settings.target_reaction,
            delay_secs = self.settings.confirmation_delay.as_secs_f64(),
            "found message with target reaction; starting confirmation window"
        );

        let delay = self.settings.confirmation_delay;
        let enrichment = async {
            if tokio::time::timeout(delay, self.log_context(&candidate)).await.is_err() {
                debug!(
                    event_name = "moderation.review.context_timeout",
                    channel_id = %identity.channel_id,
                    message_ts = %identity.message_ts,
                    correlation_id,
                    "review context lookups outlasted the confirmation window"
                );
            }
        };
        tokio::join!(enrichment, tokio::time::sleep(delay));

        debug!(
            event_name = "moderation.review.recheck",
            channel_id = %identity.channel_id,
            message_ts = %identity.message_ts,
            correlation_id,
            "confirmation window elapsed; re-checking reactions"
        );

        let still_present = match self.client.reactions(identity).await {
            Ok(reactions) => reactions
                .iter()
                .any(|name| normalize_reaction(name) == self.settings.target_reaction),
            Err(error) if error.is_not_found() => {
                info!(
                    event_name = "moderation.review.message_gone",
                    channel_id = %identity.channel_id,
                    message_ts = %identity.message_ts,
                    correlation_id,
                    "message no longer exists"
                );
                false
            }
            Err(error) => {
                warn!(
                    event_name = "moderation.review.recheck_failed",
                    channel_id = %identity.channel_id,
                    message_ts = %identity.message_ts,
                    correlation_id,
                    operation = error.method(),
                    error_class = error.class(),
                    error = %error,
                    "could not re-check reactions; leaving message in place"
                );
                guard.release();
                return ReviewOutcome::EvidenceUnavailable;
            }
        };

        if !still_present {
            info!(
                event_name = "moderation.review.retained",
                channel_id = %identity.channel_id,
                message_ts = %identity.message_ts,
                correlation_id,
                "reaction not found after confirmation window; message not deleted"
            );
            guard.release();
            return ReviewOutcome::Retained;
        }

        match self.client.delete_message(identity).await {
            Ok(()) => {
                info!(
                    event_name = "moderation.review.deleted",
                    channel_id = %identity.channel_id,
                    message_ts = %identity.message_ts,
                    correlation_id,
                    reaction = %self.settings.target_reaction,
                    "message deleted"
                );
                guard.mark_deleted();
                ReviewOutcome::DeletedOk
            }
            Err(error) => {
                warn!(
                    event_name = "moderation.review.delete_failed",
                    channel_id = %identity.channel_id,
                    message_ts = %identity.message_ts,
                    correlation_id,
                    operation = error.method(),
                    error_class = error.class(),
                    error = %error,
                    "failed to delete message"
                );
                guard.release();
                ReviewOutcome::DeleteFailed
            }
        }
    }

    /// Best-effort description of the message for the audit log. Lookups that
    /// fail fall back to placeholders and never affect the review.
    async fn log_context(&self, candidate: &ReviewCandidate) {
        let identity = &candidate.identity;

        let channel_name = self
            .client
            .channel_name(&identity.channel_id)
            .await
            .unwrap_or_else(|error| enrichment_fallback(&error, UNKNOWN_CHANNEL));
        let author = match &candidate.author_id {
            Some(user_id) => self.display_name(user_id).await,
            None => UNKNOWN_USER.to_owned(),
        };
        let reactor = match &candidate.reactor_id {
            Some(user_id) => Some(self.display_name(user_id).await),
            None => None,
        };
        let text = match &candidate.text {
            Some(text) => text.clone(),
            None => match self.client.message_text(identity).await {
                Ok(text) => text.unwrap_or_else(|| UNKNOWN_TEXT.to_owned()),
                Err(error) => enrichment_fallback(&error, UNKNOWN_TEXT),
            },
        };

        info!(
            event_name = "moderation.review.context",
            channel_id = %identity.channel_id,
            message_ts = %identity.message_ts,
            correlation_id = candidate.source.correlation_id(),
            channel_name = %channel_name,
            author = %author,
            reactor = reactor.as_deref().unwrap_or("n/a"),
            text = %text,
            "review context"
        );
    }

    async fn display_name(&self, user_id: &UserId) -> String {
        self.client
            .user_display_name(user_id)
            .await
            .unwrap_or_else(|error| enrichment_fallback(&error, UNKNOWN_USER))
    }
}

fn enrichment_fallback(error: &ApiError, placeholder: &str) -> String {
    debug!(
        event_name = "moderation.review.enrichment_failed",
        operation = error.method(),
        error = %error,
        placeholder,
        "log enrichment lookup failed"
    );
    placeholder.to_owned()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::task::JoinSet;
    use tokio::time::Instant;

    use crate::domain::message::{
        ChannelId, MessageIdentity, MessageSummary, ReviewCandidate, ReviewSource, UserId,
    };
    use crate::errors::ApiError;
    use crate::moderation::registry::ReviewState;
    use crate::platform::memory::InMemoryWorkspace;
    use crate::platform::MessagingClient;

    use super::{Admission, ReviewCoordinator, ReviewOutcome, ReviewSettings};

    const DELAY: Duration = Duration::from_secs(5);

    async fn seeded() -> (Arc<InMemoryWorkspace>, MessageIdentity) {
        let workspace = Arc::new(InMemoryWorkspace::new());
        workspace.add_channel("C1", "general", true).await;
        workspace.add_user("U1", "Author").await;
        workspace.add_user("U2", "Reviewer").await;
        let identity =
            workspace.add_message("C1", "1730000000.0100", "U1", "ok", &["white_check_mark"]).await;
        (workspace, identity)
    }

    fn coordinator(workspace: &Arc<InMemoryWorkspace>) -> Arc<ReviewCoordinator> {
        Arc::new(ReviewCoordinator::new(
            workspace.clone(),
            ReviewSettings::new("white_check_mark", DELAY),
        ))
    }

    fn live(identity: &MessageIdentity) -> ReviewCandidate {
        ReviewCandidate {
            identity: identity.clone(),
            source: ReviewSource::LiveEvent { correlation_id: "env-1".to_owned() },
            author_id: Some(UserId("U1".to_owned())),
            reactor_id: Some(UserId("U2".to_owned())),
            text: None,
        }
    }

    #[test]
    fn settings_normalize_target_reaction() {
        let settings = ReviewSettings::new(" :White_Check_Mark: ", DELAY);

        assert_eq!(settings.target_reaction(), "white_check_mark");
        assert_eq!(ReviewSettings::default().confirmation_delay(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_admissions_review_once() {
        let (workspace, identity) = seeded().await;
        let coordinator = coordinator(&workspace);

        let mut reviews = JoinSet::new();
        for _ in 0..8 {
            let coordinator = coordinator.clone();
            let candidate = live(&identity);
            reviews.spawn(async move { coordinator.admit(candidate).await });
        }

        let mut outcomes = Vec::new();
        while let Some(outcome) = reviews.join_next().await {
            outcomes.push(outcome.expect("review task"));
        }

        let proceeded: Vec<_> =
            outcomes.iter().filter(|outcome| **outcome != ReviewOutcome::Skipped).collect();
        assert_eq!(proceeded, vec![&ReviewOutcome::DeletedOk]);
        assert_eq!(workspace.delete_attempts().await, 1);
        assert_eq!(workspace.reaction_checks().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retracted_reaction_retains_message_and_allows_new_review() {
        let (workspace, identity) = seeded().await;
        let coordinator = coordinator(&workspace);

        let Admission::Scheduled(handle) = coordinator.dispatch(live(&identity)) else {
            panic!("first admission should be scheduled");
        };
        workspace.remove_reaction(&identity, "white_check_mark").await;

        assert_eq!(handle.outcome().await, ReviewOutcome::Retained);
        assert!(workspace.contains(&identity).await);
        assert_eq!(workspace.delete_attempts().await, 0);
        assert_eq!(coordinator.state_of(&identity), ReviewState::Untouched);

        workspace.add_reaction(&identity, "white_check_mark").await;
        assert_eq!(coordinator.admit(live(&identity)).await, ReviewOutcome::DeletedOk);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_reaction_deletes_once_and_is_terminal() {
        let (workspace, identity) = seeded().await;
        let coordinator = coordinator(&workspace);

        assert_eq!(coordinator.admit(live(&identity)).await, ReviewOutcome::DeletedOk);
        assert_eq!(coordinator.state_of(&identity), ReviewState::Deleted);
        assert_eq!(workspace.deleted().await, vec![identity.clone()]);

        assert_eq!(coordinator.admit(live(&identity)).await, ReviewOutcome::Skipped);
        assert!(matches!(coordinator.dispatch(live(&identity)), Admission::Skipped));
        assert_eq!(workspace.delete_attempts().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delete_releases_identity_for_retrigger() {
        let (workspace, identity) = seeded().await;
        workspace
            .fail_next("chat.delete", ApiError::platform("chat.delete", "cant_delete_message"))
            .await;
        let coordinator = coordinator(&workspace);

        assert_eq!(coordinator.admit(live(&identity)).await, ReviewOutcome::DeleteFailed);
        assert_eq!(coordinator.state_of(&identity), ReviewState::Untouched);
        assert!(workspace.contains(&identity).await);

        assert_eq!(coordinator.admit(live(&identity)).await, ReviewOutcome::DeletedOk);
        assert_eq!(workspace.delete_attempts().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn recheck_failure_releases_without_deleting() {
        let (workspace, identity) = seeded().await;
        workspace.fail_next("reactions.get", ApiError::transport("reactions.get", "timeout")).await;
        let coordinator = coordinator(&workspace);

        assert_eq!(coordinator.admit(live(&identity)).await, ReviewOutcome::EvidenceUnavailable);
        assert_eq!(coordinator.state_of(&identity), ReviewState::Untouched);
        assert_eq!(workspace.delete_attempts().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn message_deleted_elsewhere_counts_as_retained() {
        let (workspace, identity) = seeded().await;
        let coordinator = coordinator(&workspace);

        let Admission::Scheduled(handle) = coordinator.dispatch(live(&identity)) else {
            panic!("admission should be scheduled");
        };
        workspace.delete_message(&identity).await.expect("manual delete");

        assert_eq!(handle.outcome().await, ReviewOutcome::Retained);
        assert_eq!(coordinator.state_of(&identity), ReviewState::Untouched);
    }

    #[tokio::test(start_paused = true)]
    async fn enrichment_failures_do_not_block_deletion() {
        let (workspace, identity) = seeded().await;
        for method in ["users.info", "conversations.info", "conversations.history"] {
            workspace.fail_always(method, ApiError::transport(method, "down")).await;
        }
        let coordinator = coordinator(&workspace);

        assert_eq!(coordinator.admit(live(&identity)).await, ReviewOutcome::DeletedOk);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_window_waits_before_recheck() {
        let (workspace, identity) = seeded().await;
        let coordinator = coordinator(&workspace);
        let started = Instant::now();

        let Admission::Scheduled(handle) = coordinator.dispatch(live(&identity)) else {
            panic!("admission should be scheduled");
        };
        tokio::time::sleep(DELAY / 2).await;
        assert_eq!(workspace.reaction_checks().await, 0);
        assert_eq!(coordinator.state_of(&identity), ReviewState::UnderReview);

        assert_eq!(handle.outcome().await, ReviewOutcome::DeletedOk);
        assert!(started.elapsed() >= DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_messages_wait_in_parallel() {
        let (workspace, first) = seeded().await;
        let second = workspace
            .add_message("C1", "1730000000.0200", "U1", "also", &["white_check_mark"])
            .await;
        let coordinator = coordinator(&workspace);
        let started = Instant::now();

        let handles: Vec<_> = [&first, &second]
            .into_iter()
            .filter_map(|identity| match coordinator.dispatch(live(identity)) {
                Admission::Scheduled(handle) => Some(handle),
                Admission::Skipped => None,
            })
            .collect();
        assert_eq!(handles.len(), 2);
        for handle in handles {
            assert_eq!(handle.outcome().await, ReviewOutcome::DeletedOk);
        }

        assert!(started.elapsed() < DELAY * 2, "reviews should not serialize on the window");
        assert_eq!(coordinator.stats().deleted, 2);
    }

    /// Delegates to the in-memory workspace but stalls every user lookup.
    struct SlowNames {
        inner: Arc<InMemoryWorkspace>,
        stall: Duration,
        rechecked_at: std::sync::Mutex<Option<Instant>>,
    }

    #[async_trait]
    impl MessagingClient for SlowNames {
        async fn list_member_channels(&self) -> Result<Vec<ChannelId>, ApiError> {
            self.inner.list_member_channels().await
        }

        async fn channel_history(
            &self,
            channel_id: &ChannelId,
            page_size: u32,
        ) -> Result<Vec<MessageSummary>, ApiError> {
            self.inner.channel_history(channel_id, page_size).await
        }

        async fn message_text(
            &self,
            identity: &MessageIdentity,
        ) -> Result<Option<String>, ApiError> {
            self.inner.message_text(identity).await
        }

        async fn reactions(&self, identity: &MessageIdentity) -> Result<Vec<String>, ApiError> {
            if let Ok(mut at) = self.rechecked_at.lock() {
                *at = Some(Instant::now());
            }
            self.inner.reactions(identity).await
        }

        async fn user_display_name(&self, user_id: &UserId) -> Result<String, ApiError> {
            tokio::time::sleep(self.stall).await;
            self.inner.user_display_name(user_id).await
        }

        async fn channel_name(&self, channel_id: &ChannelId) -> Result<String, ApiError> {
            self.inner.channel_name(channel_id).await
        }

        async fn post_message(&self, channel_id: &ChannelId, text: &str) -> Result<(), ApiError> {
            self.inner.post_message(channel_id, text).await
        }

        async fn delete_message(&self, identity: &MessageIdentity) -> Result<(), ApiError> {
            self.inner.delete_message(identity).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_enrichment_does_not_stretch_confirmation_window() {
        let (workspace, identity) = seeded().await;
        let client = Arc::new(SlowNames {
            inner: workspace.clone(),
            stall: DELAY * 2,
            rechecked_at: std::sync::Mutex::new(None),
        });
        let coordinator = ReviewCoordinator::new(
            client.clone(),
            ReviewSettings::new("white_check_mark", DELAY),
        );
        let started = Instant::now();

        let outcome = coordinator.admit(live(&identity)).await;

        let rechecked_at = client.rechecked_at.lock().ok().and_then(|at| *at).expect("rechecked");
        assert_eq!(outcome, ReviewOutcome::DeletedOk);
        let waited = rechecked_at - started;
        assert!(waited >= DELAY && waited < DELAY + Duration::from_secs(1), "{waited:?}");
        assert!(!workspace.contains(&identity).await);
    }

    struct PanickingClient;

    #[async_trait]
    impl MessagingClient for PanickingClient {
        async fn list_member_channels(&self) -> Result<Vec<ChannelId>, ApiError> {
            Ok(Vec::new())
        }

        async fn channel_history(
            &self,
            _channel_id: &ChannelId,
            _page_size: u32,
        ) -> Result<Vec<MessageSummary>, ApiError> {
            Ok(Vec::new())
        }

        async fn message_text(
            &self,
            _identity: &MessageIdentity,
        ) -> Result<Option<String>, ApiError> {
            Ok(None)
        }

        async fn reactions(&self, _identity: &MessageIdentity) -> Result<Vec<String>, ApiError> {
            panic!("reaction lookup exploded");
        }

        async fn user_display_name(&self, _user_id: &UserId) -> Result<String, ApiError> {
            Ok("someone".to_owned())
        }

        async fn channel_name(&self, _channel_id: &ChannelId) -> Result<String, ApiError> {
            Ok("general".to_owned())
        }

        async fn post_message(&self, _channel_id: &ChannelId, _text: &str) -> Result<(), ApiError> {
            Ok(())
        }

        async fn delete_message(&self, _identity: &MessageIdentity) -> Result<(), ApiError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_review_is_aborted_and_released() {
        let coordinator = Arc::new(ReviewCoordinator::new(
            Arc::new(PanickingClient),
            ReviewSettings::new("white_check_mark", DELAY),
        ));
        let identity = MessageIdentity::new("C1", "1");

        let Admission::Scheduled(handle) = coordinator.dispatch(live(&identity)) else {
            panic!("admission should be scheduled");
        };

        assert_eq!(handle.outcome().await, ReviewOutcome::Aborted);
        assert_eq!(coordinator.state_of(&identity), ReviewState::Untouched);
    }
}
