use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::domain::message::MessageIdentity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Untouched,
    UnderReview,
    Deleted,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReviewStats {
    pub under_review: usize,
    pub deleted: usize,
}

/// Review lifecycle per message. Absent entries are `Untouched`.
///
/// Every operation is a single critical section, so an admission check can
/// never interleave with another caller's admission or release of the same
/// identity.
#[derive(Debug, Default)]
pub(crate) struct ReviewRegistry {
    entries: Mutex<HashMap<MessageIdentity, ReviewState>>,
}

impl ReviewRegistry {
    fn entries(&self) -> MutexGuard<'_, HashMap<MessageIdentity, ReviewState>> {
        // Every critical section leaves the map consistent, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves `identity` to `UnderReview` unless it is already under review or
    /// deleted, in which case the current state is returned.
    pub(crate) fn try_begin(&self, identity: &MessageIdentity) -> Result<(), ReviewState> {
        let mut entries = self.entries();
        if let Some(state) = entries.get(identity) {
            return Err(*state);
        }
        entries.insert(identity.clone(), ReviewState::UnderReview);
        Ok(())
    }

    /// `UnderReview -> Untouched`. A deleted identity stays deleted.
    pub(crate) fn release(&self, identity: &MessageIdentity) {
        let mut entries = self.entries();
        if entries.get(identity) == Some(&ReviewState::UnderReview) {
            entries.remove(identity);
        }
    }

    pub(crate) fn mark_deleted(&self, identity: &MessageIdentity) {
        self.entries().insert(identity.clone(), ReviewState::Deleted);
    }

    pub(crate) fn state(&self, identity: &MessageIdentity) -> ReviewState {
        self.entries().get(identity).copied().unwrap_or(ReviewState::Untouched)
    }

    pub(crate) fn stats(&self) -> ReviewStats {
        self.entries().values().fold(ReviewStats::default(), |mut stats, state| {
            match state {
                ReviewState::UnderReview => stats.under_review += 1,
                ReviewState::Deleted => stats.deleted += 1,
                ReviewState::Untouched => {}
            }
            stats
        })
    }
}

/// Ownership of one `UnderReview` slot. Settling it records the result;
/// dropping it unsettled (panic, cancelled task) releases the identity.
pub(crate) struct AdmissionGuard {
    registry: Arc<ReviewRegistry>,
    identity: MessageIdentity,
    settled: bool,
}

impl AdmissionGuard {
    pub(crate) fn acquire(
        registry: &Arc<ReviewRegistry>,
        identity: &MessageIdentity,
    ) -> Result<Self, ReviewState> {
        registry.try_begin(identity)?;
        Ok(Self { registry: Arc::clone(registry), identity: identity.clone(), settled: false })
    }

    pub(crate) fn release(mut self) {
        self.settled = true;
        self.registry.release(&self.identity);
    }

    pub(crate) fn mark_deleted(mut self) {
        self.settled = true;
        self.registry.mark_deleted(&self.identity);
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.registry.release(&self.identity);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::domain::message::MessageIdentity;

    use super::{AdmissionGuard, ReviewRegistry, ReviewState, ReviewStats};

    #[test]
    fn second_admission_sees_current_state() {
        let registry = ReviewRegistry::default();
        let identity = MessageIdentity::new("C1", "1");

        assert_eq!(registry.try_begin(&identity), Ok(()));
        assert_eq!(registry.try_begin(&identity), Err(ReviewState::UnderReview));

        registry.mark_deleted(&identity);
        assert_eq!(registry.try_begin(&identity), Err(ReviewState::Deleted));
    }

    #[test]
    fn release_never_resurrects_deleted_identity() {
        let registry = ReviewRegistry::default();
        let identity = MessageIdentity::new("C1", "1");

        registry.mark_deleted(&identity);
        registry.release(&identity);

        assert_eq!(registry.state(&identity), ReviewState::Deleted);
    }

    #[test]
    fn released_identity_is_admissible_again() {
        let registry = ReviewRegistry::default();
        let identity = MessageIdentity::new("C1", "1");

        registry.try_begin(&identity).expect("first admission");
        registry.release(&identity);

        assert_eq!(registry.state(&identity), ReviewState::Untouched);
        assert_eq!(registry.try_begin(&identity), Ok(()));
    }

    #[test]
    fn dropped_guard_releases_identity() {
        let registry = Arc::new(ReviewRegistry::default());
        let identity = MessageIdentity::new("C1", "1");

        let guard = AdmissionGuard::acquire(&registry, &identity).expect("admitted");
        assert!(AdmissionGuard::acquire(&registry, &identity).is_err());
        drop(guard);

        assert_eq!(registry.state(&identity), ReviewState::Untouched);
    }

    #[test]
    fn settled_guard_keeps_deleted_state() {
        let registry = Arc::new(ReviewRegistry::default());
        let identity = MessageIdentity::new("C1", "1");

        AdmissionGuard::acquire(&registry, &identity).expect("admitted").mark_deleted();

        assert_eq!(registry.state(&identity), ReviewState::Deleted);
    }

    #[test]
    fn stats_count_each_state() {
        let registry = ReviewRegistry::default();
        registry.try_begin(&MessageIdentity::new("C1", "1")).expect("admit");
        registry.try_begin(&MessageIdentity::new("C1", "2")).expect("admit");
        registry.mark_deleted(&MessageIdentity::new("C2", "1"));

        assert_eq!(registry.stats(), ReviewStats { under_review: 2, deleted: 1 });
    }
}
