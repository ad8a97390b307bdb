//! Reaction-triggered message moderation.
//!
//! ```text
//! live reaction event ─┐
//!                      ├─> ReviewCoordinator ─> wait ─> re-check ─> delete | retain
//! history scan ────────┘         │
//!                          ReviewRegistry (Untouched → UnderReview → Deleted)
//! ```

pub mod coordinator;
pub mod reconcile;
mod registry;

pub use coordinator::{
    Admission, ReviewCoordinator, ReviewHandle, ReviewOutcome, ReviewSettings,
    DEFAULT_CONFIRMATION_DELAY, DEFAULT_TARGET_REACTION,
};
pub use reconcile::{
    CandidateScan, ChannelFailure, ReconciliationScanner, ScanReport, DEFAULT_HISTORY_PAGE_SIZE,
};
pub use registry::{ReviewState, ReviewStats};
