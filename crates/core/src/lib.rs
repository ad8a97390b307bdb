pub mod broadcast;
pub mod config;
pub mod domain;
pub mod errors;
pub mod moderation;
pub mod platform;

pub use broadcast::{broadcast, BroadcastReport};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::message::{
    normalize_reaction, ChannelId, MessageIdentity, MessageSummary, MessageTs, ReviewCandidate,
    ReviewSource, UserId,
};
pub use errors::ApiError;
pub use moderation::{
    Admission, ReconciliationScanner, ReviewCoordinator, ReviewHandle, ReviewOutcome,
    ReviewSettings, ReviewState, ReviewStats, ScanReport,
};
pub use platform::MessagingClient;
