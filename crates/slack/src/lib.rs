//! Slack adapter for checksweep.
//!
//! - **Web API** (`web`) - `SlackWebClient`, the `MessagingClient` backed by Slack
//! - **Events** (`events`) - Socket Mode frames, envelope model, dispatcher, `ReactionIngestor`
//! - **Socket Mode** (`socket`) - event loop with acknowledgement and reconnection
//! - **Transport** (`transport`) - WebSocket connection used by the event loop
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and subscribe to the `reaction_added` bot event
//! 3. Bot scopes: `channels:read`, `groups:read`, `users:read`, `chat:write`, `reactions:read`
//! 4. User scopes: `channels:history`, `groups:history`, `reactions:read`, `chat:write`
//! 5. Set env vars: `CHECKSWEEP_SLACK_APP_TOKEN`, `CHECKSWEEP_SLACK_BOT_TOKEN`,
//!    `CHECKSWEEP_SLACK_USER_TOKEN`
//!
//! # Architecture
//!
//! ```text
//! Slack ─ws─> SlackSocketTransport ─> SocketModeRunner ─> EventDispatcher ─> ReactionIngestor
//!                                       │ on connect                           │
//!                                       └─> ReconciliationScanner ──> ReviewCoordinator
//! ```

pub mod events;
pub mod socket;
pub mod transport;
pub mod web;
