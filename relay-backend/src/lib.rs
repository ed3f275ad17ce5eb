//! # relay-backend
//!
//! Real-time telemetry relay: UDP "Dash" datagrams in, one JSON message per
//! decoded packet out to every WebSocket subscriber, plus an HTTP diagnostics
//! surface.
//!
//! ```text
//! UDP :5555 ─▶ udp_listener ─▶ decode ─▶ hub ─┬─▶ ws subscriber 1   (ws :8765)
//!                     │                        ├─▶ ws subscriber 2
//!                     ▼                        └─▶ …
//!                ServerState ◀── diagnostics (http :8080, read-only)
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod hub;
pub mod server;
pub mod state;
pub mod udp_listener;
pub mod ws_server;

pub use config::RelayConfig;
pub use error::{RelayError, ServerRole};
pub use hub::{BroadcastHub, SharedHub, Subscription, SubscriptionHandle};
pub use server::{shutdown_signal, Relay, RelayAddrs};
pub use state::{ServerState, SharedServerState, StatusSnapshot};
