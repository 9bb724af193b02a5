//! MCPmon client library
//!
//! Talks to an MCPmon server: a REST client for authentication and monitor
//! management, a client-side cache of monitor records, and a reconnecting
//! WebSocket push channel whose `monitor_update` messages are merged into
//! that cache as they arrive.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod io;
pub mod message;
pub mod model;
pub mod session;
pub mod sync;

pub use api::{ApiClient, Endpoint};
pub use cache::{shared_cache, MergeOutcome, MonitorCache, SharedCache, Tag};
pub use client::RealtimeClient;
pub use config::{load_config, ApiConfig, Config, RealtimeConfig, ReconnectConfig};
pub use connection::{push_channel_uri, ConnectionEvent, ConnectionPhase};
pub use error::{ClientError, Result};
pub use message::{IgnoreMessages, InboundMessage, MessageHandler, WireMessage, MONITOR_UPDATE};
pub use model::{
    AuthType, AuthUser, ContactMessage, Feedback, Monitor, MonitorChanges, MonitorPatch,
    MonitorRecord, MonitorStatus, NewMonitor, NewPassword, PasswordResetRequest, ScanRequest,
    SignupRequest,
};
pub use session::Session;
pub use sync::CacheSync;
