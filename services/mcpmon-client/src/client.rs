//! Real-time client for the MCPmon push channel

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::config::Config;
use crate::connection::{
    close_connection, open_connection, spawn_session_task, ConnectionConfig, ConnectionEvent,
    ConnectionPhase, SharedConnectionState,
};
use crate::io::{SocketConnector, WsConnector};
use crate::message::MessageHandler;

/// Reconnecting push channel client
///
/// Keeps at most one socket open for the current session token and hands
/// every well-formed message to its [`MessageHandler`]. Nothing on this type
/// returns an error: connection failures are retried, and malformed messages
/// are logged and dropped.
pub struct RealtimeClient {
    config: ConnectionConfig,
    shared: SharedConnectionState,
}

impl RealtimeClient {
    /// Create a client using the tokio-tungstenite connector
    pub fn new(
        config: &Config,
        token: watch::Receiver<Option<String>>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self::with_connector(config, token, handler, Arc::new(WsConnector::new()))
    }

    /// Create a client with a custom socket connector
    ///
    /// This is useful for testing with mock connections.
    pub fn with_connector(
        config: &Config,
        token: watch::Receiver<Option<String>>,
        handler: Arc<dyn MessageHandler>,
        connector: Arc<dyn SocketConnector>,
    ) -> Self {
        Self {
            config: ConnectionConfig {
                api_base_url: config.api.base_url.clone(),
                connection_timeout: Duration::from_secs(
                    config.realtime.connection_timeout_seconds,
                ),
                reconnect: config.realtime.reconnect.clone(),
            },
            shared: SharedConnectionState::new(token, handler, connector),
        }
    }

    /// Follow the session token: connect whenever one is present, reconnect
    /// when it changes, disconnect when it goes away
    pub fn start(&self) {
        let handle = spawn_session_task(self.config.clone(), self.shared.clone());
        let mut slot = self
            .shared
            .session_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Open a connection for the current token
    ///
    /// Closes any existing socket first and resets the reconnect counter.
    /// Does nothing without a token or while an attempt is in flight.
    pub async fn connect(&self) {
        open_connection(&self.config, &self.shared, false).await;
    }

    /// Close the connection and cancel any pending reconnect
    pub async fn disconnect(&self) {
        close_connection(&self.shared).await;
    }

    /// Stop following the session and disconnect
    pub async fn shutdown(&self) {
        debug!("Shutting down push channel client");
        self.shared.abort_all_tasks();
        close_connection(&self.shared).await;
    }

    /// Send a JSON message, returning false if the socket is not open
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        if self.shared.phase().await != ConnectionPhase::Open {
            warn!("Push channel is not connected, dropping outbound message");
            return false;
        }

        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize outbound message: {}", e);
                return false;
            }
        };

        let mut writer = self.shared.writer.lock().await;
        match writer.as_mut() {
            Some(writer) => match writer.write_text(&text).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to send push channel message: {}", e);
                    false
                }
            },
            None => {
                warn!("Push channel is not connected, dropping outbound message");
                false
            }
        }
    }

    pub async fn state(&self) -> ConnectionPhase {
        self.shared.phase().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionPhase::Open
    }

    /// Reconnect attempts since the last successful handshake
    pub async fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts().await
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.event_sender.subscribe()
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.shared.abort_all_tasks();
    }
}
