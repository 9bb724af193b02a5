//! Connection management for the push channel
//!
//! This module owns the socket lifecycle: opening a connection for the
//! current session token, reading frames into the message handler, and the
//! fixed-interval reconnect cycle. Every task spawned here carries the
//! generation it was started for; anything that finds a newer generation in
//! the shared state gives up, so a superseded connection can never schedule
//! work for the current one.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ReconnectConfig;
use crate::error::{ClientError, Result};
use crate::io::{FrameReader, FrameWriter, SocketConnector};
use crate::message::{MessageHandler, WireMessage};

/// Lifecycle phase of the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No session, or explicitly disconnected
    #[default]
    Idle,
    /// Handshake in flight
    Connecting,
    Open,
    /// Waiting out the reconnect delay
    ReconnectPending,
    /// Closed with no automatic attempts left
    Terminal,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionPhase::Idle => write!(f, "Idle"),
            ConnectionPhase::Connecting => write!(f, "Connecting"),
            ConnectionPhase::Open => write!(f, "Open"),
            ConnectionPhase::ReconnectPending => write!(f, "ReconnectPending"),
            ConnectionPhase::Terminal => write!(f, "Terminal"),
        }
    }
}

/// Lifecycle notifications broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connection attempt started; `attempt` is 0 for the first try
    Connecting { attempt: u32 },
    Connected,
    ConnectionLost { reason: String },
    Reconnecting { attempt: u32, max_attempts: u32 },
    /// Retry budget spent; no further automatic attempts
    ReconnectExhausted { attempts: u32 },
    Disconnected,
}

/// Internal connection state
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectionState {
    pub phase: ConnectionPhase,
    pub attempts: u32,
    pub generation: u64,
}

/// Configuration for connection attempts
#[derive(Debug, Clone)]
pub(crate) struct ConnectionConfig {
    pub api_base_url: String,
    pub connection_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

type TaskSlot = Arc<StdMutex<Option<JoinHandle<()>>>>;

/// Shared state for connection management
///
/// Holds everything the client, the reader task, the reconnect timer and the
/// session watcher need to see.
#[derive(Clone)]
pub(crate) struct SharedConnectionState {
    pub state: Arc<RwLock<ConnectionState>>,
    pub writer: Arc<Mutex<Option<Box<dyn FrameWriter>>>>,
    pub event_sender: broadcast::Sender<ConnectionEvent>,
    pub token: watch::Receiver<Option<String>>,
    pub handler: Arc<dyn MessageHandler>,
    pub connector: Arc<dyn SocketConnector>,
    /// In-flight connection attempt or pending reconnect timer
    pub attempt_handle: TaskSlot,
    pub reader_handle: TaskSlot,
    pub session_handle: TaskSlot,
}

fn lock_slot(slot: &TaskSlot) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SharedConnectionState {
    pub fn new(
        token: watch::Receiver<Option<String>>,
        handler: Arc<dyn MessageHandler>,
        connector: Arc<dyn SocketConnector>,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(ConnectionState::default())),
            writer: Arc::new(Mutex::new(None)),
            event_sender,
            token,
            handler,
            connector,
            attempt_handle: Arc::new(StdMutex::new(None)),
            reader_handle: Arc::new(StdMutex::new(None)),
            session_handle: Arc::new(StdMutex::new(None)),
        }
    }

    /// Current non-empty session token
    pub fn current_token(&self) -> Option<String> {
        self.token
            .borrow()
            .as_ref()
            .filter(|token| !token.is_empty())
            .cloned()
    }

    pub async fn phase(&self) -> ConnectionPhase {
        self.state.read().await.phase
    }

    pub async fn attempts(&self) -> u32 {
        self.state.read().await.attempts
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.event_sender.send(event);
    }

    /// Abort the attempt/timer task and the reader task
    pub fn abort_connection_tasks(&self) {
        for slot in [&self.attempt_handle, &self.reader_handle] {
            if let Some(handle) = lock_slot(slot).take() {
                handle.abort();
            }
        }
    }

    /// Abort every task, including the session watcher
    pub fn abort_all_tasks(&self) {
        self.abort_connection_tasks();
        if let Some(handle) = lock_slot(&self.session_handle).take() {
            handle.abort();
        }
    }
}

/// Build the push channel URI for an API base URL
///
/// `https` maps to `wss` and `http` to `ws`. A trailing `/api` segment is
/// dropped from the base path, `/ws` is appended, and the session token is
/// carried as the `token` query parameter.
pub fn push_channel_uri(api_base_url: &str, token: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(api_base_url)
        .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", api_base_url, e)))?;

    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(ClientError::InvalidUrl(format!(
                "{}: unsupported scheme '{}'",
                api_base_url, other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::InvalidUrl(format!("{}: cannot use {}", api_base_url, scheme)))?;

    let base_path = url.path().trim_end_matches('/');
    let base_path = base_path.strip_suffix("/api").unwrap_or(base_path);
    let path = format!("{}/ws", base_path);
    url.set_path(&path);
    url.set_fragment(None);
    url.set_query(None);
    url.query_pairs_mut().append_pair("token", token);

    Ok(url.to_string())
}

/// Mask the `token` query value for logging
pub(crate) fn redact_token(uri: &str) -> String {
    const KEY: &str = "token=";
    match uri.find(KEY) {
        Some(start) => {
            let value_start = start + KEY.len();
            let value_end = uri[value_start..]
                .find('&')
                .map_or(uri.len(), |offset| value_start + offset);
            format!("{}***{}", &uri[..value_start], &uri[value_end..])
        }
        None => uri.to_string(),
    }
}

fn spawn_close(mut writer: Box<dyn FrameWriter>) {
    tokio::spawn(async move {
        if let Err(e) = writer.close().await {
            debug!("Error closing push channel socket: {}", e);
        }
    });
}

/// Open a fresh connection for the current token
///
/// With `force` unset this is a no-op while an attempt is already in flight.
/// Any existing socket is closed and the reconnect counter reset first.
pub(crate) async fn open_connection(
    config: &ConnectionConfig,
    shared: &SharedConnectionState,
    force: bool,
) {
    if shared.current_token().is_none() {
        debug!("No session token, not connecting");
        return;
    }

    let mut state = shared.state.write().await;
    if !force && state.phase == ConnectionPhase::Connecting {
        debug!("Connection attempt already in progress");
        return;
    }

    state.generation += 1;
    state.phase = ConnectionPhase::Connecting;
    state.attempts = 0;
    shared.abort_connection_tasks();
    if let Some(writer) = shared.writer.lock().await.take() {
        debug!("Closing previous push channel socket");
        spawn_close(writer);
    }

    let handle = spawn_attempt_task(config.clone(), shared.clone(), state.generation, None);
    *lock_slot(&shared.attempt_handle) = Some(handle);
}

/// Tear the connection down and return to `Idle`
///
/// Timers and the reader are cancelled before this returns; the socket close
/// is requested but not awaited.
pub(crate) async fn close_connection(shared: &SharedConnectionState) {
    let mut state = shared.state.write().await;
    let previous = state.phase;
    state.generation += 1;
    state.phase = ConnectionPhase::Idle;
    state.attempts = 0;
    shared.abort_connection_tasks();
    let writer = shared.writer.lock().await.take();
    drop(state);

    if let Some(writer) = writer {
        spawn_close(writer);
    }
    if previous != ConnectionPhase::Idle {
        info!("Push channel disconnected");
        shared.emit(ConnectionEvent::Disconnected);
    }
}

/// Spawn a connection attempt, optionally after a delay
pub(crate) fn spawn_attempt_task(
    config: ConnectionConfig,
    shared: SharedConnectionState,
    generation: u64,
    delay: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        establish(&config, &shared, generation).await;
    })
}

async fn establish(config: &ConnectionConfig, shared: &SharedConnectionState, generation: u64) {
    let attempt = {
        let mut state = shared.state.write().await;
        if state.generation != generation {
            return;
        }
        state.phase = ConnectionPhase::Connecting;
        state.attempts
    };

    let Some(token) = shared.current_token() else {
        handle_close(config, shared, generation, "Session ended".to_string()).await;
        return;
    };

    let uri = match push_channel_uri(&config.api_base_url, &token) {
        Ok(uri) => uri,
        Err(e) => {
            warn!("Cannot build push channel URI: {}", e);
            let mut state = shared.state.write().await;
            if state.generation == generation {
                state.phase = ConnectionPhase::Terminal;
            }
            return;
        }
    };

    info!("Connecting to push channel at {}", redact_token(&uri));
    shared.emit(ConnectionEvent::Connecting { attempt });

    match shared
        .connector
        .connect(&uri, config.connection_timeout)
        .await
    {
        Ok(pair) => {
            let mut state = shared.state.write().await;
            if state.generation != generation {
                debug!("Discarding socket for superseded connection");
                drop(state);
                spawn_close(pair.writer);
                return;
            }
            state.phase = ConnectionPhase::Open;
            state.attempts = 0;
            *shared.writer.lock().await = Some(pair.writer);

            let reader_handle =
                spawn_reader_task(pair.reader, config.clone(), shared.clone(), generation);
            *lock_slot(&shared.reader_handle) = Some(reader_handle);

            info!("Push channel connected");
            shared.emit(ConnectionEvent::Connected);
            drop(state);
        }
        Err(e) => {
            warn!("Push channel connection failed: {}", e);
            handle_close(config, shared, generation, e.to_string()).await;
        }
    }
}

/// React to a failed attempt or a lost connection
async fn handle_close(
    config: &ConnectionConfig,
    shared: &SharedConnectionState,
    generation: u64,
    reason: String,
) {
    let mut state = shared.state.write().await;
    if state.generation != generation {
        debug!("Ignoring close of superseded connection");
        return;
    }

    if let Some(writer) = shared.writer.lock().await.take() {
        spawn_close(writer);
    }
    shared.emit(ConnectionEvent::ConnectionLost { reason });

    let reconnect = &config.reconnect;
    if !reconnect.enabled {
        debug!("Auto-reconnect disabled, not reconnecting");
        state.phase = ConnectionPhase::Terminal;
        return;
    }

    if shared.current_token().is_none() {
        debug!("Session ended, not reconnecting");
        state.phase = ConnectionPhase::Idle;
        return;
    }

    if state.attempts >= reconnect.max_attempts {
        warn!(
            "Push channel reconnection failed: max attempts ({}) exceeded",
            reconnect.max_attempts
        );
        state.phase = ConnectionPhase::Terminal;
        shared.emit(ConnectionEvent::ReconnectExhausted {
            attempts: state.attempts,
        });
        return;
    }

    state.attempts += 1;
    state.phase = ConnectionPhase::ReconnectPending;
    info!(
        "Reconnecting to push channel in {:?} (attempt {}/{})",
        reconnect.interval(),
        state.attempts,
        reconnect.max_attempts
    );
    shared.emit(ConnectionEvent::Reconnecting {
        attempt: state.attempts,
        max_attempts: reconnect.max_attempts,
    });

    let handle = spawn_attempt_task(
        config.clone(),
        shared.clone(),
        generation,
        Some(reconnect.interval()),
    );
    *lock_slot(&shared.attempt_handle) = Some(handle);
}

/// Spawn a reader task that feeds frames to the message handler
pub(crate) fn spawn_reader_task(
    mut reader: Box<dyn FrameReader>,
    config: ConnectionConfig,
    shared: SharedConnectionState,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reason = loop {
            match reader.read_text().await {
                Ok(None) => break "Connection closed by server".to_string(),
                Ok(Some(text)) => dispatch(&shared, &text).await,
                Err(e) => break format!("Read error: {}", e),
            }
        };

        warn!("Push channel connection lost: {}", reason);
        handle_close(&config, &shared, generation, reason).await;
    })
}

async fn dispatch(shared: &SharedConnectionState, text: &str) {
    match WireMessage::parse(text) {
        Ok(message) => {
            debug!("Push message received: {}", message.kind);
            shared.handler.handle(message).await;
        }
        Err(e) => warn!("Dropping malformed push message: {}", e),
    }
}

/// Spawn the task that follows the session token
///
/// A new token (re)opens the connection with a fresh retry budget; losing
/// the token closes it.
pub(crate) fn spawn_session_task(
    config: ConnectionConfig,
    shared: SharedConnectionState,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tokens = shared.token.clone();
        loop {
            let present = tokens
                .borrow_and_update()
                .as_ref()
                .is_some_and(|token| !token.is_empty());
            if present {
                open_connection(&config, &shared, true).await;
            } else {
                close_connection(&shared).await;
            }

            if tokens.changed().await.is_err() {
                debug!("Session closed, stopping session watcher");
                break;
            }
        }
    })
}
