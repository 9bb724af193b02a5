//! Session token holder
//!
//! The session owns the bearer token issued on login, signup or OAuth
//! callback. Consumers that must react to login/logout (the push channel)
//! subscribe to it instead of polling.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// Shared, observable session token
#[derive(Debug, Clone)]
pub struct Session {
    sender: Arc<watch::Sender<Option<String>>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a session without a token
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create a session that already holds a token
    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.set_token(token);
        session
    }

    /// Store a new token. An empty token is treated as a logout.
    ///
    /// Subscribers are only notified when the value actually changes.
    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        let token = if token.is_empty() { None } else { Some(token) };
        self.replace(token);
    }

    /// Drop the token (logout)
    pub fn clear(&self) {
        self.replace(None);
    }

    fn replace(&self, token: Option<String>) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == token {
                false
            } else {
                *current = token;
                true
            }
        });
        if changed {
            debug!("Session token changed (present: {})", self.is_authenticated());
        }
    }

    /// Current token, if any
    pub fn token(&self) -> Option<String> {
        self.sender.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.sender.borrow().is_some()
    }

    /// Watch token changes
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.sender.subscribe()
    }
}
