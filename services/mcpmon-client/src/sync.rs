//! Push channel to cache bridge

use async_trait::async_trait;
use tracing::debug;

use crate::cache::{MergeOutcome, SharedCache};
use crate::message::{InboundMessage, MessageHandler, WireMessage};

/// Applies `monitor_update` messages to the monitor cache
#[derive(Debug, Clone)]
pub struct CacheSync {
    cache: SharedCache,
}

impl CacheSync {
    pub fn new(cache: SharedCache) -> Self {
        Self { cache }
    }

    /// Apply one message, reporting which views it touched
    pub async fn apply(&self, message: WireMessage) -> MergeOutcome {
        match InboundMessage::from(message) {
            InboundMessage::MonitorUpdate(patch) => self.cache.write().await.apply_patch(&patch),
            InboundMessage::Other(message) => {
                debug!("Ignoring push message of type '{}'", message.kind);
                MergeOutcome::default()
            }
        }
    }
}

#[async_trait]
impl MessageHandler for CacheSync {
    async fn handle(&self, message: WireMessage) {
        self.apply(message).await;
    }
}
