//! Cross-process change-notification feed
//!
//! Transport for event delivery between agent processes is delegated to this
//! collaborator; the core only publishes outgoing events to it and consumes a
//! broadcast receiver for incoming ones. [`LoopbackFeed`] is the in-process
//! implementation used by single-process deployments and tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::events::AgentEvent;

/// Channel capacity for the loopback broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Error type for feed operations
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed closed")]
    Closed,
}

/// Result type for feed operations
pub type FeedResult<T> = Result<T, FeedError>;

/// Shared reference to a notification feed
pub type SharedNotificationFeed = Arc<dyn NotificationFeed>;

/// Change-notification feed carrying events between agent processes
#[async_trait]
pub trait NotificationFeed: Send + Sync {
    /// Publish an event to the feed
    async fn publish(&self, event: &AgentEvent) -> FeedResult<()>;

    /// Subscribe to receive feed events
    fn subscribe(&self) -> broadcast::Receiver<AgentEvent>;
}

/// In-process feed over a tokio broadcast channel
pub struct LoopbackFeed {
    sender: broadcast::Sender<AgentEvent>,
}

impl LoopbackFeed {
    /// Create a new loopback feed
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this feed
    pub fn shared(self) -> SharedNotificationFeed {
        Arc::new(self)
    }

    /// Number of attached receivers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LoopbackFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationFeed for LoopbackFeed {
    async fn publish(&self, event: &AgentEvent) -> FeedResult<()> {
        // No receivers is fine; delivery is best-effort
        let _ = self.sender.send(event.clone());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }
}
