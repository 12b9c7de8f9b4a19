//! Fire-and-forget notifications to interested subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Published after the user's collection was re-fetched.
pub const REFRESHED_ANIME_COLLECTION: &str = "refreshed-anilist-anime-collection";

/// Published after the pre-match table was emptied.
pub const TORRENT_PREMATCHES_CLEARED: &str = "torrent-prematches-cleared";

/// An event with its publish time.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub payload: Value,
}

/// Sink for notifications. Publishing never fails the caller.
pub trait EventSink: Send + Sync {
    fn publish(&self, name: &str, payload: Value);
}

/// Event sink backed by a broadcast channel.
///
/// Cheaply cloneable. Events published while nobody is subscribed are dropped.
#[derive(Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<EventEnvelope>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, name: &str, payload: Value) {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            name: name.to_string(),
            payload,
        };
        if self.tx.send(envelope).is_err() {
            tracing::debug!(event = name, "No subscribers for event");
        }
    }
}
