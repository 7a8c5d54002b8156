//! Committed-event fan-out
//!
//! Events set inside a transaction are published only after the
//! transaction commits, in commit order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// A named event emitted by a committed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEvent {
    pub name: String,
    pub payload: Value,
    pub tx_id: String,
    pub commit_seq: u64,
}

/// Broadcast channel of committed events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers; no subscribers is not an error
    pub fn publish(&self, event: LedgerEvent) {
        let name = event.name.clone();
        match self.tx.send(event) {
            Ok(n) => trace!(event = %name, subscribers = n, "Event published"),
            Err(_) => trace!(event = %name, "Event dropped, no subscribers"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
