//! # Canopy Ledger
//!
//! Key→JSON world state shared by every pipeline operation.
//!
//! ## Features
//!
//! - Per-key versions with optimistic (MVCC) validation at commit
//! - [`TxContext`]: snapshot reads, buffered writes, deterministic timestamp
//! - JSON selector queries ([`query::Query`]) over stored documents
//! - Committed-event broadcast ([`EventBus`])
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  begin()   ┌───────────┐  commit()  ┌──────────────┐
//! │    Ledger    │───────────▶│ TxContext │───────────▶│  StateStore  │
//! └──────────────┘            └───────────┘            └──────┬───────┘
//!                                                            │ events
//!                                                     ┌──────▼───────┐
//!                                                     │   EventBus   │
//!                                                     └──────────────┘
//! ```

pub mod context;
pub mod events;
pub mod keys;
pub mod query;
pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use context::{CommitReceipt, TxContext, WrittenKey};
pub use events::{EventBus, LedgerEvent};
pub use query::{Query, Selector, SortOrder};
pub use store::{InMemoryStateStore, StateStore, VersionedValue, WriteBatch};

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Capacity of the committed-event broadcast channel
    pub event_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            event_capacity: events::DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Handle to world state and its event stream
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn StateStore>,
    bus: EventBus,
}

impl Ledger {
    pub fn new(store: Arc<dyn StateStore>, config: &LedgerConfig) -> Self {
        Self {
            store,
            bus: EventBus::new(config.event_capacity),
        }
    }

    /// Ledger over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStateStore::new()), &LedgerConfig::default())
    }

    /// Start a transaction stamped with the current time
    pub fn begin(&self, creator: &str) -> TxContext {
        self.begin_at(creator, Utc::now())
    }

    /// Start a transaction with an explicit timestamp
    pub fn begin_at(&self, creator: &str, timestamp: DateTime<Utc>) -> TxContext {
        TxContext::new(self.store.clone(), Some(self.bus.clone()), creator, timestamp)
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.bus.subscribe()
    }
}
