//! Transaction context: one unit of work against world state
//!
//! - Point reads come from committed state overlaid with this
//!   transaction's own pending writes, and are recorded in the read set
//! - Writes and events are buffered and become visible only on commit
//! - Commit validates the read set against current versions (MVCC)
//! - Dropping a context without committing discards it
//!
//! Prefix scans and selector queries read committed state only and are
//! not part of the read set.

use std::collections::BTreeMap;
use std::sync::Arc;

use canopy_common::{CanopyError, Document, Result, DOC_TYPE_FIELD};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::events::{EventBus, LedgerEvent};
use crate::query::Query;
use crate::store::{StateStore, WriteBatch};

/// A key written by a committed transaction
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenKey {
    pub key: String,
    pub doc_type: Option<String>,
    /// `status` field of the stored document, if it has one
    pub status: Option<String>,
}

/// Result of a successful commit
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub tx_id: String,
    /// 0 when the transaction wrote nothing
    pub commit_seq: u64,
    pub writes: Vec<WrittenKey>,
    pub events: Vec<LedgerEvent>,
}

pub struct TxContext {
    store: Arc<dyn StateStore>,
    bus: Option<EventBus>,
    tx_id: String,
    timestamp: DateTime<Utc>,
    creator: String,
    reads: BTreeMap<String, Option<u64>>,
    writes: BTreeMap<String, Value>,
    events: Vec<(String, Value)>,
}

impl TxContext {
    pub fn new(
        store: Arc<dyn StateStore>,
        bus: Option<EventBus>,
        creator: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            bus,
            tx_id: uuid::Uuid::now_v7().to_string(),
            timestamp,
            creator: creator.into(),
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    /// Transaction timestamp; fixed for the life of the context
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Invoking identity
    pub fn creator(&self) -> &str {
        &self.creator
    }

    /// Read a key, recording its committed version
    pub fn get_state(&mut self, key: &str) -> Result<Option<Value>> {
        if let Some(pending) = self.writes.get(key) {
            return Ok(Some(pending.clone()));
        }
        let committed = self.store.get(key)?;
        self.reads
            .entry(key.to_string())
            .or_insert_with(|| committed.as_ref().map(|v| v.version));
        Ok(committed.map(|v| v.value))
    }

    pub fn exists(&mut self, key: &str) -> Result<bool> {
        Ok(self.get_state(key)?.is_some())
    }

    pub fn get_doc<T: Document>(&mut self, key: &str) -> Result<Option<T>> {
        match self.get_state(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Read a document that must exist
    pub fn require_doc<T: Document>(&mut self, key: &str, what: &str) -> Result<T> {
        self.get_doc(key)?
            .ok_or_else(|| CanopyError::not_found(format!("{} {}", what, key)))
    }

    /// Buffer a raw write
    pub fn put_state(&mut self, key: impl Into<String>, value: Value) {
        self.writes.insert(key.into(), value);
    }

    /// Buffer a document write, tagging it with its `docType`
    pub fn put_doc<T: Document>(&mut self, key: impl Into<String>, doc: &T) -> Result<()> {
        let mut value = serde_json::to_value(doc)?;
        match value.as_object_mut() {
            Some(obj) => {
                obj.insert(DOC_TYPE_FIELD.to_string(), Value::from(T::DOC_TYPE));
            }
            None => {
                return Err(CanopyError::Serialization(format!(
                    "{} did not serialize to a JSON object",
                    T::DOC_TYPE
                )))
            }
        }
        self.put_state(key, value);
        Ok(())
    }

    /// Committed entries under a key prefix
    pub fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        self.store.scan_prefix(prefix)
    }

    /// Committed entries matching a query document
    pub fn query(&self, query: &Value) -> Result<Vec<(String, Value)>> {
        let query = Query::parse(query)?;
        self.store.query(&query)
    }

    /// Committed documents of type `T` matching a query document
    pub fn query_docs<T: Document>(&self, query: &Value) -> Result<Vec<T>> {
        self.query(query)?
            .into_iter()
            .map(|(_, v)| serde_json::from_value(v).map_err(CanopyError::from))
            .collect()
    }

    /// Buffer an event, published after commit
    pub fn set_event<P: Serialize>(&mut self, name: &str, payload: &P) -> Result<()> {
        let payload = serde_json::to_value(payload)?;
        self.events.push((name.to_string(), payload));
        Ok(())
    }

    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Validate and apply this transaction's writes, then publish its events
    pub fn commit(self) -> Result<CommitReceipt> {
        let TxContext {
            store,
            bus,
            tx_id,
            reads,
            writes,
            events,
            ..
        } = self;

        let written: Vec<WrittenKey> = writes
            .iter()
            .map(|(key, value)| WrittenKey {
                key: key.clone(),
                doc_type: value
                    .get(DOC_TYPE_FIELD)
                    .and_then(Value::as_str)
                    .map(str::to_string),
                status: value.get("status").and_then(Value::as_str).map(str::to_string),
            })
            .collect();

        let commit_seq = if writes.is_empty() {
            0
        } else {
            store.apply(WriteBatch { reads, writes })?
        };

        let events: Vec<LedgerEvent> = events
            .into_iter()
            .map(|(name, payload)| LedgerEvent {
                name,
                payload,
                tx_id: tx_id.clone(),
                commit_seq,
            })
            .collect();

        if let Some(bus) = &bus {
            for event in &events {
                bus.publish(event.clone());
            }
        }

        debug!(
            tx_id = %tx_id,
            commit_seq,
            writes = written.len(),
            events = events.len(),
            "Transaction committed"
        );

        Ok(CommitReceipt {
            tx_id,
            commit_seq,
            writes: written,
            events,
        })
    }
}

impl std::fmt::Debug for TxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxContext")
            .field("tx_id", &self.tx_id)
            .field("creator", &self.creator)
            .field("timestamp", &self.timestamp)
            .field("reads", &self.reads.len())
            .field("writes", &self.writes.len())
            .finish()
    }
}
