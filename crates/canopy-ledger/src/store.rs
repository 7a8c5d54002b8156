//! Versioned world state
//!
//! Every key carries the commit sequence number of the write that last
//! touched it. A batch is accepted only if every key it read still has the
//! version it observed (absent keys included), otherwise it is rejected
//! whole with `Conflict`.

use std::collections::BTreeMap;

use canopy_common::{CanopyError, Result};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::query::Query;

/// A stored document and the commit that last wrote it
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedValue {
    pub value: Value,
    pub version: u64,
}

/// Read set and write set of one transaction
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    /// key -> version observed (`None` = key was absent)
    pub reads: BTreeMap<String, Option<u64>>,
    pub writes: BTreeMap<String, Value>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Shared key-value state space
pub trait StateStore: Send + Sync {
    /// Latest committed value for a key
    fn get(&self, key: &str) -> Result<Option<VersionedValue>>;

    /// All committed entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>>;

    /// All committed entries matching a query
    fn query(&self, query: &Query) -> Result<Vec<(String, Value)>>;

    /// Validate the read set and apply the write set atomically.
    /// Returns the commit sequence number assigned to the batch.
    fn apply(&self, batch: WriteBatch) -> Result<u64>;

    /// Sequence number of the last commit
    fn height(&self) -> u64;
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, VersionedValue>,
    seq: u64,
}

/// In-process state store
#[derive(Default)]
pub struct InMemoryStateStore {
    inner: RwLock<Inner>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

impl StateStore for InMemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<VersionedValue>> {
        Ok(self.inner.read().entries.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let inner = self.inner.read();
        Ok(inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect())
    }

    fn query(&self, query: &Query) -> Result<Vec<(String, Value)>> {
        let inner = self.inner.read();
        let hits = inner
            .entries
            .iter()
            .filter(|(_, v)| query.selector.matches(&v.value))
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect();
        Ok(query.finish(hits))
    }

    fn apply(&self, batch: WriteBatch) -> Result<u64> {
        let mut inner = self.inner.write();

        for (key, read) in &batch.reads {
            let current = inner.entries.get(key).map(|v| v.version);
            if current != *read {
                debug!(key = %key, read = ?read, current = ?current, "MVCC read conflict");
                return Err(CanopyError::Conflict {
                    key: key.clone(),
                    read: *read,
                    current,
                });
            }
        }

        inner.seq += 1;
        let seq = inner.seq;
        for (key, value) in batch.writes {
            inner.entries.insert(
                key,
                VersionedValue {
                    value,
                    version: seq,
                },
            );
        }
        Ok(seq)
    }

    fn height(&self) -> u64 {
        self.inner.read().seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_common::ErrorKind;
    use serde_json::json;

    fn write(key: &str, value: Value) -> WriteBatch {
        let mut batch = WriteBatch::default();
        batch.writes.insert(key.to_string(), value);
        batch
    }

    #[test]
    fn test_apply_assigns_versions() {
        let store = InMemoryStateStore::new();
        let seq = store.apply(write("A", json!(1))).unwrap();
        assert_eq!(seq, 1);
        assert_eq!(store.get("A").unwrap().unwrap().version, 1);

        store.apply(write("A", json!(2))).unwrap();
        let a = store.get("A").unwrap().unwrap();
        assert_eq!(a.version, 2);
        assert_eq!(a.value, json!(2));
        assert_eq!(store.height(), 2);
    }

    #[test]
    fn test_stale_read_conflicts() {
        let store = InMemoryStateStore::new();
        store.apply(write("A", json!(1))).unwrap();

        let mut stale = write("A", json!("from-stale"));
        stale.reads.insert("A".into(), Some(1));
        store.apply(write("A", json!(2))).unwrap();

        let err = store.apply(stale).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(store.get("A").unwrap().unwrap().value, json!(2));
    }

    #[test]
    fn test_phantom_insert_conflicts() {
        let store = InMemoryStateStore::new();

        let mut first = write("REF", json!(true));
        first.reads.insert("REF".into(), None);
        let mut second = write("REF", json!(true));
        second.reads.insert("REF".into(), None);

        store.apply(first).unwrap();
        assert!(matches!(store.apply(second), Err(CanopyError::Conflict { .. })));
    }

    #[test]
    fn test_rejected_batch_writes_nothing() {
        let store = InMemoryStateStore::new();
        store.apply(write("A", json!(1))).unwrap();

        let mut batch = WriteBatch::default();
        batch.reads.insert("A".into(), None);
        batch.writes.insert("B".into(), json!(1));
        assert!(store.apply(batch).is_err());
        assert!(store.get("B").unwrap().is_none());
        assert_eq!(store.height(), 1);
    }

    #[test]
    fn test_scan_prefix() {
        let store = InMemoryStateStore::new();
        for key in ["ORACLE_a", "ORACLE_b", "OBS-1", "ORACLEX"] {
            store.apply(write(key, json!(key))).unwrap();
        }
        let hits = store.scan_prefix("ORACLE_").unwrap();
        let keys: Vec<_> = hits.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["ORACLE_a", "ORACLE_b"]);
    }
}
