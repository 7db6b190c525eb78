//! In-memory backend.
//!
//! A first-class configuration, not just a test double: ephemeral nodes
//! run on it directly. Commits apply under a single write lock, which
//! gives serialisable semantics trivially; snapshots clone the map under
//! the read lock.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::backend::{BackendError, BatchOp, KvBackend, KvRead, WriteBatch};

/// In-memory implementation of [`KvBackend`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryBackend {
    /// Creates a new, empty in-memory backend.
    pub fn new() -> MemoryBackend {
        MemoryBackend::default()
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.map.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn scan(map: &BTreeMap<Vec<u8>, Vec<u8>>, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    map.range(prefix.to_vec()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        let map = self
            .map
            .read()
            .map_err(|_| BackendError::Poisoned("memory backend"))?;
        Ok(map.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BackendError> {
        let map = self
            .map
            .read()
            .map_err(|_| BackendError::Poisoned("memory backend"))?;
        Ok(scan(&map, prefix))
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), BackendError> {
        let mut map = self
            .map
            .write()
            .map_err(|_| BackendError::Poisoned("memory backend"))?;
        for op in batch.ops {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<Box<dyn KvRead + '_>, BackendError> {
        let map = self
            .map
            .read()
            .map_err(|_| BackendError::Poisoned("memory backend"))?;
        Ok(Box::new(MemorySnapshot { map: map.clone() }))
    }
}

/// Point-in-time copy of the map.
struct MemorySnapshot {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl KvRead for MemorySnapshot {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.map.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BackendError> {
        Ok(scan(&self.map, prefix))
    }
}
