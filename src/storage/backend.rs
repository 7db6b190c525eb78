//! Key-value backend abstraction.
//!
//! The store runs on a single flat keyspace with two guarantees from the
//! backend: a [`WriteBatch`] commits atomically, and a [`KvRead`]
//! snapshot observes a stable view across multiple dependent reads.
//! Concrete implementations live in [`super::mem`] and
//! [`super::rocksdb`].

use std::fmt;

/// Backend-level error type.
#[derive(Debug)]
pub enum BackendError {
    /// Underlying RocksDB error.
    RocksDb(rocksdb::Error),
    /// Filesystem error while preparing the storage directory.
    Io(std::io::Error),
    /// A storage lock was poisoned by a panicking writer.
    Poisoned(&'static str),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::RocksDb(e) => write!(f, "rocksdb: {e}"),
            BackendError::Io(e) => write!(f, "io: {e}"),
            BackendError::Poisoned(what) => write!(f, "poisoned lock: {what}"),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::RocksDb(e) => Some(e),
            BackendError::Io(e) => Some(e),
            BackendError::Poisoned(_) => None,
        }
    }
}

impl From<rocksdb::Error> for BackendError {
    fn from(e: rocksdb::Error) -> Self {
        BackendError::RocksDb(e)
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError::Io(e)
    }
}

/// One staged mutation of a [`WriteBatch`].
#[derive(Clone, Debug)]
pub(crate) enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// An ordered set of mutations applied atomically by
/// [`KvBackend::commit`]. Either every operation lands or none does.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    pub(crate) ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> WriteBatch {
        WriteBatch::default()
    }

    /// Stages a put.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Stages a delete. Deleting an absent key is a no-op at commit.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A stable read view of the keyspace.
///
/// All reads through one `KvRead` observe the same version of the data,
/// regardless of concurrent commits.
pub trait KvRead {
    /// Fetches the value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;

    /// Returns all `(key, value)` pairs whose key starts with `prefix`,
    /// in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BackendError>;
}

/// A key-value backend with atomic batch commits and snapshot reads.
pub trait KvBackend: Send + Sync {
    /// Point read against the current state.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;

    /// Prefix scan against the current state, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BackendError>;

    /// Applies a batch atomically.
    fn commit(&self, batch: WriteBatch) -> Result<(), BackendError>;

    /// Opens a stable read view of the current state.
    fn snapshot(&self) -> Result<Box<dyn KvRead + '_>, BackendError>;
}
