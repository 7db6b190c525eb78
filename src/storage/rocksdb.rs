//! RocksDB-backed durable backend.
//!
//! One RocksDB instance holds the whole keyspace; the logical namespaces
//! (`blk:`, `idx:`, `ext:`, `children:`, `root:`) are key prefixes, so a
//! prefix scan walks one namespace. Batches map to `rocksdb::WriteBatch`
//! (atomic on commit) and read views map to RocksDB snapshots.

use std::path::{Path, PathBuf};

use rocksdb::{DB, Direction, IteratorMode, Options};

use super::backend::{BackendError, BatchOp, KvBackend, KvRead, WriteBatch};

/// Configuration for [`RocksDbBackend`].
#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    /// Filesystem path of the database directory.
    pub path: PathBuf,
    /// Whether to create the database if it does not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/tera-db"),
            create_if_missing: true,
        }
    }
}

/// RocksDB implementation of [`KvBackend`].
pub struct RocksDbBackend {
    db: DB,
}

impl RocksDbBackend {
    /// Opens (or creates) the database at the configured path.
    ///
    /// The storage directory is created first, so a fresh data dir does
    /// not need to exist ahead of time.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, BackendError> {
        if cfg.create_if_missing {
            std::fs::create_dir_all(&cfg.path)?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);

        let db = DB::open(&opts, Path::new(&cfg.path))?;
        Ok(Self { db })
    }
}

fn collect_prefix<I>(iter: I, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BackendError>
where
    I: Iterator<Item = Result<(Box<[u8]>, Box<[u8]>), rocksdb::Error>>,
{
    let mut out = Vec::new();
    for item in iter {
        let (key, value) = item?;
        if !key.starts_with(prefix) {
            break;
        }
        out.push((key.into_vec(), value.into_vec()));
    }
    Ok(out)
}

impl KvBackend for RocksDbBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.db.get(key)?)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BackendError> {
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        collect_prefix(iter, prefix)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), BackendError> {
        let mut inner = rocksdb::WriteBatch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put { key, value } => inner.put(key, value),
                BatchOp::Delete { key } => inner.delete(key),
            }
        }
        self.db.write(inner)?;
        Ok(())
    }

    fn snapshot(&self) -> Result<Box<dyn KvRead + '_>, BackendError> {
        Ok(Box::new(RocksDbSnapshot {
            snapshot: self.db.snapshot(),
        }))
    }
}

/// Read view backed by a RocksDB snapshot.
struct RocksDbSnapshot<'a> {
    snapshot: rocksdb::Snapshot<'a>,
}

impl KvRead for RocksDbSnapshot<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.snapshot.get(key)?)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BackendError> {
        let iter = self
            .snapshot
            .iterator(IteratorMode::From(prefix, Direction::Forward));
        collect_prefix(iter, prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, RocksDbBackend) {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = RocksDbConfig {
            path: tmp.path().join("db"),
            create_if_missing: true,
        };
        let backend = RocksDbBackend::open(&cfg).expect("open RocksDB");
        (tmp, backend)
    }

    #[test]
    fn open_creates_the_storage_directory() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("nested").join("db");
        let cfg = RocksDbConfig {
            path: path.clone(),
            create_if_missing: true,
        };

        let _backend = RocksDbBackend::open(&cfg).expect("open RocksDB");
        assert!(path.exists());
    }

    #[test]
    fn batch_roundtrip_and_prefix_scan() {
        let (_tmp, backend) = open_temp();

        let mut batch = WriteBatch::new();
        batch.put(b"blk:aa".to_vec(), b"1".to_vec());
        batch.put(b"ext:aa".to_vec(), b"2".to_vec());
        batch.put(b"blk:bb".to_vec(), b"3".to_vec());
        backend.commit(batch).unwrap();

        assert_eq!(backend.get(b"blk:aa").unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.get(b"missing").unwrap(), None);

        let blocks = backend.scan_prefix(b"blk:").unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].0, b"blk:aa");
    }

    #[test]
    fn snapshot_reads_are_stable_across_commits() {
        let (_tmp, backend) = open_temp();

        let mut batch = WriteBatch::new();
        batch.put(b"k".to_vec(), b"old".to_vec());
        backend.commit(batch).unwrap();

        let snapshot = backend.snapshot().unwrap();

        let mut batch = WriteBatch::new();
        batch.put(b"k".to_vec(), b"new".to_vec());
        batch.put(b"k2".to_vec(), b"v2".to_vec());
        backend.commit(batch).unwrap();

        assert_eq!(snapshot.get(b"k").unwrap(), Some(b"old".to_vec()));
        assert_eq!(snapshot.get(b"k2").unwrap(), None);
    }

    #[test]
    fn data_survives_reopen() {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = RocksDbConfig {
            path: tmp.path().join("db"),
            create_if_missing: true,
        };

        {
            let backend = RocksDbBackend::open(&cfg).unwrap();
            let mut batch = WriteBatch::new();
            batch.put(b"persist".to_vec(), b"yes".to_vec());
            backend.commit(batch).unwrap();
        }

        let backend = RocksDbBackend::open(&cfg).unwrap();
        assert_eq!(backend.get(b"persist").unwrap(), Some(b"yes".to_vec()));
    }
}
