//! The store facade.
//!
//! [`Store`] owns the backend and composes the blob layer and the
//! extension graph behind one API. Mutating operations serialise on an
//! internal mutex and commit one atomic batch each; read operations take
//! snapshots internally, so a reader never observes a half-applied edge.
//!
//! Closing is RAII: dropping the store drops the backend (and, for the
//! in-memory configuration, the data).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::StorageConfig;
use crate::content::Extension;
use crate::crypto::GroupHash;
use crate::error::Error;

use super::backend::{KvBackend, WriteBatch};
use super::blocks::{BlockStore, PREFIX_BLOCK, block_key, hash_from_key, index_key};
use super::extensions::{
    ExtensionGraph, ExtensionRecord, PREFIX_CHILDREN, PREFIX_EXTENSION, PREFIX_ROOT, children_key,
    encode_hex_list, extension_key, find_root, read_hex_list, root_key,
};
use super::mem::MemoryBackend;
use super::rocksdb::{RocksDbBackend, RocksDbConfig};
use super::verification::{IntegrityReport, VerificationResult};

/// Storage statistics, as reported by [`Store::stats`].
#[derive(Clone, Debug, PartialEq)]
pub struct StoreStats {
    pub block_count: usize,
    pub extension_count: usize,
    pub total_size: u64,
    /// Storage directory; `None` for the in-memory configuration.
    pub path: Option<PathBuf>,
}

/// Durable, transactional content store indexed by group hash.
pub struct Store {
    backend: Arc<dyn KvBackend>,
    blocks: BlockStore,
    extensions: ExtensionGraph,
    /// Serialises mutating operations. Held only for the duration of one
    /// store call, never across user code.
    write_lock: Mutex<()>,
    path: Option<PathBuf>,
}

impl Store {
    /// Opens a store per the given configuration: RocksDB at the
    /// configured path, or an ephemeral in-memory backend.
    pub fn open(cfg: &StorageConfig) -> Result<Store, Error> {
        if cfg.in_memory {
            return Ok(Store::with_backend(Arc::new(MemoryBackend::new()), None));
        }
        let backend = RocksDbBackend::open(&RocksDbConfig {
            path: cfg.path.clone(),
            create_if_missing: true,
        })?;
        Ok(Store::with_backend(
            Arc::new(backend),
            Some(cfg.path.clone()),
        ))
    }

    /// Opens an ephemeral in-memory store.
    pub fn in_memory() -> Store {
        Store::with_backend(Arc::new(MemoryBackend::new()), None)
    }

    fn with_backend(backend: Arc<dyn KvBackend>, path: Option<PathBuf>) -> Store {
        Store {
            blocks: BlockStore::new(backend.clone()),
            extensions: ExtensionGraph::new(backend.clone()),
            write_lock: Mutex::new(()),
            backend,
            path,
        }
    }

    /// Storage directory, when backed by disk.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// Direct access to the blob layer.
    pub fn blocks(&self) -> &BlockStore {
        &self.blocks
    }

    /// Direct access to the extension graph.
    pub fn extensions(&self) -> &ExtensionGraph {
        &self.extensions
    }

    /// Stores root content, returning its hash.
    pub fn put_content(&self, data: &[u8]) -> Result<GroupHash, Error> {
        let _guard = self.write_guard()?;
        Ok(self.blocks.put_root(data)?.hash)
    }

    /// Fetches content bytes by hash.
    pub fn get_content(&self, hash: &GroupHash) -> Result<Vec<u8>, Error> {
        Ok(self.blocks.get(hash)?.data)
    }

    /// Whether content exists under `hash`.
    pub fn has_content(&self, hash: &GroupHash) -> Result<bool, Error> {
        self.blocks.has(hash)
    }

    /// Persists an admitted extension: the delta blob and the graph edge
    /// commit as one transaction.
    pub fn put_extension(&self, ext: &Extension) -> Result<(), Error> {
        if ext.parent.crypto.is_zero() {
            return Err(Error::InvalidExtension(
                "parent is the identity; store the content as a root".to_string(),
            ));
        }

        let _guard = self.write_guard()?;
        let mut batch = WriteBatch::new();

        self.blocks.stage_put(&mut batch, &ext.delta, false)?;

        let record = ExtensionRecord {
            parent: ext.parent.crypto,
            child: ext.child.crypto,
            delta: ext.delta.clone(),
            child_dual_hash: ext.child.clone(),
            timestamp: ext.timestamp,
            publisher: ext.publisher.clone(),
        };
        self.extensions.stage_extension(&mut batch, &record)?;

        if !batch.is_empty() {
            self.backend.commit(batch)?;
        }
        Ok(())
    }

    /// Fetches the extension record for a child hash.
    pub fn get_extension(&self, hash: &GroupHash) -> Result<ExtensionRecord, Error> {
        self.extensions.get_extension(hash)
    }

    /// All stored extension records, in key order.
    pub fn extension_records(&self) -> Result<Vec<ExtensionRecord>, Error> {
        let mut records = Vec::new();
        for (_, value) in self.backend.scan_prefix(PREFIX_EXTENSION.as_bytes())? {
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    pub fn get_children(&self, parent: &GroupHash) -> Result<Vec<GroupHash>, Error> {
        self.extensions.get_children(parent)
    }

    pub fn get_chain(&self, hash: &GroupHash) -> Result<Vec<ExtensionRecord>, Error> {
        self.extensions.get_chain(hash)
    }

    pub fn get_root(&self, hash: &GroupHash) -> Result<GroupHash, Error> {
        self.extensions.get_root(hash)
    }

    pub fn get_all_descendants(&self, root: &GroupHash) -> Result<Vec<GroupHash>, Error> {
        self.extensions.get_all_descendants(root)
    }

    pub fn is_extension(&self, parent: &GroupHash, child: &GroupHash) -> Result<bool, Error> {
        self.extensions.is_extension(parent, child)
    }

    pub fn verify_chain(
        &self,
        root: &GroupHash,
        target: &GroupHash,
    ) -> Result<VerificationResult, Error> {
        self.extensions.verify_chain(root, target)
    }

    pub fn verify_extension(
        &self,
        parent: &GroupHash,
        child: &GroupHash,
    ) -> Result<VerificationResult, Error> {
        self.extensions.verify_extension_step(parent, child)
    }

    pub fn reconstruct(&self, hash: &GroupHash) -> Result<Vec<u8>, Error> {
        self.extensions.reconstruct(&self.blocks, hash)
    }

    pub fn verify_and_reconstruct(
        &self,
        root: &GroupHash,
        target: &GroupHash,
    ) -> Result<(VerificationResult, Option<Vec<u8>>), Error> {
        self.extensions
            .verify_and_reconstruct(&self.blocks, root, target)
    }

    /// Runs the read-only integrity audit.
    pub fn audit(&self) -> Result<IntegrityReport, Error> {
        self.extensions.audit(&self.blocks)
    }

    /// Current storage statistics.
    pub fn stats(&self) -> Result<StoreStats, Error> {
        Ok(StoreStats {
            block_count: self.blocks.count()?,
            extension_count: self.backend.scan_prefix(PREFIX_EXTENSION.as_bytes())?.len(),
            total_size: self.blocks.total_size()?,
            path: self.path.clone(),
        })
    }

    /// Mark-and-sweep garbage collection.
    ///
    /// Marks `keep_roots` and everything their descendant indices reach,
    /// then deletes every unmarked block together with the extension
    /// records and index entries of unmarked hashes, all in one batch.
    /// Surviving children/descendant lists are pruned of swept entries.
    /// Returns the number of blocks deleted.
    pub fn gc(&self, keep_roots: &[GroupHash]) -> Result<usize, Error> {
        let _guard = self.write_guard()?;
        let view = self.backend.snapshot()?;

        let mut marked: HashSet<GroupHash> = keep_roots.iter().copied().collect();
        for root in keep_roots {
            for descendant in read_hex_list(view.as_ref(), &root_key(root))? {
                marked.insert(descendant);
            }
        }

        let mut batch = WriteBatch::new();
        let mut deleted = 0usize;

        // Sweep blocks.
        for (key, _) in view.scan_prefix(PREFIX_BLOCK.as_bytes())? {
            let Some(hash) = hash_from_key(&key, PREFIX_BLOCK) else {
                continue;
            };
            if !marked.contains(&hash) {
                batch.delete(block_key(&hash));
                batch.delete(index_key(&hash));
                deleted += 1;
            }
        }

        // Sweep edges of unmarked children, remembering which surviving
        // lists reference them.
        let mut pruned_children: HashMap<GroupHash, HashSet<GroupHash>> = HashMap::new();
        let mut pruned_descendants: HashMap<GroupHash, HashSet<GroupHash>> = HashMap::new();

        for (key, value) in view.scan_prefix(PREFIX_EXTENSION.as_bytes())? {
            let Some(child) = hash_from_key(&key, PREFIX_EXTENSION) else {
                continue;
            };
            if marked.contains(&child) {
                continue;
            }
            batch.delete(extension_key(&child));

            let record: ExtensionRecord = serde_json::from_slice(&value)?;
            if marked.contains(&record.parent) {
                pruned_children
                    .entry(record.parent)
                    .or_default()
                    .insert(child);
            }
            let root = find_root(view.as_ref(), &record.parent)?;
            if marked.contains(&root) {
                pruned_descendants.entry(root).or_default().insert(child);
            }
        }

        // Index lists anchored at unmarked hashes go wholesale.
        for prefix in [PREFIX_CHILDREN, PREFIX_ROOT] {
            for (key, _) in view.scan_prefix(prefix.as_bytes())? {
                if let Some(owner) = hash_from_key(&key, prefix) {
                    if !marked.contains(&owner) {
                        batch.delete(key);
                    }
                }
            }
        }

        // Prune swept entries out of surviving lists.
        for (parent, removed) in &pruned_children {
            let kept: Vec<GroupHash> = read_hex_list(view.as_ref(), &children_key(parent))?
                .into_iter()
                .filter(|h| !removed.contains(h))
                .collect();
            if kept.is_empty() {
                batch.delete(children_key(parent));
            } else {
                batch.put(children_key(parent), encode_hex_list(&kept)?);
            }
        }
        for (root, removed) in &pruned_descendants {
            let kept: Vec<GroupHash> = read_hex_list(view.as_ref(), &root_key(root))?
                .into_iter()
                .filter(|h| !removed.contains(h))
                .collect();
            if kept.is_empty() {
                batch.delete(root_key(root));
            } else {
                batch.put(root_key(root), encode_hex_list(&kept)?);
            }
        }

        if !batch.is_empty() {
            self.backend.commit(batch)?;
        }
        Ok(deleted)
    }

    fn write_guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, Error> {
        self.write_lock
            .lock()
            .map_err(|_| super::backend::BackendError::Poisoned("store write lock").into())
    }
}
