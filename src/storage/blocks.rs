//! Content block storage.
//!
//! Blocks are byte strings keyed by their element hash under the `blk:`
//! namespace, serialised as canonical JSON with base64 data. A root's
//! block holds its full bytes; a child's block holds only its delta (the
//! chain records carry deltas too, so reconstruction never depends on
//! delta blocks). The `idx:` namespace flags hashes first stored as
//! roots, which lets the graph refuse ambiguous root/child hashes.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::crypto::{self, GroupHash};
use crate::error::Error;

use super::backend::{KvBackend, WriteBatch};

/// Keyspace prefix for block data: `blk:<hex>` -> [`Block`] JSON.
pub const PREFIX_BLOCK: &str = "blk:";

/// Keyspace prefix for block metadata: `idx:<hex>` -> root flag.
pub const PREFIX_INDEX: &str = "idx:";

/// Marker value stored under `idx:<hex>` for root content.
const ROOT_FLAG: &[u8] = b"root";

/// A stored content block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Element hash of the block bytes.
    pub hash: GroupHash,
    /// The stored bytes.
    #[serde(with = "crate::encoding::b64")]
    pub data: Vec<u8>,
    /// Length of `data` in bytes.
    pub size: u64,
    /// First-write time, unix seconds.
    pub timestamp: i64,
}

/// Blob layer over the shared backend.
pub struct BlockStore {
    backend: Arc<dyn KvBackend>,
}

impl BlockStore {
    pub(crate) fn new(backend: Arc<dyn KvBackend>) -> BlockStore {
        BlockStore { backend }
    }

    /// Stores a content block, returning it.
    ///
    /// Re-putting identical bytes is idempotent. Observing different
    /// bytes under the same hash means the store is corrupt (or the
    /// digest is broken) and is refused.
    pub fn put(&self, data: &[u8]) -> Result<Block, Error> {
        let mut batch = WriteBatch::new();
        let block = self.stage_put(&mut batch, data, false)?;
        if !batch.is_empty() {
            self.backend.commit(batch)?;
        }
        Ok(block)
    }

    /// Stores a block and flags its hash as root content.
    pub fn put_root(&self, data: &[u8]) -> Result<Block, Error> {
        let mut batch = WriteBatch::new();
        let block = self.stage_put(&mut batch, data, true)?;
        if !batch.is_empty() {
            self.backend.commit(batch)?;
        }
        Ok(block)
    }

    /// Stages a block write into `batch` without committing, so callers
    /// can fuse it with index writes into one transaction.
    pub(crate) fn stage_put(
        &self,
        batch: &mut WriteBatch,
        data: &[u8],
        root: bool,
    ) -> Result<Block, Error> {
        let hash = crypto::hash_element(data);

        if let Some(existing) = self.read(&hash)? {
            if existing.data != data {
                return Err(Error::CorruptIndex(format!(
                    "block {hash} already stored with different content"
                )));
            }
            if root {
                batch.put(index_key(&hash), ROOT_FLAG.to_vec());
            }
            return Ok(existing);
        }

        let block = Block {
            hash,
            data: data.to_vec(),
            size: data.len() as u64,
            timestamp: unix_now(),
        };
        batch.put(block_key(&hash), serde_json::to_vec(&block)?);
        if root {
            batch.put(index_key(&hash), ROOT_FLAG.to_vec());
        }
        Ok(block)
    }

    /// Fetches a block by hash.
    pub fn get(&self, hash: &GroupHash) -> Result<Block, Error> {
        self.read(hash)?.ok_or(Error::BlockNotFound(*hash))
    }

    /// Whether a block exists under `hash`.
    pub fn has(&self, hash: &GroupHash) -> Result<bool, Error> {
        Ok(self.backend.get(&block_key(hash))?.is_some())
    }

    /// Whether `hash` is flagged as root content.
    pub fn is_root(&self, hash: &GroupHash) -> Result<bool, Error> {
        Ok(self.backend.get(&index_key(hash))?.is_some())
    }

    /// Removes a block and its metadata. Removing an absent block is a
    /// no-op; blocks are only deleted by garbage collection.
    pub fn delete(&self, hash: &GroupHash) -> Result<(), Error> {
        let mut batch = WriteBatch::new();
        batch.delete(block_key(hash));
        batch.delete(index_key(hash));
        self.backend.commit(batch)?;
        Ok(())
    }

    /// Lists all stored block hashes.
    pub fn list(&self) -> Result<Vec<GroupHash>, Error> {
        let mut hashes = Vec::new();
        for (key, _) in self.backend.scan_prefix(PREFIX_BLOCK.as_bytes())? {
            if let Some(hash) = hash_from_key(&key, PREFIX_BLOCK) {
                hashes.push(hash);
            }
        }
        Ok(hashes)
    }

    /// Number of stored blocks.
    pub fn count(&self) -> Result<usize, Error> {
        Ok(self.backend.scan_prefix(PREFIX_BLOCK.as_bytes())?.len())
    }

    /// Total size in bytes of all stored blocks.
    pub fn total_size(&self) -> Result<u64, Error> {
        let mut total = 0u64;
        for (_, value) in self.backend.scan_prefix(PREFIX_BLOCK.as_bytes())? {
            let block: Block = serde_json::from_slice(&value)?;
            total += block.size;
        }
        Ok(total)
    }

    fn read(&self, hash: &GroupHash) -> Result<Option<Block>, Error> {
        match self.backend.get(&block_key(hash))? {
            None => Ok(None),
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        }
    }
}

pub(crate) fn block_key(hash: &GroupHash) -> Vec<u8> {
    format!("{PREFIX_BLOCK}{}", hash.to_hex()).into_bytes()
}

pub(crate) fn index_key(hash: &GroupHash) -> Vec<u8> {
    format!("{PREFIX_INDEX}{}", hash.to_hex()).into_bytes()
}

/// Recovers a hash from a prefixed storage key; `None` for foreign keys.
pub(crate) fn hash_from_key(key: &[u8], prefix: &str) -> Option<GroupHash> {
    let hex = std::str::from_utf8(key.get(prefix.len()..)?).ok()?;
    GroupHash::from_hex(hex).ok()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
