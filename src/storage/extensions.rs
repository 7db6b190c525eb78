//! The extension graph.
//!
//! Three keyspaces track how content extends content:
//!
//! - `ext:<child>` -> [`ExtensionRecord`]: the child's single incoming
//!   edge. Keying records by child makes the graph a forest: a hash has
//!   at most one parent, while a parent may have many children.
//! - `children:<parent>` -> child hex list, insertion-ordered.
//! - `root:<root>` -> every descendant hex reachable from that root.
//!
//! An edge insert touches all three keyspaces and commits as one batch;
//! a crash can never leave a record without its index entries.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::content::DualHash;
use crate::crypto::{self, GroupHash};
use crate::error::Error;

use super::backend::{KvBackend, KvRead, WriteBatch};

/// Keyspace prefix for extension records: `ext:<child_hex>`.
pub const PREFIX_EXTENSION: &str = "ext:";

/// Keyspace prefix for the children index: `children:<parent_hex>`.
pub const PREFIX_CHILDREN: &str = "children:";

/// Keyspace prefix for the descendant index: `root:<root_hex>`.
pub const PREFIX_ROOT: &str = "root:";

/// A persisted extension edge, keyed by its child hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    /// Hash of the parent content.
    pub parent: GroupHash,
    /// Hash of the child content (`parent + delta` in the group).
    pub child: GroupHash,
    /// The bytes appended to the parent.
    #[serde(with = "crate::encoding::b64")]
    pub delta: Vec<u8>,
    /// Dual hash of the child.
    pub child_dual_hash: DualHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
}

/// Index layer over the shared backend.
pub struct ExtensionGraph {
    backend: Arc<dyn KvBackend>,
}

impl ExtensionGraph {
    pub(crate) fn new(backend: Arc<dyn KvBackend>) -> ExtensionGraph {
        ExtensionGraph { backend }
    }

    pub(crate) fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// Records a new extension edge.
    ///
    /// The record write, the children-index append, and the
    /// descendant-index append (after walking to the root inside one
    /// snapshot) commit as a single atomic batch. Re-adding an identical
    /// edge is a no-op; any conflicting edge for the same child is
    /// refused.
    pub fn add_extension(
        &self,
        parent: &GroupHash,
        child: &GroupHash,
        delta: &[u8],
        child_dual: &DualHash,
    ) -> Result<(), Error> {
        let record = ExtensionRecord {
            parent: *parent,
            child: *child,
            delta: delta.to_vec(),
            child_dual_hash: child_dual.clone(),
            timestamp: None,
            publisher: None,
        };

        let mut batch = WriteBatch::new();
        if self.stage_extension(&mut batch, &record)? {
            self.backend.commit(batch)?;
        }
        Ok(())
    }

    /// Stages the three-key edge insert into `batch`; returns `false`
    /// when the identical edge already exists and nothing was staged.
    pub(crate) fn stage_extension(
        &self,
        batch: &mut WriteBatch,
        record: &ExtensionRecord,
    ) -> Result<bool, Error> {
        if !crypto::verify_extension(&record.parent, &record.child, &record.delta) {
            return Err(Error::InvalidExtension(format!(
                "child {} is not parent {} extended by the delta",
                record.child, record.parent
            )));
        }
        if record.child_dual_hash.crypto != record.child {
            return Err(Error::InvalidExtension(format!(
                "child dual hash {} does not match child {}",
                record.child_dual_hash.crypto, record.child
            )));
        }

        let view = self.backend.snapshot()?;

        if let Some(existing) = read_record(view.as_ref(), &record.child)? {
            if existing.parent == record.parent && existing.delta == record.delta {
                return Ok(false);
            }
            return Err(Error::InvalidExtension(format!(
                "child {} already recorded with a different parent or delta",
                record.child
            )));
        }

        // A hash that already anchors a descendant index cannot become a
        // child: re-parenting it would silently invalidate the index of
        // its whole subtree.
        if view.get(&root_key(&record.child))?.is_some() {
            return Err(Error::InvalidExtension(format!(
                "child {} already anchors its own descendant index",
                record.child
            )));
        }

        batch.put(extension_key(&record.child), serde_json::to_vec(record)?);

        let mut children = read_hex_list(view.as_ref(), &children_key(&record.parent))?;
        if !children.contains(&record.child) {
            children.push(record.child);
        }
        batch.put(children_key(&record.parent), encode_hex_list(&children)?);

        let root = find_root(view.as_ref(), &record.parent)?;
        let mut descendants = read_hex_list(view.as_ref(), &root_key(&root))?;
        if !descendants.contains(&record.child) {
            descendants.push(record.child);
        }
        batch.put(root_key(&root), encode_hex_list(&descendants)?);

        Ok(true)
    }

    /// Fetches the extension record for a child hash.
    pub fn get_extension(&self, hash: &GroupHash) -> Result<ExtensionRecord, Error> {
        let view = self.backend.snapshot()?;
        read_record(view.as_ref(), hash)?.ok_or(Error::ExtensionNotFound(*hash))
    }

    /// Returns the parent of a child hash.
    pub fn get_parent(&self, hash: &GroupHash) -> Result<GroupHash, Error> {
        Ok(self.get_extension(hash)?.parent)
    }

    /// Direct children of a hash, in insertion order. A hash with no
    /// children yields an empty list.
    pub fn get_children(&self, parent: &GroupHash) -> Result<Vec<GroupHash>, Error> {
        let view = self.backend.snapshot()?;
        read_hex_list(view.as_ref(), &children_key(parent))
    }

    /// Walks parent edges backward to the root of the chain containing
    /// `hash`. A hash with no incoming edge is its own root.
    pub fn get_root(&self, hash: &GroupHash) -> Result<GroupHash, Error> {
        let view = self.backend.snapshot()?;
        find_root(view.as_ref(), hash)
    }

    /// Returns the chain of extension records from the root down to
    /// `hash`, in root-to-leaf order. A root yields an empty chain.
    pub fn get_chain(&self, hash: &GroupHash) -> Result<Vec<ExtensionRecord>, Error> {
        let view = self.backend.snapshot()?;
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = *hash;

        while let Some(record) = read_record(view.as_ref(), &current)? {
            if !visited.insert(current) {
                return Err(Error::CorruptIndex(format!(
                    "extension records form a cycle at {current}"
                )));
            }
            current = record.parent;
            chain.push(record);
        }

        chain.reverse();
        Ok(chain)
    }

    /// Every hash reachable forward from `root`, per the stored index.
    pub fn get_all_descendants(&self, root: &GroupHash) -> Result<Vec<GroupHash>, Error> {
        let view = self.backend.snapshot()?;
        read_hex_list(view.as_ref(), &root_key(root))
    }

    /// Whether `child` is recorded as a direct extension of `parent`.
    pub fn is_extension(&self, parent: &GroupHash, child: &GroupHash) -> Result<bool, Error> {
        match self.get_extension(child) {
            Ok(record) => Ok(record.parent == *parent),
            Err(Error::ExtensionNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

pub(crate) fn read_record(
    view: &dyn KvRead,
    child: &GroupHash,
) -> Result<Option<ExtensionRecord>, Error> {
    match view.get(&extension_key(child))? {
        None => Ok(None),
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
    }
}

pub(crate) fn read_hex_list(view: &dyn KvRead, key: &[u8]) -> Result<Vec<GroupHash>, Error> {
    match view.get(key)? {
        None => Ok(Vec::new()),
        Some(bytes) => {
            let hexes: Vec<String> = serde_json::from_slice(&bytes)?;
            hexes.iter().map(|h| GroupHash::from_hex(h)).collect()
        }
    }
}

pub(crate) fn encode_hex_list(hashes: &[GroupHash]) -> Result<Vec<u8>, Error> {
    let hexes: Vec<String> = hashes.iter().map(GroupHash::to_hex).collect();
    Ok(serde_json::to_vec(&hexes)?)
}

/// Walks parent edges inside one read view until a hash with no record.
pub(crate) fn find_root(view: &dyn KvRead, hash: &GroupHash) -> Result<GroupHash, Error> {
    let mut visited = HashSet::new();
    let mut current = *hash;

    while let Some(record) = read_record(view, &current)? {
        if !visited.insert(current) {
            return Err(Error::CorruptIndex(format!(
                "extension records form a cycle at {current}"
            )));
        }
        current = record.parent;
    }
    Ok(current)
}

pub(crate) fn extension_key(child: &GroupHash) -> Vec<u8> {
    format!("{PREFIX_EXTENSION}{}", child.to_hex()).into_bytes()
}

pub(crate) fn children_key(parent: &GroupHash) -> Vec<u8> {
    format!("{PREFIX_CHILDREN}{}", parent.to_hex()).into_bytes()
}

pub(crate) fn root_key(root: &GroupHash) -> Vec<u8> {
    format!("{PREFIX_ROOT}{}", root.to_hex()).into_bytes()
}
