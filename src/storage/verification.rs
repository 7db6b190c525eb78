//! Chain verification, content reconstruction, and integrity audit.
//!
//! Verification never errors on a logical mismatch: a broken chain is a
//! [`VerificationResult`] with `valid == false` and a reason naming the
//! failed step. Errors are reserved for I/O and encoding faults.

use std::collections::HashSet;

use crate::crypto::{self, GroupHash};
use crate::error::Error;

use super::blocks::BlockStore;
use super::extensions::{ExtensionGraph, read_hex_list, read_record};

/// Result of verifying a chain or a single extension step.
#[derive(Clone, Debug, PartialEq)]
pub struct VerificationResult {
    pub valid: bool,
    /// Human-readable outcome; names the failing step on mismatch.
    pub reason: String,
    /// Number of verified edges (root to target).
    pub chain_length: usize,
    /// Root of the verified chain, when valid.
    pub root: Option<GroupHash>,
    /// Target of the verified chain, when valid.
    pub final_hash: Option<GroupHash>,
}

impl VerificationResult {
    fn invalid(reason: String) -> VerificationResult {
        VerificationResult {
            valid: false,
            reason,
            chain_length: 0,
            root: None,
            final_hash: None,
        }
    }
}

/// Read-only integrity report produced by [`ExtensionGraph::audit`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IntegrityReport {
    pub total_blocks: usize,
    pub total_extensions: usize,
    pub invalid_extensions: usize,
    /// Blocks with neither an incoming edge nor children.
    pub orphaned_blocks: usize,
    /// Descriptions of observed faults, capped at [`MAX_AUDIT_ERRORS`].
    pub errors: Vec<String>,
}

/// Upper bound on the audit error list.
pub const MAX_AUDIT_ERRORS: usize = 32;

impl IntegrityReport {
    fn record_error(&mut self, message: String) {
        if self.errors.len() < MAX_AUDIT_ERRORS {
            self.errors.push(message);
        }
    }
}

impl ExtensionGraph {
    /// Verifies a single stored extension step from `parent` to `child`.
    pub fn verify_extension_step(
        &self,
        parent: &GroupHash,
        child: &GroupHash,
    ) -> Result<VerificationResult, Error> {
        let record = match self.get_extension(child) {
            Ok(record) => record,
            Err(Error::ExtensionNotFound(_)) => {
                return Ok(VerificationResult::invalid(format!(
                    "no extension record for {child}"
                )));
            }
            Err(e) => return Err(e),
        };

        if record.parent != *parent {
            return Ok(VerificationResult::invalid(format!(
                "recorded parent {} does not match {parent}",
                record.parent
            )));
        }
        if !crypto::verify_extension(parent, child, &record.delta) {
            return Ok(VerificationResult::invalid(
                "child hash does not match parent extended by delta".to_string(),
            ));
        }

        Ok(VerificationResult {
            valid: true,
            reason: "extension verified".to_string(),
            chain_length: 1,
            root: Some(*parent),
            final_hash: Some(*child),
        })
    }

    /// Verifies the stored chain from `root` down to `target`.
    ///
    /// Walks the chain records in order, re-deriving each child from the
    /// running cursor, and succeeds only when the cursor lands exactly on
    /// `target`. Linear in the chain length.
    pub fn verify_chain(
        &self,
        root: &GroupHash,
        target: &GroupHash,
    ) -> Result<VerificationResult, Error> {
        let chain = self.get_chain(target)?;
        let mut cursor = *root;

        for (step, record) in chain.iter().enumerate() {
            if record.parent != cursor {
                return Ok(VerificationResult::invalid(format!(
                    "chain break at step {step}: parent mismatch"
                )));
            }
            if !crypto::verify_extension(&cursor, &record.child, &record.delta) {
                return Ok(VerificationResult::invalid(format!(
                    "invalid extension at step {step}: hash mismatch"
                )));
            }
            cursor = record.child;
        }

        if cursor != *target {
            return Ok(VerificationResult::invalid(
                "chain does not reach the target hash".to_string(),
            ));
        }

        Ok(VerificationResult {
            valid: true,
            reason: "chain verified".to_string(),
            chain_length: chain.len(),
            root: Some(*root),
            final_hash: Some(*target),
        })
    }

    /// Rebuilds the full content bytes for `hash` by replaying its chain:
    /// the root block's bytes followed by every delta in order.
    pub fn reconstruct(&self, blocks: &BlockStore, hash: &GroupHash) -> Result<Vec<u8>, Error> {
        let chain = self.get_chain(hash)?;
        let root = chain.first().map(|record| record.parent).unwrap_or(*hash);

        let root_block = blocks.get(&root)?;
        let mut content = root_block.data;
        for record in &chain {
            content.extend_from_slice(&record.delta);
        }
        Ok(content)
    }

    /// Verifies the chain from `root` to `target` and reconstructs the
    /// content only when verification succeeds.
    pub fn verify_and_reconstruct(
        &self,
        blocks: &BlockStore,
        root: &GroupHash,
        target: &GroupHash,
    ) -> Result<(VerificationResult, Option<Vec<u8>>), Error> {
        let result = self.verify_chain(root, target)?;
        if !result.valid {
            return Ok((result, None));
        }
        let content = self.reconstruct(blocks, target)?;
        Ok((result, Some(content)))
    }

    /// Sweeps every stored block and verifies each of its recorded child
    /// edges. Read-only; faults are counted and described, never fixed.
    pub fn audit(&self, blocks: &BlockStore) -> Result<IntegrityReport, Error> {
        let view = self.backend().snapshot()?;
        let mut report = IntegrityReport::default();

        let hashes = blocks.list()?;
        report.total_blocks = hashes.len();

        for hash in &hashes {
            let children = read_hex_list(
                view.as_ref(),
                &super::extensions::children_key(hash),
            )?;
            report.total_extensions += children.len();

            let has_parent = read_record(view.as_ref(), hash)?.is_some();
            if !has_parent && children.is_empty() {
                report.orphaned_blocks += 1;
            }
            if has_parent && blocks.is_root(hash)? {
                report.record_error(format!(
                    "block {} is flagged as root but has a parent edge",
                    short(hash)
                ));
            }

            for child in &children {
                match read_record(view.as_ref(), child)? {
                    None => {
                        report.invalid_extensions += 1;
                        report.record_error(format!(
                            "children index of {} lists {} but no record exists",
                            short(hash),
                            short(child)
                        ));
                    }
                    Some(record) => {
                        let valid = record.parent == *hash
                            && crypto::verify_extension(hash, child, &record.delta);
                        if !valid {
                            report.invalid_extensions += 1;
                            report.record_error(format!(
                                "invalid extension {} -> {}",
                                short(hash),
                                short(child)
                            ));
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}

fn short(hash: &GroupHash) -> String {
    hash.to_hex()[..8].to_string()
}
