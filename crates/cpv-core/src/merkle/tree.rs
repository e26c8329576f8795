//! Batch Merkle tree construction.

use tracing::debug;

use super::proof::MerkleProof;
use crate::cancel::CancellationToken;
use crate::crypto::{self, Hash};
use crate::error::{VerifyError, VerifyResult};

/// The only supported leaf derivation, as named in anchors.
pub const LEAF_HASH_METHOD: &str = "SHA256(EventHash)";

/// `LeafHash = SHA-256(raw EventHash bytes)`.
#[must_use]
pub fn leaf_hash(event_hash: &Hash) -> Hash {
    crypto::sha256(event_hash)
}

/// A binary Merkle tree over one batch of event hashes.
///
/// Leaves are padded up to a power of two by repeating the last leaf. Padding
/// leaves exist only to complete the shape: they are never given an index and
/// never produce a proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    tree_size: usize,
    /// `levels[0]` holds the padded leaves, the last level holds the root.
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Builds the tree over `event_hashes` in the given order.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::EmptyBatch`] if `event_hashes` is empty
    /// - [`VerifyError::Cancelled`] if `cancel` trips between levels
    pub fn build(event_hashes: &[Hash], cancel: &CancellationToken) -> VerifyResult<Self> {
        let Some(last) = event_hashes.last() else {
            return Err(VerifyError::EmptyBatch);
        };

        let tree_size = event_hashes.len();
        let padded = tree_size.next_power_of_two();
        let mut leaves: Vec<Hash> = event_hashes.iter().map(leaf_hash).collect();
        leaves.resize(padded, leaf_hash(last));

        let mut levels = vec![leaves];
        while let Some(current) = levels.last().filter(|level| level.len() > 1) {
            cancel.check()?;
            let next: Vec<Hash> = current
                .chunks_exact(2)
                .map(|pair| crypto::sha256_concat(&pair[0], &pair[1]))
                .collect();
            levels.push(next);
        }

        debug!(tree_size, padded, height = levels.len() - 1, "merkle tree built");
        Ok(Self { tree_size, levels })
    }

    /// The root.
    #[must_use]
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_default()
    }

    /// Number of real leaves (before padding).
    #[must_use]
    pub const fn tree_size(&self) -> usize {
        self.tree_size
    }

    /// Number of leaves after padding.
    #[must_use]
    pub fn padded_size(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Number of sibling hashes in every proof.
    #[must_use]
    pub fn height(&self) -> usize {
        self.levels.len() - 1
    }

    /// Leaf hash at `index`, if `index` addresses a real leaf.
    #[must_use]
    pub fn leaf(&self, index: usize) -> Option<Hash> {
        (index < self.tree_size)
            .then(|| self.levels.first().and_then(|l| l.get(index)).copied())
            .flatten()
    }

    /// Inclusion proof for the real leaf at `index`, bottom to top.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::ProofInvalid`] if `index` is not a real leaf.
    pub fn proof(&self, index: usize) -> VerifyResult<MerkleProof> {
        if index >= self.tree_size {
            return Err(VerifyError::proof_invalid(format!(
                "leaf index {index} outside tree of size {}",
                self.tree_size
            )));
        }

        let mut siblings = Vec::with_capacity(self.height());
        let mut idx = index;
        for level in &self.levels[..self.height()] {
            siblings.push(level[idx ^ 1]);
            idx /= 2;
        }
        Ok(MerkleProof::new(index, self.tree_size, siblings))
    }
}
