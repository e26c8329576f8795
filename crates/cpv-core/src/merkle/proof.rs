//! Merkle inclusion proofs.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::leaf_hash;
use crate::cancel::CancellationToken;
use crate::crypto::{self, Hash};
use crate::error::{VerifyError, VerifyResult};

/// Height of the padded tree for `tree_size` real leaves, or `None` when
/// the padded size does not fit in a `usize`.
#[must_use]
pub const fn padded_height(tree_size: usize) -> Option<usize> {
    match tree_size.checked_next_power_of_two() {
        Some(padded) => Some(padded.trailing_zeros() as usize),
        None => None,
    }
}

/// An inclusion proof: sibling hashes from leaf level up to the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    leaf_index: usize,
    tree_size: usize,
    #[serde(with = "prefixed_hashes")]
    siblings: Vec<Hash>,
}

impl MerkleProof {
    /// Creates a proof.
    #[must_use]
    pub const fn new(leaf_index: usize, tree_size: usize, siblings: Vec<Hash>) -> Self {
        Self {
            leaf_index,
            tree_size,
            siblings,
        }
    }

    /// Index of the proven leaf.
    #[must_use]
    pub const fn leaf_index(&self) -> usize {
        self.leaf_index
    }

    /// Number of real leaves in the tree.
    #[must_use]
    pub const fn tree_size(&self) -> usize {
        self.tree_size
    }

    /// Sibling hashes, bottom to top.
    #[must_use]
    pub fn siblings(&self) -> &[Hash] {
        &self.siblings
    }

    /// Siblings in `sha256:<hex>` form.
    #[must_use]
    pub fn siblings_prefixed(&self) -> Vec<String> {
        self.siblings.iter().map(crypto::to_prefixed).collect()
    }

    /// Verifies this proof for `event_hash` against `root`.
    ///
    /// # Errors
    ///
    /// See [`MerkleProofVerifier::verify_sized`].
    pub fn verify(
        &self,
        event_hash: &Hash,
        root: &Hash,
        cancel: &CancellationToken,
    ) -> VerifyResult<()> {
        MerkleProofVerifier::verify_sized(
            event_hash,
            self.leaf_index,
            self.tree_size,
            &self.siblings,
            root,
            cancel,
        )
    }
}

/// Recomputes roots from inclusion proofs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MerkleProofVerifier;

impl MerkleProofVerifier {
    /// Folds `proof` over the leaf derived from `event_hash`.
    ///
    /// At each level an even index hashes `current || sibling` and an odd
    /// index hashes `sibling || current`, then the index halves.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Cancelled`] if `cancel` trips between levels.
    pub fn compute_root(
        event_hash: &Hash,
        leaf_index: usize,
        proof: &[Hash],
        cancel: &CancellationToken,
    ) -> VerifyResult<Hash> {
        let mut current = leaf_hash(event_hash);
        let mut idx = leaf_index;
        for sibling in proof {
            cancel.check()?;
            current = if idx % 2 == 0 {
                crypto::sha256_concat(&current, sibling)
            } else {
                crypto::sha256_concat(sibling, &current)
            };
            idx /= 2;
        }
        Ok(current)
    }

    /// Verifies a proof without knowledge of the tree size.
    ///
    /// An empty proof is a direct comparison of the leaf hash with the root.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::ProofInvalid`] if the recomputed root differs
    /// - [`VerifyError::Cancelled`] if `cancel` trips between levels
    pub fn verify(
        event_hash: &Hash,
        leaf_index: usize,
        proof: &[Hash],
        root: &Hash,
        cancel: &CancellationToken,
    ) -> VerifyResult<()> {
        let computed = Self::compute_root(event_hash, leaf_index, proof, cancel)?;
        if crypto::digests_equal(&computed, root) {
            debug!(leaf_index, depth = proof.len(), "inclusion proof verified");
            Ok(())
        } else {
            Err(VerifyError::proof_invalid(format!(
                "recomputed root {} does not match {}",
                crypto::to_prefixed(&computed),
                crypto::to_prefixed(root)
            )))
        }
    }

    /// Verifies a proof for a tree of known size.
    ///
    /// Besides the root comparison, the index must address a real leaf and
    /// the proof must have exactly the padded tree height, so padding leaves
    /// are never addressable.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::ProofInvalid`] on any mismatch, including a tree
    ///   size too large to pad
    /// - [`VerifyError::Cancelled`] if `cancel` trips between levels
    pub fn verify_sized(
        event_hash: &Hash,
        leaf_index: usize,
        tree_size: usize,
        proof: &[Hash],
        root: &Hash,
        cancel: &CancellationToken,
    ) -> VerifyResult<()> {
        if leaf_index >= tree_size {
            return Err(VerifyError::proof_invalid(format!(
                "leaf index {leaf_index} outside tree of size {tree_size}"
            )));
        }
        let Some(height) = padded_height(tree_size) else {
            return Err(VerifyError::proof_invalid(format!(
                "tree size {tree_size} cannot be padded to a power of two"
            )));
        };
        if proof.len() != height {
            return Err(VerifyError::proof_invalid(format!(
                "proof has {} siblings, tree of size {tree_size} needs {height}",
                proof.len()
            )));
        }
        Self::verify(event_hash, leaf_index, proof, root, cancel)
    }

    /// Verifies a proof given in wire form.
    ///
    /// Hash strings may carry the `sha256:` prefix or not and are compared
    /// case-insensitively.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::EncodingError`] for malformed hash strings
    /// - [`VerifyError::ProofInvalid`] if the proof does not verify
    /// - [`VerifyError::Cancelled`] if `cancel` trips between levels
    pub fn verify_hex(
        event_hash: &str,
        leaf_index: usize,
        proof: &[String],
        root: &str,
        cancel: &CancellationToken,
    ) -> VerifyResult<()> {
        let event_hash = crypto::parse_lenient(event_hash)?;
        let root = crypto::parse_lenient(root)?;
        let proof = proof
            .iter()
            .map(|s| crypto::parse_lenient(s))
            .collect::<VerifyResult<Vec<_>>>()?;
        Self::verify(&event_hash, leaf_index, &proof, &root, cancel)
    }
}

mod prefixed_hashes {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::crypto::{self, Hash};

    pub fn serialize<S: Serializer>(hashes: &[Hash], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(hashes.iter().map(crypto::to_prefixed))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Hash>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| crypto::parse_lenient(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::merkle::MerkleTree;

    fn hashes(n: usize) -> Vec<Hash> {
        (0..n).map(|i| crypto::sha256(&i.to_be_bytes())).collect()
    }

    #[test]
    fn padded_height_matches_power_of_two() {
        assert_eq!(padded_height(1), Some(0));
        assert_eq!(padded_height(2), Some(1));
        assert_eq!(padded_height(3), Some(2));
        assert_eq!(padded_height(4), Some(2));
        assert_eq!(padded_height(5), Some(3));
        assert_eq!(padded_height(usize::MAX), None);
    }

    #[test]
    fn empty_proof_is_leaf_root_equality() {
        let h = hashes(1);
        let none = CancellationToken::none();
        MerkleProofVerifier::verify(&h[0], 0, &[], &leaf_hash(&h[0]), &none).unwrap();
        assert!(MerkleProofVerifier::verify(&h[0], 0, &[], &h[0], &none).is_err());
    }

    #[test]
    fn flipped_sibling_fails() {
        let h = hashes(4);
        let tree = MerkleTree::build(&h, &CancellationToken::none()).unwrap();
        let proof = tree.proof(2).unwrap();
        let mut siblings = proof.siblings().to_vec();
        siblings[1][0] ^= 1;
        assert!(matches!(
            MerkleProofVerifier::verify(&h[2], 2, &siblings, &tree.root(), &CancellationToken::none()),
            Err(VerifyError::ProofInvalid { .. })
        ));
    }

    #[test]
    fn wrong_index_fails() {
        let h = hashes(4);
        let tree = MerkleTree::build(&h, &CancellationToken::none()).unwrap();
        let proof = tree.proof(1).unwrap();
        assert!(
            MerkleProofVerifier::verify(
                &h[1],
                0,
                proof.siblings(),
                &tree.root(),
                &CancellationToken::none()
            )
            .is_err()
        );
    }

    #[test]
    fn padding_leaf_is_not_addressable_when_size_known() {
        let h = hashes(3);
        let tree = MerkleTree::build(&h, &CancellationToken::none()).unwrap();
        let proof_for_last = tree.proof(2).unwrap();
        // Index 3 is the duplicate of index 2; with the size known it is out of range.
        let err = MerkleProofVerifier::verify_sized(
            &h[2],
            3,
            3,
            &[leaf_hash(&h[2]), proof_for_last.siblings()[1]],
            &tree.root(),
            &CancellationToken::none(),
        )
        .unwrap_err();
        assert!(matches!(err, VerifyError::ProofInvalid { .. }));
    }

    #[test]
    fn oversized_tree_is_rejected_without_overflow() {
        let h = hashes(1);
        let err = MerkleProofVerifier::verify_sized(
            &h[0],
            0,
            usize::MAX,
            &[],
            &leaf_hash(&h[0]),
            &CancellationToken::none(),
        )
        .unwrap_err();
        assert!(matches!(err, VerifyError::ProofInvalid { .. }));
    }

    #[test]
    fn cancelled_token_stops_proof_folding() {
        let h = hashes(4);
        let tree = MerkleTree::build(&h, &CancellationToken::none()).unwrap();
        let proof = tree.proof(3).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            proof.verify(&h[3], &tree.root(), &cancel),
            Err(VerifyError::Cancelled)
        );
        proof.verify(&h[3], &tree.root(), &CancellationToken::none()).unwrap();
    }

    #[test]
    fn short_proof_is_rejected_when_size_known() {
        let h = hashes(4);
        let tree = MerkleTree::build(&h, &CancellationToken::none()).unwrap();
        let proof = tree.proof(0).unwrap();
        assert!(
            MerkleProofVerifier::verify_sized(
                &h[0],
                0,
                4,
                &proof.siblings()[..1],
                &tree.root(),
                &CancellationToken::none()
            )
            .is_err()
        );
    }

    #[test]
    fn hex_form_is_case_insensitive() {
        let h = hashes(2);
        let tree = MerkleTree::build(&h, &CancellationToken::none()).unwrap();
        let proof: Vec<String> = tree
            .proof(0)
            .unwrap()
            .siblings_prefixed()
            .into_iter()
            .map(|s| s.to_uppercase())
            .collect();
        MerkleProofVerifier::verify_hex(
            &crypto::to_prefixed(&h[0]),
            0,
            &proof,
            &crypto::to_bare_hex(&tree.root()).to_uppercase(),
            &CancellationToken::none(),
        )
        .unwrap();
    }

    #[test]
    fn proof_json_uses_prefixed_hashes() {
        let proof = MerkleProof::new(1, 2, vec![[0xAB; 32]]);
        let value = serde_json::to_value(&proof).unwrap();
        assert!(value["siblings"][0].as_str().unwrap().starts_with("sha256:ab"));
        let back: MerkleProof = serde_json::from_value(value).unwrap();
        assert_eq!(back, proof);
    }

    proptest! {
        #[test]
        fn prop_every_real_leaf_proves(n in 1usize..40) {
            let h = hashes(n);
            let tree = MerkleTree::build(&h, &CancellationToken::none()).unwrap();
            for (i, event_hash) in h.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                prop_assert_eq!(Some(proof.siblings().len()), padded_height(n));
                prop_assert!(proof.verify(event_hash, &tree.root(), &CancellationToken::none()).is_ok());
            }
        }
    }
}
