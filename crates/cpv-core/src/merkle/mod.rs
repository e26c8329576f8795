//! Batch Merkle trees over event hashes.
//!
//! ```text
//! LeafHash[i] = SHA-256(EventHash[i] bytes)
//! node        = SHA-256(left || right)
//! ```
//!
//! Leaves are padded to a power of two by duplicating the last leaf.
//! `TreeSize` is always the real leaf count, before padding.
//!
//! # Example
//!
//! ```rust
//! use cpv_core::cancel::CancellationToken;
//! use cpv_core::crypto::sha256;
//! use cpv_core::merkle::MerkleTree;
//!
//! let hashes = [sha256(b"a"), sha256(b"b"), sha256(b"c")];
//! let tree = MerkleTree::build(&hashes, &CancellationToken::none()).unwrap();
//! let proof = tree.proof(2).unwrap();
//! proof.verify(&hashes[2], &tree.root(), &CancellationToken::none()).unwrap();
//! ```

mod proof;
mod tree;

pub use proof::{MerkleProof, MerkleProofVerifier, padded_height};
pub use tree::{LEAF_HASH_METHOD, MerkleTree, leaf_hash};
