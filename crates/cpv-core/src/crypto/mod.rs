//! Cryptographic primitives for capture provenance.
//!
//! - **SHA-256 hashing**: event digests, Merkle leaves and nodes, the
//!   completeness commitment
//! - **Hash strings**: the `sha256:<hex>` wire form, compared
//!   case-insensitively and in constant time
//! - **Signatures**: `ES256` and `Ed25519` verification over the raw 32-byte
//!   `EventHash`
//!
//! # Example
//!
//! ```rust
//! use cpv_core::crypto::{parse_prefixed, sha256, to_prefixed};
//!
//! let digest = sha256(b"canonical event bytes");
//! let text = to_prefixed(&digest);
//! assert!(text.starts_with("sha256:"));
//! assert_eq!(parse_prefixed(&text.to_uppercase()).unwrap(), digest);
//! ```

mod hash;
mod sign;

pub use hash::{
    GENESIS_PREV_HASH, HASH_PREFIX, HASH_SIZE, Hash, digests_equal, genesis_prev_hash,
    is_genesis, parse_bare, parse_lenient, parse_prefixed, sha256, sha256_concat, strip_prefix,
    to_bare_hex, to_prefixed,
};
pub(crate) use sign::base64_bytes;
pub use sign::{
    ED25519_PUBLIC_KEY_SIZE, FIXED_SIGNATURE_SIZE, PublicKey, SignatureAlgorithm, decode_base64,
    verify_signature,
};
