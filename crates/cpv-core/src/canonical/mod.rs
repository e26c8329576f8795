//! Canonical encoding of JSON values before hashing.
//!
//! Event digests are computed over canonical bytes, so two producers that
//! emit the same members in a different order or with different whitespace
//! arrive at the same `EventHash`. The encoding is a capability passed into
//! the hasher through the [`Canonicalizer`] trait; [`JcsCanonicalizer`]
//! implements RFC 8785 and is the default.

mod jcs;

pub use jcs::{
    CANONICALIZER_ID, JcsCanonicalizer, JcsError, MAX_DEPTH, canonicalize_str, is_canonical,
    parse_strict, to_canonical_string,
};
use serde_json::Value;

use crate::error::VerifyError;

/// Deterministic serialization of a JSON value to bytes.
///
/// Implementations must be pure: the same value always yields the same bytes.
/// A value that cannot be serialized deterministically must produce
/// [`VerifyError::EncodingError`] rather than a best-effort encoding.
pub trait Canonicalizer: Send + Sync {
    /// Identifier recorded alongside digests for diagnostics.
    fn id(&self) -> &'static str;

    /// Returns the canonical bytes of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::EncodingError`] if `value` has no deterministic
    /// encoding under this scheme.
    fn canonicalize(&self, value: &Value) -> Result<Vec<u8>, VerifyError>;
}
