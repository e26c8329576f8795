//! Event digest computation.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::{Event, fields};
use crate::canonical::{Canonicalizer, JcsCanonicalizer};
use crate::crypto::{self, Hash};
use crate::error::{VerifyError, VerifyResult};

/// Members removed from the event before canonicalization.
pub const EXCLUDED_FIELDS: [&str; 2] = [fields::EVENT_HASH, fields::SIGNATURE];

/// Computes and checks `EventHash` values.
///
/// `EventHash = SHA-256(canonicalize(event without EventHash and Signature))`.
/// Every other member takes part, including unknown and null members.
#[derive(Clone)]
pub struct EventHasher {
    canonicalizer: Arc<dyn Canonicalizer>,
}

impl Default for EventHasher {
    fn default() -> Self {
        Self::new(Arc::new(JcsCanonicalizer))
    }
}

impl fmt::Debug for EventHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHasher")
            .field("canonicalizer", &self.canonicalizer.id())
            .finish()
    }
}

impl EventHasher {
    /// Creates a hasher over the given canonical encoding.
    #[must_use]
    pub fn new(canonicalizer: Arc<dyn Canonicalizer>) -> Self {
        Self { canonicalizer }
    }

    /// Identifier of the canonical encoding in use.
    #[must_use]
    pub fn canonicalizer_id(&self) -> &'static str {
        self.canonicalizer.id()
    }

    /// Returns the exact bytes that are hashed.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::EncodingError`] if the event cannot be
    /// canonicalized.
    pub fn preimage(&self, event: &Event) -> VerifyResult<Vec<u8>> {
        let mut body = event.raw().clone();
        for field in EXCLUDED_FIELDS {
            body.remove(field);
        }
        self.canonicalizer.canonicalize(&Value::Object(body))
    }

    /// Computes the event digest.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::EncodingError`] if the event cannot be
    /// canonicalized.
    pub fn compute(&self, event: &Event) -> VerifyResult<Hash> {
        Ok(crypto::sha256(&self.preimage(event)?))
    }

    /// Recomputes the digest and compares it with the stored `EventHash`.
    ///
    /// Returns the verified digest.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::EncodingError`] if `EventHash` is absent or malformed
    /// - [`VerifyError::EventHashMismatch`] if the digests differ
    pub fn verify(&self, event: &Event) -> VerifyResult<Hash> {
        let stored = event.event_hash_bytes()?;
        let computed = self.compute(event)?;
        if !crypto::digests_equal(&stored, &computed) {
            debug!(event_id = event.event_id(), "event hash mismatch");
            return Err(VerifyError::EventHashMismatch {
                index: None,
                stored: crypto::to_prefixed(&stored),
                computed: crypto::to_prefixed(&computed),
            });
        }
        Ok(computed)
    }

    /// Returns a copy of `event` with `EventHash` set to its computed digest.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::EncodingError`] if the event cannot be
    /// canonicalized.
    pub fn seal(&self, event: &Event) -> VerifyResult<Event> {
        let digest = self.compute(event)?;
        Ok(event.with_event_hash(&digest))
    }
}
