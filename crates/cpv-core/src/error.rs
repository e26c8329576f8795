//! Error taxonomy for provenance verification.
//!
//! Every check in this crate returns a typed [`VerifyError`] on failure. None
//! of them is coerced into success, and every variant carries a stable
//! machine code (see [`VerifyError::code`]) so that downstream tooling can
//! report *which* check failed instead of a bare pass/fail.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a completeness invariant did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletenessViolationKind {
    /// The candidate set has a different size than recorded.
    CountMismatch {
        /// Count recorded in the invariant.
        expected: u64,
        /// Count of the candidate set.
        actual: u64,
    },
    /// The XOR commitment over the candidate set differs from the recorded
    /// sum.
    HashSumMismatch {
        /// Recorded `hash_sum`.
        expected: String,
        /// Recomputed `hash_sum`.
        actual: String,
    },
    /// A recorded boundary member (first/last timestamp or event id) does
    /// not match the candidate set.
    BoundaryMismatch {
        /// Name of the boundary member.
        field: String,
        /// Recorded value.
        expected: String,
        /// Value derived from the candidate set.
        actual: String,
    },
}

impl fmt::Display for CompletenessViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountMismatch { expected, actual } => {
                write!(f, "count mismatch: expected {expected}, got {actual}")
            },
            Self::HashSumMismatch { expected, actual } => {
                write!(f, "hash-sum mismatch: expected {expected}, computed {actual}")
            },
            Self::BoundaryMismatch {
                field,
                expected,
                actual,
            } => write!(f, "{field} mismatch: expected {expected}, got {actual}"),
        }
    }
}

/// Errors produced by the verification engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum VerifyError {
    /// A value could not be decoded or deterministically serialized.
    #[error("encoding error: {reason}")]
    EncodingError {
        /// Human-readable reason.
        reason: String,
    },

    /// The stored `EventHash` does not match the recomputed digest.
    #[error("event hash mismatch{}: stored {stored}, computed {computed}", fmt_index(.index))]
    EventHashMismatch {
        /// Position in the chain, when the event was checked as part of one.
        index: Option<usize>,
        /// `EventHash` carried by the event.
        stored: String,
        /// `EventHash` recomputed from the canonical bytes.
        computed: String,
    },

    /// The signature does not verify under the declared key and algorithm.
    #[error("signature invalid: {reason}")]
    SignatureInvalid {
        /// Human-readable reason.
        reason: String,
    },

    /// The declared signature algorithm is unknown or not accepted by
    /// policy.
    #[error("unsupported signature algorithm: {algorithm}")]
    UnsupportedAlgorithm {
        /// The algorithm as declared.
        algorithm: String,
    },

    /// Hash-chain linkage is broken at `index`.
    #[error("chain broken at index {index}: {reason}")]
    ChainBroken {
        /// Index of the first event whose linkage fails.
        index: usize,
        /// Human-readable reason.
        reason: String,
    },

    /// The event under verification is not part of the supplied chain.
    #[error("event {event_id} is not part of chain {chain_id}")]
    EventNotInChain {
        /// `EventID` of the event under verification.
        event_id: String,
        /// `ChainID` of the supplied chain context.
        chain_id: String,
    },

    /// The completeness invariant does not hold.
    #[error("completeness violation: {kind}")]
    CompletenessViolation {
        /// Which part of the invariant failed.
        kind: CompletenessViolationKind,
    },

    /// A Merkle batch with no leaves.
    #[error("empty batch: a Merkle tree needs at least one leaf")]
    EmptyBatch,

    /// A Merkle inclusion proof does not reconstruct the expected root.
    #[error("merkle proof invalid: {reason}")]
    ProofInvalid {
        /// Human-readable reason.
        reason: String,
    },

    /// The anchor declares a leaf hash method other than
    /// `SHA256(EventHash)`.
    #[error("unsupported leaf hash method: {method}")]
    UnsupportedLeafHashMethod {
        /// The declared method.
        method: String,
    },

    /// The time-stamp token could not be parsed.
    #[error("time-stamp token unparseable: {reason}")]
    TokenUnparseable {
        /// Human-readable reason.
        reason: String,
    },

    /// `AnchorDigest` is not the Merkle root.
    #[error("anchor digest mismatch: digest {anchor_digest}, root {root}")]
    AnchorDigestMismatch {
        /// `AnchorDigest` as declared.
        anchor_digest: String,
        /// Merkle `Root` as declared.
        root: String,
    },

    /// The token's message imprint is not the anchor digest.
    #[error("message imprint mismatch: token {token}, anchor digest {anchor_digest}")]
    MessageImprintMismatch {
        /// `hashedMessage` extracted from the token (hex).
        token: String,
        /// `AnchorDigest` (hex).
        anchor_digest: String,
    },

    /// A hash algorithm other than SHA-256.
    #[error("unsupported hash algorithm: {algorithm}")]
    UnsupportedHashAlgorithm {
        /// The algorithm name or OID.
        algorithm: String,
    },

    /// The anchor names a TSA service outside the accepted set.
    #[error("untrusted time-stamp authority: {service}")]
    UntrustedTimestampAuthority {
        /// Service name from the anchor (or `<none>`).
        service: String,
    },

    /// Policy requires evidence that the request does not carry.
    #[error("missing evidence: {what}")]
    MissingEvidence {
        /// What is missing.
        what: String,
    },

    /// The operation was cancelled.
    #[error("verification cancelled")]
    Cancelled,
}

#[allow(clippy::ref_option)]
fn fmt_index(index: &Option<usize>) -> String {
    index.map_or_else(String::new, |i| format!(" at index {i}"))
}

impl VerifyError {
    /// Creates an encoding error.
    #[must_use]
    pub fn encoding(reason: impl Into<String>) -> Self {
        Self::EncodingError {
            reason: reason.into(),
        }
    }

    /// Creates a signature-invalid error.
    #[must_use]
    pub fn signature_invalid(reason: impl Into<String>) -> Self {
        Self::SignatureInvalid {
            reason: reason.into(),
        }
    }

    /// Creates a chain-broken error.
    #[must_use]
    pub fn chain_broken(index: usize, reason: impl Into<String>) -> Self {
        Self::ChainBroken {
            index,
            reason: reason.into(),
        }
    }

    /// Creates a proof-invalid error.
    #[must_use]
    pub fn proof_invalid(reason: impl Into<String>) -> Self {
        Self::ProofInvalid {
            reason: reason.into(),
        }
    }

    /// Creates a token-unparseable error.
    #[must_use]
    pub fn token_unparseable(reason: impl Into<String>) -> Self {
        Self::TokenUnparseable {
            reason: reason.into(),
        }
    }

    /// Creates a missing-evidence error.
    #[must_use]
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingEvidence { what: what.into() }
    }

    /// Stable machine-readable code for this error kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EncodingError { .. } => "E_ENCODING",
            Self::EventHashMismatch { .. } => "E_EVENT_HASH_MISMATCH",
            Self::SignatureInvalid { .. } => "E_SIGNATURE_INVALID",
            Self::UnsupportedAlgorithm { .. } => "E_UNSUPPORTED_ALGORITHM",
            Self::ChainBroken { .. } => "E_CHAIN_BROKEN",
            Self::EventNotInChain { .. } => "E_EVENT_NOT_IN_CHAIN",
            Self::CompletenessViolation { .. } => "E_COMPLETENESS_VIOLATION",
            Self::EmptyBatch => "E_EMPTY_BATCH",
            Self::ProofInvalid { .. } => "E_PROOF_INVALID",
            Self::UnsupportedLeafHashMethod { .. } => "E_UNSUPPORTED_LEAF_HASH_METHOD",
            Self::TokenUnparseable { .. } => "E_TOKEN_UNPARSEABLE",
            Self::AnchorDigestMismatch { .. } => "E_ANCHOR_DIGEST_MISMATCH",
            Self::MessageImprintMismatch { .. } => "E_MESSAGE_IMPRINT_MISMATCH",
            Self::UnsupportedHashAlgorithm { .. } => "E_UNSUPPORTED_HASH_ALGORITHM",
            Self::UntrustedTimestampAuthority { .. } => "E_UNTRUSTED_TSA",
            Self::MissingEvidence { .. } => "E_MISSING_EVIDENCE",
            Self::Cancelled => "E_CANCELLED",
        }
    }
}

/// Result alias used throughout the crate.
pub type VerifyResult<T> = Result<T, VerifyError>;
