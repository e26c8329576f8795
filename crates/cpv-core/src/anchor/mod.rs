//! External anchors: Merkle inclusion plus an RFC 3161 time-stamp.
//!
//! An [`Anchor`] ties one event to a batch Merkle root and ties that root to
//! a time-stamp token from an independent authority. All format versions are
//! normalized into this one type at the boundary (see [`versions`]).
//!
//! ```text
//! EventHash -> LeafHash -> Root -> AnchorDigest -> TSA MessageImprint
//! ```

mod builder;
mod validator;
pub mod versions;

pub use builder::{AnchorBuilder, AnchoredBatch};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
pub use validator::{AnchorValidator, AnchorVerdict};
pub use versions::AnchorVersion;

use crate::canonical::parse_strict;
use crate::crypto::decode_base64;
use crate::error::{VerifyError, VerifyResult};

/// `AnchorDigestAlgorithm` written by this crate.
pub const ANCHOR_DIGEST_ALGORITHM: &str = "sha-256";

/// Merkle inclusion evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleEvidence {
    /// Real leaf count of the batch.
    pub tree_size: usize,
    /// Declared leaf derivation, if recorded.
    pub leaf_hash_method: Option<String>,
    /// Recorded leaf hash, if any.
    pub leaf_hash: Option<String>,
    /// Position of the event in the batch.
    pub leaf_index: usize,
    /// Sibling hashes, bottom to top.
    pub proof: Vec<String>,
    /// Batch root.
    pub root: String,
}

/// `MessageImprint` as stored alongside the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoredImprint {
    /// Hash algorithm name.
    #[serde(rename = "HashAlgorithm")]
    pub hash_algorithm: String,
    /// Hashed message, hex.
    #[serde(rename = "HashedMessage")]
    pub hashed_message: String,
}

/// Time-stamp evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsaEvidence {
    /// Base64 of the DER `TimeStampToken`.
    pub token: String,
    /// Imprint stored by the producer (v1.3).
    pub message_imprint: Option<StoredImprint>,
    /// Producer-recorded time. Informational; the token's `genTime` wins.
    pub gen_time: Option<String>,
    /// Authority name.
    pub service: Option<String>,
}

/// A normalized anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Format version the anchor was read from.
    pub version: AnchorVersion,
    /// Anchor identifier, shared by every event of a batch.
    pub anchor_id: String,
    /// Root bytes as hex without prefix; derived from the root for v1.1.
    pub anchor_digest: String,
    /// Declared digest algorithm (v1.2+).
    pub anchor_digest_algorithm: Option<String>,
    /// Merkle inclusion evidence.
    pub merkle: MerkleEvidence,
    /// Time-stamp evidence.
    pub tsa: TsaEvidence,
}

impl Anchor {
    /// Parses an anchor of any supported version.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::EncodingError`] for malformed documents.
    pub fn from_value(value: Value) -> VerifyResult<Self> {
        versions::parse_anchor(value)
    }

    /// Parses anchor JSON text, rejecting duplicate member names.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::EncodingError`] for malformed input.
    pub fn from_json_str(input: &str) -> VerifyResult<Self> {
        Self::from_value(parse_strict(input)?)
    }

    /// Decoded DER token bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::TokenUnparseable`] if the token is not base64.
    pub fn token_der(&self) -> VerifyResult<Vec<u8>> {
        decode_base64(&self.tsa.token, "TSA.Token")
            .map_err(|e| VerifyError::token_unparseable(e.to_string()))
    }
}

impl Serialize for Anchor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        versions::to_latest_value(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Anchor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Self::from_value(Value::deserialize(deserializer)?).map_err(serde::de::Error::custom)
    }
}
