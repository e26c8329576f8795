//! Wire shapes of each anchor format version.
//!
//! | Version | Adds |
//! |---|---|
//! | 1.1 | `AnchorID`, `Merkle{TreeSize, LeafHash?, LeafIndex, Proof, Root}`, `TSA{Token, GenTime?, Service?}` |
//! | 1.2 | `AnchorDigest`, `AnchorDigestAlgorithm` |
//! | 1.3 | `Merkle.LeafHashMethod`, `TSA.MessageImprint` |
//!
//! Each shape rejects members it does not define, so a document declaring
//! one version while carrying another version's members fails at the
//! boundary instead of being half-understood.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Anchor, MerkleEvidence, StoredImprint, TsaEvidence};
use crate::crypto;
use crate::error::{VerifyError, VerifyResult};

/// Anchor format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnchorVersion {
    /// No anchor digest; digest derived from the root.
    V1_1,
    /// Explicit anchor digest.
    V1_2,
    /// Leaf hash method and stored message imprint.
    V1_3,
}

impl AnchorVersion {
    /// Newest version, used when serializing.
    pub const LATEST: Self = Self::V1_3;

    /// Wire form (`"1.1"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1_1 => "1.1",
            Self::V1_2 => "1.2",
            Self::V1_3 => "1.3",
        }
    }

    fn parse(raw: &str) -> VerifyResult<Self> {
        match raw.trim().trim_start_matches(['v', 'V']) {
            "1.1" => Ok(Self::V1_1),
            "1.2" => Ok(Self::V1_2),
            "1.3" => Ok(Self::V1_3),
            other => Err(VerifyError::encoding(format!(
                "unknown AnchorVersion '{other}'"
            ))),
        }
    }

    /// Infers the version from which members are present.
    fn infer(doc: &serde_json::Map<String, Value>) -> Self {
        let has = |outer: &str, inner: &str| {
            doc.get(outer)
                .and_then(Value::as_object)
                .is_some_and(|o| o.contains_key(inner))
        };
        if has("Merkle", "LeafHashMethod") || has("TSA", "MessageImprint") {
            Self::V1_3
        } else if doc.contains_key("AnchorDigest") {
            Self::V1_2
        } else {
            Self::V1_1
        }
    }
}

impl fmt::Display for AnchorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MerkleV11 {
    #[serde(rename = "TreeSize")]
    tree_size: u64,
    #[serde(rename = "LeafHash", default, skip_serializing_if = "Option::is_none")]
    leaf_hash: Option<String>,
    #[serde(rename = "LeafIndex")]
    leaf_index: u64,
    #[serde(rename = "Proof", default)]
    proof: Vec<String>,
    #[serde(rename = "Root")]
    root: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MerkleV13 {
    #[serde(rename = "TreeSize")]
    tree_size: u64,
    #[serde(rename = "LeafHashMethod", default, skip_serializing_if = "Option::is_none")]
    leaf_hash_method: Option<String>,
    #[serde(rename = "LeafHash", default, skip_serializing_if = "Option::is_none")]
    leaf_hash: Option<String>,
    #[serde(rename = "LeafIndex")]
    leaf_index: u64,
    #[serde(rename = "Proof", default)]
    proof: Vec<String>,
    #[serde(rename = "Root")]
    root: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TsaV11 {
    #[serde(rename = "Token")]
    token: String,
    #[serde(rename = "GenTime", default, skip_serializing_if = "Option::is_none")]
    gen_time: Option<String>,
    #[serde(rename = "Service", default, skip_serializing_if = "Option::is_none")]
    service: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TsaV13 {
    #[serde(rename = "Token")]
    token: String,
    #[serde(rename = "MessageImprint", default, skip_serializing_if = "Option::is_none")]
    message_imprint: Option<StoredImprint>,
    #[serde(rename = "GenTime", default, skip_serializing_if = "Option::is_none")]
    gen_time: Option<String>,
    #[serde(rename = "Service", default, skip_serializing_if = "Option::is_none")]
    service: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnchorV11 {
    #[serde(rename = "AnchorVersion", default)]
    _version: Option<String>,
    #[serde(rename = "AnchorID")]
    anchor_id: String,
    #[serde(rename = "Merkle")]
    merkle: MerkleV11,
    #[serde(rename = "TSA")]
    tsa: TsaV11,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnchorV12 {
    #[serde(rename = "AnchorVersion", default)]
    _version: Option<String>,
    #[serde(rename = "AnchorID")]
    anchor_id: String,
    #[serde(rename = "AnchorDigest")]
    anchor_digest: String,
    #[serde(rename = "AnchorDigestAlgorithm", default)]
    anchor_digest_algorithm: Option<String>,
    #[serde(rename = "Merkle")]
    merkle: MerkleV11,
    #[serde(rename = "TSA")]
    tsa: TsaV11,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnchorV13 {
    #[serde(rename = "AnchorVersion", default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(rename = "AnchorID")]
    anchor_id: String,
    #[serde(rename = "AnchorDigest")]
    anchor_digest: String,
    #[serde(rename = "AnchorDigestAlgorithm", default, skip_serializing_if = "Option::is_none")]
    anchor_digest_algorithm: Option<String>,
    #[serde(rename = "Merkle")]
    merkle: MerkleV13,
    #[serde(rename = "TSA")]
    tsa: TsaV13,
}

/// A parsed anchor document, tagged by version.
#[derive(Debug)]
enum VersionedAnchor {
    V1_1(AnchorV11),
    V1_2(AnchorV12),
    V1_3(AnchorV13),
}

impl VersionedAnchor {
    fn into_anchor(self) -> VerifyResult<Anchor> {
        match self {
            Self::V1_1(doc) => {
                let digest = crypto::to_bare_hex(&crypto::parse_lenient(&doc.merkle.root)?);
                Ok(Anchor {
                    version: AnchorVersion::V1_1,
                    anchor_id: doc.anchor_id,
                    anchor_digest: digest,
                    anchor_digest_algorithm: None,
                    merkle: merkle_v11(doc.merkle)?,
                    tsa: tsa_v11(doc.tsa),
                })
            },
            Self::V1_2(doc) => Ok(Anchor {
                version: AnchorVersion::V1_2,
                anchor_id: doc.anchor_id,
                anchor_digest: doc.anchor_digest,
                anchor_digest_algorithm: doc.anchor_digest_algorithm,
                merkle: merkle_v11(doc.merkle)?,
                tsa: tsa_v11(doc.tsa),
            }),
            Self::V1_3(doc) => Ok(Anchor {
                version: AnchorVersion::V1_3,
                anchor_id: doc.anchor_id,
                anchor_digest: doc.anchor_digest,
                anchor_digest_algorithm: doc.anchor_digest_algorithm,
                merkle: MerkleEvidence {
                    tree_size: to_usize(doc.merkle.tree_size, "TreeSize")?,
                    leaf_hash_method: doc.merkle.leaf_hash_method,
                    leaf_hash: doc.merkle.leaf_hash,
                    leaf_index: to_usize(doc.merkle.leaf_index, "LeafIndex")?,
                    proof: doc.merkle.proof,
                    root: doc.merkle.root,
                },
                tsa: TsaEvidence {
                    token: doc.tsa.token,
                    message_imprint: doc.tsa.message_imprint,
                    gen_time: doc.tsa.gen_time,
                    service: doc.tsa.service,
                },
            }),
        }
    }
}

fn merkle_v11(m: MerkleV11) -> VerifyResult<MerkleEvidence> {
    Ok(MerkleEvidence {
        tree_size: to_usize(m.tree_size, "TreeSize")?,
        leaf_hash_method: None,
        leaf_hash: m.leaf_hash,
        leaf_index: to_usize(m.leaf_index, "LeafIndex")?,
        proof: m.proof,
        root: m.root,
    })
}

fn tsa_v11(t: TsaV11) -> TsaEvidence {
    TsaEvidence {
        token: t.token,
        message_imprint: None,
        gen_time: t.gen_time,
        service: t.service,
    }
}

fn to_usize(value: u64, field: &str) -> VerifyResult<usize> {
    usize::try_from(value).map_err(|_| VerifyError::encoding(format!("{field} {value} out of range")))
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, version: AnchorVersion) -> VerifyResult<T> {
    serde_json::from_value(value)
        .map_err(|e| VerifyError::encoding(format!("malformed v{version} anchor: {e}")))
}

/// Parses an anchor document of any supported version.
///
/// # Errors
///
/// Returns [`VerifyError::EncodingError`] if the document is not an object,
/// names an unknown version, or does not fit its version's shape.
pub fn parse_anchor(value: Value) -> VerifyResult<Anchor> {
    let Value::Object(doc) = &value else {
        return Err(VerifyError::encoding("anchor must be a JSON object"));
    };
    let version = match doc.get("AnchorVersion") {
        Some(Value::String(raw)) => AnchorVersion::parse(raw)?,
        Some(_) => return Err(VerifyError::encoding("AnchorVersion must be a string")),
        None => AnchorVersion::infer(doc),
    };

    let versioned = match version {
        AnchorVersion::V1_1 => VersionedAnchor::V1_1(decode(value, version)?),
        AnchorVersion::V1_2 => VersionedAnchor::V1_2(decode(value, version)?),
        AnchorVersion::V1_3 => VersionedAnchor::V1_3(decode(value, version)?),
    };
    versioned.into_anchor()
}

/// Renders `anchor` in the newest wire shape.
///
/// # Errors
///
/// Returns [`VerifyError::EncodingError`] if serialization fails.
pub fn to_latest_value(anchor: &Anchor) -> VerifyResult<Value> {
    let doc = AnchorV13 {
        version: Some(AnchorVersion::LATEST.as_str().to_string()),
        anchor_id: anchor.anchor_id.clone(),
        anchor_digest: anchor.anchor_digest.clone(),
        anchor_digest_algorithm: anchor.anchor_digest_algorithm.clone(),
        merkle: MerkleV13 {
            tree_size: anchor.merkle.tree_size as u64,
            leaf_hash_method: anchor.merkle.leaf_hash_method.clone(),
            leaf_hash: anchor.merkle.leaf_hash.clone(),
            leaf_index: anchor.merkle.leaf_index as u64,
            proof: anchor.merkle.proof.clone(),
            root: anchor.merkle.root.clone(),
        },
        tsa: TsaV13 {
            token: anchor.tsa.token.clone(),
            message_imprint: anchor.tsa.message_imprint.clone(),
            gen_time: anchor.tsa.gen_time.clone(),
            service: anchor.tsa.service.clone(),
        },
    };
    serde_json::to_value(doc).map_err(|e| VerifyError::encoding(e.to_string()))
}
