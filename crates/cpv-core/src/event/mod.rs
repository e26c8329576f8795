//! Capture events.
//!
//! An [`Event`] is created once at capture time and is immutable afterwards.
//! It is parsed from JSON exactly once, at the boundary: typed members are
//! extracted for verification logic, and the complete original object is
//! retained so that hashing covers every member, including members this crate
//! does not know about.
//!
//! # Wire Shape
//!
//! ```json
//! {
//!   "EventID": "evt-0001",
//!   "ChainID": "chain-7",
//!   "PrevHash": "sha256:0000…",
//!   "Timestamp": "2026-01-18T10:00:00.000Z",
//!   "EventType": "INGEST",
//!   "Asset": { "MediaHash": "sha256:…" },
//!   "CaptureContext": { "Device": "…" },
//!   "SignerInfo": { "KeyID": "k1", "Algorithm": "ES256", "PublicKey": "<base64>" },
//!   "EventHash": "sha256:…",
//!   "Signature": { "Algorithm": "ES256", "Value": "<base64>" }
//! }
//! ```

mod hasher;

use std::fmt;
use std::str::FromStr;

pub use hasher::{EventHasher, EXCLUDED_FIELDS};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::canonical::parse_strict;
use crate::crypto::{self, Hash, PublicKey, SignatureAlgorithm, base64_bytes};
use crate::error::{VerifyError, VerifyResult};

/// JSON member names used by the event wire format.
pub mod fields {
    /// Event identifier.
    pub const EVENT_ID: &str = "EventID";
    /// Chain identifier.
    pub const CHAIN_ID: &str = "ChainID";
    /// Previous event hash.
    pub const PREV_HASH: &str = "PrevHash";
    /// Producer timestamp (untrusted).
    pub const TIMESTAMP: &str = "Timestamp";
    /// Event type.
    pub const EVENT_TYPE: &str = "EventType";
    /// Asset payload.
    pub const ASSET: &str = "Asset";
    /// Capture context payload.
    pub const CAPTURE_CONTEXT: &str = "CaptureContext";
    /// Signer information.
    pub const SIGNER_INFO: &str = "SignerInfo";
    /// Human attestation.
    pub const HUMAN_ATTESTATION: &str = "HumanAttestation";
    /// Tombstone details.
    pub const TOMBSTONE: &str = "Tombstone";
    /// The event's own digest.
    pub const EVENT_HASH: &str = "EventHash";
    /// The signature over the digest.
    pub const SIGNATURE: &str = "Signature";
}

/// Kind of capture event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Content captured and ingested.
    Ingest,
    /// Content exported.
    Export,
    /// Signed, intentional deletion of previously ingested content.
    Tombstone,
}

impl EventType {
    /// The wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "INGEST",
            Self::Export => "EXPORT",
            Self::Tombstone => "TOMBSTONE",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INGEST" => Ok(Self::Ingest),
            "EXPORT" => Ok(Self::Export),
            "TOMBSTONE" => Ok(Self::Tombstone),
            other => Err(VerifyError::encoding(format!("unknown EventType '{other}'"))),
        }
    }
}

/// Who signed the event. Every member is optional across format versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    /// Key identifier.
    #[serde(rename = "KeyID", default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Declared algorithm of the signing key.
    #[serde(rename = "Algorithm", default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// Public key bytes (SEC1 for ES256, raw for Ed25519).
    #[serde(
        rename = "PublicKey",
        default,
        skip_serializing_if = "Option::is_none",
        with = "optional_base64"
    )]
    pub public_key: Option<Vec<u8>>,
}

/// Attestation that a human was present at capture time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanAttestation {
    /// Attestation method (for example a biometric modality).
    #[serde(rename = "Method", default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// When the attestation was made.
    #[serde(rename = "AttestedAt", default, skip_serializing_if = "Option::is_none")]
    pub attested_at: Option<String>,
    /// Digest of the attestation evidence, if recorded.
    #[serde(rename = "EvidenceHash", default, skip_serializing_if = "Option::is_none")]
    pub evidence_hash: Option<String>,
}

/// Details of a TOMBSTONE event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TombstoneInfo {
    /// `EventID` whose content was intentionally deleted.
    #[serde(rename = "TargetEventID")]
    pub target_event_id: String,
    /// Free-form reason.
    #[serde(rename = "Reason", default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Signature over the event digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSignature {
    /// Declared algorithm, kept verbatim so that unknown names surface as
    /// [`VerifyError::UnsupportedAlgorithm`] at verification time.
    #[serde(rename = "Algorithm")]
    pub algorithm: String,
    /// Signature bytes.
    #[serde(rename = "Value", with = "base64_bytes")]
    pub value: Vec<u8>,
}

/// An immutable capture event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    event_id: String,
    chain_id: String,
    prev_hash: String,
    timestamp: String,
    event_type: EventType,
    signer_info: Option<SignerInfo>,
    human_attestation: Option<HumanAttestation>,
    tombstone: Option<TombstoneInfo>,
    event_hash: Option<String>,
    signature: Option<EventSignature>,
    raw: Map<String, Value>,
}

impl Event {
    /// Parses an event from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::EncodingError`] if `value` is not an object or a
    /// required member is missing or mistyped.
    pub fn from_value(value: Value) -> VerifyResult<Self> {
        let Value::Object(raw) = value else {
            return Err(VerifyError::encoding("event must be a JSON object"));
        };

        let event_type = required_str(&raw, fields::EVENT_TYPE)?.parse()?;
        let tombstone: Option<TombstoneInfo> = optional_member(&raw, fields::TOMBSTONE)?;
        if tombstone.is_some() && event_type != EventType::Tombstone {
            return Err(VerifyError::encoding(format!(
                "{} member is only valid on TOMBSTONE events",
                fields::TOMBSTONE
            )));
        }

        Ok(Self {
            event_id: required_str(&raw, fields::EVENT_ID)?.to_string(),
            chain_id: required_str(&raw, fields::CHAIN_ID)?.to_string(),
            prev_hash: required_str(&raw, fields::PREV_HASH)?.to_string(),
            timestamp: required_str(&raw, fields::TIMESTAMP)?.to_string(),
            event_type,
            signer_info: optional_member(&raw, fields::SIGNER_INFO)?,
            human_attestation: optional_member(&raw, fields::HUMAN_ATTESTATION)?,
            tombstone,
            event_hash: optional_member(&raw, fields::EVENT_HASH)?,
            signature: optional_member(&raw, fields::SIGNATURE)?,
            raw,
        })
    }

    /// Parses an event from JSON text, rejecting duplicate member names.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::EncodingError`] on malformed JSON or a malformed
    /// event.
    pub fn from_json_str(input: &str) -> VerifyResult<Self> {
        Self::from_value(parse_strict(input)?)
    }

    /// `EventID`.
    #[must_use]
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// `ChainID`.
    #[must_use]
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// `PrevHash` as stored.
    #[must_use]
    pub fn prev_hash(&self) -> &str {
        &self.prev_hash
    }

    /// Producer timestamp. Untrusted; never used for ordering.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// `EventType`.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    /// `SignerInfo`, if present.
    #[must_use]
    pub const fn signer_info(&self) -> Option<&SignerInfo> {
        self.signer_info.as_ref()
    }

    /// `HumanAttestation`, if present.
    #[must_use]
    pub const fn human_attestation(&self) -> Option<&HumanAttestation> {
        self.human_attestation.as_ref()
    }

    /// Tombstone details, if this is a TOMBSTONE carrying them.
    #[must_use]
    pub const fn tombstone(&self) -> Option<&TombstoneInfo> {
        self.tombstone.as_ref()
    }

    /// True for TOMBSTONE events.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.event_type == EventType::Tombstone
    }

    /// `EventHash` as stored, if present.
    #[must_use]
    pub fn event_hash(&self) -> Option<&str> {
        self.event_hash.as_deref()
    }

    /// `Signature`, if present.
    #[must_use]
    pub const fn signature(&self) -> Option<&EventSignature> {
        self.signature.as_ref()
    }

    /// The complete original JSON object.
    #[must_use]
    pub const fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Decodes the stored `EventHash`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::EncodingError`] if the member is absent or
    /// malformed.
    pub fn event_hash_bytes(&self) -> VerifyResult<Hash> {
        let stored = self.event_hash.as_deref().ok_or_else(|| {
            VerifyError::encoding(format!("event {} has no EventHash", self.event_id))
        })?;
        crypto::parse_prefixed(stored)
    }

    /// Decodes the stored `PrevHash`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::EncodingError`] if the value is malformed.
    pub fn prev_hash_bytes(&self) -> VerifyResult<Hash> {
        crypto::parse_prefixed(&self.prev_hash)
    }

    /// Returns a copy of this event with `EventHash` set to `event_hash`.
    #[must_use]
    pub fn with_event_hash(&self, event_hash: &Hash) -> Self {
        let mut next = self.clone();
        let text = crypto::to_prefixed(event_hash);
        next.raw
            .insert(fields::EVENT_HASH.to_string(), Value::String(text.clone()));
        next.event_hash = Some(text);
        next
    }

    /// Returns a copy of this event carrying `signature`.
    #[must_use]
    pub fn with_signature(&self, signature: EventSignature) -> Self {
        let mut next = self.clone();
        let mut sig = Map::new();
        sig.insert(
            "Algorithm".to_string(),
            Value::String(signature.algorithm.clone()),
        );
        sig.insert(
            "Value".to_string(),
            Value::String(base64_encode(&signature.value)),
        );
        next.raw
            .insert(fields::SIGNATURE.to_string(), Value::Object(sig));
        next.signature = Some(signature);
        next
    }

    /// Verifies the event signature over `event_hash`.
    ///
    /// The key is `key` when supplied, otherwise `SignerInfo.PublicKey`. The
    /// signature's declared algorithm must be in `accepted`, and must agree
    /// with both the key's algorithm and any `SignerInfo.Algorithm`.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::SignatureInvalid`] if the signature is missing,
    ///   inconsistent, or does not verify
    /// - [`VerifyError::UnsupportedAlgorithm`] for an unknown or non-accepted
    ///   algorithm
    /// - [`VerifyError::MissingEvidence`] if no public key is available
    pub fn verify_signature(
        &self,
        event_hash: &Hash,
        key: Option<&PublicKey>,
        accepted: &[SignatureAlgorithm],
    ) -> VerifyResult<SignatureAlgorithm> {
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| VerifyError::signature_invalid("event carries no Signature"))?;
        let algorithm: SignatureAlgorithm = signature.algorithm.parse()?;
        if !accepted.contains(&algorithm) {
            return Err(VerifyError::UnsupportedAlgorithm {
                algorithm: algorithm.to_string(),
            });
        }

        if let Some(declared) = self.signer_info.as_ref().and_then(|s| s.algorithm.as_deref()) {
            let declared: SignatureAlgorithm = declared.parse()?;
            if declared != algorithm {
                return Err(VerifyError::signature_invalid(format!(
                    "SignerInfo declares {declared} but Signature declares {algorithm}"
                )));
            }
        }

        let embedded;
        let key = match key {
            Some(key) => key,
            None => {
                let bytes = self
                    .signer_info
                    .as_ref()
                    .and_then(|s| s.public_key.clone())
                    .ok_or_else(|| VerifyError::missing("public key for signature verification"))?;
                embedded = PublicKey::new(algorithm, bytes);
                &embedded
            },
        };
        if key.algorithm != algorithm {
            return Err(VerifyError::signature_invalid(format!(
                "key algorithm {} does not match signature algorithm {algorithm}",
                key.algorithm
            )));
        }

        key.verify(event_hash, &signature.value)?;
        Ok(algorithm)
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

fn required_str<'a>(raw: &'a Map<String, Value>, field: &str) -> VerifyResult<&'a str> {
    match raw.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(VerifyError::encoding(format!("{field} must be a string"))),
        None => Err(VerifyError::encoding(format!("missing required member {field}"))),
    }
}

fn optional_member<T: serde::de::DeserializeOwned>(
    raw: &Map<String, Value>,
    field: &str,
) -> VerifyResult<Option<T>> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| VerifyError::encoding(format!("malformed {field}: {e}"))),
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

mod optional_base64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| BASE64.decode(raw.trim()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
