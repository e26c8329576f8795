//! Signature verification over event digests.
//!
//! Signatures always cover the raw 32-byte `EventHash`, never its hex form and
//! never the full event. Two algorithms are accepted and both stay accepted
//! for backward compatibility:
//!
//! - `ES256`: ECDSA over P-256 with SHA-256 (JOSE semantics, so the 32 digest
//!   bytes are the signed message). Keys are SEC1 encoded; signatures are the
//!   fixed 64-byte `r || s` form or ASN.1 DER.
//! - `Ed25519`: 32-byte public keys, 64-byte signatures, strict verification.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::hash::Hash;
use crate::error::{VerifyError, VerifyResult};

/// Size of an Ed25519 public key in bytes.
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of a fixed-width signature (`r || s` for ES256, Ed25519).
pub const FIXED_SIGNATURE_SIZE: usize = 64;

/// Declared signature algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignatureAlgorithm {
    /// ECDSA P-256 / SHA-256.
    Es256,
    /// Ed25519.
    Ed25519,
}

impl SignatureAlgorithm {
    /// All algorithms this crate can verify.
    pub const ALL: [Self; 2] = [Self::Es256, Self::Ed25519];

    /// The wire name (`ES256` or `Ed25519`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Es256 => "ES256",
            Self::Ed25519 => "Ed25519",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ES256" => Ok(Self::Es256),
            "Ed25519" | "EdDSA" => Ok(Self::Ed25519),
            other => Err(VerifyError::UnsupportedAlgorithm {
                algorithm: other.to_string(),
            }),
        }
    }
}

impl Serialize for SignatureAlgorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SignatureAlgorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A public key tagged with its algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    /// Algorithm the key belongs to.
    #[serde(rename = "Algorithm")]
    pub algorithm: SignatureAlgorithm,
    /// Encoded key bytes (base64 on the wire).
    #[serde(rename = "Key", with = "base64_bytes")]
    pub key: Vec<u8>,
}

impl PublicKey {
    /// Creates a new tagged public key.
    #[must_use]
    pub fn new(algorithm: SignatureAlgorithm, key: impl Into<Vec<u8>>) -> Self {
        Self {
            algorithm,
            key: key.into(),
        }
    }

    /// Verifies `signature` over `event_hash` with this key.
    ///
    /// # Errors
    ///
    /// See [`verify_signature`].
    pub fn verify(&self, event_hash: &Hash, signature: &[u8]) -> VerifyResult<()> {
        verify_signature(self.algorithm, &self.key, event_hash, signature)
    }
}

/// Verifies a signature over the raw 32-byte event digest.
///
/// # Errors
///
/// Returns [`VerifyError::SignatureInvalid`] if the key or signature is
/// malformed or the signature does not verify.
pub fn verify_signature(
    algorithm: SignatureAlgorithm,
    public_key: &[u8],
    event_hash: &Hash,
    signature: &[u8],
) -> VerifyResult<()> {
    match algorithm {
        SignatureAlgorithm::Ed25519 => verify_ed25519(public_key, event_hash, signature),
        SignatureAlgorithm::Es256 => verify_es256(public_key, event_hash, signature),
    }
}

fn verify_ed25519(public_key: &[u8], message: &Hash, signature: &[u8]) -> VerifyResult<()> {
    let key_bytes: [u8; ED25519_PUBLIC_KEY_SIZE] = public_key.try_into().map_err(|_| {
        VerifyError::signature_invalid(format!(
            "Ed25519 public key must be {ED25519_PUBLIC_KEY_SIZE} bytes, got {}",
            public_key.len()
        ))
    })?;
    let key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| VerifyError::signature_invalid(format!("invalid Ed25519 key: {e}")))?;
    let sig = ed25519_dalek::Signature::from_slice(signature)
        .map_err(|e| VerifyError::signature_invalid(format!("malformed Ed25519 signature: {e}")))?;
    key.verify_strict(message, &sig)
        .map_err(|_| VerifyError::signature_invalid("Ed25519 signature does not verify"))
}

fn verify_es256(public_key: &[u8], message: &Hash, signature: &[u8]) -> VerifyResult<()> {
    use p256::ecdsa::signature::Verifier as _;

    let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| VerifyError::signature_invalid(format!("invalid P-256 key: {e}")))?;
    let sig = if signature.len() == FIXED_SIGNATURE_SIZE {
        p256::ecdsa::Signature::from_slice(signature)
    } else {
        p256::ecdsa::Signature::from_der(signature)
    }
    .map_err(|e| VerifyError::signature_invalid(format!("malformed ES256 signature: {e}")))?;
    key.verify(message, &sig)
        .map_err(|_| VerifyError::signature_invalid("ES256 signature does not verify"))
}

/// Serde adapter for base64-encoded byte vectors.
pub(crate) mod base64_bytes {
    use base64::Engine as _;

    use super::{BASE64, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BASE64.decode(raw.trim()).map_err(serde::de::Error::custom)
    }
}

/// Decodes standard base64, mapping failures to [`VerifyError::EncodingError`].
///
/// # Errors
///
/// Returns an encoding error if `value` is not valid base64.
pub fn decode_base64(value: &str, what: &str) -> VerifyResult<Vec<u8>> {
    BASE64
        .decode(value.trim())
        .map_err(|e| VerifyError::encoding(format!("{what} is not valid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::Signer as _;
    use p256::ecdsa::signature::Signer as _;

    use super::*;
    use crate::crypto::hash::sha256;

    fn ed25519_key() -> ed25519_dalek::SigningKey {
        ed25519_dalek::SigningKey::from_bytes(&[7u8; 32])
    }

    fn p256_key() -> p256::ecdsa::SigningKey {
        p256::ecdsa::SigningKey::from_slice(&[9u8; 32]).unwrap()
    }

    #[test]
    fn ed25519_signature_over_digest_verifies() {
        let sk = ed25519_key();
        let digest = sha256(b"canonical event");
        let sig = sk.sign(&digest);
        let pk = PublicKey::new(SignatureAlgorithm::Ed25519, sk.verifying_key().to_bytes());
        pk.verify(&digest, &sig.to_bytes()).unwrap();
    }

    #[test]
    fn ed25519_signature_over_hex_string_is_rejected() {
        let sk = ed25519_key();
        let digest = sha256(b"canonical event");
        let sig = sk.sign(hex::encode(digest).as_bytes());
        let pk = PublicKey::new(SignatureAlgorithm::Ed25519, sk.verifying_key().to_bytes());
        assert!(matches!(
            pk.verify(&digest, &sig.to_bytes()),
            Err(VerifyError::SignatureInvalid { .. })
        ));
    }

    #[test]
    fn es256_fixed_and_der_signatures_verify() {
        let sk = p256_key();
        let digest = sha256(b"canonical event");
        let sig: p256::ecdsa::Signature = sk.sign(&digest);
        let pk_bytes = sk.verifying_key().to_encoded_point(false).as_bytes().to_vec();
        let pk = PublicKey::new(SignatureAlgorithm::Es256, pk_bytes);

        pk.verify(&digest, &sig.to_bytes()).unwrap();
        pk.verify(&digest, sig.to_der().as_bytes()).unwrap();
    }

    #[test]
    fn es256_wrong_digest_fails() {
        let sk = p256_key();
        let sig: p256::ecdsa::Signature = sk.sign(&sha256(b"a"));
        let pk_bytes = sk.verifying_key().to_encoded_point(true).as_bytes().to_vec();
        let err = verify_signature(
            SignatureAlgorithm::Es256,
            &pk_bytes,
            &sha256(b"b"),
            &sig.to_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, VerifyError::SignatureInvalid { .. }));
    }

    #[test]
    fn malformed_key_is_signature_invalid() {
        let err = verify_signature(
            SignatureAlgorithm::Ed25519,
            &[1, 2, 3],
            &sha256(b"a"),
            &[0u8; 64],
        )
        .unwrap_err();
        assert!(matches!(err, VerifyError::SignatureInvalid { .. }));
    }

    #[test]
    fn unknown_algorithm_name_is_unsupported() {
        assert_eq!(
            "ES256".parse::<SignatureAlgorithm>().unwrap(),
            SignatureAlgorithm::Es256
        );
        assert!(matches!(
            "RS256".parse::<SignatureAlgorithm>(),
            Err(VerifyError::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn public_key_json_uses_base64() {
        let pk = PublicKey::new(SignatureAlgorithm::Ed25519, vec![0xAB; 32]);
        let json = serde_json::to_value(&pk).unwrap();
        assert_eq!(json["Algorithm"], "Ed25519");
        let back: PublicKey = serde_json::from_value(json).unwrap();
        assert_eq!(back, pk);
    }
}
