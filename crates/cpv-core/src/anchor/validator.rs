//! Anchor validation.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Anchor;
use crate::cancel::CancellationToken;
use crate::crypto::{self, Hash};
use crate::error::{VerifyError, VerifyResult};
use crate::merkle::{LEAF_HASH_METHOD, MerkleProofVerifier, leaf_hash};
use crate::tsa::{
    DerTimestampTokenParser, DigestAlgorithm, NoTrustEvaluation, TimestampTokenParser,
    TrustOutcome, TsaTrustValidator,
};

/// Result of a successful anchor validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorVerdict {
    /// `AnchorID`.
    pub anchor_id: String,
    /// `genTime` taken from the token.
    pub attested_time: DateTime<Utc>,
    /// Batch size.
    pub tree_size: usize,
    /// Position of the event in the batch.
    pub leaf_index: usize,
    /// Verified root, `sha256:<hex>`.
    pub root: String,
    /// Authority name, when recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Advisory findings that do not invalidate the anchor.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Certificate trust in the authority.
    pub timestamp_trust: TrustOutcome,
}

/// Validates anchors against the event hash they claim to cover.
///
/// Checks run in a fixed order and the first failure ends validation:
///
/// 1. single-leaf batches: index 0, empty proof, root equals the leaf hash
/// 2. larger batches: the inclusion proof recomputes the root
/// 3. `LeafHashMethod`, when present, is `SHA256(EventHash)`
/// 4. `AnchorDigest` equals the root
/// 5. the token parses
/// 6. the token's imprint algorithm is SHA-256
/// 7. the token's imprint equals `AnchorDigest`
/// 8. a stored imprint that differs from the token's is only a warning
#[derive(Clone)]
pub struct AnchorValidator {
    parser: Arc<dyn TimestampTokenParser>,
    trust: Arc<dyn TsaTrustValidator>,
    accepted_services: Vec<String>,
}

impl Default for AnchorValidator {
    fn default() -> Self {
        Self {
            parser: Arc::new(DerTimestampTokenParser),
            trust: Arc::new(NoTrustEvaluation),
            accepted_services: Vec::new(),
        }
    }
}

impl fmt::Debug for AnchorValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnchorValidator")
            .field("accepted_services", &self.accepted_services)
            .finish_non_exhaustive()
    }
}

impl AnchorValidator {
    /// Replaces the token parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn TimestampTokenParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Replaces the certificate trust evaluation.
    #[must_use]
    pub fn with_trust(mut self, trust: Arc<dyn TsaTrustValidator>) -> Self {
        self.trust = trust;
        self
    }

    /// Restricts accepted authorities. An empty list accepts any.
    #[must_use]
    pub fn with_accepted_services(mut self, services: Vec<String>) -> Self {
        self.accepted_services = services;
        self
    }

    /// Validates `anchor` for the event whose digest is `event_hash`.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::EmptyBatch`] for `TreeSize` 0
    /// - [`VerifyError::ProofInvalid`] if inclusion fails
    /// - [`VerifyError::UnsupportedLeafHashMethod`]
    /// - [`VerifyError::UnsupportedHashAlgorithm`] for a non-SHA-256 anchor
    ///   digest or token imprint
    /// - [`VerifyError::AnchorDigestMismatch`]
    /// - [`VerifyError::TokenUnparseable`]
    /// - [`VerifyError::MessageImprintMismatch`]
    /// - [`VerifyError::UntrustedTimestampAuthority`] if the service is not
    ///   accepted
    /// - [`VerifyError::EncodingError`] for malformed hash strings, including
    ///   an `AnchorDigest` that is not bare hex
    /// - [`VerifyError::Cancelled`] if `cancel` trips during proof folding
    pub fn validate(
        &self,
        anchor: &Anchor,
        event_hash: &Hash,
        cancel: &CancellationToken,
    ) -> VerifyResult<AnchorVerdict> {
        let merkle = &anchor.merkle;
        let root = crypto::parse_lenient(&merkle.root)?;
        let leaf = leaf_hash(event_hash);

        // Steps 1 and 2: inclusion.
        match merkle.tree_size {
            0 => return Err(VerifyError::EmptyBatch),
            1 => {
                if merkle.leaf_index != 0 {
                    return Err(VerifyError::proof_invalid(format!(
                        "single-leaf batch with LeafIndex {}",
                        merkle.leaf_index
                    )));
                }
                if !merkle.proof.is_empty() {
                    return Err(VerifyError::proof_invalid(
                        "single-leaf batch must carry an empty proof",
                    ));
                }
                check_recorded_leaf(merkle.leaf_hash.as_deref(), &leaf)?;
                if !crypto::digests_equal(&root, &leaf) {
                    return Err(VerifyError::proof_invalid(
                        "single-leaf root is not SHA-256(EventHash)",
                    ));
                }
            },
            tree_size => {
                check_recorded_leaf(merkle.leaf_hash.as_deref(), &leaf)?;
                let proof = merkle
                    .proof
                    .iter()
                    .map(|s| crypto::parse_lenient(s))
                    .collect::<VerifyResult<Vec<_>>>()?;
                MerkleProofVerifier::verify_sized(
                    event_hash,
                    merkle.leaf_index,
                    tree_size,
                    &proof,
                    &root,
                    cancel,
                )?;
            },
        }
        debug!(anchor_id = %anchor.anchor_id, "merkle inclusion verified");

        // Step 3.
        if let Some(method) = &merkle.leaf_hash_method {
            if method != LEAF_HASH_METHOD {
                return Err(VerifyError::UnsupportedLeafHashMethod {
                    method: method.clone(),
                });
            }
        }

        // Step 4.
        if let Some(algorithm) = &anchor.anchor_digest_algorithm {
            if DigestAlgorithm::from_name(algorithm) != DigestAlgorithm::Sha256 {
                return Err(VerifyError::UnsupportedHashAlgorithm {
                    algorithm: algorithm.clone(),
                });
            }
        }
        let anchor_digest = crypto::parse_bare(&anchor.anchor_digest)?;
        if !crypto::digests_equal(&anchor_digest, &root) {
            warn!(anchor_id = %anchor.anchor_id, "anchor digest does not match root");
            return Err(VerifyError::AnchorDigestMismatch {
                anchor_digest: anchor.anchor_digest.clone(),
                root: merkle.root.clone(),
            });
        }

        // Step 5.
        let token_der = anchor.token_der()?;
        let parsed = self.parser.parse(&token_der)?;

        // Step 6.
        if parsed.hash_algorithm != DigestAlgorithm::Sha256 {
            return Err(VerifyError::UnsupportedHashAlgorithm {
                algorithm: parsed.hash_algorithm.to_string(),
            });
        }

        // Step 7.
        let imprint_matches = <[u8; crypto::HASH_SIZE]>::try_from(parsed.hashed_message.as_slice())
            .is_ok_and(|imprint| crypto::digests_equal(&imprint, &anchor_digest));
        if !imprint_matches {
            warn!(anchor_id = %anchor.anchor_id, "token imprint does not match anchor digest");
            return Err(VerifyError::MessageImprintMismatch {
                token: parsed.hashed_message_hex(),
                anchor_digest: crypto::to_bare_hex(&anchor_digest),
            });
        }

        if !self.accepted_services.is_empty() {
            let service = anchor.tsa.service.as_deref().unwrap_or_default();
            if !self.accepted_services.iter().any(|s| s == service) {
                return Err(VerifyError::UntrustedTimestampAuthority {
                    service: service.to_string(),
                });
            }
        }

        // Step 8.
        let mut warnings = Vec::new();
        if let Some(stored) = &anchor.tsa.message_imprint {
            let algorithm_differs =
                DigestAlgorithm::from_name(&stored.hash_algorithm) != parsed.hash_algorithm;
            let message_differs = !stored
                .hashed_message
                .trim()
                .eq_ignore_ascii_case(&parsed.hashed_message_hex());
            if algorithm_differs || message_differs {
                warn!(anchor_id = %anchor.anchor_id, "stored MessageImprint differs from token");
                warnings.push(format!(
                    "stored TSA.MessageImprint ({}:{}) differs from token ({}:{})",
                    stored.hash_algorithm,
                    stored.hashed_message,
                    parsed.hash_algorithm,
                    parsed.hashed_message_hex()
                ));
            }
        }

        let timestamp_trust = self.trust.evaluate(&token_der, &parsed);
        debug!(anchor_id = %anchor.anchor_id, gen_time = %parsed.gen_time, "anchor verified");

        Ok(AnchorVerdict {
            anchor_id: anchor.anchor_id.clone(),
            attested_time: parsed.gen_time,
            tree_size: merkle.tree_size,
            leaf_index: merkle.leaf_index,
            root: crypto::to_prefixed(&root),
            service: anchor.tsa.service.clone(),
            warnings,
            timestamp_trust,
        })
    }
}

fn check_recorded_leaf(recorded: Option<&str>, computed: &Hash) -> VerifyResult<()> {
    let Some(recorded) = recorded else {
        return Ok(());
    };
    if crypto::digests_equal(&crypto::parse_lenient(recorded)?, computed) {
        Ok(())
    } else {
        Err(VerifyError::proof_invalid(format!(
            "LeafHash {recorded} is not SHA-256(EventHash) {}",
            crypto::to_prefixed(computed)
        )))
    }
}
