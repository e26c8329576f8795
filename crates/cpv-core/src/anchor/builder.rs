//! Producer-side batch anchoring.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, info};

use super::{
    ANCHOR_DIGEST_ALGORITHM, Anchor, AnchorVersion, MerkleEvidence, StoredImprint, TsaEvidence,
};
use crate::cancel::CancellationToken;
use crate::crypto::{self, Hash};
use crate::error::{VerifyError, VerifyResult};
use crate::merkle::{LEAF_HASH_METHOD, MerkleTree};
use crate::tsa::{
    DerTimestampTokenParser, DigestAlgorithm, ParsedToken, TimeStampRequest, TimestampAuthority,
    TimestampTokenParser, token_der,
};

/// Anchors for every event of one batch.
#[derive(Debug, Clone)]
pub struct AnchoredBatch {
    /// The batch tree.
    pub tree: MerkleTree,
    /// What the authority attested.
    pub token: ParsedToken,
    /// One anchor per event, in batch order.
    pub anchors: Vec<Anchor>,
}

/// Builds a batch tree, time-stamps its root and emits per-event anchors.
pub struct AnchorBuilder<'a> {
    authority: &'a dyn TimestampAuthority,
    parser: Arc<dyn TimestampTokenParser>,
    policy: Option<String>,
    nonce: Option<u64>,
}

impl<'a> AnchorBuilder<'a> {
    /// Builder submitting to `authority`.
    #[must_use]
    pub fn new(authority: &'a dyn TimestampAuthority) -> Self {
        Self {
            authority,
            parser: Arc::new(DerTimestampTokenParser),
            policy: None,
            nonce: None,
        }
    }

    /// Requests a specific TSA policy.
    #[must_use]
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    /// Sends a nonce and requires the token to echo it.
    #[must_use]
    pub const fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Anchors `event_hashes` under `anchor_id`.
    ///
    /// The returned token is cross-checked before any anchor is emitted: its
    /// imprint must be SHA-256 over the root and it must echo the nonce.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::EmptyBatch`] for an empty batch
    /// - [`VerifyError::TokenUnparseable`] if the authority's response is not
    ///   a usable token
    /// - [`VerifyError::UnsupportedHashAlgorithm`] or
    ///   [`VerifyError::MessageImprintMismatch`] if the token attests
    ///   something else
    /// - [`VerifyError::Cancelled`] if `cancel` trips
    pub fn anchor_batch(
        &self,
        anchor_id: &str,
        event_hashes: &[Hash],
        cancel: &CancellationToken,
    ) -> VerifyResult<AnchoredBatch> {
        let tree = MerkleTree::build(event_hashes, cancel)?;
        let root = tree.root();

        let mut request = TimeStampRequest::new(root);
        request.policy.clone_from(&self.policy);
        request.nonce = self.nonce;
        let response = self.authority.timestamp(&request.to_der()?)?;
        cancel.check()?;

        let token_bytes = token_der(&response)?;
        let token = self.parser.parse(token_bytes)?;
        if token.hash_algorithm != DigestAlgorithm::Sha256 {
            return Err(VerifyError::UnsupportedHashAlgorithm {
                algorithm: token.hash_algorithm.to_string(),
            });
        }
        if token.hashed_message != root {
            return Err(VerifyError::MessageImprintMismatch {
                token: token.hashed_message_hex(),
                anchor_digest: crypto::to_bare_hex(&root),
            });
        }
        if let Some(nonce) = self.nonce {
            let echoed = token
                .nonce
                .as_deref()
                .and_then(|n| crate::tsa::der::decode_u64(n).ok());
            if echoed != Some(nonce) {
                return Err(VerifyError::token_unparseable("token does not echo the request nonce"));
            }
        }

        let encoded_token = BASE64.encode(token_bytes);
        let digest_hex = crypto::to_bare_hex(&root);
        let anchors = (0..tree.tree_size())
            .map(|index| {
                let proof = tree.proof(index)?;
                Ok(Anchor {
                    version: AnchorVersion::LATEST,
                    anchor_id: anchor_id.to_string(),
                    anchor_digest: digest_hex.clone(),
                    anchor_digest_algorithm: Some(ANCHOR_DIGEST_ALGORITHM.to_string()),
                    merkle: MerkleEvidence {
                        tree_size: tree.tree_size(),
                        leaf_hash_method: Some(LEAF_HASH_METHOD.to_string()),
                        leaf_hash: tree.leaf(index).map(|h| crypto::to_prefixed(&h)),
                        leaf_index: index,
                        proof: proof.siblings_prefixed(),
                        root: crypto::to_prefixed(&root),
                    },
                    tsa: TsaEvidence {
                        token: encoded_token.clone(),
                        message_imprint: Some(StoredImprint {
                            hash_algorithm: token.hash_algorithm.to_string(),
                            hashed_message: token.hashed_message_hex(),
                        }),
                        gen_time: Some(token.gen_time.to_rfc3339()),
                        service: Some(self.authority.service().to_string()),
                    },
                })
            })
            .collect::<VerifyResult<Vec<_>>>()?;

        debug!(anchor_id, count = anchors.len(), "per-event anchors emitted");
        info!(
            anchor_id,
            tree_size = tree.tree_size(),
            gen_time = %token.gen_time,
            "batch anchored"
        );
        Ok(AnchoredBatch {
            tree,
            token,
            anchors,
        })
    }
}
