//! Proof bundles: everything needed to verify one event, in one JSON file.
//!
//! ```json
//! {
//!   "Event": { ... },
//!   "Chain": { "Events": [ ... ], "Completeness": { ... } },
//!   "Anchor": { ... },
//!   "PublicKey": { "Algorithm": "Ed25519", "Key": "<base64>" }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::anchor::Anchor;
use crate::canonical::parse_strict;
use crate::completeness::CompletenessInvariant;
use crate::crypto::PublicKey;
use crate::error::VerifyError;
use crate::event::Event;
use crate::verify::{ChainContext, VerificationRequest};

/// Errors loading a proof bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The file could not be read.
    #[error("failed to read proof bundle: {0}")]
    Io(#[from] std::io::Error),

    /// The JSON is malformed or has duplicate members.
    #[error("malformed proof bundle: {0}")]
    Encoding(#[from] VerifyError),

    /// The JSON does not have the bundle shape.
    #[error("invalid proof bundle: {0}")]
    Shape(#[from] serde_json::Error),
}

/// `Chain` member of a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleChain {
    /// Chain events in producer order.
    #[serde(rename = "Events")]
    pub events: Vec<Event>,
    /// Recorded completeness invariant.
    #[serde(rename = "Completeness", default, skip_serializing_if = "Option::is_none")]
    pub completeness: Option<CompletenessInvariant>,
}

/// On-disk proof bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProofBundle {
    /// The event under verification.
    #[serde(rename = "Event")]
    pub event: Event,
    /// Its chain context.
    #[serde(rename = "Chain", default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<BundleChain>,
    /// Its anchor.
    #[serde(rename = "Anchor", default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Anchor>,
    /// Verification key overriding `SignerInfo.PublicKey`.
    #[serde(rename = "PublicKey", default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKey>,
}

impl ProofBundle {
    /// Reads a bundle from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a bundle.
    pub fn from_file(path: &Path) -> Result<Self, BundleError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parses bundle JSON, rejecting duplicate member names anywhere.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or not a bundle.
    pub fn from_json_str(content: &str) -> Result<Self, BundleError> {
        let value = parse_strict(content).map_err(VerifyError::from)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Converts into an orchestrator request.
    #[must_use]
    pub fn into_request(self) -> VerificationRequest {
        VerificationRequest {
            event: self.event,
            chain: self.chain.map(|c| ChainContext {
                events: c.events,
                completeness: c.completeness,
            }),
            anchor: self.anchor,
            public_key: self.public_key,
        }
    }
}
