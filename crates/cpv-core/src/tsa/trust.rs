//! TSA certificate trust.

use serde::{Deserialize, Serialize};

use super::token::ParsedToken;

/// Outcome of evaluating the TSA's signing certificate.
///
/// Trust never changes whether a proof is structurally valid; it decides
/// whether the attested time is conclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrustOutcome {
    /// The token's signer chains to an accepted root.
    Trusted {
        /// Subject or label of the signer, for display.
        signer: String,
    },
    /// The signer could not be trusted.
    Untrusted {
        /// Why trust failed.
        reason: String,
    },
    /// No trust evaluation was configured.
    NotEvaluated,
}

impl TrustOutcome {
    /// True only for [`TrustOutcome::Trusted`].
    #[must_use]
    pub const fn is_trusted(&self) -> bool {
        matches!(self, Self::Trusted { .. })
    }
}

/// Pluggable certificate-chain evaluation for time-stamp tokens.
pub trait TsaTrustValidator: Send + Sync {
    /// Evaluates trust in the authority that produced `token_der`.
    fn evaluate(&self, token_der: &[u8], parsed: &ParsedToken) -> TrustOutcome;
}

/// Validator that performs no evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrustEvaluation;

impl TsaTrustValidator for NoTrustEvaluation {
    fn evaluate(&self, _token_der: &[u8], _parsed: &ParsedToken) -> TrustOutcome {
        TrustOutcome::NotEvaluated
    }
}
