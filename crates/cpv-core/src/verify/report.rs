//! Structured verification results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anchor::AnchorVerdict;
use crate::chain::ChainReport;
use crate::crypto::SignatureAlgorithm;
use crate::error::VerifyError;
use crate::tsa::TrustOutcome;

/// Status of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    /// The check passed.
    Valid,
    /// The check passed with a non-fatal observation.
    Warning,
    /// The check failed.
    Invalid,
    /// The evidence for the check was not supplied.
    NotApplicable,
}

impl CheckStatus {
    /// Text form used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Warning => "WARNING",
            Self::Invalid => "INVALID",
            Self::NotApplicable => "NOT_APPLICABLE",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Status.
    pub status: CheckStatus,
    /// Error code, set when `status` is [`CheckStatus::Invalid`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    /// A passing check.
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            status: CheckStatus::Valid,
            code: None,
            detail: None,
        }
    }

    /// A passing check with a note.
    #[must_use]
    pub fn valid_with(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::valid()
        }
    }

    /// A passing check with a non-fatal observation.
    #[must_use]
    pub fn warning(detail: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warning,
            code: None,
            detail: Some(detail.into()),
        }
    }

    /// A failed check.
    #[must_use]
    pub fn invalid(error: &VerifyError) -> Self {
        Self {
            status: CheckStatus::Invalid,
            code: Some(error.code().to_string()),
            detail: Some(error.to_string()),
        }
    }

    /// A check whose evidence was absent.
    #[must_use]
    pub fn not_applicable(reason: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::NotApplicable,
            code: None,
            detail: Some(reason.into()),
        }
    }

    /// True for [`CheckStatus::Invalid`].
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.status == CheckStatus::Invalid
    }
}

/// The first failed check, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Which check failed.
    pub check: String,
    /// Its error code.
    pub code: String,
    /// Its detail message.
    pub message: String,
}

/// An advisory finding, passed through exactly as the check produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// Check that raised it.
    pub check: String,
    /// The finding.
    pub message: String,
}

/// Everything verification learned about one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// `EventID` of the verified event.
    pub event_id: String,
    /// Digest the event was checked against, prefixed hex.
    pub event_hash: Option<String>,
    /// Algorithm of a verified signature.
    pub signature_algorithm: Option<SignatureAlgorithm>,
    /// Hash and signature check.
    pub event_integrity: CheckResult,
    /// Chain walk and membership check.
    pub chain_integrity: CheckResult,
    /// Chain walk details, when the walk succeeded.
    pub chain: Option<ChainReport>,
    /// Completeness invariant check.
    pub completeness: CheckResult,
    /// Anchor check.
    pub anchor_result: CheckResult,
    /// Anchor details, when the anchor validated.
    pub anchor: Option<AnchorVerdict>,
    /// Time attested by the anchor's TSA.
    pub attested_time: Option<DateTime<Utc>>,
    /// Certificate trust of the TSA.
    pub timestamp_trust: Option<TrustOutcome>,
    /// [`CheckStatus::Valid`] unless some check is invalid.
    pub overall: CheckStatus,
    /// Valid, anchored, and the TSA is trusted.
    pub conclusive: bool,
    /// Non-fatal observations from every check.
    pub warnings: Vec<Warning>,
    /// First invalid check, if any.
    pub first_failure: Option<Failure>,
}

impl VerificationReport {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn assemble(
        event_id: String,
        event_hash: Option<String>,
        signature_algorithm: Option<SignatureAlgorithm>,
        event_integrity: CheckResult,
        chain_integrity: CheckResult,
        chain: Option<ChainReport>,
        completeness: CheckResult,
        anchor_result: CheckResult,
        anchor: Option<AnchorVerdict>,
    ) -> Self {
        let checks = [
            ("event_integrity", &event_integrity),
            ("chain_integrity", &chain_integrity),
            ("completeness", &completeness),
            ("anchor", &anchor_result),
        ];
        let first_failure = checks.iter().find(|(_, c)| c.is_invalid()).map(|(name, c)| Failure {
            check: (*name).to_string(),
            code: c.code.clone().unwrap_or_default(),
            message: c.detail.clone().unwrap_or_default(),
        });
        let warnings = anchor
            .iter()
            .flat_map(|verdict| &verdict.warnings)
            .map(|message| Warning {
                check: "anchor".to_string(),
                message: message.clone(),
            })
            .collect();

        let overall = if first_failure.is_some() {
            CheckStatus::Invalid
        } else {
            CheckStatus::Valid
        };
        let timestamp_trust = anchor.as_ref().map(|a| a.timestamp_trust.clone());
        let conclusive = overall == CheckStatus::Valid
            && anchor_result.status != CheckStatus::NotApplicable
            && timestamp_trust.as_ref().is_some_and(TrustOutcome::is_trusted);

        Self {
            event_id,
            event_hash,
            signature_algorithm,
            event_integrity,
            chain_integrity,
            chain,
            completeness,
            anchor_result,
            attested_time: anchor.as_ref().map(|a| a.attested_time),
            anchor,
            timestamp_trust,
            overall,
            conclusive,
            warnings,
            first_failure,
        }
    }

    /// True when no check is invalid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.overall == CheckStatus::Valid
    }
}
