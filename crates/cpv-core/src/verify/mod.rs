//! Verification orchestration.
//!
//! [`Verifier`] runs every applicable check for one event and folds the
//! outcomes into a [`VerificationReport`]:
//!
//! | Check | Inputs | Not applicable when |
//! |---|---|---|
//! | event integrity | event, optional key | never |
//! | chain integrity | chain context | no chain supplied |
//! | completeness | chain context + invariant | no invariant recorded |
//! | anchor | anchor | no anchor and the policy does not require one |
//!
//! Checks never short-circuit each other: a broken chain still gets its
//! anchor checked, so the report names every failed check. Only
//! cancellation aborts verification as a whole.

mod report;

use std::num::NonZeroUsize;
use std::sync::Arc;

pub use report::{CheckResult, CheckStatus, Failure, VerificationReport, Warning};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::anchor::{Anchor, AnchorValidator, AnchorVerdict};
use crate::cancel::CancellationToken;
use crate::canonical::Canonicalizer;
use crate::chain::{ChainReport, ChainValidator};
use crate::completeness::{CompletenessChecker, CompletenessInvariant};
use crate::config::VerificationPolicy;
use crate::crypto::{self, Hash, PublicKey, SignatureAlgorithm};
use crate::error::{VerifyError, VerifyResult};
use crate::event::{Event, EventHasher};
use crate::tsa::{TimestampTokenParser, TsaTrustValidator};

/// The chain an event claims to belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainContext {
    /// Events in producer order.
    pub events: Vec<Event>,
    /// Recorded completeness invariant, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completeness: Option<CompletenessInvariant>,
}

/// Everything needed to verify one event.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRequest {
    /// The event under verification.
    pub event: Event,
    /// Its chain context.
    pub chain: Option<ChainContext>,
    /// Its anchor.
    pub anchor: Option<Anchor>,
    /// Key overriding `SignerInfo.PublicKey`.
    pub public_key: Option<PublicKey>,
}

impl VerificationRequest {
    /// A request for `event` with no further evidence.
    #[must_use]
    pub const fn new(event: Event) -> Self {
        Self {
            event,
            chain: None,
            anchor: None,
            public_key: None,
        }
    }
}

/// Runs verification requests under one policy.
#[derive(Debug, Clone)]
pub struct Verifier {
    policy: VerificationPolicy,
    hasher: EventHasher,
    anchors: AnchorValidator,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(VerificationPolicy::default())
    }
}

impl Verifier {
    /// A verifier using the default canonicalizer, token parser and no
    /// certificate trust evaluation.
    #[must_use]
    pub fn new(policy: VerificationPolicy) -> Self {
        let anchors = AnchorValidator::default()
            .with_accepted_services(policy.accepted_tsa_services.clone());
        Self {
            policy,
            hasher: EventHasher::default(),
            anchors,
        }
    }

    /// Replaces the canonical encoding used for event hashes.
    #[must_use]
    pub fn with_canonicalizer(mut self, canonicalizer: Arc<dyn Canonicalizer>) -> Self {
        self.hasher = EventHasher::new(canonicalizer);
        self
    }

    /// Replaces the time-stamp token parser.
    #[must_use]
    pub fn with_token_parser(mut self, parser: Arc<dyn TimestampTokenParser>) -> Self {
        self.anchors = self.anchors.with_parser(parser);
        self
    }

    /// Installs certificate trust evaluation for time-stamp authorities.
    #[must_use]
    pub fn with_trust(mut self, trust: Arc<dyn TsaTrustValidator>) -> Self {
        self.anchors = self.anchors.with_trust(trust);
        self
    }

    /// The policy in force.
    #[must_use]
    pub const fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// Verifies one request.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Cancelled`] if `cancel` trips. Every other
    /// failure is reported inside the returned report.
    #[instrument(skip_all, fields(event_id = request.event.event_id()))]
    pub fn verify(
        &self,
        request: &VerificationRequest,
        cancel: &CancellationToken,
    ) -> VerifyResult<VerificationReport> {
        cancel.check()?;
        let event = &request.event;

        let (event_integrity, signature_algorithm) =
            self.check_event(event, request.public_key.as_ref());
        let digest = event_digest(event, &self.hasher);

        let (chain_integrity, chain) = match &request.chain {
            None => (CheckResult::not_applicable("no chain context supplied"), None),
            Some(context) => self.check_chain(event, digest.as_ref(), &context.events, cancel)?,
        };

        let recorded = request
            .chain
            .as_ref()
            .and_then(|c| c.completeness.as_ref().map(|invariant| (&c.events, invariant)));
        let completeness = match recorded {
            None => CheckResult::not_applicable("no completeness invariant recorded"),
            Some((events, invariant)) => match CompletenessChecker.check(events, invariant, cancel) {
                Ok(()) => CheckResult::valid(),
                Err(VerifyError::Cancelled) => return Err(VerifyError::Cancelled),
                Err(e) => CheckResult::invalid(&e),
            },
        };

        cancel.check()?;
        let (anchor_result, anchor) =
            self.check_anchor(request.anchor.as_ref(), digest.as_ref(), cancel)?;

        let report = VerificationReport::assemble(
            event.event_id().to_string(),
            digest.as_ref().ok().map(crypto::to_prefixed),
            signature_algorithm,
            event_integrity,
            chain_integrity,
            chain,
            completeness,
            anchor_result,
            anchor,
        );

        if report.overall == CheckStatus::Valid {
            info!(conclusive = report.conclusive, "event verified");
        } else if let Some(failure) = &report.first_failure {
            warn!(check = %failure.check, code = %failure.code, "event failed verification");
        }
        Ok(report)
    }

    /// Verifies independent requests in parallel on scoped threads.
    ///
    /// Results keep the order of `requests`. Once `cancel` trips, remaining
    /// requests yield [`VerifyError::Cancelled`].
    #[instrument(skip_all, fields(count = requests.len()))]
    pub fn verify_many(
        &self,
        requests: &[VerificationRequest],
        cancel: &CancellationToken,
    ) -> Vec<VerifyResult<VerificationReport>> {
        if requests.is_empty() {
            return Vec::new();
        }
        let workers = std::thread::available_parallelism()
            .map_or(1, NonZeroUsize::get)
            .min(requests.len());
        let chunk = requests.len().div_ceil(workers);
        debug!(workers, chunk, "verifying in parallel");

        std::thread::scope(|scope| {
            let handles: Vec<_> = requests
                .chunks(chunk)
                .map(|part| {
                    scope.spawn(move || {
                        part.iter()
                            .map(|request| self.verify(request, cancel))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }

    fn check_event(
        &self,
        event: &Event,
        key: Option<&PublicKey>,
    ) -> (CheckResult, Option<SignatureAlgorithm>) {
        let digest = match self.hasher.verify(event) {
            Ok(digest) => digest,
            Err(e) => return (CheckResult::invalid(&e), None),
        };

        if event.signature().is_none() {
            return if self.policy.require_signature {
                (
                    CheckResult::invalid(&VerifyError::missing("event signature")),
                    None,
                )
            } else {
                (CheckResult::valid_with("hash verified; event is unsigned"), None)
            };
        }

        match event.verify_signature(&digest, key, &self.policy.accepted_signature_algorithms) {
            Ok(algorithm) => (CheckResult::valid(), Some(algorithm)),
            Err(e) => (CheckResult::invalid(&e), None),
        }
    }

    fn check_chain(
        &self,
        event: &Event,
        digest: Result<&Hash, &VerifyError>,
        events: &[Event],
        cancel: &CancellationToken,
    ) -> VerifyResult<(CheckResult, Option<ChainReport>)> {
        let validator = ChainValidator::new(self.hasher.clone())
            .with_recomputed_hashes(self.policy.recompute_chain_hashes);
        let report = match validator.validate(events, cancel) {
            Ok(report) => report,
            Err(VerifyError::Cancelled) => return Err(VerifyError::Cancelled),
            Err(e) => return Ok((CheckResult::invalid(&e), None)),
        };

        let not_in_chain = || VerifyError::EventNotInChain {
            event_id: event.event_id().to_string(),
            chain_id: report.chain_id.clone(),
        };
        let Ok(digest) = digest else {
            return Ok((CheckResult::invalid(&not_in_chain()), Some(report)));
        };
        let member = events.iter().any(|candidate| {
            candidate
                .event_hash_bytes()
                .is_ok_and(|h| crypto::digests_equal(&h, digest))
        });
        if !member || event.chain_id() != report.chain_id {
            return Ok((CheckResult::invalid(&not_in_chain()), Some(report)));
        }

        let result = if report.tombstones.is_empty() {
            CheckResult::valid()
        } else {
            CheckResult::valid_with(format!(
                "{} tombstone(s) recorded as intentional deletions",
                report.tombstones.len()
            ))
        };
        Ok((result, Some(report)))
    }

    fn check_anchor(
        &self,
        anchor: Option<&Anchor>,
        digest: Result<&Hash, &VerifyError>,
        cancel: &CancellationToken,
    ) -> VerifyResult<(CheckResult, Option<AnchorVerdict>)> {
        let Some(anchor) = anchor else {
            return Ok(if self.policy.require_anchor {
                (CheckResult::invalid(&VerifyError::missing("anchor")), None)
            } else {
                (CheckResult::not_applicable("no anchor supplied"), None)
            });
        };
        let digest = match digest {
            Ok(digest) => digest,
            Err(e) => return Ok((CheckResult::invalid(e), None)),
        };

        match self.anchors.validate(anchor, digest, cancel) {
            Ok(verdict) if verdict.warnings.is_empty() => Ok((CheckResult::valid(), Some(verdict))),
            Ok(verdict) => {
                let detail = format!("{} advisory finding(s)", verdict.warnings.len());
                Ok((CheckResult::warning(detail), Some(verdict)))
            },
            Err(VerifyError::Cancelled) => Err(VerifyError::Cancelled),
            Err(e) => Ok((CheckResult::invalid(&e), None)),
        }
    }
}

/// The digest chain membership and anchoring are checked against: the
/// stored `EventHash`, falling back to the recomputed one when absent.
fn event_digest(event: &Event, hasher: &EventHasher) -> VerifyResult<Hash> {
    if event.event_hash().is_some() {
        event.event_hash_bytes()
    } else {
        hasher.compute(event)
    }
}
