//! Completeness invariant over a set of events.
//!
//! The invariant commits to *which* events exist without committing to their
//! order: `hash_sum` is the XOR of `SHA-256(EventHash bytes)` over the set.
//! Adding, removing or substituting an event changes the count or the sum;
//! reordering changes neither, which is the chain's job to catch.
//!
//! Boundary members (`first_timestamp`, `last_timestamp`, `first_event_id`,
//! `last_event_id`) are optional and only checked when recorded.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::crypto::{self, HASH_SIZE, Hash};
use crate::error::{CompletenessViolationKind, VerifyError, VerifyResult};
use crate::event::Event;

/// Recorded completeness commitment for a batch of events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessInvariant {
    /// Number of events in the batch.
    pub expected_count: u64,
    /// `sha256:` + hex of the XOR commitment.
    pub hash_sum: String,
    /// Smallest `Timestamp` in the batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<String>,
    /// Largest `Timestamp` in the batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<String>,
    /// `EventID` of the first event in supplied order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_event_id: Option<String>,
    /// `EventID` of the last event in supplied order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,
}

impl CompletenessInvariant {
    /// Computes the invariant for `events`, including boundary members.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::EmptyBatch`] for an empty slice
    /// - [`VerifyError::EncodingError`] if an event lacks a readable
    ///   `EventHash`
    /// - [`VerifyError::Cancelled`] if `cancel` trips
    pub fn compute(events: &[Event], cancel: &CancellationToken) -> VerifyResult<Self> {
        if events.is_empty() {
            return Err(VerifyError::EmptyBatch);
        }
        let sum = xor_commitment(events, cancel)?;
        let timestamps = events.iter().map(Event::timestamp);

        Ok(Self {
            expected_count: events.len() as u64,
            hash_sum: crypto::to_prefixed(&sum),
            first_timestamp: timestamps.clone().min().map(str::to_string),
            last_timestamp: timestamps.max().map(str::to_string),
            first_event_id: events.first().map(|e| e.event_id().to_string()),
            last_event_id: events.last().map(|e| e.event_id().to_string()),
        })
    }

    /// Commitment over bare `EventHash` values.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Cancelled`] if `cancel` trips.
    pub fn from_hashes(hashes: &[Hash], cancel: &CancellationToken) -> VerifyResult<Self> {
        let mut sum = [0u8; HASH_SIZE];
        for hash in hashes {
            cancel.check()?;
            fold(&mut sum, hash);
        }
        Ok(Self {
            expected_count: hashes.len() as u64,
            hash_sum: crypto::to_prefixed(&sum),
            first_timestamp: None,
            last_timestamp: None,
            first_event_id: None,
            last_event_id: None,
        })
    }
}

/// Checks candidate event sets against a recorded invariant.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletenessChecker;

impl CompletenessChecker {
    /// Verifies `events` against `invariant`.
    ///
    /// Checks run in order: count, hash sum, then any recorded boundary
    /// member. The first failure is returned.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::CompletenessViolation`] naming the failed check
    /// - [`VerifyError::EncodingError`] if the recorded `hash_sum` or an
    ///   event's `EventHash` is malformed
    /// - [`VerifyError::Cancelled`] if `cancel` trips
    pub fn check(
        &self,
        events: &[Event],
        invariant: &CompletenessInvariant,
        cancel: &CancellationToken,
    ) -> VerifyResult<()> {
        let actual = events.len() as u64;
        if actual != invariant.expected_count {
            warn!(expected = invariant.expected_count, actual, "completeness count mismatch");
            return Err(violation(CompletenessViolationKind::CountMismatch {
                expected: invariant.expected_count,
                actual,
            }));
        }

        let recorded = crypto::parse_prefixed(&invariant.hash_sum)?;
        let computed = xor_commitment(events, cancel)?;
        if !crypto::digests_equal(&recorded, &computed) {
            warn!("completeness hash-sum mismatch");
            return Err(violation(CompletenessViolationKind::HashSumMismatch {
                expected: invariant.hash_sum.clone(),
                actual: crypto::to_prefixed(&computed),
            }));
        }

        let timestamps = events.iter().map(Event::timestamp);
        check_boundary(
            "first_timestamp",
            invariant.first_timestamp.as_deref(),
            timestamps.clone().min(),
        )?;
        check_boundary(
            "last_timestamp",
            invariant.last_timestamp.as_deref(),
            timestamps.max(),
        )?;
        check_boundary(
            "first_event_id",
            invariant.first_event_id.as_deref(),
            events.first().map(Event::event_id),
        )?;
        check_boundary(
            "last_event_id",
            invariant.last_event_id.as_deref(),
            events.last().map(Event::event_id),
        )?;

        debug!(count = actual, "completeness invariant holds");
        Ok(())
    }
}

fn xor_commitment(events: &[Event], cancel: &CancellationToken) -> VerifyResult<Hash> {
    let mut sum = [0u8; HASH_SIZE];
    for event in events {
        cancel.check()?;
        fold(&mut sum, &event.event_hash_bytes()?);
    }
    Ok(sum)
}

fn fold(sum: &mut Hash, event_hash: &Hash) {
    let digest = crypto::sha256(event_hash);
    for (acc, byte) in sum.iter_mut().zip(digest) {
        *acc ^= byte;
    }
}

fn check_boundary(field: &str, recorded: Option<&str>, actual: Option<&str>) -> VerifyResult<()> {
    let Some(expected) = recorded else {
        return Ok(());
    };
    let actual = actual.unwrap_or_default();
    if expected == actual {
        Ok(())
    } else {
        warn!(field, "completeness boundary mismatch");
        Err(violation(CompletenessViolationKind::BoundaryMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }))
    }
}

fn violation(kind: CompletenessViolationKind) -> VerifyError {
    VerifyError::CompletenessViolation { kind }
}
